//! Webhook related structures

use serde::Deserialize;

use crate::error::{HookError, Result};

/// The subset of GitHub's push event payload this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub name: Option<String>,
    pub login: Option<String>,
}

impl PushPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| HookError::BadPayload(e.to_string()))
    }

    /// Repository coordinates used for mapping lookup.
    pub fn target(&self) -> Result<RepoTarget> {
        let owner = self
            .repository
            .owner
            .name
            .as_deref()
            .or(self.repository.owner.login.as_deref())
            .filter(|o| !o.is_empty())
            .ok_or_else(|| HookError::BadPayload("repository.owner.name is missing".into()))?;

        Ok(RepoTarget {
            owner: owner.to_string(),
            name: self.repository.name.clone(),
            branch: self
                .git_ref
                .strip_prefix("refs/heads/")
                .map(str::to_string),
        })
    }
}

/// Repository and branch a push was made to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub owner: String,
    pub name: String,
    /// `None` when the ref is not a branch (tags, notes, ...).
    pub branch: Option<String>,
}

impl RepoTarget {
    pub fn repo_key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn branch_key(&self) -> Option<String> {
        self.branch
            .as_ref()
            .map(|branch| format!("{}/{}/branch:{}", self.owner, self.name, branch))
    }
}
