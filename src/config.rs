//! Repository mapping table and its reloadable in-memory cache.
//!
//! The table is a JSON object keyed by `"{owner}/{name}"` or
//! `"{owner}/{name}/branch:{branch}"`:
//!
//! ```json
//! {
//!   "octo/site": { "path": "/srv/site" },
//!   "octo/site/branch:staging": {
//!     "path": "/srv/site-staging",
//!     "action": [["git", "pull", "origin", "staging"], ["make", "deploy"]],
//!     "env": { "DEPLOY_ENV": "staging" }
//!   }
//! }
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info};

use crate::error::{HookError, Result};

/// One command invocation as an argument vector.
///
/// A bare string is accepted as a program with no arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "CommandLineRepr")]
pub struct CommandLine(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandLineRepr {
    Argv(Vec<String>),
    Program(String),
}

impl From<CommandLineRepr> for CommandLine {
    fn from(repr: CommandLineRepr) -> Self {
        match repr {
            CommandLineRepr::Argv(argv) => CommandLine(argv),
            CommandLineRepr::Program(program) => CommandLine(vec![program]),
        }
    }
}

impl CommandLine {
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }
}

/// A single repository mapping entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepoMapping {
    /// Working directory for triggered commands. Entries without a path are a no-op.
    pub path: Option<PathBuf>,
    /// Commands to run instead of the default pull.
    pub action: Option<Vec<CommandLine>>,
    /// Variables overlaid on the service's own environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl RepoMapping {
    /// Returns the configured commands, or `None` when the default pull applies.
    pub fn commands(&self) -> Option<&[CommandLine]> {
        self.action.as_deref().filter(|cmds| !cmds.is_empty())
    }
}

/// The full mapping table, keyed by repository (optionally branch-qualified).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RepoTable {
    pub entries: BTreeMap<String, RepoMapping>,
}

impl RepoTable {
    pub fn get(&self, key: &str) -> Option<&RepoMapping> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse and validate a table from JSON text.
    pub fn from_json(path: &Path, text: &str) -> Result<Self> {
        let table: RepoTable =
            serde_json::from_str(text).map_err(|source| HookError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        for (key, mapping) in &self.entries {
            let mut segments = key.split('/');
            let owner = segments.next().unwrap_or_default();
            let name = segments.next().unwrap_or_default();
            if owner.is_empty() || name.is_empty() {
                return Err(HookError::ConfigInvalid {
                    key: key.clone(),
                    message: "key must look like 'owner/name' or 'owner/name/branch:<branch>'"
                        .to_string(),
                });
            }
            for (idx, cmd) in mapping.action.iter().flatten().enumerate() {
                if cmd.program().is_none_or(str::is_empty) {
                    return Err(HookError::ConfigInvalid {
                        key: key.clone(),
                        message: format!("action #{} has no program", idx),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Load and parse the repository mapping file
pub fn load_repo_table(path: &Path) -> Result<RepoTable> {
    let text = fs::read_to_string(path).map_err(|source| HookError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    RepoTable::from_json(path, &text)
}

/// Lazily loaded, explicitly reloadable view of the mapping file.
///
/// Readers get an `Arc` snapshot and never hold the lock while dispatching;
/// `reload` swaps in a fresh snapshot only after the new file parsed cleanly.
pub struct ConfigCache {
    path: PathBuf,
    current: RwLock<Option<Arc<RepoTable>>>,
}

impl ConfigCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
        }
    }

    /// Cache that starts out holding `table` instead of reading from disk.
    pub fn with_table(path: impl Into<PathBuf>, table: RepoTable) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Some(Arc::new(table))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot, loading the file on first use.
    pub fn snapshot(&self) -> Result<Arc<RepoTable>> {
        if let Some(table) = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(table));
        }

        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        // another request may have loaded it while we waited for the write lock
        if let Some(table) = slot.as_ref() {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(load_repo_table(&self.path)?);
        info!(
            "Loaded {} repository mapping(s) from {:?}",
            table.len(),
            self.path
        );
        *slot = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Re-read the mapping file and install it as the new snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<RepoTable>> {
        let table = match load_repo_table(&self.path) {
            Ok(table) => Arc::new(table),
            Err(e) => {
                error!("Failed to reload repository config: {}", e);
                return Err(e);
            }
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&table));
        info!(
            "Repository config reloaded: {} mapping(s) from {:?}",
            table.len(),
            self.path
        );
        Ok(table)
    }
}
