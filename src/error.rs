use std::io;
use std::path::PathBuf;

/// Custom error type for simple_git_hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Failed to read repository config '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse repository config '{}': {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid repository config entry '{key}': {message}")]
    ConfigInvalid { key: String, message: String },

    #[error("GitHub meta request failed: {0}")]
    MetaFetch(#[from] reqwest::Error),

    #[error("Invalid webhook payload: {0}")]
    BadPayload(String),

    #[error("Failed to spawn '{program}' in '{}': {source}", cwd.display())]
    Spawn {
        program: String,
        cwd: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Helper type for Results that use HookError
pub type Result<T> = std::result::Result<T, HookError>;
