use std::path::PathBuf;

/// Errors raised while loading or validating a lending policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy file could not be read.
    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The policy text is not valid TOML or has the wrong shape.
    #[error("failed to parse policy: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the lending rules cannot work with.
    #[error("invalid policy field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
