use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubicError {
    #[error("Unsupported pod network, please use 'flannel' or 'cilium'")]
    UnsupportedPodNetwork(String),

    #[error("invalid target spec '{0}': expected host names or a pattern")]
    InvalidTargetSpec(String),

    #[error("invalid key '{0}': keys must be non-empty and contain no '=' or newline")]
    InvalidKey(String),

    #[error("malformed line {line} in {}: {content}", path.display())]
    MalformedStore {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl KubicError {
    /// True for errors caused by caller input rather than host state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            KubicError::UnsupportedPodNetwork(_)
                | KubicError::InvalidTargetSpec(_)
                | KubicError::InvalidKey(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KubicError>;
