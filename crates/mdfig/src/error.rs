//! CLI error types.

use mdfig_config::ConfigError;
use mdfig_render::{DocumentError, PoolConfigError, RenderError};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("{0}")]
    Pool(#[from] PoolConfigError),

    #[error("{0}")]
    Document(#[from] DocumentError),

    #[error("{path}: {source}")]
    ReadInput {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} diagram(s) failed to render")]
    Failed(usize),
}
