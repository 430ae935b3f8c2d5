use thiserror::Error;

use docrecon_config::ConfigError;
use docrecon_engine::EngineError;
use docrecon_io::DocumentError;

pub type Result<T> = std::result::Result<T, ReconError>;

#[derive(Debug, Error)]
pub enum ReconError {
    /// A side references an input no path was supplied for.
    #[error("no path supplied for input '{0}'")]
    MissingInput(String),

    /// A set-aside rule or projection names a column the side lacks.
    #[error("side '{side}': missing column '{column}'")]
    MissingColumn { side: String, column: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}
