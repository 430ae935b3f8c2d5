use std::path::PathBuf;

use thiserror::Error;

use docrecon_config::ConfigError;
use docrecon_engine::EngineError;

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Neither a file nor a directory, and not to be created.
    #[error("path not found: '{}'", .0.display())]
    NotFound(PathBuf),

    /// Malformed delimited input.
    #[error("'{path}': {message}")]
    Delimited { path: PathBuf, message: String },

    #[error("'{path}': spreadsheet error: {message}")]
    Spreadsheet { path: PathBuf, message: String },

    /// A declared section does not exist in the opened source.
    #[error("document '{document}': no section named '{section}'")]
    MissingSection { document: String, section: String },

    /// Sections were declared for a source format that has none.
    #[error("document '{document}': sections require a spreadsheet source")]
    SectionsUnsupported { document: String },

    /// Alias substitution mapped two source columns onto one name.
    #[error("document '{document}': columns '{first}' and '{second}' both resolve to '{column}'")]
    AliasCollision {
        document: String,
        column: String,
        first: String,
        second: String,
    },

    #[error("invalid read option: {0}")]
    ReadOption(String),

    #[error("cannot write '{path}': {message}")]
    Write { path: PathBuf, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
