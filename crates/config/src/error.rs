use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    Parse(String),

    /// A group member reference names a category that does not exist.
    #[error("invalid group reference '{reference}': unknown category '{category}'")]
    UnknownCategory { reference: String, category: String },

    /// A group member reference names a key absent from its category.
    #[error("invalid group reference '{reference}': no source named '{key}' under '{category}'")]
    UnknownMember {
        reference: String,
        category: String,
        key: String,
    },

    /// A group member reference is not of the form `category.key`.
    #[error("invalid group reference '{0}': expected 'category.key'")]
    MalformedReference(String),

    /// The same alias string is declared twice.
    #[error("duplicate alias '{alias}' (declared for '{first}' and '{second}')")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },

    /// Structural validation failure (missing output, bad side count, ...).
    #[error("config validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
