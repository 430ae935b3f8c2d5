use thiserror::Error;

use docrecon_config::ColumnType;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A step or operation referenced a column the table does not have.
    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// Two columns of one table would share a name.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    /// A record does not match the table's width.
    #[error("row has {found} fields, table has {expected} columns")]
    RowWidth { expected: usize, found: usize },

    /// A raw field could not be coerced to its declared type.
    #[error("column '{column}': cannot parse '{value}' as {expected:?}")]
    Coerce {
        column: String,
        value: String,
        expected: ColumnType,
    },

    #[error("column '{column}': cannot parse date '{value}'")]
    DateParse { column: String, value: String },

    /// Mutation step declared with a name no registry entry answers to.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// A required parameter is absent or has the wrong shape.
    #[error("action '{action}': invalid parameter '{param}': {reason}")]
    InvalidParam {
        action: String,
        param: String,
        reason: String,
    },

    #[error("worker pool error: {0}")]
    Pool(String),

    /// A pipeline step failed; no partial result is kept.
    #[error("step '{step}' failed on '{report}': {source}")]
    Step {
        step: String,
        report: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub fn invalid_param(action: &str, param: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            action: action.to_string(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }
}
