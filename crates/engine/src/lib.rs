pub mod actions;
pub mod dates;
pub mod error;
pub mod generators;
pub mod pipeline;
pub mod pool;
pub mod table;
pub mod value;

pub use error::{EngineError, Result};
pub use generators::Generator;
pub use pipeline::{Action, ActionRegistry, MutationPipeline, MutationStep, Params, Scope, REPORT_NAME};
pub use pool::WorkerPool;
pub use table::{RowRef, Table};
pub use value::Value;
