// Document I/O: sources on disk to tables and back

pub mod csv;
pub mod document;
pub mod error;
pub mod layout;
pub mod set;
pub mod source;
pub mod xlsx;

pub use document::{Document, DocumentSection, LoadContext};
pub use error::{DocumentError, Result};
pub use set::{DocumentSet, JoinHooks};
pub use source::SourcePath;
