//! `docrecon-config`: declarative configuration for reconciliation jobs.
//!
//! Static TOML is parsed into a [`ConfigValue`] tree, group fragments are
//! merged onto their members, and the result is frozen into a typed
//! [`ProcessConfig`] that every other crate receives by reference.

pub mod aliases;
pub mod error;
pub mod group;
pub mod process;
pub mod value;

pub use aliases::AliasResolver;
pub use error::{ConfigError, Result};
pub use group::{apply_groups, Group};
pub use process::{
    CarryForward, CliOptions, ColumnType, JobConfig, MutationPhases, MutationSpec, ProcessConfig,
    ProcessMeta, ReadOptions, SectionDefinition, SetAsideRule, SideConfig, SourceCatalog,
    SourceConfig, SourceDefinition, SourceKind,
};
pub use value::{deep_merge, merge_defaults, ConfigValue, Scalar};

/// Canonical name of the implicit section of a document that declares none.
pub const DEFAULT_SECTION: &str = "__default__";
