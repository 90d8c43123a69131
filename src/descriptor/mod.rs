//! Descriptor sheets compiled into typed SCPI command definitions.
//!
//! Pipeline: sheet → [`table::compile_sheet`] → per row
//! [`compiler::compile_row`] (template scan + parameter cell parse + binding
//! check) → [`DescriptorTable`].

pub mod cache;
pub mod compiler;
pub mod error;
pub mod params;
pub mod table;
pub mod template;

pub use cache::DescriptorCache;
pub use compiler::{compile_row, CommandDefinition, DescriptorRow, Direction};
pub use error::{DescriptorError, LoadWarning};
pub use params::{parse_parameter_cell, ParameterDescriptor, ParameterKind};
pub use table::{distinct_models, load_table, DescriptorTable};
pub use template::Template;
