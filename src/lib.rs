//! Data-driven SCPI command console.
//!
//! A descriptor workbook (one sheet per instrument model) is compiled into
//! typed command definitions. The UI asks [`controls`] what to show, sends
//! user input through [`render`], and every command that reaches an
//! instrument lands in [`history`], exportable as a PyVISA script.

pub mod audit;
pub mod controls;
pub mod descriptor;
pub mod error;
pub mod files;
pub mod history;
pub mod instrument;
pub mod paths;
pub mod render;
pub mod script;
pub mod session;
pub mod settings;
pub mod workbook;
