//! nbsync-template: declarative extraction of records from command output
//!
//! Templates use a small TextFSM dialect: `Value` declarations followed by a
//! single `Start` state of anchored line rules.

pub mod error;
pub mod extract;
pub mod record;
pub mod registry;
pub mod template;

pub use error::TemplateError;
pub use extract::extract;
pub use record::Record;
pub use registry::TemplateRegistry;
pub use template::{Repeat, Rule, Template, ValueDef};
