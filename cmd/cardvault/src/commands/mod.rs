//! CLI commands module.

mod build;
mod inspect;
mod provision;
mod query;
mod util;

pub use build::BuildCommand;
pub use inspect::InspectCommand;
pub use provision::ProvisionCommand;
pub use query::QueryCommand;

pub(crate) use util::*;
