//! CLI commands module.

mod check;
mod publish;
mod run;
mod util;

pub use check::CheckCommand;
pub use publish::PublishCommand;
pub use run::RunCommand;

pub(crate) use util::*;
