// Private module - the public surface is re-exported below
#[allow(clippy::module_inception)]
mod config;
mod switches;

pub use config::*;
pub use switches::*;
