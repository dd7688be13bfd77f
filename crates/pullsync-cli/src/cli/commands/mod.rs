//! CLI command handlers, one per file.

mod config;
mod parse_status;
mod run;

pub use config::run_config;
pub use parse_status::run_parse_status;
pub use run::run_daemon;
