//! CLI command implementations.

mod history;
mod info;
mod run;
mod scan;
mod send;

pub use history::{clear_history, show_history};
pub use info::show_info;
pub use run::run_service;
pub use scan::scan;
pub use send::send_file;
