//! UI utilities for terminal output.

mod banner;
mod format;

pub use banner::print_banner;
pub use format::{print_item, print_peer};
