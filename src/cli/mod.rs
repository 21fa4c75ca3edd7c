pub mod commands;
pub mod output;
pub mod util;

pub use util::{CommandContext, category_filter, require_initialized};
