//! Command handlers behind the `rp` subcommands.

pub mod render_cmd;
pub mod select_cmd;
pub mod templates_cmd;
pub mod tree_cmd;
