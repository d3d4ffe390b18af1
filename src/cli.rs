//! CLI domain: parse, route and presentation only.
//! Every command goes through the same [`NodeAdapter`](crate::adapter::NodeAdapter)
//! surface a host would use.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{format_status_json, format_status_text, StatusReport};
pub use route::RunContext;
