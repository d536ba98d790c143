//! Output renderers for the CLI.

pub mod json;
pub mod markdown;
