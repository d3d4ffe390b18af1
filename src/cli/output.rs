//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::ApiError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Initialization { attempts, message } => format!(
            "Could not open the node store after {} attempt(s): {}",
            attempts, message
        ),
        other => other.to_string(),
    }
}
