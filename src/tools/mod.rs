//! Tools the model can invoke through in-stream directives.

pub mod clock;
pub mod math;
pub mod registry;

pub use registry::{ToolOutcome, ToolRegistry};

use crate::error::Result;

/// A capability the model can request by emitting a directive.
///
/// Implementations must be cheap to construct and safe to call from the
/// turn thread; anything slow should carry its own timeout.
pub trait Tool: Send + Sync {
    /// Name the model must use in the directive payload.
    fn name(&self) -> &str;

    /// Instruction text embedded in the system prompt.
    fn description(&self) -> &str;

    /// JSON schema describing the arguments object.
    fn input_schema(&self) -> serde_json::Value;

    /// Run the tool against already-parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns an error when the arguments are invalid or execution fails;
    /// the registry reports it to the model instead of propagating.
    fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value>;
}
