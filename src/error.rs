//! Error types for helper registration and resolution.
//!
//! All failure modes surface through the [`HelperError`] enum. The enum is
//! cloneable on purpose: a failed call record stores its error once, and the
//! identical error is handed to every transitive dependent and ultimately to
//! the `resolve_all` caller, rather than being re-wrapped at each hop.
//!
//! Helper implementations themselves report failures through the flexible
//! edge (`anyhow::Error`, see [`crate::helper::HelperResult`]); the resolver
//! converts those into [`HelperError::Execution`] with the helper's name and
//! a safe rendering of the arguments it was actually called with.

use serde_json::Value;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HelperError>;

/// Errors produced while registering, wrapping, or resolving helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HelperError {
    /// `register` was called with a name that is not a non-empty
    /// identifier-like string.
    #[error("invalid helper name {name:?}: expected a non-empty identifier")]
    InvalidName {
        /// The rejected name, verbatim.
        name: String,
    },

    /// Resolution was requested for a token not present in the stash: never
    /// minted, minted by a different instance, or dropped by a reset.
    #[error("unable to resolve {token}: not found in stash")]
    NotFound {
        /// The unresolvable token.
        token: String,
    },

    /// The helper implementation returned an error, either directly (sync
    /// helpers) or through its completion handle (async helpers).
    #[error("helper '{helper}' failed with args {args}: {message}")]
    Execution {
        /// Name of the failing helper.
        helper: String,
        /// Rendering of the arguments the helper was invoked with.
        args: String,
        /// The implementation's error message.
        message: String,
    },

    /// A wrap or invocation referenced a name with no registered helper.
    #[error("no helper registered under the name '{name}'")]
    UnknownHelper {
        /// The unregistered name.
        name: String,
    },

    /// A call was reached again while its own resolution was still in
    /// progress.
    #[error("circular dependency while resolving {token}: {chain}")]
    CircularDependency {
        /// The token whose resolution closed the cycle.
        token: String,
        /// Human-readable chain of in-flight calls, outermost first.
        chain: String,
    },

    /// An async helper dropped its completion handle without delivering a
    /// value or an error.
    #[error("helper '{helper}' dropped its completion handle without responding")]
    CompletionDropped {
        /// Name of the offending helper.
        helper: String,
    },
}

/// Render helper arguments for error context.
///
/// Blank values (null, empty strings, `false`) are excluded from the
/// rendering; everything else is stringified defensively so that exotic
/// values cannot themselves fail during error formatting.
pub(crate) fn format_args(args: &[Value]) -> String {
    let rendered: Vec<String> = args.iter().filter(|v| !is_blank(v)).map(render_arg).collect();
    format!("({})", rendered.join(", "))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn render_arg(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unprintable>".to_string())
}
