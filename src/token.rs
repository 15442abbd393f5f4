//! Placeholder token minting and recognition.
//!
//! A token is the string a wrapped helper returns in place of its eventual
//! value. The format is `<prefix><instance>_<call>__`, e.g. `__async0_3__`
//! for the fourth call recorded by instance 0 under the default prefix. The
//! reserved prefix keeps tokens from colliding with ordinary template output,
//! and the instance/call pair makes every token process-unique.
//!
//! The format is self-describing, so recognition is a pure parse: no state,
//! no registry lookups, no runtime type inspection. [`matches`] only accepts
//! a candidate minted by the given instance, which is what keeps tokens from
//! one engine inert when they show up in another engine's arguments.

/// Prefix used when the caller does not configure one.
pub const DEFAULT_PREFIX: &str = "__async";

/// Structured fields carried by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenParts {
    /// Process-unique id of the engine instance that minted the token.
    pub instance_id: u64,
    /// Per-instance call counter value at mint time.
    pub call_id: u64,
}

/// Format a token for one recorded call.
///
/// # Examples
///
/// ```
/// use deferred_helpers::token;
///
/// assert_eq!(token::mint("__async", 0, 0), "__async0_0__");
/// assert_eq!(token::mint("__t", 2, 17), "__t2_17__");
/// ```
pub fn mint(prefix: &str, instance_id: u64, call_id: u64) -> String {
    format!("{prefix}{instance_id}_{call_id}__")
}

/// Parse a candidate string as a token with the given prefix.
///
/// Returns `None` unless the entire string is a well-formed token. Partial
/// matches (a token embedded in surrounding text) are rejected; scanning text
/// for embedded tokens is the resolver's job and works on whole stashed
/// tokens, not on arbitrary substrings.
pub fn parse(candidate: &str, prefix: &str) -> Option<TokenParts> {
    let rest = candidate.strip_prefix(prefix)?;
    let rest = rest.strip_suffix("__")?;
    let (instance, call) = rest.split_once('_')?;
    if instance.is_empty() || call.is_empty() {
        return None;
    }
    let instance_id = instance.parse().ok()?;
    let call_id = call.parse().ok()?;
    Some(TokenParts {
        instance_id,
        call_id,
    })
}

/// Check whether a candidate string is a token minted by the given instance.
///
/// # Examples
///
/// ```
/// use deferred_helpers::token;
///
/// let tok = token::mint("__async", 4, 9);
/// assert!(token::matches(&tok, "__async", 4));
/// assert!(!token::matches(&tok, "__async", 5));
/// assert!(!token::matches("just text", "__async", 4));
/// ```
pub fn matches(candidate: &str, prefix: &str, instance_id: u64) -> bool {
    parse(candidate, prefix).is_some_and(|parts| parts.instance_id == instance_id)
}
