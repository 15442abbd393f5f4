//! Named helper storage.
//!
//! The registry stores helpers by name for one engine instance. It is pure
//! bookkeeping: helpers are never invoked through the registry, only through
//! the call wrapper, which is what allows invocation to be deferred past the
//! synchronous render pass.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{HelperError, Result};
use crate::helper::Helper;

/// Helper storage for one engine instance.
///
/// Registering under an existing name replaces the previous helper.
#[derive(Debug, Default)]
pub struct HelperRegistry {
    helpers: Mutex<BTreeMap<String, Helper>>,
}

impl HelperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a helper under its name.
    ///
    /// # Errors
    ///
    /// Returns [`HelperError::InvalidName`] if the name is not a non-empty
    /// identifier-like string (leading ASCII letter or underscore, then
    /// letters, digits, underscores, or hyphens).
    pub fn register(&self, helper: Helper) -> Result<()> {
        if !is_valid_name(helper.name()) {
            return Err(HelperError::InvalidName {
                name: helper.name().to_string(),
            });
        }
        debug!(helper = %helper.name(), mode = %helper.mode(), "registering helper");
        if let Ok(mut helpers) = self.helpers.lock() {
            helpers.insert(helper.name().to_string(), helper);
        }
        Ok(())
    }

    /// Look up a helper by name.
    pub fn lookup(&self, name: &str) -> Option<Helper> {
        self.helpers.lock().ok().and_then(|helpers| helpers.get(name).cloned())
    }

    /// All registered helpers, keyed by name.
    pub fn all(&self) -> BTreeMap<String, Helper> {
        self.helpers.lock().map(|helpers| helpers.clone()).unwrap_or_default()
    }

    /// Number of registered helpers.
    pub fn len(&self) -> usize {
        self.helpers.lock().map(|helpers| helpers.len()).unwrap_or(0)
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
