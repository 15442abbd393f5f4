//! Recorded calls and their resolution state.
//!
//! Every invocation of a wrapped helper lands here as a [`CallRecord`]. The
//! [`Stash`] is owned by exactly one engine instance, is append-only during
//! rendering, and is cleared only by an explicit reset. Records move through
//! a one-way state machine: `Pending` to either `Resolved` or `Failed`, both
//! terminal. Re-resolving a terminal record is a pure read, which is what
//! keeps a helper with side effects from running twice when several
//! dependents reference the same token.
//!
//! The stash also tracks which tokens are currently mid-resolution. A token
//! reached again while still in flight closes a cycle, and resolution fails
//! with the chain instead of recursing forever.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::trace;

use crate::error::HelperError;

/// Resolution state of a stashed call.
#[derive(Debug, Clone)]
pub enum ResolutionState {
    /// The helper has not run yet.
    Pending,
    /// The helper ran and produced a value.
    Resolved(Value),
    /// The helper (or one of its dependencies) failed.
    Failed(HelperError),
}

impl ResolutionState {
    /// Whether the state is `Resolved` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One deferred helper invocation.
///
/// The `args` snapshot is mutated in place when a dependency resolves (the
/// token at that index is overwritten with the dependency's value); that and
/// the state transition are the only mutations a record undergoes.
#[derive(Debug, Clone)]
pub struct CallRecord {
    token: String,
    helper: String,
    args: Vec<Value>,
    dependencies: Vec<usize>,
    state: ResolutionState,
}

impl CallRecord {
    pub(crate) fn new(
        token: String,
        helper: String,
        args: Vec<Value>,
        dependencies: Vec<usize>,
    ) -> Self {
        Self {
            token,
            helper,
            args,
            dependencies,
            state: ResolutionState::Pending,
        }
    }

    /// The token minted for this call.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Name of the helper this call defers.
    pub fn helper(&self) -> &str {
        &self.helper
    }

    /// Snapshot of the arguments passed at call time, with resolved
    /// dependency values substituted in as resolution progresses.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Indices within `args` whose value is a token of the owning instance.
    pub fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    /// Current resolution state.
    pub fn state(&self) -> &ResolutionState {
        &self.state
    }
}

/// Outcome of claiming a record for resolution.
#[derive(Debug)]
pub(crate) enum Claim {
    /// The record already reached a terminal state; the stored outcome is
    /// returned as-is.
    Settled(Result<Value, HelperError>),
    /// The record was pending and is now marked in flight. The caller must
    /// run the helper and report back through [`Stash::finish`].
    Run {
        helper: String,
        args: Vec<Value>,
        dependencies: Vec<usize>,
    },
}

#[derive(Debug, Default)]
struct StashInner {
    records: HashMap<String, CallRecord>,
    /// Tokens in insertion order; drives the `resolve_all` walk.
    order: Vec<String>,
    /// Tokens currently mid-resolution, outermost first.
    in_flight: Vec<String>,
}

/// Token-to-record store for one engine instance.
#[derive(Debug, Default)]
pub struct Stash {
    inner: Mutex<StashInner>,
}

impl Stash {
    /// Create an empty stash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stashed records.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.records.len()).unwrap_or(0)
    }

    /// Whether the stash holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a record exists for the token.
    pub fn contains(&self, token: &str) -> bool {
        self.inner.lock().map(|inner| inner.records.contains_key(token)).unwrap_or(false)
    }

    /// Stashed tokens in insertion order.
    pub fn tokens(&self) -> Vec<String> {
        self.inner.lock().map(|inner| inner.order.clone()).unwrap_or_default()
    }

    /// Snapshot of one record, if present.
    pub fn get(&self, token: &str) -> Option<CallRecord> {
        self.inner.lock().ok().and_then(|inner| inner.records.get(token).cloned())
    }

    pub(crate) fn insert(&self, record: CallRecord) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.order.push(record.token.clone());
            inner.records.insert(record.token.clone(), record);
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.records.clear();
            inner.order.clear();
            inner.in_flight.clear();
        }
    }

    /// Claim a record for resolution.
    ///
    /// Terminal records yield [`Claim::Settled`] without touching the
    /// in-flight stack. Pending records are marked in flight and their
    /// execution inputs handed back. A record already in flight closes a
    /// cycle and fails here, before any helper runs.
    pub(crate) fn begin(&self, token: &str) -> Result<Claim, HelperError> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(record) = inner.records.get(token) else {
            return Err(HelperError::NotFound {
                token: token.to_string(),
            });
        };

        match &record.state {
            ResolutionState::Resolved(value) => {
                trace!(token, "record already resolved; returning cached value");
                return Ok(Claim::Settled(Ok(value.clone())));
            }
            ResolutionState::Failed(err) => {
                trace!(token, "record already failed; returning cached error");
                return Ok(Claim::Settled(Err(err.clone())));
            }
            ResolutionState::Pending => {}
        }

        if inner.in_flight.iter().any(|t| t == token) {
            let chain = describe_chain(&inner, token);
            return Err(HelperError::CircularDependency {
                token: token.to_string(),
                chain,
            });
        }

        let record = &inner.records[token];
        let claim = Claim::Run {
            helper: record.helper.clone(),
            args: record.args.clone(),
            dependencies: record.dependencies.clone(),
        };
        inner.in_flight.push(token.to_string());
        Ok(claim)
    }

    /// Overwrite one argument with its dependency's resolved value.
    pub(crate) fn substitute_arg(&self, token: &str, index: usize, value: Value) {
        if let Ok(mut inner) = self.inner.lock()
            && let Some(record) = inner.records.get_mut(token)
            && let Some(slot) = record.args.get_mut(index)
        {
            *slot = value;
        }
    }

    /// Record the terminal outcome for an in-flight token and hand the
    /// outcome back for the caller to propagate.
    pub(crate) fn finish(
        &self,
        token: &str,
        outcome: Result<Value, HelperError>,
    ) -> Result<Value, HelperError> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        inner.in_flight.retain(|t| t != token);
        if let Some(record) = inner.records.get_mut(token) {
            record.state = match &outcome {
                Ok(value) => ResolutionState::Resolved(value.clone()),
                Err(err) => ResolutionState::Failed(err.clone()),
            };
        }
        outcome
    }
}

/// Render the in-flight chain for a cycle error, outermost call first.
fn describe_chain(inner: &StashInner, closing: &str) -> String {
    let mut entries: Vec<String> = inner
        .in_flight
        .iter()
        .chain(std::iter::once(&closing.to_string()))
        .map(|tok| match inner.records.get(tok) {
            Some(record) => format!("{} ({})", record.helper, tok),
            None => tok.clone(),
        })
        .collect();
    // Dedup the closing entry when the cycle is self-referential at depth 1.
    if entries.len() >= 2 && entries[entries.len() - 1] == entries[entries.len() - 2] {
        entries.pop();
    }
    entries.join(" → ")
}
