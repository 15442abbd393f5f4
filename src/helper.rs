//! Helper definitions and the completion contract for asynchronous helpers.
//!
//! A helper is a named unit of work supplied by the caller. Its execution
//! mode is an explicit tag carried by [`HelperImpl`]: synchronous helpers
//! return their value directly, asynchronous helpers deliver it through a
//! [`Completion`] handle appended by the resolver at invocation time. The
//! mode is never inferred from the function's shape.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;

/// Result type produced by helper implementations.
///
/// Helper authors report failure with any `anyhow`-compatible error; the
/// resolver attaches the helper's name and arguments when surfacing it.
pub type HelperResult = anyhow::Result<Value>;

/// Boxed synchronous helper implementation.
pub type SyncFn = Arc<dyn Fn(&[Value]) -> HelperResult + Send + Sync>;

/// Boxed asynchronous helper implementation.
///
/// The function itself returns nothing; the result travels through the
/// [`Completion`] handle. The implementation may deliver inline or move the
/// handle into a spawned task and deliver later.
pub type AsyncFn = Arc<dyn Fn(&[Value], Completion) + Send + Sync>;

/// Execution mode of a registered helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperMode {
    /// The implementation returns its value directly.
    Sync,
    /// The implementation delivers its value through a [`Completion`].
    Async,
}

impl fmt::Display for HelperMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

/// A helper implementation tagged with its execution mode.
#[derive(Clone)]
pub enum HelperImpl {
    /// Synchronous implementation.
    Sync(SyncFn),
    /// Asynchronous, completion-driven implementation.
    Async(AsyncFn),
}

impl HelperImpl {
    /// The mode this implementation runs in.
    pub fn mode(&self) -> HelperMode {
        match self {
            Self::Sync(_) => HelperMode::Sync,
            Self::Async(_) => HelperMode::Async,
        }
    }
}

impl fmt::Debug for HelperImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HelperImpl::{}", self.mode())
    }
}

/// A named unit of work, immutable once registered.
#[derive(Debug, Clone)]
pub struct Helper {
    name: String,
    implementation: HelperImpl,
}

impl Helper {
    /// Create a helper from a name and a tagged implementation.
    pub fn new(name: impl Into<String>, implementation: HelperImpl) -> Self {
        Self {
            name: name.into(),
            implementation,
        }
    }

    /// The helper's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The helper's execution mode.
    pub fn mode(&self) -> HelperMode {
        self.implementation.mode()
    }

    pub(crate) fn implementation(&self) -> &HelperImpl {
        &self.implementation
    }
}

/// Completion handle passed to asynchronous helpers.
///
/// This is the error-first callback of callback-style helpers, expressed as
/// two delivery methods. Exactly one delivery takes effect: the first call to
/// [`Completion::resolve`] or [`Completion::reject`] wins and every later
/// call is ignored. The handle is cheap to clone so implementations can hand
/// it to whichever task finishes first.
///
/// # Examples
///
/// ```rust,no_run
/// use deferred_helpers::engine::Engine;
///
/// # fn example(engine: &Engine) -> deferred_helpers::error::Result<()> {
/// engine.register_async("greet", |args, done| {
///     match args.first().and_then(|v| v.as_str()) {
///         Some(name) => done.resolve(format!("hello {name}")),
///         None => done.reject(anyhow::anyhow!("greet needs a name")),
///     };
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Completion {
    tx: Arc<Mutex<Option<oneshot::Sender<HelperResult>>>>,
}

impl Completion {
    /// Create a handle and the receiver the resolver awaits.
    pub(crate) fn new() -> (Self, oneshot::Receiver<HelperResult>) {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        (handle, rx)
    }

    /// Deliver a successful value.
    ///
    /// Returns `true` if this delivery won, `false` if the completion had
    /// already been delivered (the value is dropped in that case).
    pub fn resolve(&self, value: impl Into<Value>) -> bool {
        self.deliver(Ok(value.into()))
    }

    /// Deliver a failure.
    ///
    /// Returns `true` if this delivery won, `false` if the completion had
    /// already been delivered.
    pub fn reject(&self, error: impl Into<anyhow::Error>) -> bool {
        self.deliver(Err(error.into()))
    }

    fn deliver(&self, outcome: HelperResult) -> bool {
        let Some(tx) = self.tx.lock().ok().and_then(|mut slot| slot.take()) else {
            return false;
        };
        // A closed receiver means the resolver gave up; nothing to deliver to.
        tx.send(outcome).is_ok()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delivered = self.tx.lock().map(|slot| slot.is_none()).unwrap_or(true);
        f.debug_struct("Completion").field("delivered", &delivered).finish()
    }
}
