//! Engine instances and call wrapping.
//!
//! An [`Engine`] owns one helper registry, one stash, a per-instance call
//! counter, and a process-unique instance id. Wrapped helpers obtained from
//! [`Engine::wrap`] / [`Engine::wrap_all`] are what gets handed to the
//! template engine: invoking one is pure bookkeeping (snapshot the
//! arguments, note which of them are tokens, mint a fresh token, stash a
//! pending record) and returns the token. No helper code runs until
//! resolution.
//!
//! Instance ids come from an [`InstanceAllocator`]. The process-wide default
//! keeps tokens unique across every instance that ever existed in the
//! process; tests that need deterministic ids construct their own allocator
//! and pass it through [`EngineOptions`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Result;
use crate::helper::{Completion, Helper, HelperImpl, HelperResult};
use crate::registry::HelperRegistry;
use crate::stash::{CallRecord, Stash};
use crate::token;

/// Allocates process-unique engine instance ids.
///
/// Ids increase monotonically from zero. One allocator backs all engines
/// created through [`Engine::new`]; supplying a fresh allocator per test via
/// [`EngineOptions`] pins ids without hidden shared state.
#[derive(Debug, Default)]
pub struct InstanceAllocator {
    next: AtomicU64,
}

impl InstanceAllocator {
    /// Create an allocator starting at id zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next instance id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

static PROCESS_ALLOCATOR: LazyLock<Arc<InstanceAllocator>> =
    LazyLock::new(|| Arc::new(InstanceAllocator::new()));

/// The process-wide allocator used by [`Engine::new`].
pub fn process_allocator() -> Arc<InstanceAllocator> {
    PROCESS_ALLOCATOR.clone()
}

/// Construction options for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Token prefix; must be improbable in ordinary template content.
    pub prefix: String,
    /// Source of the instance id.
    pub allocator: Arc<InstanceAllocator>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            prefix: token::DEFAULT_PREFIX.to_string(),
            allocator: process_allocator(),
        }
    }
}

#[derive(Debug)]
struct EngineInner {
    registry: HelperRegistry,
    stash: Stash,
    instance_id: u64,
    prefix: String,
    call_counter: AtomicU64,
}

/// Handle to one deferral engine instance.
///
/// Cheap to clone; clones share the same registry, stash, and counters. Many
/// instances may coexist in a process, each with its own stash and a distinct
/// instance id, so tokens never collide across instances.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with the default prefix and the process allocator.
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Create an engine with explicit options.
    pub fn with_options(options: EngineOptions) -> Self {
        let instance_id = options.allocator.next_id();
        debug!(instance_id, prefix = %options.prefix, "creating engine instance");
        Self {
            inner: Arc::new(EngineInner {
                registry: HelperRegistry::new(),
                stash: Stash::new(),
                instance_id,
                prefix: options.prefix,
                call_counter: AtomicU64::new(0),
            }),
        }
    }

    /// This instance's process-unique id.
    pub fn instance_id(&self) -> u64 {
        self.inner.instance_id
    }

    /// This instance's token prefix.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Read access to this instance's stash.
    pub fn stash(&self) -> &Stash {
        &self.inner.stash
    }

    /// Register a helper.
    ///
    /// Re-registering under the same name replaces the previous helper.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::HelperError::InvalidName`] for names that are
    /// not non-empty identifier-like strings.
    pub fn register(&self, helper: Helper) -> Result<()> {
        self.inner.registry.register(helper)
    }

    /// Register a synchronous helper from a closure.
    pub fn register_sync<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&[Value]) -> HelperResult + Send + Sync + 'static,
    {
        self.register(Helper::new(name, HelperImpl::Sync(Arc::new(f))))
    }

    /// Register an asynchronous, completion-driven helper from a closure.
    pub fn register_async<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&[Value], Completion) + Send + Sync + 'static,
    {
        self.register(Helper::new(name, HelperImpl::Async(Arc::new(f))))
    }

    /// Look up a registered helper by name.
    pub fn helper(&self, name: &str) -> Option<Helper> {
        self.inner.registry.lookup(name)
    }

    /// All registered helpers, keyed by name.
    pub fn helpers(&self) -> BTreeMap<String, Helper> {
        self.inner.registry.all()
    }

    /// Wrap one registered helper for use inside a synchronous render pass.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::HelperError::UnknownHelper`] if no helper is
    /// registered under `name`.
    pub fn wrap(&self, name: &str) -> Result<WrappedHelper> {
        if self.inner.registry.lookup(name).is_none() {
            return Err(crate::error::HelperError::UnknownHelper {
                name: name.to_string(),
            });
        }
        Ok(WrappedHelper {
            engine: self.clone(),
            name: name.to_string(),
        })
    }

    /// Wrap every registered helper at once.
    pub fn wrap_all(&self) -> BTreeMap<String, WrappedHelper> {
        self.inner
            .registry
            .all()
            .into_keys()
            .map(|name| {
                let wrapped = WrappedHelper {
                    engine: self.clone(),
                    name: name.clone(),
                };
                (name, wrapped)
            })
            .collect()
    }

    /// Drop every stashed call and restart call numbering from zero.
    ///
    /// Tokens minted before the reset can no longer be resolved.
    pub fn reset(&self) {
        debug!(instance_id = self.inner.instance_id, "resetting engine stash");
        self.inner.stash.clear();
        self.inner.call_counter.store(0, Ordering::Relaxed);
    }

    fn next_call_id(&self) -> u64 {
        self.inner.call_counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Callable facade over one registered helper.
///
/// Invoking it never runs the helper. The call is recorded in the owning
/// engine's stash and a placeholder token is returned, which is what lets a
/// synchronous render pass proceed while the real work waits for the
/// resolution pass.
#[derive(Clone)]
pub struct WrappedHelper {
    engine: Engine,
    name: String,
}

impl WrappedHelper {
    /// Name of the helper this wrapper defers.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a call and return its token.
    ///
    /// Arguments are snapshotted at call time; mutating the caller's data
    /// afterwards does not affect the record. String arguments that are
    /// tokens of the owning instance are recorded as dependencies and
    /// resolved before this call's helper runs.
    pub fn call(&self, args: &[Value]) -> String {
        let inner = &self.engine.inner;
        let args = args.to_vec();
        let dependencies: Vec<usize> = args
            .iter()
            .enumerate()
            .filter_map(|(idx, arg)| match arg {
                Value::String(s) if token::matches(s, &inner.prefix, inner.instance_id) => {
                    Some(idx)
                }
                _ => None,
            })
            .collect();

        let call_id = self.engine.next_call_id();
        let tok = token::mint(&inner.prefix, inner.instance_id, call_id);
        trace!(
            helper = %self.name,
            token = %tok,
            args = args.len(),
            dependencies = dependencies.len(),
            "stashing deferred call"
        );
        inner.stash.insert(CallRecord::new(tok.clone(), self.name.clone(), args, dependencies));
        tok
    }
}

impl fmt::Debug for WrappedHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedHelper")
            .field("name", &self.name)
            .field("instance_id", &self.engine.instance_id())
            .finish()
    }
}
