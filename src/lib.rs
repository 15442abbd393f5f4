//! Deferred execution of asynchronous template helpers behind synchronous
//! render passes.
//!
//! String-interpolation template engines invoke helpers synchronously and
//! expect a string back immediately. That makes helpers whose results are
//! produced asynchronously (network lookups, file reads, anything
//! callback-shaped) impossible to use directly. This crate bridges the gap by
//! deferring execution:
//!
//! 1. Helpers are registered with an [`engine::Engine`] and handed to the
//!    template engine in *wrapped* form. Invoking a wrapped helper never runs
//!    the underlying implementation; it records the call (arguments included)
//!    in a per-instance stash and returns an opaque placeholder token that is
//!    a perfectly ordinary string as far as the template engine is concerned.
//! 2. The template renders synchronously, collecting tokens into its output.
//!    Tokens may nest: a token passed as an argument to another wrapped
//!    helper is recorded as a dependency of that call.
//! 3. After rendering, [`engine::Engine::resolve_all`] walks the recorded
//!    calls, executes each helper at most once (dependencies first), and
//!    substitutes the final values back into the output string. A single
//!    token can be resolved directly with [`engine::Engine::resolve_token`].
//!
//! # Example
//!
//! ```rust,no_run
//! use deferred_helpers::engine::Engine;
//! use serde_json::json;
//!
//! # async fn example() -> deferred_helpers::error::Result<()> {
//! let engine = Engine::new();
//! engine.register_sync("upper", |args| {
//!     let s = args.first().and_then(|v| v.as_str()).unwrap_or_default();
//!     Ok(s.to_uppercase().into())
//! })?;
//! engine.register_async("lower", |args, done| {
//!     let s = args.first().and_then(|v| v.as_str()).unwrap_or_default();
//!     done.resolve(s.to_lowercase());
//! })?;
//!
//! // During the synchronous render pass only bookkeeping happens.
//! let upper = engine.wrap("upper")?;
//! let token = upper.call(&[json!("brian")]);
//! let rendered = format!("hello {token}!");
//!
//! // After rendering, resolve the deferred calls and substitute.
//! let output = engine.resolve_all(&rendered).await?;
//! assert_eq!(output, "hello BRIAN!");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`token`] - placeholder token minting and recognition
//! - [`registry`] - named helper storage
//! - [`helper`] - helper definitions and the async completion contract
//! - [`stash`] - recorded calls and their resolution state
//! - [`engine`] - engine instances and call wrapping
//! - [`resolver`] - token and text resolution
//! - [`error`] - error types
//!
//! # Scope
//!
//! This crate is not a promise library and not a task scheduler, and it does
//! not parse template syntax. The only string convention it knows is its own
//! token format, and the only collaboration contract with a template engine
//! is: wrapped helpers return strings, and rendered output is fed back
//! through [`engine::Engine::resolve_all`].

pub mod engine;
pub mod error;
pub mod helper;
pub mod registry;
pub mod resolver;
pub mod stash;
pub mod token;
