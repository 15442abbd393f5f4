//! Token and text resolution.
//!
//! Resolution turns tokens back into values. [`Engine::resolve_token`] walks
//! one call's dependency graph depth-first: every argument that is itself a
//! token is resolved before the owning helper runs, and terminal outcomes are
//! memoized in the stash so each call executes at most once no matter how
//! many dependents reference it. [`Engine::resolve_all`] applies the same
//! machinery to a whole rendered string, substituting each stashed token's
//! value for its occurrences.
//!
//! Dependency failures short-circuit: a call whose dependency failed never
//! runs, and the dependency's original error is what every transitive
//! dependent reports.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, trace};

use crate::engine::Engine;
use crate::error::{HelperError, Result, format_args};
use crate::helper::{Completion, HelperImpl};
use crate::stash::Claim;
use crate::token;

impl Engine {
    /// Resolve a single token to its final value.
    ///
    /// Re-resolving an already-terminal token is a pure read of the cached
    /// outcome; the helper implementation runs at most once per token.
    ///
    /// # Errors
    ///
    /// - [`HelperError::NotFound`] if the token was never stashed by this
    ///   instance (or the instance has been reset since).
    /// - [`HelperError::Execution`] if the helper, or any helper it depends
    ///   on, fails; dependency failures propagate unchanged.
    /// - [`HelperError::CircularDependency`] if the call is reachable from
    ///   its own resolution.
    pub async fn resolve_token(&self, token: &str) -> Result<Value> {
        self.resolve_inner(token).await
    }

    /// Resolve every stashed token occurring in `text`.
    ///
    /// Stashed tokens are visited in insertion order; tokens absent from the
    /// text are skipped without executing their helpers (normal when a
    /// template branch was not taken). Each found token is resolved and every
    /// occurrence of it replaced with the value's string form: strings
    /// substitute their raw contents, null substitutes nothing, any other
    /// value its compact JSON rendering.
    ///
    /// # Errors
    ///
    /// The first resolution failure aborts the remaining substitutions and is
    /// returned as-is.
    pub async fn resolve_all(&self, text: &str) -> Result<String> {
        let mut output = text.to_string();
        for tok in self.stash().tokens() {
            if !output.contains(&tok) {
                trace!(token = %tok, "token absent from text; skipping");
                continue;
            }
            let value = self.resolve_inner(&tok).await?;
            let rendered = render_value(&value);
            trace!(token = %tok, "substituting resolved value");
            output = output.replace(&tok, &rendered);
        }
        Ok(output)
    }

    fn resolve_inner<'a>(&'a self, tok: &'a str) -> BoxFuture<'a, Result<Value>> {
        async move {
            let (helper_name, mut args, dependencies) = match self.stash().begin(tok)? {
                Claim::Settled(outcome) => return outcome,
                Claim::Run {
                    helper,
                    args,
                    dependencies,
                } => (helper, args, dependencies),
            };

            // Dependencies settle (resolve or fail) before the owning helper
            // runs; a failed dependency short-circuits the dependent.
            for idx in dependencies {
                let dep_token = match args.get(idx) {
                    Some(Value::String(s)) => s.clone(),
                    _ => continue,
                };
                match self.resolve_inner(&dep_token).await {
                    Ok(value) => {
                        self.stash().substitute_arg(tok, idx, value.clone());
                        args[idx] = value;
                    }
                    Err(err) => {
                        debug!(
                            token = %tok,
                            dependency = %dep_token,
                            "dependency failed; short-circuiting dependent"
                        );
                        return self.stash().finish(tok, Err(err));
                    }
                }
            }

            let outcome = match self.invoke(&helper_name, &args).await {
                Ok(value) => self.chase_returned_token(value).await,
                Err(err) => Err(err),
            };
            self.stash().finish(tok, outcome)
        }
        .boxed()
    }

    /// Run one helper implementation with fully substituted arguments.
    async fn invoke(&self, helper_name: &str, args: &[Value]) -> Result<Value> {
        let Some(helper) = self.helper(helper_name) else {
            return Err(HelperError::UnknownHelper {
                name: helper_name.to_string(),
            });
        };
        trace!(helper = %helper_name, mode = %helper.mode(), "invoking helper");

        match helper.implementation() {
            HelperImpl::Sync(f) => f(args).map_err(|err| HelperError::Execution {
                helper: helper_name.to_string(),
                args: format_args(args),
                message: err.to_string(),
            }),
            HelperImpl::Async(f) => {
                let (completion, rx) = Completion::new();
                f(args, completion);
                match rx.await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(HelperError::Execution {
                        helper: helper_name.to_string(),
                        args: format_args(args),
                        message: err.to_string(),
                    }),
                    Err(_) => Err(HelperError::CompletionDropped {
                        helper: helper_name.to_string(),
                    }),
                }
            }
        }
    }

    /// A helper may hand back another call's token instead of a concrete
    /// value; resolve through it so dependents see the final value.
    async fn chase_returned_token(&self, value: Value) -> Result<Value> {
        if let Value::String(s) = &value
            && token::matches(s, self.prefix(), self.instance_id())
        {
            trace!(token = %s, "helper returned a deferred token; resolving through it");
            return self.resolve_inner(s).await;
        }
        Ok(value)
    }
}

/// String form used when substituting a resolved value into rendered text.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
