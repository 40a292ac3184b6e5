//! The scripting boundary: update scripts, their backend, and the shared
//! execution context.
//!
//! Update scripts are opaque, externally compiled units bound to targets.
//! The resolver drives them through three phases: **bind** (source text to a
//! script object, at graph construction), **compile** and **prepare** (two
//! separately failable passes run before any update is requested), and
//! **execute** (per update pass, for stale targets only).

use std::any::Any;
use std::collections::HashMap;

use crate::error::ScriptCreateError;

/// Outcome of one script execution.
///
/// The three-way split drives the orchestrator: failure aborts and rolls back
/// the pass, while the changed/no-change distinction decides whether the
/// target's own stamp advances (and with it, whether dependents re-run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// The script failed; the status code is script-defined.
    Failed(i32),
    /// The script ran to completion without changing anything.
    Unchanged,
    /// The script ran and changed the records it maintains.
    Updated,
}

impl ScriptOutcome {
    /// Returns true for [`ScriptOutcome::Failed`].
    pub fn is_failure(self) -> bool {
        matches!(self, ScriptOutcome::Failed(_))
    }
}

/// A compiled update script bound to a target.
///
/// Implementations live in the scripting backend; the resolver only drives
/// the lifecycle and branches on [`ScriptOutcome`]. `kind` and `source` are
/// retained for introspection ([`Resolver::dump`](crate::Resolver::dump)).
pub trait UpdateScript {
    /// Declared kind of this script (the backend it was bound with).
    fn kind(&self) -> &str;

    /// Original source text of this script.
    fn source(&self) -> &str;

    /// Syntax and bind-time checks. Run once for every script before any
    /// target is ever executed.
    fn compile(&mut self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    /// Runtime-environment setup, run after every script has compiled.
    fn prepare(&mut self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    /// Run the script against the shared execution context.
    ///
    /// Blocking; the resolver waits for the terminal status. Bounded
    /// execution time, if required, is the backend's responsibility.
    fn execute(&mut self, ctx: &mut ScriptContext) -> ScriptOutcome;
}

/// A scripting backend, looked up by script kind at graph construction.
pub trait ScriptBackend {
    /// Bind source text of the stated kind into an executable script.
    ///
    /// Returns [`ScriptCreateError::UnsupportedKind`] when the backend does
    /// not implement `kind`, and [`ScriptCreateError::Bind`] for every other
    /// binding failure; the resolver reports the two differently.
    fn create(&self, kind: &str, source: &str)
        -> Result<Box<dyn UpdateScript>, ScriptCreateError>;
}

/// Shared mutable state handed to every script invocation.
///
/// A named-slot table with type-erased values: the embedder seeds whatever
/// handles its scripts need (database connections, counters, configuration)
/// and scripts downcast the slots they know about. One context is shared by
/// all executions within a resolver, so state written by a dependency's
/// script is visible to scripts that run after it in the same pass.
#[derive(Default)]
pub struct ScriptContext {
    slots: HashMap<String, Box<dyn Any + Send>>,
}

impl ScriptContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under a name, replacing any previous value.
    pub fn set<T: Any + Send>(&mut self, name: impl Into<String>, value: T) {
        self.slots.insert(name.into(), Box::new(value));
    }

    /// Borrow a value by name, if present and of the requested type.
    pub fn get<T: Any + Send>(&self, name: &str) -> Option<&T> {
        self.slots.get(name).and_then(|slot| slot.downcast_ref())
    }

    /// Mutably borrow a value by name, if present and of the requested type.
    pub fn get_mut<T: Any + Send>(&mut self, name: &str) -> Option<&mut T> {
        self.slots.get_mut(name).and_then(|slot| slot.downcast_mut())
    }

    /// Remove a value by name, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.slots.remove(name).is_some()
    }
}

impl std::fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.slots.keys().collect();
        names.sort();
        f.debug_struct("ScriptContext").field("slots", &names).finish()
    }
}
