//! The resolver registry and its transactional update orchestrator.

use std::io;

use slab::Slab;
use tracing::{debug, error, trace};

use crate::error::ResolverError;
use crate::graph;
use crate::script::{ScriptBackend, ScriptContext, ScriptOutcome};
use crate::stamp::Stamp;
use crate::store::FactStore;
use crate::target::{
    older_than_facts, older_than_targets, Fact, StampCheckpoint, Target, TargetDecl, TargetId,
};

/// Result of a successful update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Nothing was stale; no script ran. The transaction still committed.
    UpToDate,
    /// Scripts ran, but the last one reported no change.
    Unchanged,
    /// The request's target was updated.
    Updated,
}

/// The update engine: a registry of targets over an external fact store.
///
/// Built once from parsed declarations; targets are never added or removed
/// afterward. All state lives in this single aggregate: there are no process
/// globals, and no internal locking; callers serialize update requests.
///
/// One update request maps to one store transaction: scripts run inside it,
/// and a failing pass rolls the transaction back and restores every stamp the
/// pass may have advanced, so no target is ever left referencing a version
/// newer than what was actually committed.
pub struct Resolver<S> {
    store: S,
    targets: Vec<Target>,
    facts: Slab<Fact>,
    auto_update: Option<TargetId>,
    /// Pass generation; targets updated within a pass take its value.
    generation: Stamp,
    ctx: ScriptContext,
}

impl<S: FactStore> Resolver<S> {
    /// Build a resolver from parsed target declarations.
    ///
    /// Binds, compiles, and prepares every declared script, registers every
    /// referenced fact in the store, linearizes the dependency graph, and
    /// resolves the designated auto-update target. Any failure aborts the
    /// whole build; a partially constructed registry is never returned.
    pub fn new(
        store: S,
        backend: &dyn ScriptBackend,
        decls: Vec<TargetDecl>,
        auto_update: Option<String>,
    ) -> Result<Self, ResolverError> {
        let built = graph::build(&store, backend, decls, auto_update)?;
        Ok(Self {
            store,
            targets: built.targets,
            facts: built.facts,
            auto_update: built.auto_update,
            generation: Stamp::ZERO,
            ctx: ScriptContext::new(),
        })
    }

    /// Replace the default execution context shared by all script runs.
    pub fn with_context(mut self, ctx: ScriptContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// The shared execution context, for seeding values scripts rely on.
    pub fn context_mut(&mut self) -> &mut ScriptContext {
        &mut self.ctx
    }

    /// The fact store this resolver runs against.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of targets in the registry.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True if the registry holds no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Find a target's id by name.
    pub fn lookup(&self, name: &str) -> Option<TargetId> {
        self.targets.iter().find(|t| t.name == name).map(|t| t.id)
    }

    /// Name of the designated auto-update target, if one was declared.
    pub fn auto_update_target(&self) -> Option<&str> {
        self.auto_update.map(|id| self.targets[id].name.as_str())
    }

    /// Update a target by name.
    ///
    /// Linear scan; target counts are tens, not millions.
    pub fn update_by_name(&mut self, name: &str) -> Result<UpdateOutcome, ResolverError> {
        match self.lookup(name) {
            Some(id) => self.update_target(id),
            None => Err(ResolverError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Update a target by id.
    pub fn update_by_id(&mut self, id: TargetId) -> Result<UpdateOutcome, ResolverError> {
        if id < self.targets.len() {
            self.update_target(id)
        } else {
            Err(ResolverError::OutOfRange {
                id,
                ntarget: self.targets.len(),
            })
        }
    }

    /// Update the designated auto-update target.
    ///
    /// A no-op success when no auto-update target was declared: neither the
    /// store nor any script is touched.
    pub fn autoupdate(&mut self) -> Result<UpdateOutcome, ResolverError> {
        match self.auto_update {
            Some(id) => self.update_target(id),
            None => Ok(UpdateOutcome::UpToDate),
        }
    }

    /// Drive one update request through the topological order, inside one
    /// store transaction.
    fn update_target(&mut self, id: TargetId) -> Result<UpdateOutcome, ResolverError> {
        self.generation = self.generation.next();
        let generation = self.generation;
        let order = self.targets[id].update_targets.clone();
        debug!(target = %self.targets[id].name, generation = %generation, "update requested");

        let tx = self.store.start_transaction()?;

        let mut checkpoint = StampCheckpoint::new(self.targets.len(), self.facts.len());
        checkpoint.save(&self.targets, &order);

        let mut needs_update = older_than_facts(&self.store, &self.facts, &self.targets[id]);
        let mut last_run = None;
        let mut failed: Option<(TargetId, i32)> = None;

        for &dep_id in &order {
            if dep_id == id {
                // The subject is always the tail of its own order; hitting it
                // earlier would mean a malformed ordering, so stop the walk.
                break;
            }
            let dep = &self.targets[dep_id];
            let stale = older_than_facts(&self.store, &self.facts, dep)
                || older_than_targets(&self.targets, dep);
            trace!(dependency = %dep.name, stale, "dependency checked");
            if !stale {
                continue;
            }
            needs_update = true;
            match self.execute_script(dep_id, generation) {
                ScriptOutcome::Failed(code) => {
                    failed = Some((dep_id, code));
                    break;
                }
                outcome => last_run = Some(outcome),
            }
        }

        if failed.is_none() && needs_update {
            match self.execute_script(id, generation) {
                ScriptOutcome::Failed(code) => failed = Some((id, code)),
                outcome => last_run = Some(outcome),
            }
        }

        if let Some((failed_id, code)) = failed {
            let target = self.targets[failed_id].name.clone();
            error!(%target, code, "update pass failed, rolling back");
            self.store.rollback_transaction(tx);
            checkpoint.restore(&mut self.targets, &order);
            return Err(ResolverError::ScriptFailed { target, code });
        }

        if let Err(err) = self.store.commit_transaction(tx) {
            error!(%err, "commit failed, restoring stamps");
            checkpoint.restore(&mut self.targets, &order);
            return Err(err.into());
        }

        Ok(match last_run {
            None => UpdateOutcome::UpToDate,
            Some(ScriptOutcome::Unchanged) => UpdateOutcome::Unchanged,
            Some(_) => UpdateOutcome::Updated,
        })
    }

    /// Execute one target's script and re-sync its stamps on success.
    ///
    /// A target without a script executes as a no-op success. Fact stamps
    /// refresh on any success; the own stamp advances only when the script
    /// reports a change, so a no-op run does not force dependents to re-run.
    fn execute_script(&mut self, id: TargetId, generation: Stamp) -> ScriptOutcome {
        let Self {
            store,
            targets,
            facts,
            ctx,
            ..
        } = self;
        let target = &mut targets[id];
        let outcome = match target.script.as_mut() {
            Some(script) => {
                debug!(target = %target.name, "running update script");
                script.execute(ctx)
            }
            None => ScriptOutcome::Unchanged,
        };
        match outcome {
            ScriptOutcome::Failed(_) => {}
            ScriptOutcome::Unchanged | ScriptOutcome::Updated => {
                if let Some(update_facts) = &target.update_facts {
                    for (slot, &fact_id) in update_facts.iter().enumerate() {
                        target.fact_stamps[slot] =
                            Some(store.fact_stamp(&facts[fact_id].name));
                    }
                }
                if outcome == ScriptOutcome::Updated {
                    target.stamp = generation;
                }
            }
        }
        outcome
    }

    /// Write a deterministic, human-readable report of the graph.
    ///
    /// Read-only; per target: name, declared dependencies, the resolved
    /// fact-check list, the resolved target update order, and the bound
    /// script's kind and source.
    pub fn dump(&self, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "{} targets", self.targets.len())?;
        for target in &self.targets {
            writeln!(out, "#{}: {}", target.id, target.name)?;
            if target.depends.is_empty() {
                writeln!(out, "  dependencies: <none>")?;
            } else {
                writeln!(out, "  dependencies: {}", target.depends.join(" "))?;
                match &target.update_facts {
                    Some(update_facts) => {
                        let names: Vec<&str> = update_facts
                            .iter()
                            .map(|&fact_id| self.facts[fact_id].name.as_str())
                            .collect();
                        writeln!(out, "  facts to check: {}", names.join(" "))?;
                    }
                    None => writeln!(out, "  facts to check: <none>")?,
                }
                let names: Vec<&str> = target
                    .update_targets
                    .iter()
                    .map(|&dep| self.targets[dep].name.as_str())
                    .collect();
                writeln!(out, "  target update order: {}", names.join(" "))?;
            }
            match &target.script {
                Some(script) => {
                    writeln!(out, "  update script ({}):", script.kind())?;
                    writeln!(out, "{}", script.source())?;
                    writeln!(out, "  end script")?;
                }
                None => writeln!(out, "  no update script")?,
            }
        }
        Ok(())
    }
}
