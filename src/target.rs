//! Target records, staleness predicates, and the stamp checkpoint used for
//! rollback.

use slab::Slab;

use crate::script::UpdateScript;
use crate::stamp::Stamp;
use crate::store::FactStore;

/// Dense index of a target in the registry.
pub type TargetId = usize;

/// Dense index of a fact in the registry's fact arena.
pub type FactId = usize;

/// Sigil that marks a dependency reference as a fact reference.
pub const FACT_SIGIL: char = '$';

/// Returns the fact name if `reference` is a sigil-prefixed fact reference.
pub(crate) fn fact_reference(reference: &str) -> Option<&str> {
    reference.strip_prefix(FACT_SIGIL)
}

/// A parsed target declaration, consumed by the graph builder.
///
/// This is the boundary to the (external) ruleset parser: name, dependency
/// references in declared order (`$fact` or bare target names), and an
/// optional update script. The builder takes ownership; nothing is shared
/// with the parse tree afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDecl {
    /// Unique target name.
    pub name: String,
    /// Dependency references in declaration order.
    pub depends: Vec<String>,
    /// Optional update script source and kind.
    pub script: Option<ScriptDecl>,
}

/// Update script source text and its declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDecl {
    /// Scripting backend kind the source is written for.
    pub kind: String,
    /// Script source text.
    pub source: String,
}

impl TargetDecl {
    /// Create a declaration with no dependencies and no script.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends: Vec::new(),
            script: None,
        }
    }

    /// Add a dependency reference (`$fact` or bare target name).
    pub fn depends_on(mut self, reference: impl Into<String>) -> Self {
        self.depends.push(reference.into());
        self
    }

    /// Attach an update script.
    pub fn with_script(mut self, kind: impl Into<String>, source: impl Into<String>) -> Self {
        self.script = Some(ScriptDecl {
            kind: kind.into(),
            source: source.into(),
        });
        self
    }
}

/// A fact referenced by the graph, registered in the store at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fact {
    pub(crate) name: String,
}

/// A named node in the dependency graph.
pub(crate) struct Target {
    /// This target's own index, stored once at construction.
    pub(crate) id: TargetId,
    pub(crate) name: String,
    /// Declared dependency references, order preserved.
    pub(crate) depends: Vec<String>,
    /// Direct fact dependencies to check for staleness; `None` when the
    /// target has no fact dependency at all (and is therefore always stale).
    pub(crate) update_facts: Option<Vec<FactId>>,
    /// Last-observed stamp per `update_facts` slot; `None` until the first
    /// successful update, so a never-updated target counts as stale even when
    /// the store stamp still sits at its initial value.
    pub(crate) fact_stamps: Vec<Option<Stamp>>,
    /// Topological update order: every transitive target dependency exactly
    /// once, this target itself last.
    pub(crate) update_targets: Vec<TargetId>,
    pub(crate) script: Option<Box<dyn UpdateScript>>,
    /// Own stamp, assigned the resolver's pass generation whenever an update
    /// pass actually changes this target.
    pub(crate) stamp: Stamp,
}

/// Whether `target` is older than any of the facts it tracks.
///
/// A target without fact dependencies has no way to prove freshness and is
/// always considered older than its (nonexistent) facts; such targets are
/// conservatively re-run every time they are reached.
pub(crate) fn older_than_facts<S: FactStore>(store: &S, facts: &Slab<Fact>, target: &Target) -> bool {
    let Some(update_facts) = &target.update_facts else {
        return true;
    };
    update_facts
        .iter()
        .enumerate()
        .any(|(slot, &fact_id)| match target.fact_stamps[slot] {
            None => true,
            Some(seen) => store.fact_stamp(&facts[fact_id].name) > seen,
        })
}

/// Whether any target in `target`'s update order carries a newer own stamp.
///
/// The subject itself is the last entry of its own update order; it is not
/// special-cased here since a target cannot be newer than itself.
pub(crate) fn older_than_targets(targets: &[Target], target: &Target) -> bool {
    target
        .update_targets
        .iter()
        .any(|&dep| targets[dep].stamp > target.stamp)
}

/// Saved stamp state for one update pass, restored verbatim on failure.
///
/// Fact stamps live in a flat buffer of `ntarget * nfact` slots indexed
/// `id * nfact + slot`; oversized but simple, with the bounds validated at
/// graph construction. Own stamps get one slot per target. Only the slots of
/// targets in the subject's update order are ever written or read back, so a
/// restore touches exactly the state a failed pass may have disturbed.
pub(crate) struct StampCheckpoint {
    fact_stamps: Vec<Option<Stamp>>,
    own_stamps: Vec<Stamp>,
    nfact: usize,
}

impl StampCheckpoint {
    pub(crate) fn new(ntarget: usize, nfact: usize) -> Self {
        Self {
            fact_stamps: vec![None; ntarget * nfact],
            own_stamps: vec![Stamp::ZERO; ntarget],
            nfact,
        }
    }

    /// Snapshot the stamps of every target in `order`.
    pub(crate) fn save(&mut self, targets: &[Target], order: &[TargetId]) {
        for &id in order {
            let target = &targets[id];
            self.own_stamps[id] = target.stamp;
            if target.update_facts.is_some() {
                let base = id * self.nfact;
                for (slot, &stamp) in target.fact_stamps.iter().enumerate() {
                    self.fact_stamps[base + slot] = stamp;
                }
            }
        }
    }

    /// Write the snapshotted stamps back, leaving every target in `order`
    /// exactly as it was at `save` time.
    pub(crate) fn restore(&self, targets: &mut [Target], order: &[TargetId]) {
        for &id in order {
            let target = &mut targets[id];
            target.stamp = self.own_stamps[id];
            if target.update_facts.is_some() {
                let base = id * self.nfact;
                for (slot, stamp) in target.fact_stamps.iter_mut().enumerate() {
                    *stamp = self.fact_stamps[base + slot];
                }
            }
        }
    }
}
