//! The target graph builder.
//!
//! Consumes parsed target declarations and produces the registry's flat
//! target array: script binding, implicit fact registration, dependency
//! resolution, per-target topological linearization with cycle rejection,
//! auto-update resolution, and the compile and prepare passes.

use std::collections::HashMap;

use slab::Slab;
use tracing::{debug, error};

use crate::error::{ResolverError, ScriptCreateError};
use crate::script::ScriptBackend;
use crate::stamp::Stamp;
use crate::store::FactStore;
use crate::target::{fact_reference, Fact, FactId, Target, TargetDecl, TargetId};

/// Builder output, adopted wholesale by the resolver.
pub(crate) struct BuiltGraph {
    pub(crate) targets: Vec<Target>,
    pub(crate) facts: Slab<Fact>,
    pub(crate) auto_update: Option<TargetId>,
}

impl std::fmt::Debug for BuiltGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltGraph")
            .field("targets", &self.targets.len())
            .field("facts", &self.facts.len())
            .field("auto_update", &self.auto_update)
            .finish()
    }
}

/// Build the target array from parsed declarations.
///
/// Every failure here is fatal to the whole build: the registry either comes
/// up complete, compiled, and prepared, or not at all.
pub(crate) fn build<S: FactStore>(
    store: &S,
    backend: &dyn ScriptBackend,
    decls: Vec<TargetDecl>,
    auto_update: Option<String>,
) -> Result<BuiltGraph, ResolverError> {
    let mut targets = Vec::with_capacity(decls.len());
    let mut target_index = HashMap::new();
    let mut facts = Slab::new();
    let mut fact_index: HashMap<String, FactId> = HashMap::new();

    for decl in decls {
        let id = targets.len();
        if target_index.insert(decl.name.clone(), id).is_some() {
            error!(target = %decl.name, "duplicate target declaration");
            return Err(ResolverError::DuplicateTarget { name: decl.name });
        }

        let script = match decl.script {
            Some(script_decl) => {
                match backend.create(&script_decl.kind, &script_decl.source) {
                    Ok(script) => Some(script),
                    Err(ScriptCreateError::UnsupportedKind) => {
                        error!(target = %decl.name, kind = %script_decl.kind,
                               "unsupported script kind");
                        return Err(ResolverError::UnsupportedScriptKind {
                            target: decl.name,
                            kind: script_decl.kind,
                        });
                    }
                    Err(ScriptCreateError::Bind(reason)) => {
                        error!(target = %decl.name, %reason, "failed to set up script");
                        return Err(ResolverError::ScriptBind {
                            target: decl.name,
                            reason,
                        });
                    }
                }
            }
            None => None,
        };

        for reference in &decl.depends {
            if let Some(fact) = fact_reference(reference) {
                if !fact_index.contains_key(fact) {
                    store.register_fact(fact)?;
                    let fact_id = facts.insert(Fact {
                        name: fact.to_string(),
                    });
                    fact_index.insert(fact.to_string(), fact_id);
                    debug!(fact, "registered fact");
                }
            }
        }

        targets.push(Target {
            id,
            name: decl.name,
            depends: decl.depends,
            update_facts: None,
            fact_stamps: Vec::new(),
            update_targets: Vec::new(),
            script,
            stamp: Stamp::ZERO,
        });
    }

    let auto_update = match auto_update {
        Some(name) => match target_index.get(&name) {
            Some(&id) => Some(id),
            None => {
                error!(target = %name, "auto-update target does not exist");
                return Err(ResolverError::UnknownAutoUpdateTarget { name });
            }
        },
        None => None,
    };

    // Flat buffer size for the per-pass stamp checkpoint.
    if targets.len().checked_mul(facts.len()).is_none() {
        return Err(ResolverError::CapacityExceeded {
            ntarget: targets.len(),
            nfact: facts.len(),
        });
    }

    link_dependencies(&mut targets, &target_index, &fact_index)?;
    linearize(&mut targets)?;
    compile_scripts(&mut targets)?;
    prepare_scripts(&mut targets)?;

    Ok(BuiltGraph {
        targets,
        facts,
        auto_update,
    })
}

/// Resolve textual references into `update_facts` and the fact stamp vector.
///
/// `update_facts` holds the target's direct fact references only; facts
/// behind a dependency target are that dependency's business during the
/// update walk. A target with no fact reference keeps `None` and is always
/// considered stale.
fn link_dependencies(
    targets: &mut [Target],
    target_index: &HashMap<String, TargetId>,
    fact_index: &HashMap<String, FactId>,
) -> Result<(), ResolverError> {
    for target in targets.iter_mut() {
        let mut update_facts: Vec<FactId> = Vec::new();
        for reference in &target.depends {
            match fact_reference(reference) {
                Some(fact) => {
                    // Registered above; the index lookup cannot miss.
                    if let Some(&fact_id) = fact_index.get(fact) {
                        if !update_facts.contains(&fact_id) {
                            update_facts.push(fact_id);
                        }
                    }
                }
                None => {
                    if !target_index.contains_key(reference.as_str()) {
                        error!(target = %target.name, dependency = %reference,
                               "unresolvable target dependency");
                        return Err(ResolverError::UnknownDependency {
                            target: target.name.clone(),
                            dependency: reference.clone(),
                        });
                    }
                }
            }
        }
        if !update_facts.is_empty() {
            target.fact_stamps = vec![None; update_facts.len()];
            target.update_facts = Some(update_facts);
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Visiting,
    Done,
}

/// Compute each target's topological update order.
///
/// Depth-first postorder over target dependencies, one walk per target: every
/// transitive target dependency appears exactly once, no target precedes one
/// it depends on, and the target itself comes last. A cycle anywhere in the
/// declared graph fails the build with the cycle path.
fn linearize(targets: &mut [Target]) -> Result<(), ResolverError> {
    let name_to_id: HashMap<&str, TargetId> = targets
        .iter()
        .map(|t| (t.name.as_str(), t.id))
        .collect();
    let adjacency: Vec<Vec<TargetId>> = targets
        .iter()
        .map(|t| {
            t.depends
                .iter()
                .filter(|reference| fact_reference(reference).is_none())
                .map(|reference| name_to_id[reference.as_str()])
                .collect()
        })
        .collect();

    for id in 0..targets.len() {
        let mut marks = vec![Mark::White; targets.len()];
        let mut trail = Vec::new();
        let mut order = Vec::new();
        visit(id, &adjacency, &mut marks, &mut trail, &mut order).map_err(|cycle_start| {
            let first = trail
                .iter()
                .position(|&t| t == cycle_start)
                .unwrap_or(0);
            let mut path: Vec<String> = trail[first..]
                .iter()
                .map(|&t| targets[t].name.clone())
                .collect();
            path.push(targets[cycle_start].name.clone());
            error!(path = %path.join(" -> "), "cyclic target dependency");
            ResolverError::CyclicDependency { path }
        })?;
        targets[id].update_targets = order;
    }
    Ok(())
}

fn visit(
    id: TargetId,
    adjacency: &[Vec<TargetId>],
    marks: &mut [Mark],
    trail: &mut Vec<TargetId>,
    order: &mut Vec<TargetId>,
) -> Result<(), TargetId> {
    match marks[id] {
        Mark::Done => return Ok(()),
        Mark::Visiting => return Err(id),
        Mark::White => {}
    }
    marks[id] = Mark::Visiting;
    trail.push(id);
    for &dep in &adjacency[id] {
        visit(dep, adjacency, marks, trail, order)?;
    }
    trail.pop();
    marks[id] = Mark::Done;
    order.push(id);
    Ok(())
}

/// Syntax/bind-time check for every bound script, before any execution.
fn compile_scripts(targets: &mut [Target]) -> Result<(), ResolverError> {
    for target in targets.iter_mut() {
        if let Some(script) = target.script.as_mut() {
            script.compile().map_err(|reason| {
                error!(target = %target.name, %reason, "failed to compile script");
                ResolverError::ScriptCompile {
                    target: target.name.clone(),
                    reason,
                }
            })?;
        }
    }
    Ok(())
}

/// Runtime-environment setup for every compiled script.
fn prepare_scripts(targets: &mut [Target]) -> Result<(), ResolverError> {
    for target in targets.iter_mut() {
        if let Some(script) = target.script.as_mut() {
            script.prepare().map_err(|reason| {
                error!(target = %target.name, %reason, "failed to prepare script");
                ResolverError::ScriptPrepare {
                    target: target.name.clone(),
                    reason,
                }
            })?;
        }
    }
    Ok(())
}
