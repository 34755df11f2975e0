//! Action Dispatch
//!
//! Actions are the only write path into the engine. A request names a
//! component, an action, and arguments; the component registry maps it
//! to (variable, requested value) pairs, and the dispatcher here routes
//! each pair down to essential variables:
//!
//! - An essential target is written directly.
//! - A derived target with an inverse definition runs it against the
//!   current dependency values and re-enqueues the resulting writes on
//!   its dependency slots.
//! - A derived target without an inverse rejects the write; nothing
//!   mutates.
//!
//! All essential writes of one action are collected first and applied as
//! a batch. Recomputation is lazy, so no reader can observe a state
//! where only part of the batch has landed.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Warning;
use crate::graph::{DependencyGraph, InverseResult, ResolvedDep, VarId};
use crate::tree::ComponentArena;
use crate::value::StateValue;

/// Bound on inverse-chain length; a pathological inverse that keeps
/// re-enqueuing stops here instead of spinning.
const MAX_INVERSE_STEPS: usize = 10_000;

/// One action request against a named component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub component: String,
    pub action: String,
    #[serde(default)]
    pub args: IndexMap<String, StateValue>,
}

/// Route requested writes down to essential variables and apply them as
/// one batch. Returns the essential variables actually written.
pub fn apply_action(
    targets: Vec<(VarId, StateValue)>,
    graph: &mut DependencyGraph,
    tree: &ComponentArena,
    warnings: &mut Vec<Warning>,
) -> Vec<VarId> {
    let mut queue: VecDeque<(VarId, StateValue)> = targets.into();
    let mut writes: Vec<(VarId, StateValue)> = Vec::new();
    let mut steps = 0;

    while let Some((id, requested)) = queue.pop_front() {
        steps += 1;
        if steps > MAX_INVERSE_STEPS {
            warn!("inverse chain exceeded step limit; dropping remaining writes");
            break;
        }

        let Some(var) = graph.get(id) else { continue };
        if var.is_essential() {
            writes.push((id, requested));
            continue;
        }

        let Some(inverse) = var.inverse.clone() else {
            debug!(variable = %var.name, "write rejected: no inverse definition");
            continue;
        };

        // Freshen so the resolved dependency slots and their values are
        // current before the inverse runs.
        graph.freshen(id, tree, warnings);
        let inputs = graph.dependency_values(id, warnings);
        match inverse(&requested, &inputs) {
            InverseResult::Set(pairs) => {
                for (slot, value) in pairs {
                    match graph.get(id).and_then(|v| v.resolved.get(slot).cloned()) {
                        Some(ResolvedDep::Var { id: producer, index: None }) => {
                            queue.push_back((producer, value));
                        }
                        Some(ResolvedDep::Var { index: Some(_), .. }) => {
                            debug!("write rejected: element slots are read-only");
                        }
                        Some(ResolvedDep::Const(_)) | None => {}
                    }
                }
            }
            InverseResult::Rejected => {
                if let Some(var) = graph.get(id) {
                    debug!(variable = %var.name, "write rejected by inverse definition");
                }
            }
        }
    }

    // Apply the batch. Marking is metadata only; recomputation happens at
    // the next read, after every write has landed.
    let mut affected = Vec::new();
    for (id, value) in writes {
        if graph.set_essential(id, value) {
            affected.push(id);
        }
    }
    affected
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
