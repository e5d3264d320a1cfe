//! Compile-time loop unrolling.
//!
//! `unroll=true` expands every `Loop` scope into `count` inline copies of its
//! body, each re-seeded and tick-shifted, with no `LOOP_START`/`LOOP_END`
//! bracket emitted. Runs against already-extracted (pre-transform) events so
//! the clones can each run the transform chain with their own iteration
//! seed.

use super::model::{CompileState, ExtractedEvent, Scope, ScopeKind, StructuralChild};

/// Recursively expand every `Loop` scope reachable from `scope_id`, bottom up
/// so nested loops are unrolled (and their duration known) before an
/// enclosing loop needs it.
pub fn unroll_scope(state: &mut CompileState, scope_id: usize) {
    // Recurse into children first (post-order) so nested Loop scopes are
    // already flattened by the time we compute this scope's own duration.
    let children = state.scopes[scope_id].children.clone();
    let mut new_children = Vec::with_capacity(children.len());
    for child in children {
        match child {
            StructuralChild::Scope(child_id) => {
                unroll_scope(state, child_id);
                if let ScopeKind::Loop { count } = state.scopes[child_id].kind {
                    let copies = expand_loop(state, child_id, count);
                    new_children.extend(copies.into_iter().map(StructuralChild::Scope));
                } else {
                    new_children.push(StructuralChild::Scope(child_id));
                }
            }
            StructuralChild::Stack {
                start_tick,
                branch_count,
                branches,
            } => {
                for &branch_id in &branches {
                    unroll_scope(state, branch_id);
                }
                new_children.push(StructuralChild::Stack {
                    start_tick,
                    branch_count,
                    branches,
                });
            }
        }
    }
    state.scopes[scope_id].children = new_children;
}

/// Replace a `Loop` scope with `count` `UnrolledLoopBody` copies (as new
/// scopes appended to the arena), returning their ids in iteration order.
/// `count <= 0` yields zero copies, matching the VM's own skip-forward rule.
fn expand_loop(state: &mut CompileState, loop_scope_id: usize, count: i32) -> Vec<usize> {
    if count <= 0 {
        return Vec::new();
    }
    let body_duration = scope_duration(state, loop_scope_id);
    let parent = state.scopes[loop_scope_id].parent;

    let mut copies = Vec::with_capacity(count as usize);
    for iter in 0..count {
        let tick_shift = iter as i64 * body_duration;
        let seed_offset = iter as u32 * 1000;
        let new_scope_id = clone_scope_subtree(
            state,
            loop_scope_id,
            parent,
            ScopeKind::UnrolledLoopBody,
            tick_shift,
            seed_offset,
        );
        copies.push(new_scope_id);
    }
    copies
}

/// Deep-clone a scope (and, recursively, its structural children) into the
/// arena as a new scope rooted under `new_parent`, shifting every event's
/// `abs_tick` by `tick_shift` and composing `seed_offset` into its
/// `extra_seed` (so a loop nested inside another unrolled loop accumulates
/// both iterations' offsets).
fn clone_scope_subtree(
    state: &mut CompileState,
    source_scope_id: usize,
    new_parent: Option<usize>,
    kind_override: ScopeKind,
    tick_shift: i64,
    seed_offset: u32,
) -> usize {
    let source = state.scopes[source_scope_id].clone_shallow();
    let new_scope_id = state.scopes.len();
    state.scopes.push(Scope {
        kind: kind_override,
        parent: new_parent,
        start_tick: source.start_tick + tick_shift,
        events: Vec::new(),
        children: Vec::new(),
    });

    let mut new_events = Vec::with_capacity(source.events.len());
    for &event_idx in &source.events {
        let mut cloned: ExtractedEvent = state.events[event_idx].clone();
        cloned.abs_tick += tick_shift;
        cloned.final_tick = cloned.abs_tick;
        cloned.extra_seed = cloned.extra_seed.wrapping_add(seed_offset);
        cloned.scope = new_scope_id;
        let new_idx = state.events.len();
        state.events.push(cloned);
        new_events.push(new_idx);
    }
    state.scopes[new_scope_id].events = new_events;

    let mut new_children = Vec::with_capacity(source.children.len());
    for child in &source.children {
        match child {
            StructuralChild::Scope(child_id) => {
                let child_kind = state.scopes[*child_id].kind.clone();
                let cloned_id = clone_scope_subtree(
                    state,
                    *child_id,
                    Some(new_scope_id),
                    child_kind,
                    tick_shift,
                    seed_offset,
                );
                new_children.push(StructuralChild::Scope(cloned_id));
            }
            StructuralChild::Stack {
                start_tick,
                branch_count,
                branches,
            } => {
                let mut cloned_branches = Vec::with_capacity(branches.len());
                for &branch_id in branches {
                    let cloned_id = clone_scope_subtree(
                        state,
                        branch_id,
                        Some(new_scope_id),
                        ScopeKind::Branch,
                        tick_shift,
                        seed_offset,
                    );
                    cloned_branches.push(cloned_id);
                }
                new_children.push(StructuralChild::Stack {
                    start_tick: start_tick + tick_shift,
                    branch_count: *branch_count,
                    branches: cloned_branches,
                });
            }
        }
    }
    state.scopes[new_scope_id].children = new_children;

    new_scope_id
}

/// `body_duration`: a structure-aware summation over `scope_id`'s own
/// events and structural children, recursively maxing across parallel
/// branches and multiplying by loop counts, relative to the scope's own
/// `start_tick`.
pub fn scope_duration(state: &CompileState, scope_id: usize) -> i64 {
    let scope = &state.scopes[scope_id];
    let mut end = scope.start_tick;

    for &event_idx in &scope.events {
        let event = &state.events[event_idx];
        end = end.max(event.abs_tick + event.kind.extent());
    }

    for child in &scope.children {
        match child {
            StructuralChild::Scope(child_id) => {
                let child_scope = &state.scopes[*child_id];
                match child_scope.kind {
                    ScopeKind::Loop { count } => {
                        let n = count.max(0) as i64;
                        let d = scope_duration(state, *child_id);
                        end = end.max(child_scope.start_tick + n * d);
                    }
                    _ => {
                        let child_end = child_scope.start_tick + scope_duration(state, *child_id);
                        end = end.max(child_end);
                    }
                }
            }
            StructuralChild::Stack {
                start_tick,
                branches,
                ..
            } => {
                let branch_end = branches
                    .iter()
                    .map(|&b| scope_duration(state, b))
                    .max()
                    .unwrap_or(0);
                end = end.max(start_tick + branch_end);
            }
        }
    }

    end - scope.start_tick
}

impl Scope {
    /// A shallow copy sufficient for reading `start_tick`/event & child
    /// lists during cloning; cheap because `events`/`children` are `Vec`s
    /// of small copyable handles.
    fn clone_shallow(&self) -> Scope {
        self.clone()
    }
}
