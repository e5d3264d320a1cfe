//! Phase 4 (+5): walk the scope tree in original nesting and emit VM
//! bytecode instructions, then compute total-ticks.

use crate::vm_bc::Instruction;

use super::model::{CompileState, EventKind, ScopeKind, StructuralChild};

/// Emit `scope_id`'s sorted events, then its structural children in their
/// original order, bracketed by the VM opcode pairs their kind implies.
pub fn emit_scope(state: &CompileState, scope_id: usize, out: &mut Vec<Instruction>) {
    let scope = &state.scopes[scope_id];
    let mut current_abs = scope.start_tick;

    for &event_idx in &scope.events {
        let event = &state.events[event_idx];
        if event.final_tick > current_abs {
            out.push(Instruction::Rest {
                duration: (event.final_tick - current_abs) as u32,
            });
            current_abs = event.final_tick;
        }
        match &event.kind {
            EventKind::Note {
                pitch,
                velocity,
                duration,
            } => {
                out.push(Instruction::Note {
                    pitch: *pitch,
                    velocity: *velocity,
                    duration: *duration as u32,
                });
                current_abs += *duration;
            }
            EventKind::Rest { duration } => {
                out.push(Instruction::Rest {
                    duration: *duration as u32,
                });
                current_abs += *duration;
            }
            EventKind::Tempo { bpm } => out.push(Instruction::Tempo { bpm: *bpm }),
            EventKind::Cc { controller, value } => out.push(Instruction::Cc {
                controller: *controller,
                value: *value,
            }),
            EventKind::Bend { value } => out.push(Instruction::Bend { value: *value }),
        }
    }

    for child in &scope.children {
        match child {
            StructuralChild::Scope(child_id) => {
                let child_scope = &state.scopes[*child_id];
                match child_scope.kind {
                    ScopeKind::Loop { count } => {
                        out.push(Instruction::LoopStart { count });
                        emit_scope(state, *child_id, out);
                        out.push(Instruction::LoopEnd);
                    }
                    ScopeKind::UnrolledLoopBody => {
                        emit_scope(state, *child_id, out);
                    }
                    ScopeKind::Branch => {
                        // A Branch reached outside a Stack only happens via
                        // the tolerant malformed-input fallback; treat it as
                        // a bare inline scope (no bracket pair makes sense
                        // without a Stack to balance it).
                        emit_scope(state, *child_id, out);
                    }
                    ScopeKind::Root => unreachable!("root is never a child"),
                }
            }
            StructuralChild::Stack {
                branch_count,
                branches,
                ..
            } => {
                out.push(Instruction::StackStart {
                    count: *branch_count,
                });
                for &branch_id in branches {
                    out.push(Instruction::BranchStart);
                    emit_scope(state, branch_id, out);
                    out.push(Instruction::BranchEnd);
                }
                out.push(Instruction::StackEnd);
            }
        }
    }
}

/// Phase 5: `max` over all events of `final_tick + extent`, flat across the
/// whole arena (loop/stack multiplication is not re-applied here - every
/// unrolled or branched event already carries its own absolute extent).
pub fn total_ticks(state: &CompileState) -> i64 {
    state
        .events
        .iter()
        .map(|e| e.final_tick + e.kind.extent())
        .max()
        .unwrap_or(0)
}
