//! Phase 1: linear scan of builder bytecode into the flat event/scope arrays.
//!
//! Structurally identical to [`crate::compiler::extract`], just writing into
//! preallocated slots instead of pushing onto `Vec`s, and snapshotting each
//! event's transform context into the parallel [`EventCtx`] array instead of
//! cloning it inline.

use crate::builder_bc::{BuilderReader, Record};
use crate::compiler::{CompileError, CompileWarning};
use crate::vm_bc::opcode as vm_op;

use super::context::{EventCtx, GrooveRef, HumanizeCtx, QuantizeCtx};
use super::{StructOp, ZeroAllocCompiler};

/// An open structural frame on the parse stack. A `Stack` frame is not
/// itself sortable; it only tracks the scope id to link `Branch` children
/// under.
enum OpenFrame {
    Scope(usize),
    Stack(usize),
}

impl ZeroAllocCompiler {
    pub(super) fn extract(&mut self, words: &[crate::builder_bc::Word]) -> Result<Vec<CompileWarning>, CompileError> {
        let mut warnings = Vec::new();
        let mut frames: Vec<OpenFrame> = vec![OpenFrame::Scope(0)];
        let mut last_note_idx: Option<usize> = None;

        macro_rules! current_scope {
            () => {{
                let mut found = 0usize;
                for frame in frames.iter().rev() {
                    if let OpenFrame::Scope(id) = frame {
                        found = *id;
                        break;
                    }
                }
                found
            }};
        }

        for raw in BuilderReader::new(words) {
            let offset = raw.offset;
            match raw.record {
                Record::Note {
                    tick,
                    pitch,
                    velocity,
                    duration,
                } => {
                    let scope_id = current_scope!();
                    let ctx = self.context_snapshot();
                    let idx = self.push_event(vm_op::NOTE, tick as i64, pitch as i32, velocity as i32, duration, scope_id, ctx)?;
                    last_note_idx = Some(idx);
                }
                Record::Rest { tick, duration } => {
                    let scope_id = current_scope!();
                    let ctx = self.context_snapshot();
                    self.push_event(vm_op::REST, tick as i64, duration, 0, 0, scope_id, ctx)?;
                    last_note_idx = None;
                }
                Record::Tempo { tick, bpm } => {
                    let scope_id = current_scope!();
                    let ctx = self.context_snapshot();
                    self.push_event(vm_op::TEMPO, tick as i64, bpm as i32, 0, 0, scope_id, ctx)?;
                    last_note_idx = None;
                }
                Record::Cc { tick, controller, value } => {
                    let scope_id = current_scope!();
                    let ctx = self.context_snapshot();
                    self.push_event(vm_op::CC, tick as i64, controller as i32, value as i32, 0, scope_id, ctx)?;
                    last_note_idx = None;
                }
                Record::Bend { tick, value } => {
                    let scope_id = current_scope!();
                    let ctx = self.context_snapshot();
                    self.push_event(vm_op::BEND, tick as i64, value as i32, 0, 0, scope_id, ctx)?;
                    last_note_idx = None;
                }
                Record::LoopStart { tick, count } => {
                    let parent = current_scope!();
                    let scope_id = self.push_scope_linked(StructOp::Loop, parent as i32, tick as i64, count)?;
                    frames.push(OpenFrame::Scope(scope_id));
                    last_note_idx = None;
                }
                Record::LoopEnd => {
                    pop_scope_frame(&mut frames, &mut warnings, offset, "LOOP");
                    last_note_idx = None;
                }
                Record::StackStart { tick, branch_count } => {
                    // Left unlinked: the reference compiler only appends its
                    // `StructuralChild::Stack` to the parent at STACK_END
                    // (after every branch is known), so anything parented
                    // directly to the enclosing scope in between - a
                    // LOOP_START with no open BRANCH, say - must land before
                    // this stack in the sibling chain, not after.
                    let parent = current_scope!();
                    let scope_id = self.push_scope_raw(StructOp::Stack, parent as i32, tick as i64, branch_count as i32)?;
                    frames.push(OpenFrame::Stack(scope_id));
                    last_note_idx = None;
                }
                Record::StackEnd => {
                    match frames.last() {
                        Some(OpenFrame::Stack(stack_id)) => {
                            let stack_id = *stack_id;
                            frames.pop();
                            let parent = current_scope!();
                            self.link_child(parent, stack_id);
                        }
                        _ => {
                            warnings.push(CompileWarning::UnclosedBracket {
                                offset,
                                what: "STACK_END with no open STACK",
                            });
                        }
                    }
                    last_note_idx = None;
                }
                Record::BranchStart => {
                    let open_stack = match frames.last() {
                        Some(OpenFrame::Stack(id)) => Some(*id),
                        _ => None,
                    };
                    if let Some(stack_id) = open_stack {
                        let start_tick = self.scopes[stack_id].start_tick;
                        let scope_id = self.push_scope_linked(StructOp::Branch, stack_id as i32, start_tick, 0)?;
                        frames.push(OpenFrame::Scope(scope_id));
                    } else {
                        warnings.push(CompileWarning::UnclosedBracket {
                            offset,
                            what: "BRANCH_START outside STACK",
                        });
                        let parent = current_scope!();
                        let scope_id = self.push_scope_linked(StructOp::Branch, parent as i32, 0, 0)?;
                        frames.push(OpenFrame::Scope(scope_id));
                    }
                    last_note_idx = None;
                }
                Record::BranchEnd => {
                    pop_scope_frame(&mut frames, &mut warnings, offset, "BRANCH");
                    last_note_idx = None;
                }
                Record::HumanizePush { timing_ppt, velocity_ppt } => {
                    if self.humanize_sp >= super::MAX_CONTEXT_DEPTH {
                        return Err(CompileError::Overflow {
                            resource: "humanize context stack",
                            cap: super::MAX_CONTEXT_DEPTH,
                        });
                    }
                    self.humanize_stack[self.humanize_sp] = HumanizeCtx { timing_ppt, velocity_ppt };
                    self.humanize_sp += 1;
                    last_note_idx = None;
                }
                Record::HumanizePop => {
                    if self.humanize_sp == 0 {
                        warnings.push(CompileWarning::UnclosedBracket {
                            offset,
                            what: "HUMANIZE_POP with empty stack",
                        });
                    } else {
                        self.humanize_sp -= 1;
                    }
                    last_note_idx = None;
                }
                Record::QuantizePush { grid_ticks, strength_pct } => {
                    if self.quantize_sp >= super::MAX_CONTEXT_DEPTH {
                        return Err(CompileError::Overflow {
                            resource: "quantize context stack",
                            cap: super::MAX_CONTEXT_DEPTH,
                        });
                    }
                    self.quantize_stack[self.quantize_sp] = QuantizeCtx { grid_ticks, strength_pct };
                    self.quantize_sp += 1;
                    last_note_idx = None;
                }
                Record::QuantizePop => {
                    if self.quantize_sp == 0 {
                        warnings.push(CompileWarning::UnclosedBracket {
                            offset,
                            what: "QUANTIZE_POP with empty stack",
                        });
                    } else {
                        self.quantize_sp -= 1;
                    }
                    last_note_idx = None;
                }
                Record::GroovePush { offsets } => {
                    if offsets.len() > super::MAX_GROOVE_OFFSETS {
                        return Err(CompileError::Overflow {
                            resource: "inline groove offsets",
                            cap: super::MAX_GROOVE_OFFSETS,
                        });
                    }
                    if self.groove_arena_len + offsets.len() > self.groove_arena.len() {
                        return Err(CompileError::Overflow {
                            resource: "inline groove arena",
                            cap: self.groove_arena.len(),
                        });
                    }
                    if self.groove_sp >= super::MAX_CONTEXT_DEPTH {
                        return Err(CompileError::Overflow {
                            resource: "groove context stack",
                            cap: super::MAX_CONTEXT_DEPTH,
                        });
                    }
                    let start = self.groove_arena_len as u32;
                    for (i, v) in offsets.iter().enumerate() {
                        self.groove_arena[start as usize + i] = *v;
                    }
                    self.groove_arena_len += offsets.len();
                    self.groove_stack[self.groove_sp] = GrooveRef::Inline {
                        start,
                        len: offsets.len() as u16,
                    };
                    self.groove_sp += 1;
                    last_note_idx = None;
                }
                Record::GroovePop => {
                    if self.groove_sp == 0 {
                        warnings.push(CompileWarning::UnclosedBracket {
                            offset,
                            what: "GROOVE_POP with empty stack",
                        });
                    } else {
                        self.groove_sp -= 1;
                    }
                    last_note_idx = None;
                }
                Record::NoteModHumanize { timing_ppt, velocity_ppt } => {
                    if let Some(idx) = last_note_idx {
                        self.ctx[idx].humanize = Some(HumanizeCtx { timing_ppt, velocity_ppt });
                    } else {
                        warnings.push(CompileWarning::NoteModOnNonNote { offset });
                    }
                }
                Record::NoteModQuantize { grid_ticks, strength_pct } => {
                    if let Some(idx) = last_note_idx {
                        self.ctx[idx].quantize = Some(QuantizeCtx { grid_ticks, strength_pct });
                    } else {
                        warnings.push(CompileWarning::NoteModOnNonNote { offset });
                    }
                }
                Record::NoteModGroove { groove_index } => {
                    if let Some(idx) = last_note_idx {
                        self.ctx[idx].groove = GrooveRef::Registered { index: groove_index };
                    } else {
                        warnings.push(CompileWarning::NoteModOnNonNote { offset });
                    }
                }
            }
        }

        while frames.len() > 1 {
            match frames.pop() {
                Some(OpenFrame::Stack(stack_id)) => {
                    warnings.push(CompileWarning::UnclosedBracket {
                        offset: words.len(),
                        what: "STACK",
                    });
                    let parent = current_scope!();
                    self.link_child(parent, stack_id);
                }
                Some(OpenFrame::Scope(_)) => {
                    warnings.push(CompileWarning::UnclosedBracket {
                        offset: words.len(),
                        what: "scope",
                    });
                }
                None => {}
            }
        }

        Ok(warnings)
    }

    fn context_snapshot(&self) -> EventCtx {
        EventCtx {
            humanize: if self.humanize_sp > 0 {
                Some(self.humanize_stack[self.humanize_sp - 1])
            } else {
                None
            },
            quantize: if self.quantize_sp > 0 {
                Some(self.quantize_stack[self.quantize_sp - 1])
            } else {
                None
            },
            groove: if self.groove_sp > 0 {
                self.groove_stack[self.groove_sp - 1]
            } else {
                GrooveRef::None
            },
            extra_seed: 0,
        }
    }
}

/// Pop the innermost open `Scope` frame (for `LOOP_END`/`BRANCH_END`),
/// warning and leaving structure untouched if the top frame is not a scope
/// or only the root frame is left.
fn pop_scope_frame(frames: &mut Vec<OpenFrame>, warnings: &mut Vec<CompileWarning>, offset: usize, what: &'static str) {
    if frames.len() <= 1 {
        warnings.push(CompileWarning::UnclosedBracket { offset, what });
        return;
    }
    match frames.last() {
        Some(OpenFrame::Scope(_)) => {
            frames.pop();
        }
        _ => {
            warnings.push(CompileWarning::UnclosedBracket { offset, what });
        }
    }
}
