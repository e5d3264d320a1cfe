//! Phase 1: linear scan of builder bytecode into an event/scope arena.

use crate::builder_bc::{BuilderReader, Record, Word};

use super::error::CompileWarning;
use super::model::{
    BlockContext, CompileState, EventKind, GrooveCtx, HumanizeCtx, QuantizeCtx, ScopeKind,
    StructuralChild,
};

/// An open structural frame on the parse stack. Distinct from [`super::model::Scope`]:
/// a `Stack` frame accumulates branch scope ids but is not itself a sortable
/// scope.
enum OpenFrame {
    Scope { scope_id: usize },
    Stack {
        start_tick: i64,
        branch_count: u8,
        branches: Vec<usize>,
    },
}

pub struct ExtractOutput {
    pub state: CompileState,
    pub warnings: Vec<CompileWarning>,
}

/// Walk `words` and build the event/scope arena. Never fails: malformed
/// structure degrades to a recorded warning instead of aborting the compile.
pub fn extract(words: &[Word]) -> ExtractOutput {
    let mut state = CompileState::new();
    let mut warnings = Vec::new();

    let mut frames: Vec<OpenFrame> = vec![OpenFrame::Scope { scope_id: state.root }];
    let mut humanize_stack: Vec<HumanizeCtx> = Vec::new();
    let mut quantize_stack: Vec<QuantizeCtx> = Vec::new();
    let mut groove_stack: Vec<Vec<i32>> = Vec::new();
    let mut last_note_idx: Option<usize> = None;

    let current_scope = |frames: &[OpenFrame]| -> usize {
        for frame in frames.iter().rev() {
            if let OpenFrame::Scope { scope_id } = frame {
                return *scope_id;
            }
        }
        unreachable!("root scope frame is never popped")
    };

    let context_snapshot = |humanize_stack: &[HumanizeCtx], quantize_stack: &[QuantizeCtx], groove_stack: &[Vec<i32>]| -> BlockContext {
        BlockContext {
            humanize: humanize_stack.last().copied(),
            quantize: quantize_stack.last().copied(),
            groove: groove_stack.last().map(|offsets| GrooveCtx::Inline(offsets.clone())),
        }
    };

    macro_rules! push_event {
        ($kind:expr, $tick:expr, $offset:expr) => {{
            let scope_id = current_scope(&frames);
            let context = context_snapshot(&humanize_stack, &quantize_stack, &groove_stack);
            let event_index = state.next_event_index;
            state.next_event_index += 1;
            let idx = state.events.len();
            state.events.push(super::model::ExtractedEvent {
                kind: $kind,
                abs_tick: $tick as i64,
                final_tick: $tick as i64,
                context,
                event_index,
                scope: scope_id,
                source_offset: $offset,
                extra_seed: 0,
            });
            state.scopes[scope_id].events.push(idx);
            idx
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
                let idx = push_event!(
                    EventKind::Note {
                        pitch,
                        velocity,
                        duration: duration as i64,
                    },
                    tick,
                    offset
                );
                last_note_idx = Some(idx);
            }
            Record::Rest { tick, duration } => {
                push_event!(EventKind::Rest { duration: duration as i64 }, tick, offset);
                last_note_idx = None;
            }
            Record::Tempo { tick, bpm } => {
                push_event!(EventKind::Tempo { bpm }, tick, offset);
                last_note_idx = None;
            }
            Record::Cc {
                tick,
                controller,
                value,
            } => {
                push_event!(EventKind::Cc { controller, value }, tick, offset);
                last_note_idx = None;
            }
            Record::Bend { tick, value } => {
                push_event!(EventKind::Bend { value }, tick, offset);
                last_note_idx = None;
            }
            Record::LoopStart { tick, count } => {
                let parent = current_scope(&frames);
                let scope_id = state.push_scope(ScopeKind::Loop { count }, parent, tick as i64);
                state.scopes[parent]
                    .children
                    .push(StructuralChild::Scope(scope_id));
                frames.push(OpenFrame::Scope { scope_id });
                last_note_idx = None;
            }
            Record::LoopEnd => {
                pop_scope_frame(&mut frames, &mut warnings, offset, "LOOP");
                last_note_idx = None;
            }
            Record::StackStart { tick, branch_count } => {
                frames.push(OpenFrame::Stack {
                    start_tick: tick as i64,
                    branch_count,
                    branches: Vec::new(),
                });
                last_note_idx = None;
            }
            Record::StackEnd => {
                match frames.pop() {
                    Some(OpenFrame::Stack {
                        start_tick,
                        branch_count,
                        branches,
                    }) => {
                        let parent = current_scope(&frames);
                        state.scopes[parent].children.push(StructuralChild::Stack {
                            start_tick,
                            branch_count,
                            branches,
                        });
                    }
                    Some(other) => {
                        frames.push(other);
                        warnings.push(CompileWarning::UnclosedBracket {
                            offset,
                            what: "STACK_END with no open STACK",
                        });
                    }
                    None => {}
                }
                last_note_idx = None;
            }
            Record::BranchStart => {
                if let Some(OpenFrame::Stack { start_tick, .. }) = frames.last() {
                    let start_tick = *start_tick;
                    let scope_id = state.push_scope(ScopeKind::Branch, current_scope(&frames), start_tick);
                    frames.push(OpenFrame::Scope { scope_id });
                } else {
                    warnings.push(CompileWarning::UnclosedBracket {
                        offset,
                        what: "BRANCH_START outside STACK",
                    });
                    let parent = current_scope(&frames);
                    let scope_id = state.push_scope(ScopeKind::Branch, parent, 0);
                    state.scopes[parent]
                        .children
                        .push(StructuralChild::Scope(scope_id));
                    frames.push(OpenFrame::Scope { scope_id });
                }
                last_note_idx = None;
            }
            Record::BranchEnd => {
                let scope_id = pop_scope_frame(&mut frames, &mut warnings, offset, "BRANCH");
                if let (Some(scope_id), Some(OpenFrame::Stack { branches, .. })) =
                    (scope_id, frames.last_mut())
                {
                    branches.push(scope_id);
                }
                last_note_idx = None;
            }
            Record::HumanizePush {
                timing_ppt,
                velocity_ppt,
            } => {
                humanize_stack.push(HumanizeCtx {
                    timing_ppt,
                    velocity_ppt,
                });
                last_note_idx = None;
            }
            Record::HumanizePop => {
                if humanize_stack.pop().is_none() {
                    warnings.push(CompileWarning::UnclosedBracket {
                        offset,
                        what: "HUMANIZE_POP with empty stack",
                    });
                }
                last_note_idx = None;
            }
            Record::QuantizePush {
                grid_ticks,
                strength_pct,
            } => {
                quantize_stack.push(QuantizeCtx {
                    grid_ticks,
                    strength_pct,
                });
                last_note_idx = None;
            }
            Record::QuantizePop => {
                if quantize_stack.pop().is_none() {
                    warnings.push(CompileWarning::UnclosedBracket {
                        offset,
                        what: "QUANTIZE_POP with empty stack",
                    });
                }
                last_note_idx = None;
            }
            Record::GroovePush { offsets } => {
                groove_stack.push(offsets);
                last_note_idx = None;
            }
            Record::GroovePop => {
                if groove_stack.pop().is_none() {
                    warnings.push(CompileWarning::UnclosedBracket {
                        offset,
                        what: "GROOVE_POP with empty stack",
                    });
                }
                last_note_idx = None;
            }
            Record::NoteModHumanize {
                timing_ppt,
                velocity_ppt,
            } => {
                if let Some(idx) = last_note_idx {
                    state.events[idx].context.humanize = Some(HumanizeCtx {
                        timing_ppt,
                        velocity_ppt,
                    });
                } else {
                    warnings.push(CompileWarning::NoteModOnNonNote { offset });
                }
            }
            Record::NoteModQuantize {
                grid_ticks,
                strength_pct,
            } => {
                if let Some(idx) = last_note_idx {
                    state.events[idx].context.quantize = Some(QuantizeCtx {
                        grid_ticks,
                        strength_pct,
                    });
                } else {
                    warnings.push(CompileWarning::NoteModOnNonNote { offset });
                }
            }
            Record::NoteModGroove { groove_index } => {
                if let Some(idx) = last_note_idx {
                    state.events[idx].context.groove = Some(GrooveCtx::Registered(groove_index));
                } else {
                    warnings.push(CompileWarning::NoteModOnNonNote { offset });
                }
            }
        }
    }

    // Anything still open at EOF is implicitly closed, per the tolerant
    // structural-imbalance policy.
    while frames.len() > 1 {
        match frames.pop() {
            Some(OpenFrame::Scope { .. }) => {
                warnings.push(CompileWarning::UnclosedBracket {
                    offset: words.len(),
                    what: "scope",
                });
            }
            Some(OpenFrame::Stack {
                start_tick,
                branch_count,
                branches,
            }) => {
                warnings.push(CompileWarning::UnclosedBracket {
                    offset: words.len(),
                    what: "STACK",
                });
                let parent = current_scope(&frames);
                state.scopes[parent].children.push(StructuralChild::Stack {
                    start_tick,
                    branch_count,
                    branches,
                });
            }
            None => {}
        }
    }

    ExtractOutput { state, warnings }
}

/// Pop the innermost open `Scope` frame (for `LOOP_END`/`BRANCH_END`),
/// warning and leaving structure untouched if the top frame is not a scope
/// or the stack only has the root frame left.
fn pop_scope_frame(
    frames: &mut Vec<OpenFrame>,
    warnings: &mut Vec<CompileWarning>,
    offset: usize,
    what: &'static str,
) -> Option<usize> {
    if frames.len() <= 1 {
        warnings.push(CompileWarning::UnclosedBracket { offset, what });
        return None;
    }
    match frames.pop() {
        Some(OpenFrame::Scope { scope_id }) => Some(scope_id),
        Some(other) => {
            frames.push(other);
            warnings.push(CompileWarning::UnclosedBracket { offset, what });
            None
        }
        None => None,
    }
}
