//! The opcode dispatch table and `tick()`'s cooperative run loop.

use crate::shared::layout::{EVENT_TYPE_BEND, EVENT_TYPE_CC, EVENT_TYPE_NOTE};
use crate::shared::{RunState, SharedBuffer};
use crate::vm_bc::{decode_at, opcode, DecodeErrorKind, Instruction, Word};

use super::error::VmError;
use super::registers;
use super::stacks;

/// Decode at `pc`, treating an unrecognized opcode as a one-word no-op
/// rather than a fatal error, for forward compatibility with producers
/// emitting opcodes this VM does not yet know about. Any other decode
/// failure (truncated argument, `pc` past the end) is a fatal
/// malformed-bytecode error.
fn step(words: &[Word], pc: usize) -> Result<(Option<Instruction>, usize), VmError> {
    match decode_at(words, pc) {
        Ok((instr, next_pc)) => Ok((Some(instr), next_pc)),
        Err(e) if matches!(e.kind, DecodeErrorKind::UnknownOpcode { .. }) => Ok((None, pc + 1)),
        Err(e) => Err(VmError::MalformedBytecode {
            pc: e.pc,
            message: e.message,
        }),
    }
}

/// Advance `pc` past the `LOOP_END` matching the `LOOP_START` just consumed,
/// tracking nesting depth so inner loops don't confuse the scan.
fn skip_loop_body(words: &[Word], mut pc: usize) -> Result<usize, VmError> {
    let mut depth = 1;
    loop {
        let (instr, next_pc) = step(words, pc)?;
        match instr {
            Some(Instruction::LoopStart { .. }) => depth += 1,
            Some(Instruction::LoopEnd) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(next_pc);
                }
            }
            Some(Instruction::Eof) | None if pc >= words.len() => {
                return Err(VmError::MalformedBytecode {
                    pc,
                    message: "LOOP_START has no matching LOOP_END".to_string(),
                })
            }
            _ => {}
        }
        pc = next_pc;
    }
}

/// Run the dispatch loop until `TICK` would exceed `target_tick`, the
/// program reaches `EOF`, or the event ring backpressures.
pub fn run_tick(buf: &SharedBuffer, target_tick: i64) -> Result<(), VmError> {
    if buf.state() == RunState::Done {
        return Ok(());
    }
    buf.set_state(RunState::Running);
    let words = buf.bytecode_words();

    loop {
        let cur_tick = registers::tick(buf);
        if cur_tick > target_tick {
            buf.set_state(RunState::Paused);
            return Ok(());
        }

        let pc = registers::pc(buf);
        let (instr, next_pc) = step(&words, pc)?;

        let Some(instr) = instr else {
            registers::set_pc(buf, next_pc);
            continue;
        };

        match instr {
            Instruction::Note { pitch, velocity, duration } => {
                if buf.is_backpressured() {
                    buf.set_state(RunState::Paused);
                    return Ok(());
                }
                let transposed = pitch as i32 + registers::transposition(buf);
                buf.push_event(EVENT_TYPE_NOTE, cur_tick as Word, transposed, velocity as Word, duration as Word);
                registers::set_tick(buf, cur_tick + duration as i64);
                registers::set_pc(buf, next_pc);
            }
            Instruction::Rest { duration } => {
                registers::set_tick(buf, cur_tick + duration as i64);
                registers::set_pc(buf, next_pc);
            }
            Instruction::Chord {
                root,
                intervals,
                velocity,
                duration,
            } => {
                if buf.is_backpressured() {
                    buf.set_state(RunState::Paused);
                    return Ok(());
                }
                let transposition = registers::transposition(buf);
                let pitches = std::iter::once(0i32).chain(intervals.iter().map(|i| *i as i32));
                for (i, interval) in pitches.enumerate() {
                    if i > 0 && buf.is_backpressured() {
                        // Subsequent chord notes are best-effort only.
                        continue;
                    }
                    let transposed = root as i32 + interval + transposition;
                    buf.push_event(EVENT_TYPE_NOTE, cur_tick as Word, transposed, velocity as Word, duration as Word);
                }
                registers::set_tick(buf, cur_tick + duration as i64);
                registers::set_pc(buf, next_pc);
            }
            Instruction::Tempo { bpm } => {
                buf.push_tempo(cur_tick as Word, bpm as Word);
                registers::set_pc(buf, next_pc);
            }
            Instruction::Cc { controller, value } => {
                if buf.is_backpressured() {
                    buf.set_state(RunState::Paused);
                    return Ok(());
                }
                buf.push_event(EVENT_TYPE_CC, cur_tick as Word, controller as Word, value as Word, 0);
                registers::set_pc(buf, next_pc);
            }
            Instruction::Bend { value } => {
                if buf.is_backpressured() {
                    buf.set_state(RunState::Paused);
                    return Ok(());
                }
                buf.push_event(EVENT_TYPE_BEND, cur_tick as Word, value as Word, 0, 0);
                registers::set_pc(buf, next_pc);
            }
            Instruction::Transpose { semitones } => {
                if semitones != 0 {
                    stacks::push_transpose(buf, semitones)?;
                } else {
                    stacks::pop_transpose(buf);
                }
                registers::set_pc(buf, next_pc);
            }
            Instruction::StackStart { count } => {
                stacks::push_stack_frame(buf, cur_tick as Word, count)?;
                registers::set_pc(buf, next_pc);
            }
            Instruction::BranchStart => {
                if let Some((start, _, _, _)) = stacks::top_stack_frame(buf) {
                    registers::set_tick(buf, start as i64);
                }
                registers::set_pc(buf, next_pc);
            }
            Instruction::BranchEnd => {
                if let Some((start, max_dur, _count, branch_index)) = stacks::top_stack_frame(buf) {
                    let elapsed = (registers::tick(buf) - start as i64) as i32;
                    stacks::update_top_stack_frame(buf, max_dur.max(elapsed), branch_index + 1);
                }
                registers::set_pc(buf, next_pc);
            }
            Instruction::StackEnd => {
                if let Some((start, max_dur)) = stacks::pop_stack_frame(buf) {
                    registers::set_tick(buf, start as i64 + max_dur as i64);
                }
                registers::set_pc(buf, next_pc);
            }
            Instruction::LoopStart { count } => {
                if count <= 0 {
                    let after = skip_loop_body(&words, next_pc)?;
                    registers::set_pc(buf, after);
                } else {
                    stacks::push_loop_frame(buf, next_pc, count)?;
                    registers::set_pc(buf, next_pc);
                }
            }
            Instruction::LoopEnd => {
                if let Some((body_pc, remaining)) = stacks::top_loop_frame(buf) {
                    let remaining = remaining - 1;
                    if remaining > 0 {
                        stacks::update_top_loop_frame(buf, remaining);
                        registers::set_pc(buf, body_pc);
                    } else {
                        stacks::pop_loop_frame(buf);
                        registers::set_pc(buf, next_pc);
                    }
                } else {
                    registers::set_pc(buf, next_pc);
                }
            }
            Instruction::Eof => {
                buf.set_state(RunState::Done);
                return Ok(());
            }
        }
    }
}

/// Advance PC past the matching `LOOP_END` by tracking `LOOP_START`/`LOOP_END`
/// nesting depth, per the dispatch table's `LOOP_START` skip rule.
pub fn loop_end_opcode() -> Word {
    opcode::LOOP_END
}
