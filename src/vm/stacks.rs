//! Bounded push/pop over the three auxiliary stacks living in the shared
//! buffer. Exceeding a cap is always a fatal [`VmError::Overflow`].

use crate::shared::layout::{MAX_LOOP_FRAMES, MAX_STACK_FRAMES, MAX_TRANSPOSE};
use crate::shared::SharedBuffer;

use super::error::VmError;
use super::registers;

/// Push a new `STACK_START` frame. Returns the frame's index.
pub fn push_stack_frame(
    buf: &SharedBuffer,
    start_tick: i32,
    branch_count: u8,
) -> Result<usize, VmError> {
    let sp = registers::stack_sp(buf);
    if sp >= MAX_STACK_FRAMES {
        return Err(VmError::Overflow {
            resource: "stack frames",
            cap: MAX_STACK_FRAMES,
        });
    }
    buf.stack_frame_set(sp, start_tick, 0, branch_count as i32, 0);
    registers::set_stack_sp(buf, sp + 1);
    Ok(sp)
}

/// Pop the innermost stack frame, returning its final `(start_tick, max_branch_duration)`.
pub fn pop_stack_frame(buf: &SharedBuffer) -> Option<(i32, i32)> {
    let sp = registers::stack_sp(buf);
    if sp == 0 {
        return None;
    }
    let (start, max_dur, _, _) = buf.stack_frame_get(sp - 1);
    registers::set_stack_sp(buf, sp - 1);
    Some((start, max_dur))
}

/// Access the innermost open stack frame without popping it.
pub fn top_stack_frame(buf: &SharedBuffer) -> Option<(i32, i32, i32, i32)> {
    let sp = registers::stack_sp(buf);
    if sp == 0 {
        return None;
    }
    Some(buf.stack_frame_get(sp - 1))
}

pub fn update_top_stack_frame(buf: &SharedBuffer, max_branch_duration: i32, branch_index: i32) {
    let sp = registers::stack_sp(buf);
    if sp == 0 {
        return;
    }
    let (start, _, count, _) = buf.stack_frame_get(sp - 1);
    buf.stack_frame_set(sp - 1, start, max_branch_duration, count, branch_index);
}

pub fn push_loop_frame(buf: &SharedBuffer, body_start_pc: usize, remaining: i32) -> Result<(), VmError> {
    let sp = registers::loop_sp(buf);
    if sp >= MAX_LOOP_FRAMES {
        return Err(VmError::Overflow {
            resource: "loop frames",
            cap: MAX_LOOP_FRAMES,
        });
    }
    buf.loop_frame_set(sp, body_start_pc as i32, remaining);
    registers::set_loop_sp(buf, sp + 1);
    Ok(())
}

pub fn top_loop_frame(buf: &SharedBuffer) -> Option<(usize, i32)> {
    let sp = registers::loop_sp(buf);
    if sp == 0 {
        return None;
    }
    let (pc, remaining) = buf.loop_frame_get(sp - 1);
    Some((pc as usize, remaining))
}

pub fn update_top_loop_frame(buf: &SharedBuffer, remaining: i32) {
    let sp = registers::loop_sp(buf);
    if sp == 0 {
        return;
    }
    let (pc, _) = buf.loop_frame_get(sp - 1);
    buf.loop_frame_set(sp - 1, pc, remaining);
}

pub fn pop_loop_frame(buf: &SharedBuffer) {
    let sp = registers::loop_sp(buf);
    if sp > 0 {
        registers::set_loop_sp(buf, sp - 1);
    }
}

/// Push a nonzero `TRANSPOSE(s)`: the stack records cumulative values, so a
/// later pop can restore exactly what was in force before this push.
pub fn push_transpose(buf: &SharedBuffer, semitones: i32) -> Result<(), VmError> {
    let sp = registers::trans_sp(buf);
    if sp >= MAX_TRANSPOSE {
        return Err(VmError::Overflow {
            resource: "transposition stack",
            cap: MAX_TRANSPOSE,
        });
    }
    let new_value = registers::transposition(buf) + semitones;
    buf.transpose_set(sp, new_value);
    registers::set_trans_sp(buf, sp + 1);
    registers::set_transposition(buf, new_value);
    Ok(())
}

/// Pop a `TRANSPOSE(0)`: restores the cumulative value below the popped
/// entry, or 0 if the stack is now empty.
pub fn pop_transpose(buf: &SharedBuffer) {
    let sp = registers::trans_sp(buf);
    if sp == 0 {
        registers::set_transposition(buf, 0);
        return;
    }
    registers::set_trans_sp(buf, sp - 1);
    let restored = if sp - 1 == 0 { 0 } else { buf.transpose_get(sp - 2) };
    registers::set_transposition(buf, restored);
}
