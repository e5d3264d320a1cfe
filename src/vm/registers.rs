//! Typed accessors over the VM's slice of the shared buffer's registers.
//! Thin wrappers; the bounds and meanings are fixed by [`crate::shared::layout`].

use crate::builder_bc::Word;
use crate::shared::{layout::reg, RunState, SharedBuffer};

pub fn pc(buf: &SharedBuffer) -> usize {
    buf.get_reg(reg::PC) as usize
}

pub fn set_pc(buf: &SharedBuffer, value: usize) {
    buf.set_reg(reg::PC, value as Word);
}

pub fn tick(buf: &SharedBuffer) -> i64 {
    buf.get_reg(reg::TICK) as i64
}

pub fn set_tick(buf: &SharedBuffer, value: i64) {
    buf.set_reg(reg::TICK, value as Word);
}

pub fn stack_sp(buf: &SharedBuffer) -> usize {
    buf.get_reg(reg::STACK_SP) as usize
}

pub fn set_stack_sp(buf: &SharedBuffer, value: usize) {
    buf.set_reg(reg::STACK_SP, value as Word);
}

pub fn loop_sp(buf: &SharedBuffer) -> usize {
    buf.get_reg(reg::LOOP_SP) as usize
}

pub fn set_loop_sp(buf: &SharedBuffer, value: usize) {
    buf.set_reg(reg::LOOP_SP, value as Word);
}

pub fn trans_sp(buf: &SharedBuffer) -> usize {
    buf.get_reg(reg::TRANS_SP) as usize
}

pub fn set_trans_sp(buf: &SharedBuffer, value: usize) {
    buf.set_reg(reg::TRANS_SP, value as Word);
}

pub fn transposition(buf: &SharedBuffer) -> i32 {
    buf.get_reg(reg::TRANSPOSITION)
}

pub fn set_transposition(buf: &SharedBuffer, value: i32) {
    buf.set_reg(reg::TRANSPOSITION, value);
}

pub fn reset_all(buf: &SharedBuffer) {
    set_pc(buf, 0);
    set_tick(buf, 0);
    set_stack_sp(buf, 0);
    set_loop_sp(buf, 0);
    set_trans_sp(buf, 0);
    set_transposition(buf, 0);
    buf.set_reg(reg::TEMPO_COUNT, 0);
    buf.reset_event_counters();
    buf.set_state(RunState::Idle);
}
