//! Bytecode VM - a single-threaded, cooperative stack machine that
//! interprets VM bytecode and streams timed events through the shared
//! buffer's ring.
//!
//! The VM is the sole writer of every register, the bytecode region, all
//! three auxiliary stacks, and `EVENT_WRITE`. It never allocates once
//! constructed: dispatch reads words straight out of the shared buffer.

mod dispatch;
mod error;
mod registers;
mod stacks;


pub use error::VmError;

use std::sync::Arc;

use crate::builder_bc::Word;
use crate::shared::{RunState, SharedBuffer};

/// The VM's externally visible run state, mirroring [`RunState`] but kept as
/// its own type so callers don't need to reach into `shared`.
pub type VmState = RunState;

/// A stack-machine interpreter attached to a [`SharedBuffer`].
///
/// `Vm` holds only a handle to the shared buffer; all mutable state the
/// dispatch loop touches lives in the buffer itself, which is what lets a
/// separate [`crate::consumer::EventConsumer`] read the same memory from
/// another thread.
pub struct Vm {
    buf: Arc<SharedBuffer>,
}

impl Vm {
    /// Attach to a shared buffer, validating its magic and version. Resets
    /// every execution register and both event counters to zero; state
    /// becomes `IDLE`.
    pub fn new(buf: Arc<SharedBuffer>) -> Result<Vm, VmError> {
        buf.validate()?;
        let vm = Vm { buf };
        vm.reset();
        Ok(vm)
    }

    /// Reset every execution register and both event counters to zero,
    /// returning to `IDLE`. Bytecode, PPQ, and BPM are untouched.
    pub fn reset(&self) {
        registers::reset_all(&self.buf);
    }

    /// Run the dispatch loop until `TICK` would exceed `target_tick`, the
    /// program reaches `EOF`, or the event ring backpressures.
    ///
    /// Returns the state the VM paused or finished in. A `DONE` VM call is
    /// a no-op that returns `DONE` immediately.
    pub fn tick(&self, target_tick: i64) -> Result<VmState, VmError> {
        dispatch::run_tick(&self.buf, target_tick)?;
        Ok(self.buf.state())
    }

    /// Run to completion, ignoring any tick limit. Equivalent to repeatedly
    /// calling `tick(i64::MAX)` until the state stops changing, but the
    /// caller is still responsible for draining the consumer between calls
    /// if backpressure can occur.
    pub fn run_to_end(&self) -> Result<VmState, VmError> {
        loop {
            let state = self.tick(i64::MAX)?;
            match state {
                VmState::Done | VmState::Paused => return Ok(state),
                VmState::Idle | VmState::Running => continue,
            }
        }
    }

    // --- Inspectors ---

    pub fn state(&self) -> VmState {
        self.buf.state()
    }

    pub fn pc(&self) -> usize {
        registers::pc(&self.buf)
    }

    pub fn tick_now(&self) -> i64 {
        registers::tick(&self.buf)
    }

    pub fn transposition(&self) -> i32 {
        registers::transposition(&self.buf)
    }

    pub fn event_count(&self) -> u32 {
        self.buf.event_write()
    }

    pub fn tempo_count(&self) -> usize {
        self.buf.tempo_count()
    }

    pub fn tempo_log(&self) -> Vec<(Word, Word)> {
        (0..self.buf.tempo_count())
            .filter_map(|i| self.buf.tempo_at(i))
            .collect()
    }

    pub fn ppq(&self) -> u32 {
        self.buf.ppq()
    }

    pub fn bpm(&self) -> u32 {
        self.buf.bpm()
    }

    /// The shared buffer this VM is attached to, for constructing a
    /// [`crate::consumer::EventConsumer`] on the reader side.
    pub fn shared_buffer(&self) -> &Arc<SharedBuffer> {
        &self.buf
    }
}
