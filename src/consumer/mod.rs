//! Event Consumer - the reader side of the VM's event ring.
//!
//! `EventConsumer` holds the same [`SharedBuffer`] handle as the [`crate::vm::Vm`]
//! that is writing into it, typically on another thread. It is the sole
//! writer of `EVENT_READ`; every other register is read-only from here.
//! None of its operations block or allocate beyond the `Vec` they return.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::builder_bc::Word;
use crate::shared::layout::{EVENT_TYPE_BEND, EVENT_TYPE_CC, EVENT_TYPE_NOTE};
use crate::shared::{RunState, SharedBuffer};
use crate::vm::VmState;
use crate::VmEvent;

/// A non-blocking reader over a [`SharedBuffer`]'s event ring.
pub struct EventConsumer {
    buf: Arc<SharedBuffer>,
}

fn decode_event(buf: &SharedBuffer, write_index: u32) -> VmEvent {
    let (ty, tick, f1, f2, f3) = buf.read_event_at(write_index);
    match ty {
        EVENT_TYPE_NOTE => VmEvent::Note {
            tick: tick as u32,
            pitch: f1 as u8,
            velocity: f2 as u8,
            duration: f3 as u32,
        },
        EVENT_TYPE_CC => VmEvent::Cc {
            tick: tick as u32,
            controller: f1 as u8,
            value: f2 as u8,
        },
        EVENT_TYPE_BEND => VmEvent::Bend {
            tick: tick as u32,
            value: f1 as u16,
        },
        other => unreachable!("ring entry with unknown event type {}", other),
    }
}

impl EventConsumer {
    /// Attach a reader to the same shared buffer a [`crate::vm::Vm`] is
    /// writing into.
    pub fn new(buf: Arc<SharedBuffer>) -> EventConsumer {
        EventConsumer { buf }
    }

    /// Drain every published, unread event in publication order, advancing
    /// `EVENT_READ` past all of them.
    pub fn poll(&self) -> Vec<VmEvent> {
        let write = self.buf.event_write();
        let read = self.buf.event_read();
        let mut out = Vec::with_capacity((write - read) as usize);
        let mut idx = read;
        while idx != write {
            out.push(decode_event(&self.buf, idx));
            idx = idx.wrapping_add(1);
        }
        self.buf.publish_event_read(write);
        out
    }

    /// Drain published events up to and including the last one whose tick
    /// does not exceed `target_tick`; events past that point are left
    /// unread for a later call.
    pub fn poll_until(&self, target_tick: u32) -> Vec<VmEvent> {
        let write = self.buf.event_write();
        let read = self.buf.event_read();
        let mut out = Vec::new();
        let mut idx = read;
        while idx != write {
            let event = decode_event(&self.buf, idx);
            if event.tick() > target_tick {
                break;
            }
            out.push(event);
            idx = idx.wrapping_add(1);
        }
        self.buf.publish_event_read(idx);
        out
    }

    /// The next unread event, without consuming it.
    pub fn peek(&self) -> Option<VmEvent> {
        let read = self.buf.event_read();
        if read == self.buf.event_write() {
            return None;
        }
        Some(decode_event(&self.buf, read))
    }

    /// Number of published events not yet consumed.
    pub fn available(&self) -> u32 {
        self.buf.event_write() - self.buf.event_read()
    }

    /// `true` if the ring has no free slot, i.e. the VM would pause on its
    /// next event-emitting opcode.
    pub fn is_backpressured(&self) -> bool {
        self.buf.is_backpressured()
    }

    pub fn is_done(&self) -> bool {
        self.buf.state() == RunState::Done
    }

    pub fn is_paused(&self) -> bool {
        self.buf.state() == RunState::Paused
    }

    pub fn state(&self) -> VmState {
        self.buf.state()
    }

    /// The VM's current `TICK` register.
    pub fn tick(&self) -> i64 {
        self.buf.get_reg(crate::shared::layout::reg::TICK) as i64
    }

    /// The VM's `TOTAL_TICKS` register, as computed by the compiler.
    pub fn total_ticks(&self) -> i64 {
        self.buf.get_reg(crate::shared::layout::reg::TOTAL_TICKS) as i64
    }

    pub fn ppq(&self) -> u32 {
        self.buf.ppq()
    }

    pub fn bpm(&self) -> u32 {
        self.buf.bpm()
    }

    /// The tempo log accumulated so far, as `{tick, bpm}` pairs.
    pub fn tempo_log(&self) -> Vec<(Word, Word)> {
        (0..self.buf.tempo_count())
            .filter_map(|i| self.buf.tempo_at(i))
            .collect()
    }
}
