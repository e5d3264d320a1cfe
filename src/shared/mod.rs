//! Shared Memory Layout - one contiguous integer buffer the VM and the
//! event consumer hold on opposite ends of, usually on separate threads.
//!
//! The buffer is plain `i32` words except for the three registers that need
//! atomic, ordered access: `EVENT_WRITE`, `EVENT_READ`, and `STATE`.
//! Modeling the whole buffer as `AtomicI32` keeps one
//! `Vec<AtomicI32>` type for the entire region (no unsafe, no raw pointers)
//! while letting us apply `Relaxed` ordering everywhere the VM is the sole
//! reader/writer and `Acquire`/`Release` only where two threads meet.

pub mod layout;

use std::sync::atomic::{AtomicI32, Ordering};

use crate::builder_bc::Word;
use layout::*;

/// The VM's run state, stored in the `STATE` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Done = 3,
}

impl RunState {
    pub fn from_word(word: Word) -> RunState {
        match word {
            1 => RunState::Running,
            2 => RunState::Paused,
            3 => RunState::Done,
            _ => RunState::Idle,
        }
    }
}

/// Error constructing a [`SharedBuffer`] over an existing word region:
/// magic or version mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("bad magic {found:#x}")]
    BadMagic { found: Word },
    #[error("unsupported version {found:#x}")]
    BadVersion { found: Word },
    #[error("buffer has {words} words, needs at least {needed}")]
    TooSmall { words: usize, needed: usize },
}

/// The contiguous integer buffer shared between the compiler's producer
/// side, the VM, and the event consumer.
pub struct SharedBuffer {
    words: Vec<AtomicI32>,
    ring_capacity: usize,
    tempo_capacity: usize,
    bytecode_len: usize,
}

impl SharedBuffer {
    /// Lay out a fresh buffer for `vm_bytecode`, ready for a VM to attach to
    /// via [`crate::vm::Vm::new`].
    pub fn new(
        vm_bytecode: &[Word],
        ppq: u32,
        bpm: u32,
        total_ticks: i64,
        ring_capacity: usize,
        tempo_capacity: usize,
    ) -> SharedBuffer {
        let total = total_words(vm_bytecode.len(), ring_capacity, tempo_capacity);
        let mut words: Vec<AtomicI32> = (0..total).map(|_| AtomicI32::new(0)).collect();

        words[reg::MAGIC].store(MAGIC, Ordering::Relaxed);
        words[reg::VERSION].store(VERSION, Ordering::Relaxed);
        words[reg::PPQ].store(ppq as Word, Ordering::Relaxed);
        words[reg::BPM].store(bpm as Word, Ordering::Relaxed);
        words[reg::TOTAL_TICKS].store(total_ticks as Word, Ordering::Relaxed);
        words[reg::STATE].store(RunState::Idle as Word, Ordering::Relaxed);
        words[reg::BYTECODE_LEN].store(vm_bytecode.len() as Word, Ordering::Relaxed);
        words[reg::EVENT_RING_START].store(
            (BYTECODE_REGION_START + vm_bytecode.len()) as Word,
            Ordering::Relaxed,
        );
        words[reg::EVENT_RING_CAPACITY].store(ring_capacity as Word, Ordering::Relaxed);
        words[reg::TEMPO_LOG_START].store(
            (BYTECODE_REGION_START + vm_bytecode.len() + ring_capacity * EVENT_ENTRY_WORDS) as Word,
            Ordering::Relaxed,
        );
        words[reg::TEMPO_LOG_CAPACITY].store(tempo_capacity as Word, Ordering::Relaxed);

        for (i, word) in vm_bytecode.iter().enumerate() {
            words[BYTECODE_REGION_START + i].store(*word, Ordering::Relaxed);
        }

        SharedBuffer {
            words,
            ring_capacity,
            tempo_capacity,
            bytecode_len: vm_bytecode.len(),
        }
    }

    /// Validate an existing buffer's header, as the VM does on construction.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.words.len() < reg::COUNT {
            return Err(LayoutError::TooSmall {
                words: self.words.len(),
                needed: reg::COUNT,
            });
        }
        let magic = self.get_reg(reg::MAGIC);
        if magic != MAGIC {
            return Err(LayoutError::BadMagic { found: magic });
        }
        let version = self.get_reg(reg::VERSION);
        if version != VERSION {
            return Err(LayoutError::BadVersion { found: version });
        }
        Ok(())
    }

    // --- Plain registers (single-writer, Relaxed is sufficient) ---

    pub fn get_reg(&self, slot: usize) -> Word {
        self.words[slot].load(Ordering::Relaxed)
    }

    pub fn set_reg(&self, slot: usize, value: Word) {
        self.words[slot].store(value, Ordering::Relaxed);
    }

    // --- Cross-thread registers ---

    pub fn state(&self) -> RunState {
        RunState::from_word(self.words[reg::STATE].load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: RunState) {
        self.words[reg::STATE].store(state as Word, Ordering::Release);
    }

    pub fn event_write(&self) -> u32 {
        self.words[reg::EVENT_WRITE].load(Ordering::Acquire) as u32
    }

    fn publish_event_write(&self, value: u32) {
        self.words[reg::EVENT_WRITE].store(value as Word, Ordering::Release);
    }

    pub fn event_read(&self) -> u32 {
        self.words[reg::EVENT_READ].load(Ordering::Acquire) as u32
    }

    pub fn publish_event_read(&self, value: u32) {
        self.words[reg::EVENT_READ].store(value as Word, Ordering::Release);
    }

    /// Reset both event counters to zero, as `Vm::reset` does.
    pub fn reset_event_counters(&self) {
        self.publish_event_write(0);
        self.publish_event_read(0);
    }

    // --- Derived layout accessors ---

    pub fn ppq(&self) -> u32 {
        self.get_reg(reg::PPQ) as u32
    }

    pub fn bpm(&self) -> u32 {
        self.get_reg(reg::BPM) as u32
    }

    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity
    }

    pub fn tempo_capacity(&self) -> usize {
        self.tempo_capacity
    }

    pub fn bytecode_len(&self) -> usize {
        self.bytecode_len
    }

    pub fn bytecode_word(&self, pc: usize) -> Option<Word> {
        if pc >= self.bytecode_len {
            return None;
        }
        Some(self.get_reg(BYTECODE_REGION_START + pc))
    }

    pub fn bytecode_words(&self) -> Vec<Word> {
        (0..self.bytecode_len).map(|i| self.get_reg(BYTECODE_REGION_START + i)).collect()
    }

    // --- Stack frames ---

    pub fn stack_frame_set(&self, frame: usize, start_tick: Word, max_branch_duration: Word, branch_count: Word, branch_index: Word) {
        let base = STACK_FRAME_REGION_START + frame * STACK_FRAME_WORDS;
        self.set_reg(base + stack_frame::START_TICK, start_tick);
        self.set_reg(base + stack_frame::MAX_BRANCH_DURATION, max_branch_duration);
        self.set_reg(base + stack_frame::BRANCH_COUNT, branch_count);
        self.set_reg(base + stack_frame::BRANCH_INDEX, branch_index);
    }

    pub fn stack_frame_get(&self, frame: usize) -> (Word, Word, Word, Word) {
        let base = STACK_FRAME_REGION_START + frame * STACK_FRAME_WORDS;
        (
            self.get_reg(base + stack_frame::START_TICK),
            self.get_reg(base + stack_frame::MAX_BRANCH_DURATION),
            self.get_reg(base + stack_frame::BRANCH_COUNT),
            self.get_reg(base + stack_frame::BRANCH_INDEX),
        )
    }

    // --- Loop frames ---

    pub fn loop_frame_set(&self, frame: usize, body_start_pc: Word, remaining_count: Word) {
        let base = LOOP_FRAME_REGION_START + frame * LOOP_FRAME_WORDS;
        self.set_reg(base + loop_frame::BODY_START_PC, body_start_pc);
        self.set_reg(base + loop_frame::REMAINING_COUNT, remaining_count);
    }

    pub fn loop_frame_get(&self, frame: usize) -> (Word, Word) {
        let base = LOOP_FRAME_REGION_START + frame * LOOP_FRAME_WORDS;
        (
            self.get_reg(base + loop_frame::BODY_START_PC),
            self.get_reg(base + loop_frame::REMAINING_COUNT),
        )
    }

    // --- Transposition stack ---

    pub fn transpose_set(&self, index: usize, value: Word) {
        self.set_reg(TRANSPOSE_REGION_START + index, value);
    }

    pub fn transpose_get(&self, index: usize) -> Word {
        self.get_reg(TRANSPOSE_REGION_START + index)
    }

    // --- Event ring ---

    /// `true` if the ring has no free slot for a new event.
    pub fn is_backpressured(&self) -> bool {
        self.event_write() - self.event_read() >= self.ring_capacity as u32
    }

    /// Publish one event. Caller (the VM) must have already checked
    /// [`Self::is_backpressured`]. Writes fields then releases the new
    /// `EVENT_WRITE` count: readers never observe a partially-written slot.
    pub fn push_event(&self, event_type: Word, tick: Word, field1: Word, field2: Word, field3: Word) {
        let write = self.event_write();
        let slot = (write as usize) % self.ring_capacity;
        let ring_start = self.get_reg(reg::EVENT_RING_START) as usize;
        let base = ring_start + slot * EVENT_ENTRY_WORDS;
        self.set_reg(base + event_entry::TYPE, event_type);
        self.set_reg(base + event_entry::TICK, tick);
        self.set_reg(base + event_entry::FIELD1, field1);
        self.set_reg(base + event_entry::FIELD2, field2);
        self.set_reg(base + event_entry::FIELD3, field3);
        self.publish_event_write(write + 1);
    }

    /// Read the event at ring-relative `write_index` (an absolute
    /// `EVENT_WRITE`-space counter), without checking whether it has been
    /// published; callers gate with [`Self::event_write`] first.
    pub fn read_event_at(&self, write_index: u32) -> (Word, Word, Word, Word, Word) {
        let slot = (write_index as usize) % self.ring_capacity;
        let ring_start = self.get_reg(reg::EVENT_RING_START) as usize;
        let base = ring_start + slot * EVENT_ENTRY_WORDS;
        (
            self.get_reg(base + event_entry::TYPE),
            self.get_reg(base + event_entry::TICK),
            self.get_reg(base + event_entry::FIELD1),
            self.get_reg(base + event_entry::FIELD2),
            self.get_reg(base + event_entry::FIELD3),
        )
    }

    // --- Tempo log ---

    pub fn tempo_count(&self) -> usize {
        self.get_reg(reg::TEMPO_COUNT) as usize
    }

    /// Append `{tick, bpm}` to the tempo log. Returns `false` (and leaves
    /// the log untouched) if the log is full; the caller surfaces that as a
    /// silent, counted drop rather than a fatal error.
    pub fn push_tempo(&self, tick: Word, bpm: Word) -> bool {
        let count = self.tempo_count();
        if count >= self.tempo_capacity {
            return false;
        }
        let tempo_start = self.get_reg(reg::TEMPO_LOG_START) as usize;
        let base = tempo_start + count * TEMPO_ENTRY_WORDS;
        self.set_reg(base, tick);
        self.set_reg(base + 1, bpm);
        self.set_reg(reg::TEMPO_COUNT, (count + 1) as Word);
        true
    }

    pub fn tempo_at(&self, index: usize) -> Option<(Word, Word)> {
        if index >= self.tempo_count() {
            return None;
        }
        let tempo_start = self.get_reg(reg::TEMPO_LOG_START) as usize;
        let base = tempo_start + index * TEMPO_ENTRY_WORDS;
        Some((self.get_reg(base), self.get_reg(base + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm_bc::{encode_program, Instruction};

    fn sample_buffer() -> SharedBuffer {
        let words = encode_program(&[Instruction::Note {
            pitch: 60,
            velocity: 100,
            duration: 96,
        }]);
        SharedBuffer::new(&words, 96, 120, 288, 4, 8)
    }

    #[test]
    fn validates_fresh_buffer() {
        let buf = sample_buffer();
        assert!(buf.validate().is_ok());
    }

    #[test]
    fn exposes_ppq_and_bpm() {
        let buf = sample_buffer();
        assert_eq!(buf.ppq(), 96);
        assert_eq!(buf.bpm(), 120);
    }

    #[test]
    fn event_ring_round_trips() {
        let buf = sample_buffer();
        assert!(!buf.is_backpressured());
        buf.push_event(layout::EVENT_TYPE_NOTE, 0, 60, 100, 96);
        assert_eq!(buf.event_write(), 1);
        let (ty, tick, p, v, d) = buf.read_event_at(0);
        assert_eq!((ty, tick, p, v, d), (layout::EVENT_TYPE_NOTE, 0, 60, 100, 96));
    }

    #[test]
    fn backpressure_triggers_at_capacity() {
        let buf = sample_buffer();
        for i in 0..4 {
            assert!(!buf.is_backpressured());
            buf.push_event(layout::EVENT_TYPE_NOTE, i, 60, 100, 1);
        }
        assert!(buf.is_backpressured());
        buf.publish_event_read(1);
        assert!(!buf.is_backpressured());
    }

    #[test]
    fn tempo_log_drops_silently_once_full() {
        let words = encode_program(&[Instruction::Eof]);
        let buf = SharedBuffer::new(&words, 96, 120, 0, 4, 2);
        assert!(buf.push_tempo(0, 120));
        assert!(buf.push_tempo(96, 140));
        assert!(!buf.push_tempo(192, 160));
        assert_eq!(buf.tempo_count(), 2);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let buf = sample_buffer();
        buf.words[layout::reg::MAGIC].store(0, Ordering::Relaxed);
        assert!(matches!(buf.validate(), Err(LayoutError::BadMagic { .. })));
    }
}
