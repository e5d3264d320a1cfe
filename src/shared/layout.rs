//! Fixed word offsets for the shared memory layout. These are part of the
//! ABI and must never be reordered or resized without bumping [`VERSION`].

use crate::builder_bc::Word;

pub const MAGIC: Word = 0x5342_4331; // ASCII "SBC1"
pub const VERSION: Word = 0x02;

pub const MAX_STACK_FRAMES: usize = 14;
pub const STACK_FRAME_WORDS: usize = 8;
pub const MAX_LOOP_FRAMES: usize = 20;
pub const LOOP_FRAME_WORDS: usize = 4;
pub const MAX_TRANSPOSE: usize = 32;

/// Register slots, all within word 0..32.
pub mod reg {
    pub const MAGIC: usize = 0;
    pub const VERSION: usize = 1;
    pub const PPQ: usize = 2;
    pub const BPM: usize = 3;
    pub const TOTAL_TICKS: usize = 4;
    pub const PC: usize = 5;
    pub const TICK: usize = 6;
    pub const STATE: usize = 7;
    pub const STACK_SP: usize = 8;
    pub const LOOP_SP: usize = 9;
    pub const TRANS_SP: usize = 10;
    pub const TRANSPOSITION: usize = 11;
    pub const EVENT_WRITE: usize = 12;
    pub const EVENT_READ: usize = 13;
    pub const TEMPO_COUNT: usize = 14;
    pub const BYTECODE_LEN: usize = 15;
    pub const EVENT_RING_START: usize = 16;
    pub const EVENT_RING_CAPACITY: usize = 17;
    pub const TEMPO_LOG_START: usize = 18;
    pub const TEMPO_LOG_CAPACITY: usize = 19;
    pub const COUNT: usize = 21;
}

pub const STACK_FRAME_REGION_START: usize = 32;
pub const LOOP_FRAME_REGION_START: usize = 144;
pub const TRANSPOSE_REGION_START: usize = 224;
pub const BYTECODE_REGION_START: usize = 256;

pub const EVENT_ENTRY_WORDS: usize = 6;
pub const TEMPO_ENTRY_WORDS: usize = 2;

/// Offsets within one stack-frame's 8 words.
pub mod stack_frame {
    pub const START_TICK: usize = 0;
    pub const MAX_BRANCH_DURATION: usize = 1;
    pub const BRANCH_COUNT: usize = 2;
    pub const BRANCH_INDEX: usize = 3;
}

/// Offsets within one loop-frame's 4 words.
pub mod loop_frame {
    pub const BODY_START_PC: usize = 0;
    pub const REMAINING_COUNT: usize = 1;
}

/// Offsets within one event ring entry's 6 words.
pub mod event_entry {
    pub const TYPE: usize = 0;
    pub const TICK: usize = 1;
    pub const FIELD1: usize = 2;
    pub const FIELD2: usize = 3;
    pub const FIELD3: usize = 4;
}

pub const EVENT_TYPE_NOTE: Word = 1;
pub const EVENT_TYPE_CC: Word = 2;
pub const EVENT_TYPE_BEND: Word = 3;

/// Total word size of a shared buffer sized for `bytecode_len` words of VM
/// bytecode, `ring_capacity` event slots, and `tempo_capacity` tempo-log
/// entries.
pub fn total_words(bytecode_len: usize, ring_capacity: usize, tempo_capacity: usize) -> usize {
    BYTECODE_REGION_START + bytecode_len + ring_capacity * EVENT_ENTRY_WORDS + tempo_capacity * TEMPO_ENTRY_WORDS
}
