//! VM Bytecode - the structured, relative-timed output IR.
//!
//! Unlike builder bytecode, VM bytecode carries no explicit tick: time is
//! advanced implicitly by `NOTE`, `REST`, and the structural machinery as the
//! VM executes. Each opcode consumes its arguments inline.

use thiserror::Error;

pub use crate::builder_bc::Word;

/// VM bytecode opcode values.
pub mod opcode {
    use super::Word;

    pub const NOTE: Word = 1;
    pub const REST: Word = 2;
    pub const TEMPO: Word = 3;
    pub const CC: Word = 4;
    pub const BEND: Word = 5;
    pub const TRANSPOSE: Word = 6;
    pub const STACK_START: Word = 7;
    pub const BRANCH_START: Word = 8;
    pub const BRANCH_END: Word = 9;
    pub const STACK_END: Word = 10;
    pub const LOOP_START: Word = 11;
    pub const LOOP_END: Word = 12;
    pub const CHORD2: Word = 13;
    pub const CHORD3: Word = 14;
    pub const CHORD4: Word = 15;
    pub const EOF: Word = 0xFF;
}

/// A single VM bytecode instruction, as constructed by a compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Note { pitch: u8, velocity: u8, duration: u32 },
    Rest { duration: u32 },
    Tempo { bpm: u32 },
    Cc { controller: u8, value: u8 },
    Bend { value: u16 },
    /// Nonzero = push a transposition, zero = pop back to the previous one.
    Transpose { semitones: i32 },
    StackStart { count: u8 },
    BranchStart,
    BranchEnd,
    StackEnd,
    LoopStart { count: i32 },
    LoopEnd,
    /// A chord of 2-4 simultaneous notes sharing a root, velocity, and
    /// duration. `intervals` holds `k - 1` semitone offsets from `root`.
    Chord {
        root: u8,
        intervals: Vec<i8>,
        velocity: u8,
        duration: u32,
    },
    Eof,
}

impl Instruction {
    /// Number of argument words this instruction occupies after its opcode
    /// word. Needed by the VM to skip a `LOOP_START(0)` body without
    /// executing it, and by the compiler to size its output buffer.
    pub fn arg_len(&self) -> usize {
        match self {
            Instruction::Note { .. } => 3,
            Instruction::Rest { .. } => 1,
            Instruction::Tempo { .. } => 1,
            Instruction::Cc { .. } => 2,
            Instruction::Bend { .. } => 1,
            Instruction::Transpose { .. } => 1,
            Instruction::StackStart { .. } => 1,
            Instruction::BranchStart => 0,
            Instruction::BranchEnd => 0,
            Instruction::StackEnd => 0,
            Instruction::LoopStart { .. } => 1,
            Instruction::LoopEnd => 0,
            Instruction::Chord { intervals, .. } => 2 + intervals.len(),
            Instruction::Eof => 0,
        }
    }

    /// Total word length, including the opcode word.
    pub fn word_len(&self) -> usize {
        1 + self.arg_len()
    }
}

/// What went wrong decoding an instruction at a given `pc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// `pc` is past the end of the bytecode region.
    PastEnd,
    /// The opcode word is not one this decoder recognizes. The VM treats
    /// this as a forward-compatible no-op rather than a fatal error; only
    /// the reference/zero-alloc compilers and raw decode utilities see this
    /// as an `Err`.
    UnknownOpcode { opcode: Word },
    /// A recognized opcode was missing one or more of its argument words.
    TruncatedArgument,
}

/// Error decoding a VM bytecode opcode/argument length for skip-scanning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("vm bytecode decode error at pc {pc}: {message}")]
pub struct DecodeError {
    pub pc: usize,
    pub kind: DecodeErrorKind,
    pub message: String,
}

/// Append `instr` to `out` as raw words.
pub fn encode_instruction(out: &mut Vec<Word>, instr: &Instruction) {
    match instr {
        Instruction::Note {
            pitch,
            velocity,
            duration,
        } => out.extend([opcode::NOTE, *pitch as Word, *velocity as Word, *duration as Word]),
        Instruction::Rest { duration } => out.extend([opcode::REST, *duration as Word]),
        Instruction::Tempo { bpm } => out.extend([opcode::TEMPO, *bpm as Word]),
        Instruction::Cc { controller, value } => {
            out.extend([opcode::CC, *controller as Word, *value as Word])
        }
        Instruction::Bend { value } => out.extend([opcode::BEND, *value as Word]),
        Instruction::Transpose { semitones } => out.extend([opcode::TRANSPOSE, *semitones]),
        Instruction::StackStart { count } => out.extend([opcode::STACK_START, *count as Word]),
        Instruction::BranchStart => out.push(opcode::BRANCH_START),
        Instruction::BranchEnd => out.push(opcode::BRANCH_END),
        Instruction::StackEnd => out.push(opcode::STACK_END),
        Instruction::LoopStart { count } => out.extend([opcode::LOOP_START, *count]),
        Instruction::LoopEnd => out.push(opcode::LOOP_END),
        Instruction::Chord {
            root,
            intervals,
            velocity,
            duration,
        } => {
            let chord_op = match intervals.len() {
                1 => opcode::CHORD2,
                2 => opcode::CHORD3,
                3 => opcode::CHORD4,
                n => unreachable!("chord with {} intervals is not representable", n),
            };
            out.push(chord_op);
            out.push(*root as Word);
            out.extend(intervals.iter().map(|i| *i as Word));
            out.push(*velocity as Word);
            out.push(*duration as Word);
        }
        Instruction::Eof => out.push(opcode::EOF),
    }
}

/// Encode a whole instruction stream, terminated with `EOF` if the caller
/// did not already append one.
pub fn encode_program(instructions: &[Instruction]) -> Vec<Word> {
    let mut out = Vec::new();
    for instr in instructions {
        encode_instruction(&mut out, instr);
    }
    if !matches!(instructions.last(), Some(Instruction::Eof)) {
        out.push(opcode::EOF);
    }
    out
}

/// Decode the instruction at `pc`, returning it and the `pc` of the next
/// instruction. Used by both the VM's dispatch loop and its `LOOP_START`
/// skip-forward logic.
pub fn decode_at(words: &[Word], pc: usize) -> Result<(Instruction, usize), DecodeError> {
    if pc >= words.len() {
        return Err(DecodeError {
            pc,
            kind: DecodeErrorKind::PastEnd,
            message: "pc past end of bytecode".to_string(),
        });
    }
    let op = words[pc];
    let args_at = pc + 1;

    macro_rules! arg {
        ($i:expr) => {{
            let idx = args_at + $i;
            *words.get(idx).ok_or_else(|| DecodeError {
                pc,
                kind: DecodeErrorKind::TruncatedArgument,
                message: format!("truncated argument {} for opcode {:#x}", $i, op),
            })?
        }};
    }

    let (instr, len) = match op {
        opcode::NOTE => (
            Instruction::Note {
                pitch: arg!(0) as u8,
                velocity: arg!(1) as u8,
                duration: arg!(2) as u32,
            },
            3,
        ),
        opcode::REST => (
            Instruction::Rest {
                duration: arg!(0) as u32,
            },
            1,
        ),
        opcode::TEMPO => (
            Instruction::Tempo { bpm: arg!(0) as u32 },
            1,
        ),
        opcode::CC => (
            Instruction::Cc {
                controller: arg!(0) as u8,
                value: arg!(1) as u8,
            },
            2,
        ),
        opcode::BEND => (
            Instruction::Bend {
                value: arg!(0) as u16,
            },
            1,
        ),
        opcode::TRANSPOSE => (
            Instruction::Transpose { semitones: arg!(0) },
            1,
        ),
        opcode::STACK_START => (
            Instruction::StackStart { count: arg!(0) as u8 },
            1,
        ),
        opcode::BRANCH_START => (Instruction::BranchStart, 0),
        opcode::BRANCH_END => (Instruction::BranchEnd, 0),
        opcode::STACK_END => (Instruction::StackEnd, 0),
        opcode::LOOP_START => (Instruction::LoopStart { count: arg!(0) }, 1),
        opcode::LOOP_END => (Instruction::LoopEnd, 0),
        opcode::CHORD2 | opcode::CHORD3 | opcode::CHORD4 => {
            let n_intervals = match op {
                opcode::CHORD2 => 1,
                opcode::CHORD3 => 2,
                _ => 3,
            };
            let root = arg!(0) as u8;
            let mut intervals = Vec::with_capacity(n_intervals);
            for i in 0..n_intervals {
                intervals.push(arg!(1 + i) as i8);
            }
            let velocity = arg!(1 + n_intervals) as u8;
            let duration = arg!(2 + n_intervals) as u32;
            (
                Instruction::Chord {
                    root,
                    intervals,
                    velocity,
                    duration,
                },
                2 + n_intervals,
            )
        }
        opcode::EOF => (Instruction::Eof, 0),
        other => {
            return Err(DecodeError {
                pc,
                kind: DecodeErrorKind::UnknownOpcode { opcode: other },
                message: format!("unrecognized opcode {:#x}", other),
            })
        }
    };

    Ok((instr, pc + 1 + len))
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    #[test]
    fn test_round_trip_simple() {
        let instrs = vec![
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 96,
            },
            Instruction::Rest { duration: 48 },
            Instruction::Eof,
        ];
        let words = encode_program(&instrs);
        let mut pc = 0;
        let mut decoded = Vec::new();
        loop {
            let (instr, next_pc) = decode_at(&words, pc).unwrap();
            let is_eof = matches!(instr, Instruction::Eof);
            decoded.push(instr);
            if is_eof {
                break;
            }
            pc = next_pc;
        }
        assert_eq!(decoded, instrs);
    }

    #[test]
    fn test_chord_round_trip() {
        let instr = Instruction::Chord {
            root: 60,
            intervals: vec![4, 7],
            velocity: 100,
            duration: 96,
        };
        let mut words = Vec::new();
        encode_instruction(&mut words, &instr);
        let (decoded, next_pc) = decode_at(&words, 0).unwrap();
        assert_eq!(decoded, instr);
        assert_eq!(next_pc, words.len());
    }

    #[test]
    fn test_unknown_opcode_is_fatal_to_decode() {
        let words = vec![0x99];
        assert!(decode_at(&words, 0).is_err());
    }

    #[test]
    fn test_truncated_argument_errors() {
        let words = vec![opcode::NOTE, 60];
        assert!(decode_at(&words, 0).is_err());
    }
}
