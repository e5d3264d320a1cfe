use super::*;
use crate::builder_bc::{encode_program, Record};
use crate::vm_bc::{decode_at, opcode, Instruction};

fn decode_all(words: &[Word]) -> Vec<Instruction> {
    let mut pc = 0;
    let mut out = Vec::new();
    loop {
        let (instr, next_pc) = decode_at(words, pc).expect("well-formed vm bytecode");
        let is_eof = matches!(instr, Instruction::Eof);
        out.push(instr);
        if is_eof {
            break;
        }
        pc = next_pc;
    }
    out
}

fn opts() -> CompileOptions {
    CompileOptions {
        ppq: 96,
        seed: 12345,
        groove_templates: Vec::new(),
        unroll: false,
    }
}

#[test]
fn s1_three_sequential_notes() {
    let builder = encode_program(&[
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::Note {
            tick: 96,
            pitch: 62,
            velocity: 100,
            duration: 96,
        },
        Record::Note {
            tick: 192,
            pitch: 64,
            velocity: 100,
            duration: 96,
        },
    ]);
    let out = compile(&builder, &opts()).unwrap();
    let instrs = decode_all(&out.vm_bytecode);
    assert_eq!(
        instrs,
        vec![
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 96
            },
            Instruction::Note {
                pitch: 62,
                velocity: 100,
                duration: 96
            },
            Instruction::Note {
                pitch: 64,
                velocity: 100,
                duration: 96
            },
            Instruction::Eof,
        ]
    );
    assert_eq!(out.total_ticks, 288);
}

#[test]
fn s2_rest_between_notes() {
    let builder = encode_program(&[
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::Rest { tick: 96, duration: 96 },
        Record::Note {
            tick: 192,
            pitch: 62,
            velocity: 100,
            duration: 96,
        },
    ]);
    let out = compile(&builder, &opts()).unwrap();
    let instrs = decode_all(&out.vm_bytecode);
    assert_eq!(instrs[0], Instruction::Note { pitch: 60, velocity: 100, duration: 96 });
    assert!(instrs.iter().any(|i| matches!(i, Instruction::Rest { duration: 96 })));
    assert_eq!(out.total_ticks, 288);
}

#[test]
fn s3_loop_of_three_is_bracketed_once() {
    let builder = encode_program(&[
        Record::LoopStart { tick: 0, count: 3 },
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::LoopEnd,
    ]);
    let out = compile(&builder, &opts()).unwrap();
    let instrs = decode_all(&out.vm_bytecode);
    assert_eq!(
        instrs,
        vec![
            Instruction::LoopStart { count: 3 },
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 96
            },
            Instruction::LoopEnd,
            Instruction::Eof,
        ]
    );
}

#[test]
fn s4_stack_of_two_branches() {
    let builder = encode_program(&[
        Record::StackStart {
            tick: 0,
            branch_count: 2,
        },
        Record::BranchStart,
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::BranchEnd,
        Record::BranchStart,
        Record::Note {
            tick: 0,
            pitch: 64,
            velocity: 100,
            duration: 96,
        },
        Record::BranchEnd,
        Record::StackEnd,
    ]);
    let out = compile(&builder, &opts()).unwrap();
    let instrs = decode_all(&out.vm_bytecode);
    assert_eq!(
        instrs,
        vec![
            Instruction::StackStart { count: 2 },
            Instruction::BranchStart,
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 96
            },
            Instruction::BranchEnd,
            Instruction::BranchStart,
            Instruction::Note {
                pitch: 64,
                velocity: 100,
                duration: 96
            },
            Instruction::BranchEnd,
            Instruction::StackEnd,
            Instruction::Eof,
        ]
    );
}

#[test]
fn s5_three_note_chord_as_stack() {
    let builder = encode_program(&[
        Record::StackStart {
            tick: 0,
            branch_count: 3,
        },
        Record::BranchStart,
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::BranchEnd,
        Record::BranchStart,
        Record::Note {
            tick: 0,
            pitch: 64,
            velocity: 100,
            duration: 96,
        },
        Record::BranchEnd,
        Record::BranchStart,
        Record::Note {
            tick: 0,
            pitch: 67,
            velocity: 100,
            duration: 96,
        },
        Record::BranchEnd,
        Record::StackEnd,
    ]);
    let out = compile(&builder, &opts()).unwrap();
    let instrs = decode_all(&out.vm_bytecode);
    let pitches: Vec<u8> = instrs
        .iter()
        .filter_map(|i| match i {
            Instruction::Note { pitch, .. } => Some(*pitch),
            _ => None,
        })
        .collect();
    assert_eq!(pitches, vec![60, 64, 67]);
}

#[test]
fn determinism_same_input_same_output() {
    let builder = encode_program(&[
        Record::HumanizePush {
            timing_ppt: 50,
            velocity_ppt: 50,
        },
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::HumanizePop,
    ]);
    let a = compile(&builder, &opts()).unwrap();
    let b = compile(&builder, &opts()).unwrap();
    assert_eq!(a.vm_bytecode, b.vm_bytecode);
    assert_eq!(a.total_ticks, b.total_ticks);
}

#[test]
fn identity_transform_preserves_original_ticks() {
    let builder = encode_program(&[
        Record::Note {
            tick: 10,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::Note {
            tick: 250,
            pitch: 62,
            velocity: 100,
            duration: 96,
        },
    ]);
    let out = compile(&builder, &opts()).unwrap();
    let instrs = decode_all(&out.vm_bytecode);
    // No rest before the first note: it sits at tick 10, but the scope's
    // local cursor starts at 0, so a REST(10) precedes it.
    assert_eq!(
        instrs,
        vec![
            Instruction::Rest { duration: 10 },
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 96
            },
            Instruction::Rest { duration: 144 },
            Instruction::Note {
                pitch: 62,
                velocity: 100,
                duration: 96
            },
            Instruction::Eof,
        ]
    );
}

#[test]
fn unroll_expands_loop_without_brackets() {
    let builder = encode_program(&[
        Record::LoopStart { tick: 0, count: 3 },
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::LoopEnd,
    ]);
    let mut options = opts();
    options.unroll = true;
    let out = compile(&builder, &options).unwrap();
    let instrs = decode_all(&out.vm_bytecode);
    assert!(!instrs.iter().any(|i| matches!(i, Instruction::LoopStart { .. })));
    let notes: Vec<_> = instrs
        .iter()
        .filter(|i| matches!(i, Instruction::Note { .. }))
        .collect();
    assert_eq!(notes.len(), 3);
}

#[test]
fn unroll_iterations_use_distinct_seeds_so_humanize_diverges() {
    let records = vec![
        Record::LoopStart {
            tick: 0,
            count: 20,
        },
        Record::HumanizePush {
            timing_ppt: 800,
            velocity_ppt: 0,
        },
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 10,
        },
        Record::HumanizePop,
        Record::LoopEnd,
    ];
    let builder = encode_program(&records);
    let mut options = opts();
    options.unroll = true;
    let out = compile(&builder, &options).unwrap();
    let instrs = decode_all(&out.vm_bytecode);
    let note_durations_are_consistent = instrs.iter().all(|i| match i {
        Instruction::Note { duration, .. } => *duration == 10,
        _ => true,
    });
    assert!(note_durations_are_consistent);
    // With 20 unrolled iterations of a jittered note, at least two distinct
    // rest gaps should appear between consecutive notes - otherwise every
    // iteration collided on the same seed.
    let rests: Vec<u32> = instrs
        .iter()
        .filter_map(|i| match i {
            Instruction::Rest { duration } => Some(*duration),
            _ => None,
        })
        .collect();
    let distinct: std::collections::HashSet<u32> = rests.into_iter().collect();
    assert!(distinct.len() > 1, "expected seed divergence across unrolled iterations");
}

#[test]
fn unmatched_bracket_is_tolerated_with_warning() {
    let mut builder = Vec::new();
    builder.push(opcode::LOOP_START);
    builder.push(0); // tick
    builder.push(1); // count
    builder.extend(encode_program(&[Record::Note {
        tick: 0,
        pitch: 60,
        velocity: 100,
        duration: 96,
    }]));
    // No LOOP_END before EOF.
    let out = compile(&builder, &opts()).unwrap();
    assert!(!out.warnings.is_empty());
}

#[test]
fn note_mod_on_non_note_is_tolerated_with_warning() {
    let mut builder = Vec::new();
    builder.extend([opcode::NOTE_MOD_QUANTIZE, 24, 100]);
    builder.push(opcode::EOF);
    let out = compile(&builder, &opts()).unwrap();
    assert!(out
        .warnings
        .iter()
        .any(|w| matches!(w, CompileWarning::NoteModOnNonNote { .. })));
}

#[test]
fn total_ticks_counts_a_trailing_rest_as_timed() {
    let builder = encode_program(&[
        Record::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        },
        Record::Rest { tick: 96, duration: 96 },
    ]);
    let out = compile(&builder, &opts()).unwrap();
    assert_eq!(out.total_ticks, 192);
}
