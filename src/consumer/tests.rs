use std::sync::Arc;

use super::*;
use crate::vm::Vm;
use crate::vm_bc::{encode_program, Instruction};

fn vm_and_consumer(instrs: Vec<Instruction>, ring_capacity: usize) -> (Vm, EventConsumer) {
    let words = encode_program(&instrs);
    let buf = Arc::new(SharedBuffer::new(&words, 96, 120, 0, ring_capacity, 8));
    let vm = Vm::new(Arc::clone(&buf)).unwrap();
    let consumer = EventConsumer::new(buf);
    (vm, consumer)
}

#[test]
fn poll_drains_in_publication_order() {
    let (vm, consumer) = vm_and_consumer(
        vec![
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 10,
            },
            Instruction::Note {
                pitch: 62,
                velocity: 100,
                duration: 10,
            },
            Instruction::Eof,
        ],
        8,
    );
    vm.run_to_end().unwrap();
    let events = consumer.poll();
    assert_eq!(
        events,
        vec![
            VmEvent::Note {
                tick: 0,
                pitch: 60,
                velocity: 100,
                duration: 10
            },
            VmEvent::Note {
                tick: 10,
                pitch: 62,
                velocity: 100,
                duration: 10
            },
        ]
    );
    assert_eq!(consumer.available(), 0);
    assert!(consumer.poll().is_empty());
}

#[test]
fn peek_does_not_consume() {
    let (vm, consumer) = vm_and_consumer(
        vec![
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 10,
            },
            Instruction::Eof,
        ],
        8,
    );
    vm.run_to_end().unwrap();
    let peeked = consumer.peek().unwrap();
    assert_eq!(peeked.tick(), 0);
    assert_eq!(consumer.available(), 1);
    let polled = consumer.poll();
    assert_eq!(polled, vec![peeked]);
    assert_eq!(consumer.peek(), None);
}

#[test]
fn poll_until_stops_before_events_past_target() {
    let (vm, consumer) = vm_and_consumer(
        vec![
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 48,
            },
            Instruction::Note {
                pitch: 62,
                velocity: 100,
                duration: 48,
            },
            Instruction::Note {
                pitch: 64,
                velocity: 100,
                duration: 48,
            },
            Instruction::Eof,
        ],
        8,
    );
    vm.run_to_end().unwrap();
    let partial = consumer.poll_until(48);
    assert_eq!(partial.len(), 2);
    assert_eq!(consumer.available(), 1);
    let rest = consumer.poll();
    assert_eq!(rest.len(), 1);
}

#[test]
fn is_backpressured_reflects_ring_state() {
    let (vm, consumer) = vm_and_consumer(
        vec![
            Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 1,
            },
            Instruction::Note {
                pitch: 61,
                velocity: 100,
                duration: 1,
            },
            Instruction::Eof,
        ],
        1,
    );
    vm.tick(i64::MAX).unwrap();
    assert!(consumer.is_backpressured());
    assert!(consumer.is_paused());
    consumer.poll();
    assert!(!consumer.is_backpressured());
    vm.run_to_end().unwrap();
    assert!(consumer.is_done());
}

#[test]
fn ring_fifo_holds_under_interleaved_drain_s6() {
    let (vm, consumer) = vm_and_consumer(
        {
            let mut instrs = vec![Instruction::LoopStart { count: 10 }];
            instrs.push(Instruction::Note {
                pitch: 60,
                velocity: 100,
                duration: 1,
            });
            instrs.push(Instruction::LoopEnd);
            instrs.push(Instruction::Eof);
            instrs
        },
        2,
    );
    let mut all_events = Vec::new();
    loop {
        let state = vm.tick(i64::MAX).unwrap();
        all_events.extend(consumer.poll());
        if state == crate::vm::VmState::Done {
            break;
        }
    }
    assert_eq!(all_events.len(), 10);
    for (i, event) in all_events.iter().enumerate() {
        assert_eq!(event.tick(), i as u32);
    }
}

#[test]
fn exposes_ppq_bpm_and_state_pass_through() {
    let (_vm, consumer) = vm_and_consumer(vec![Instruction::Eof], 4);
    assert_eq!(consumer.ppq(), 96);
    assert_eq!(consumer.bpm(), 120);
    assert_eq!(consumer.tick(), 0);
}
