//! The `VmEvent` type streamed out of the VM's event ring.

use serde::Serialize;

/// A single timed event published by the VM.
///
/// Emitted at the tick in force when the opcode that produced it runs.
/// `NOTE` pitches already have the current transposition applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VmEvent {
    /// A note-on with an explicit duration in ticks.
    Note {
        tick: u32,
        pitch: u8,
        velocity: u8,
        duration: u32,
    },
    /// A MIDI-style controller change.
    Cc { tick: u32, controller: u8, value: u8 },
    /// A pitch-bend value (14-bit, center 8192).
    Bend { tick: u32, value: u16 },
}

impl VmEvent {
    /// The tick at which this event was published.
    pub fn tick(&self) -> u32 {
        match self {
            VmEvent::Note { tick, .. } => *tick,
            VmEvent::Cc { tick, .. } => *tick,
            VmEvent::Bend { tick, .. } => *tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_accessor() {
        let n = VmEvent::Note {
            tick: 10,
            pitch: 60,
            velocity: 100,
            duration: 96,
        };
        assert_eq!(n.tick(), 10);

        let c = VmEvent::Cc {
            tick: 20,
            controller: 7,
            value: 127,
        };
        assert_eq!(c.tick(), 20);

        let b = VmEvent::Bend { tick: 30, value: 8192 };
        assert_eq!(b.tick(), 30);
    }

    #[test]
    fn test_serialize_tag() {
        let n = VmEvent::Note {
            tick: 0,
            pitch: 60,
            velocity: 100,
            duration: 96,
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"type\":\"note\""));
    }
}
