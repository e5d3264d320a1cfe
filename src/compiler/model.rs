//! Shared in-flight data model for the reference transform compiler.
//!
//! These types exist only between [`super::extract`] and [`super::emit`];
//! nothing here is part of either boundary bytecode format.

use crate::builder_bc::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HumanizeCtx {
    pub timing_ppt: i32,
    pub velocity_ppt: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantizeCtx {
    pub grid_ticks: i32,
    pub strength_pct: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrooveCtx {
    /// Offsets carried inline by a block-scoped `GROOVE_PUSH`.
    Inline(Vec<i32>),
    /// An index into the externally registered groove table, reachable only
    /// via the atomic `NOTE_MOD_GROOVE` override.
    Registered(i32),
}

#[derive(Debug, Clone, Default)]
pub struct BlockContext {
    pub humanize: Option<HumanizeCtx>,
    pub quantize: Option<QuantizeCtx>,
    pub groove: Option<GrooveCtx>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Note { pitch: u8, velocity: u8, duration: i64 },
    Rest { duration: i64 },
    Tempo { bpm: u32 },
    Cc { controller: u8, value: u8 },
    Bend { value: u16 },
}

impl EventKind {
    /// Ticks this event occupies once placed, for total-duration math.
    /// `Note` and `Rest` both carry a duration; TEMPO/CC/BEND are
    /// instantaneous.
    pub fn extent(&self) -> i64 {
        match self {
            EventKind::Note { duration, .. } => *duration,
            EventKind::Rest { duration } => *duration,
            _ => 0,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, EventKind::Note { .. })
    }
}

/// A single extracted event, snapshotted with the transform context that was
/// in force at the point it appeared in the builder bytecode.
#[derive(Debug, Clone)]
pub struct ExtractedEvent {
    pub kind: EventKind,
    /// Absolute input tick, as it appeared in the builder bytecode.
    pub abs_tick: i64,
    /// Tick after Quantize -> Groove -> Humanize; filled in by the transform
    /// phase. Starts equal to `abs_tick`.
    pub final_tick: i64,
    pub context: BlockContext,
    /// Both the stable-sort tiebreak and the PRNG seed offset (spec treats
    /// these as the same counter under two names).
    pub event_index: u64,
    pub scope: usize,
    /// Word offset of the originating record, for diagnostics.
    pub source_offset: usize,
    /// Additional seed contribution from unroll iteration(s) this event was
    /// cloned under: `iter * 1000` per enclosing unrolled loop, composed.
    pub extra_seed: u32,
}

/// The three kinds of event-bearing or structural scopes a builder bytecode
/// program can nest. `Stack` itself holds no events; it only groups
/// `Branch` children.
#[derive(Debug, Clone)]
pub enum ScopeKind {
    Root,
    Loop { count: i32 },
    Branch,
    /// A loop body produced by compile-time unrolling: behaves exactly like
    /// a `Loop` body for sort/emit purposes but contributes no
    /// `LOOP_START`/`LOOP_END` bracket to the output.
    UnrolledLoopBody,
}

/// A child of a scope in structural (not sort) order: either a nested
/// sortable scope (`Loop`/`Branch`/`UnrolledLoopBody`), or a `Stack` grouping
/// its `Branch` children.
#[derive(Debug, Clone)]
pub enum StructuralChild {
    Scope(usize),
    Stack {
        start_tick: i64,
        branch_count: u8,
        branches: Vec<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<usize>,
    /// Absolute tick this scope's local tick cursor is relative to: 0 for
    /// root, the tick on the `LOOP_START`/`STACK_START` record otherwise.
    pub start_tick: i64,
    /// Indices into the compiler's event arena, in original insertion order.
    pub events: Vec<usize>,
    /// Structural children in original order.
    pub children: Vec<StructuralChild>,
}

impl Scope {
    pub fn new(kind: ScopeKind, parent: Option<usize>, start_tick: i64) -> Self {
        Scope {
            kind,
            parent,
            start_tick,
            events: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Everything an in-progress compilation accumulates before emission.
pub struct CompileState {
    pub events: Vec<ExtractedEvent>,
    pub scopes: Vec<Scope>,
    pub root: usize,
    pub next_event_index: u64,
}

impl CompileState {
    pub fn new() -> Self {
        let mut scopes = Vec::new();
        scopes.push(Scope::new(ScopeKind::Root, None, 0));
        CompileState {
            events: Vec::new(),
            scopes,
            root: 0,
            next_event_index: 0,
        }
    }

    pub fn push_scope(&mut self, kind: ScopeKind, parent: usize, start_tick: i64) -> usize {
        let id = self.scopes.len();
        self.scopes.push(Scope::new(kind, Some(parent), start_tick));
        id
    }
}

pub type VmWord = Word;
