//! Zero-Alloc Compiler - a preallocated, behavior-identical variant of
//! [`crate::compiler`].
//!
//! Where the reference compiler grows `Vec`s freely, [`ZeroAllocCompiler`]
//! allocates every working buffer once in [`ZeroAllocCompiler::new`] and never
//! grows them again: [`ZeroAllocCompiler::compile`] only resets length
//! counters and overwrites slots in place. Exceeding a fixed capacity is a
//! [`CompileError::Overflow`] naming the exhausted resource, never a panic or
//! a silent truncation.
//!
//! The two compilers must agree bit-for-bit on every legal input (Testable
//! Property 2). [`context`] and [`unroll`] are the two places that trick is
//! least obvious:
//!
//! - The 7-word event record has no room for a transform context, so a
//!   parallel preallocated array (indexed the same way) carries it instead.
//! - Unrolling needs each event's pre-transform tick to compute body
//!   duration, so extraction and transform stay two separate passes over the
//!   same array exactly as in the reference compiler, rather than being
//!   folded into one.

mod context;
mod emit;
mod extract;
mod transform;
mod unroll;

#[cfg(test)]
mod tests;

use crate::builder_bc::Word;
pub use crate::compiler::{CompileError, CompileOptions, CompileOutput, CompileWarning};
use crate::vm_bc;

use context::{EventCtx, GrooveRef, HumanizeCtx, QuantizeCtx};

/// Flat event array capacity.
pub const MAX_EVENTS: usize = 65_536;
/// Scope table capacity.
pub const MAX_SCOPES: usize = 256;
/// Maximum simultaneous nesting depth of each context stack (humanize,
/// quantize, groove, tracked independently).
pub const MAX_CONTEXT_DEPTH: usize = 32;
/// Maximum inline offsets a single `GROOVE_PUSH` may carry.
pub const MAX_GROOVE_OFFSETS: usize = 32;
/// Total words the inline-groove arena can hold across the whole program.
pub const MAX_INLINE_GROOVE_WORDS: usize = 64 * MAX_GROOVE_OFFSETS;

/// The kind of a scope table entry. `Stack` holds no events of its own; it
/// only groups `Branch` children, same as the reference compiler's
/// `ScopeKind`/`StructuralChild` split, just flattened into one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructOp {
    Root,
    Loop,
    Stack,
    Branch,
    UnrolledBody,
}

#[derive(Debug, Clone, Copy)]
struct ScopeEntry {
    struct_op: StructOp,
    /// Loop iteration count, or stack branch count. Unused by `Branch`/`Root`.
    count: i32,
    start_tick: i64,
    /// `[event_start, event_end)` bounds every event pushed while this scope
    /// was open, including ones that belong to nested scopes - `scope_id`
    /// disambiguates ownership within the range.
    event_start: u32,
    event_end: u32,
    parent: i32,
    first_child: i32,
    next_sibling: i32,
}

impl Default for ScopeEntry {
    fn default() -> Self {
        ScopeEntry {
            struct_op: StructOp::Root,
            count: 0,
            start_tick: 0,
            event_start: 0,
            event_end: 0,
            parent: -1,
            first_child: -1,
            next_sibling: -1,
        }
    }
}

/// A single event row. `tick` does double duty: it holds the raw (abs) tick
/// through extraction and unrolling, then is overwritten in place with the
/// transformed tick once the transform phase runs.
#[derive(Debug, Clone, Copy, Default)]
struct FlatEvent {
    tick: i64,
    opcode: Word,
    arg0: i32,
    arg1: i32,
    arg2: i32,
    scope_id: u16,
    /// Stable-sort tiebreak and PRNG seed index. A cloned (unrolled) event
    /// keeps its source's value; only `extra_seed` (in the parallel
    /// [`EventCtx`]) changes between iterations.
    insertion_order: u32,
}

impl FlatEvent {
    fn extent(&self) -> i64 {
        if self.opcode == vm_bc::opcode::NOTE {
            self.arg2 as i64
        } else if self.opcode == vm_bc::opcode::REST {
            self.arg0 as i64
        } else {
            0
        }
    }
}

/// A preallocated, reusable compiler instance.
pub struct ZeroAllocCompiler {
    events: Vec<FlatEvent>,
    ctx: Vec<EventCtx>,
    event_len: usize,
    next_insertion_order: u32,

    scopes: Vec<ScopeEntry>,
    last_child: Vec<i32>,
    scope_len: usize,

    groove_arena: Vec<i32>,
    groove_arena_len: usize,

    /// Reused per scope during sort/emit: holds the permutation of event
    /// indices belonging to whichever scope is currently being emitted.
    scratch: Vec<u32>,

    out: Vec<Word>,

    humanize_stack: [HumanizeCtx; MAX_CONTEXT_DEPTH],
    humanize_sp: usize,
    quantize_stack: [QuantizeCtx; MAX_CONTEXT_DEPTH],
    quantize_sp: usize,
    groove_stack: [GrooveRef; MAX_CONTEXT_DEPTH],
    groove_sp: usize,
}

impl ZeroAllocCompiler {
    /// Allocate every working buffer. Call once and reuse across many
    /// [`ZeroAllocCompiler::compile`] calls; nothing allocated here is ever
    /// resized.
    pub fn new() -> Self {
        ZeroAllocCompiler {
            events: vec![FlatEvent::default(); MAX_EVENTS],
            ctx: vec![EventCtx::default(); MAX_EVENTS],
            event_len: 0,
            next_insertion_order: 0,
            scopes: vec![ScopeEntry::default(); MAX_SCOPES],
            last_child: vec![-1; MAX_SCOPES],
            scope_len: 0,
            groove_arena: vec![0; MAX_INLINE_GROOVE_WORDS],
            groove_arena_len: 0,
            scratch: vec![0; MAX_EVENTS],
            out: Vec::with_capacity(MAX_EVENTS * 7),
            humanize_stack: [HumanizeCtx::default(); MAX_CONTEXT_DEPTH],
            humanize_sp: 0,
            quantize_stack: [QuantizeCtx::default(); MAX_CONTEXT_DEPTH],
            quantize_sp: 0,
            groove_stack: [GrooveRef::None; MAX_CONTEXT_DEPTH],
            groove_sp: 0,
        }
    }

    fn reset(&mut self) {
        self.event_len = 0;
        self.next_insertion_order = 0;
        self.scope_len = 0;
        self.groove_arena_len = 0;
        self.out.clear();
        self.humanize_sp = 0;
        self.quantize_sp = 0;
        self.groove_sp = 0;
        self.last_child.fill(-1);
    }

    /// Compile a builder bytecode buffer into VM bytecode, reusing this
    /// instance's preallocated buffers. Must match
    /// [`crate::compiler::compile`] bit-for-bit on any legal input.
    pub fn compile(&mut self, builder_buf: &[Word], options: &CompileOptions) -> Result<CompileOutput, CompileError> {
        self.reset();
        self.push_scope_linked(StructOp::Root, -1, 0, 0)
            .expect("MAX_SCOPES is always large enough for an empty root");

        let warnings = self.extract(builder_buf)?;

        if options.unroll {
            self.unroll_all(0)?;
        }

        self.transform_all(options)?;

        self.emit_scope(0)?;
        self.push_out(vm_bc::opcode::EOF, &[])?;

        Ok(CompileOutput {
            vm_bytecode: self.out.clone(),
            total_ticks: self.total_ticks(),
            warnings,
        })
    }

    fn push_event(&mut self, opcode: Word, tick: i64, arg0: i32, arg1: i32, arg2: i32, scope_id: usize, ctx: EventCtx) -> Result<usize, CompileError> {
        if self.event_len >= MAX_EVENTS {
            return Err(CompileError::Overflow {
                resource: "events",
                cap: MAX_EVENTS,
            });
        }
        let idx = self.event_len;
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.events[idx] = FlatEvent {
            tick,
            opcode,
            arg0,
            arg1,
            arg2,
            scope_id: scope_id as u16,
            insertion_order: order,
        };
        self.ctx[idx] = ctx;
        self.event_len += 1;
        self.scopes[scope_id].event_end = self.event_len as u32;
        Ok(idx)
    }

    /// Allocate a scope and link it into `parent`'s sibling chain.
    fn push_scope_linked(&mut self, struct_op: StructOp, parent: i32, start_tick: i64, count: i32) -> Result<usize, CompileError> {
        let id = self.push_scope_raw(struct_op, parent, start_tick, count)?;
        if parent >= 0 {
            self.link_child(parent as usize, id);
        }
        Ok(id)
    }

    /// Allocate a scope without linking it anywhere; the caller splices it in
    /// (used by unrolling, which controls sibling order itself).
    fn push_scope_raw(&mut self, struct_op: StructOp, parent: i32, start_tick: i64, count: i32) -> Result<usize, CompileError> {
        if self.scope_len >= MAX_SCOPES {
            return Err(CompileError::Overflow {
                resource: "scopes",
                cap: MAX_SCOPES,
            });
        }
        let id = self.scope_len;
        self.scope_len += 1;
        self.scopes[id] = ScopeEntry {
            struct_op,
            count,
            start_tick,
            event_start: self.event_len as u32,
            event_end: self.event_len as u32,
            parent,
            first_child: -1,
            next_sibling: -1,
        };
        Ok(id)
    }

    fn link_child(&mut self, parent: usize, child: usize) {
        let last = self.last_child[parent];
        if last < 0 {
            self.scopes[parent].first_child = child as i32;
        } else {
            self.scopes[last as usize].next_sibling = child as i32;
        }
        self.last_child[parent] = child as i32;
    }

    /// `max` over every event of `tick + extent`, flat across the whole
    /// array, mirroring the reference compiler's `total_ticks`.
    fn total_ticks(&self) -> i64 {
        self.events[..self.event_len]
            .iter()
            .map(|e| e.tick + e.extent())
            .max()
            .unwrap_or(0)
    }
}

impl Default for ZeroAllocCompiler {
    fn default() -> Self {
        ZeroAllocCompiler::new()
    }
}

/// Compile once, discarding the compiler instance afterward. Prefer
/// constructing a [`ZeroAllocCompiler`] directly and reusing it across many
/// calls to realize the zero-allocation benefit.
pub fn compile_zero_alloc(builder_buf: &[Word], options: &CompileOptions) -> Result<CompileOutput, CompileError> {
    ZeroAllocCompiler::new().compile(builder_buf, options)
}
