//! Per-event transform context, carried in a preallocated array parallel to
//! the event array rather than inline in each 7-word row.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) struct HumanizeCtx {
    pub timing_ppt: i32,
    pub velocity_ppt: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) struct QuantizeCtx {
    pub grid_ticks: i32,
    pub strength_pct: i32,
}

/// Where an event's groove offsets live, if any were in force when it was
/// extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum GrooveRef {
    None,
    /// A slice of the inline-groove arena: `[start, start + len)`.
    Inline { start: u32, len: u16 },
    /// An index into the externally registered groove table, reachable only
    /// via the atomic `NOTE_MOD_GROOVE` override.
    Registered { index: i32 },
}

#[derive(Debug, Clone, Copy)]
pub(super) struct EventCtx {
    pub humanize: Option<HumanizeCtx>,
    pub quantize: Option<QuantizeCtx>,
    pub groove: GrooveRef,
    /// Accumulated `iter * 1000` contributions from every unrolled loop this
    /// event was cloned under.
    pub extra_seed: u32,
}

impl Default for EventCtx {
    fn default() -> Self {
        EventCtx {
            humanize: None,
            quantize: None,
            groove: GrooveRef::None,
            extra_seed: 0,
        }
    }
}
