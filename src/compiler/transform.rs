//! Phase 2: Quantize -> Groove -> Humanize, applied to every extracted event.

use crate::prng::Prng;

use super::error::CompileError;
use super::model::{ExtractedEvent, GrooveCtx};

/// Apply the transform chain to a single event in place. `base_seed` is the
/// compiler's configured seed (already folded with any unroll iteration
/// offset by the caller). `groove_templates` is the externally registered
/// groove table that `NOTE_MOD_GROOVE` indexes into.
pub fn transform_event(
    event: &mut ExtractedEvent,
    ppq: u32,
    base_seed: u32,
    groove_templates: &[Vec<i32>],
) -> Result<(), CompileError> {
    let mut tick = event.abs_tick;

    // Quantize.
    if let Some(q) = &event.context.quantize {
        if q.grid_ticks > 0 {
            let grid = q.grid_ticks as i64;
            let nearest = round_div(tick, grid) * grid;
            let delta = nearest - tick;
            tick += round_ratio(delta, q.strength_pct as i64, 100);
        }
    }

    // Groove.
    if let Some(groove) = &event.context.groove {
        let offsets: &[i32] = match groove {
            GrooveCtx::Inline(offsets) => offsets,
            GrooveCtx::Registered(index) => {
                let idx = *index;
                if idx < 0 || idx as usize >= groove_templates.len() {
                    return Err(CompileError::UnknownGrooveTemplate {
                        index: idx,
                        registered: groove_templates.len(),
                    });
                }
                &groove_templates[idx as usize]
            }
        };
        if !offsets.is_empty() {
            let ppq_i64 = ppq as i64;
            let beat_index = (tick.div_euclid(ppq_i64)).rem_euclid(offsets.len() as i64) as usize;
            tick += offsets[beat_index] as i64;
        }
    }

    // Humanize.
    if let Some(h) = &event.context.humanize {
        if h.timing_ppt > 0 || h.velocity_ppt > 0 {
            let mut prng = Prng::seed(base_seed.wrapping_add(event.event_index as u32));
            if h.timing_ppt > 0 {
                let r = prng.next();
                let delta = (r - 0.5) * 2.0 * (h.timing_ppt as f64 / 1000.0) * (ppq as f64);
                tick += delta.round() as i64;
            }
            if h.velocity_ppt > 0 {
                if let crate::compiler::model::EventKind::Note { velocity, .. } = &mut event.kind {
                    let r = prng.next();
                    let delta = (r - 0.5) * 2.0 * (h.velocity_ppt as f64 / 1000.0) * 127.0;
                    let adjusted = (*velocity as f64 + delta).round();
                    *velocity = adjusted.clamp(1.0, 127.0) as u8;
                }
            }
        }
    }

    event.final_tick = tick.max(0);
    Ok(())
}

/// `round(a / b)` with half-away-from-zero rounding.
fn round_div(a: i64, b: i64) -> i64 {
    let q = a as f64 / b as f64;
    q.round() as i64
}

/// `round(delta * pct / 100)`.
fn round_ratio(delta: i64, pct: i64, denom: i64) -> i64 {
    ((delta as f64) * (pct as f64) / (denom as f64)).round() as i64
}
