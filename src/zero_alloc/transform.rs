//! Phase 2: Quantize -> Groove -> Humanize, applied in place to every event
//! once unrolling (if requested) has finished. Reimplements the same
//! arithmetic as [`crate::compiler::transform`] directly against
//! [`super::FlatEvent`]/[`super::context::EventCtx`] rather than sharing code
//! with it, since the reference's `ExtractedEvent` carries an owned `Vec` for
//! inline groove offsets that this compiler has no business allocating.

use crate::compiler::{CompileError, CompileOptions};
use crate::prng::Prng;
use crate::vm_bc::opcode as vm_op;

use super::context::GrooveRef;
use super::ZeroAllocCompiler;

impl ZeroAllocCompiler {
    pub(super) fn transform_all(&mut self, options: &CompileOptions) -> Result<(), CompileError> {
        for i in 0..self.event_len {
            let ctx = self.ctx[i];
            let seed = options.seed.wrapping_add(ctx.extra_seed);
            let mut tick = self.events[i].tick;

            if let Some(q) = ctx.quantize {
                if q.grid_ticks > 0 {
                    let grid = q.grid_ticks as i64;
                    let nearest = round_div(tick, grid) * grid;
                    let delta = nearest - tick;
                    tick += round_ratio(delta, q.strength_pct as i64, 100);
                }
            }

            match ctx.groove {
                GrooveRef::None => {}
                GrooveRef::Inline { start, len } => {
                    if len > 0 {
                        let offsets = &self.groove_arena[start as usize..start as usize + len as usize];
                        let beat = (tick.div_euclid(options.ppq as i64)).rem_euclid(len as i64) as usize;
                        tick += offsets[beat] as i64;
                    }
                }
                GrooveRef::Registered { index } => {
                    if index < 0 || index as usize >= options.groove_templates.len() {
                        return Err(CompileError::UnknownGrooveTemplate {
                            index,
                            registered: options.groove_templates.len(),
                        });
                    }
                    let offsets = &options.groove_templates[index as usize];
                    if !offsets.is_empty() {
                        let beat = (tick.div_euclid(options.ppq as i64)).rem_euclid(offsets.len() as i64) as usize;
                        tick += offsets[beat] as i64;
                    }
                }
            }

            if let Some(h) = ctx.humanize {
                if h.timing_ppt > 0 || h.velocity_ppt > 0 {
                    let mut prng = Prng::seed(seed.wrapping_add(self.events[i].insertion_order));
                    if h.timing_ppt > 0 {
                        let r = prng.next();
                        let delta = (r - 0.5) * 2.0 * (h.timing_ppt as f64 / 1000.0) * (options.ppq as f64);
                        tick += delta.round() as i64;
                    }
                    if h.velocity_ppt > 0 && self.events[i].opcode == vm_op::NOTE {
                        let r = prng.next();
                        let delta = (r - 0.5) * 2.0 * (h.velocity_ppt as f64 / 1000.0) * 127.0;
                        let adjusted = (self.events[i].arg1 as f64 + delta).round();
                        self.events[i].arg1 = adjusted.clamp(1.0, 127.0) as i32;
                    }
                }
            }

            self.events[i].tick = tick.max(0);
        }
        Ok(())
    }
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
