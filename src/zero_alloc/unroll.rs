//! Compile-time loop unrolling, run against the flat scope tree before the
//! transform phase - mirrors [`crate::compiler::unroll`], splicing cloned
//! scopes into the same preallocated arrays instead of pushing onto `Vec`s.

use crate::compiler::CompileError;

use super::{FlatEvent, StructOp, ZeroAllocCompiler};

impl ZeroAllocCompiler {
    /// Recursively expand every `Loop` scope reachable from `scope_id`,
    /// bottom-up so a nested loop is already flattened (and its duration
    /// known) before an enclosing loop needs it.
    pub(super) fn unroll_all(&mut self, scope_id: usize) -> Result<(), CompileError> {
        let mut children = Vec::new();
        let mut child = self.scopes[scope_id].first_child;
        while child >= 0 {
            children.push(child as usize);
            child = self.scopes[child as usize].next_sibling;
        }

        for &child_id in &children {
            self.unroll_all(child_id)?;
        }

        for &child_id in &children {
            if self.scopes[child_id].struct_op == StructOp::Loop {
                self.expand_loop(scope_id, child_id)?;
            }
        }

        Ok(())
    }

    /// Replace `loop_id` (a direct child of `parent`) with `count`
    /// `UnrolledBody` copies of its subtree, splicing them into `parent`'s
    /// sibling chain in its place. `count <= 0` removes it entirely, matching
    /// the VM's own skip-forward rule.
    fn expand_loop(&mut self, parent: usize, loop_id: usize) -> Result<(), CompileError> {
        let count = self.scopes[loop_id].count;
        let mut copies = Vec::new();
        if count > 0 {
            let body_duration = self.scope_duration(loop_id);
            for iter in 0..count {
                let tick_shift = iter as i64 * body_duration;
                let seed_offset = iter as u32 * 1000;
                let new_id = self.clone_subtree(loop_id, parent as i32, StructOp::UnrolledBody, tick_shift, seed_offset)?;
                copies.push(new_id);
            }
        }
        self.splice_children(parent, loop_id, &copies);
        Ok(())
    }

    /// Deep-clone `source_id`'s subtree under `new_parent`, shifting every
    /// owned event's tick by `tick_shift` and composing `seed_offset` into
    /// its `extra_seed`. The clone is linked into the ordinary sibling chain
    /// of `new_parent` (caller splices `new_parent`'s own position
    /// separately, if needed).
    fn clone_subtree(&mut self, source_id: usize, new_parent: i32, kind_override: StructOp, tick_shift: i64, seed_offset: u32) -> Result<usize, CompileError> {
        let source = self.scopes[source_id];
        let new_id = self.push_scope_raw(kind_override, new_parent, source.start_tick + tick_shift, source.count)?;

        for i in source.event_start as usize..source.event_end as usize {
            if self.events[i].scope_id as usize != source_id {
                continue;
            }
            let mut cloned: FlatEvent = self.events[i];
            cloned.tick += tick_shift;
            let mut ctx = self.ctx[i];
            ctx.extra_seed = ctx.extra_seed.wrapping_add(seed_offset);
            if self.event_len >= super::MAX_EVENTS {
                return Err(CompileError::Overflow {
                    resource: "events",
                    cap: super::MAX_EVENTS,
                });
            }
            cloned.scope_id = new_id as u16;
            let idx = self.event_len;
            self.event_len += 1;
            self.events[idx] = cloned;
            self.ctx[idx] = ctx;
            self.scopes[new_id].event_end = self.event_len as u32;
        }

        let mut child = source.first_child;
        while child >= 0 {
            let child_id = child as usize;
            let child_kind = self.scopes[child_id].struct_op;
            let cloned_child = self.clone_subtree(child_id, new_id as i32, child_kind, tick_shift, seed_offset)?;
            self.link_child(new_id, cloned_child);
            child = self.scopes[child_id].next_sibling;
        }

        Ok(new_id)
    }

    /// Replace `old` in `parent`'s sibling chain with `chain` (in order),
    /// patching `last_child` as needed. An empty `chain` removes `old`.
    fn splice_children(&mut self, parent: usize, old: usize, chain: &[usize]) {
        let old_next = self.scopes[old].next_sibling;
        let prev = self.find_prev_sibling(parent, old);

        for w in chain.windows(2) {
            self.scopes[w[0]].next_sibling = w[1] as i32;
        }
        let new_head = chain.first().copied();
        let new_tail = chain.last().copied();
        if let Some(tail) = new_tail {
            self.scopes[tail].next_sibling = old_next;
        }

        match (prev, new_head) {
            (Some(p), Some(head)) => self.scopes[p].next_sibling = head as i32,
            (Some(p), None) => self.scopes[p].next_sibling = old_next,
            (None, Some(head)) => self.scopes[parent].first_child = head as i32,
            (None, None) => self.scopes[parent].first_child = old_next,
        }

        if self.last_child[parent] == old as i32 {
            self.last_child[parent] = new_tail.map(|t| t as i32).unwrap_or_else(|| prev.map(|p| p as i32).unwrap_or(-1));
        }
    }

    fn find_prev_sibling(&self, parent: usize, target: usize) -> Option<usize> {
        let mut cur = self.scopes[parent].first_child;
        if cur == target as i32 {
            return None;
        }
        while cur >= 0 {
            let next = self.scopes[cur as usize].next_sibling;
            if next == target as i32 {
                return Some(cur as usize);
            }
            cur = next;
        }
        None
    }

    /// A structure-aware summation over `scope_id`'s own (pre-transform)
    /// events and structural children, recursively maxing across parallel
    /// branches and multiplying by loop counts, relative to the scope's own
    /// `start_tick`.
    pub(super) fn scope_duration(&self, scope_id: usize) -> i64 {
        let scope = self.scopes[scope_id];
        let mut end = scope.start_tick;

        for i in scope.event_start as usize..scope.event_end as usize {
            let event = self.events[i];
            if event.scope_id as usize == scope_id {
                end = end.max(event.tick + event.extent());
            }
        }

        let mut child = scope.first_child;
        while child >= 0 {
            let child_id = child as usize;
            let child_scope = self.scopes[child_id];
            match child_scope.struct_op {
                StructOp::Loop => {
                    let n = child_scope.count.max(0) as i64;
                    let d = self.scope_duration(child_id);
                    end = end.max(child_scope.start_tick + n * d);
                }
                StructOp::Stack => {
                    let mut branch_end = 0i64;
                    let mut b = child_scope.first_child;
                    while b >= 0 {
                        branch_end = branch_end.max(self.scope_duration(b as usize));
                        b = self.scopes[b as usize].next_sibling;
                    }
                    end = end.max(child_scope.start_tick + branch_end);
                }
                _ => {
                    let d = self.scope_duration(child_id);
                    end = end.max(child_scope.start_tick + d);
                }
            }
            child = self.scopes[child_id].next_sibling;
        }

        end - scope.start_tick
    }
}
