//! Phases 3-5: per-scope stable sort (against the reusable scratch buffer),
//! bytecode emission, and the structural walk that brackets `Loop`/`Stack`
//! children - mirrors [`crate::compiler::sort`] and [`crate::compiler::emit`]
//! combined into one pass per scope.

use crate::compiler::CompileError;
use crate::vm_bc::opcode as vm_op;

use super::{StructOp, Word, ZeroAllocCompiler};

impl ZeroAllocCompiler {
    pub(super) fn push_out(&mut self, op: Word, args: &[Word]) -> Result<(), CompileError> {
        let needed = 1 + args.len();
        if self.out.len() + needed > self.out.capacity() {
            return Err(CompileError::Overflow {
                resource: "vm bytecode output buffer",
                cap: self.out.capacity(),
            });
        }
        self.out.push(op);
        self.out.extend_from_slice(args);
        Ok(())
    }

    /// Fill `self.scratch[0..n]` with the indices of events directly owned by
    /// `scope_id` (i.e. `scope_id` matches), stably sorted by
    /// `(tick, insertion_order)`, and return `n`.
    fn collect_and_sort_scope_events(&mut self, scope_id: usize) -> Result<usize, CompileError> {
        let scope = self.scopes[scope_id];
        let mut n = 0usize;
        for i in scope.event_start as usize..scope.event_end as usize {
            if self.events[i].scope_id as usize == scope_id {
                if n >= self.scratch.len() {
                    return Err(CompileError::Overflow {
                        resource: "per-scope event capacity",
                        cap: self.scratch.len(),
                    });
                }
                self.scratch[n] = i as u32;
                n += 1;
            }
        }

        // Stable insertion sort: fine for a few thousand events per scope,
        // and it touches only this scratch slice.
        for i in 1..n {
            let key = self.scratch[i];
            let key_ev = self.events[key as usize];
            let mut j = i;
            while j > 0 {
                let prev_ev = self.events[self.scratch[j - 1] as usize];
                if (prev_ev.tick, prev_ev.insertion_order) > (key_ev.tick, key_ev.insertion_order) {
                    self.scratch[j] = self.scratch[j - 1];
                    j -= 1;
                } else {
                    break;
                }
            }
            self.scratch[j] = key;
        }

        Ok(n)
    }

    /// Emit `scope_id`'s sorted events, then its structural children in
    /// their original order, bracketed by the VM opcode pairs their kind
    /// implies.
    pub(super) fn emit_scope(&mut self, scope_id: usize) -> Result<(), CompileError> {
        let n = self.collect_and_sort_scope_events(scope_id)?;
        let mut cursor = self.scopes[scope_id].start_tick;

        for k in 0..n {
            let ev = self.events[self.scratch[k] as usize];
            if ev.tick > cursor {
                self.push_out(vm_op::REST, &[(ev.tick - cursor) as Word])?;
                cursor = ev.tick;
            }
            match ev.opcode {
                vm_op::NOTE => {
                    self.push_out(vm_op::NOTE, &[ev.arg0, ev.arg1, ev.arg2])?;
                    cursor += ev.arg2 as i64;
                }
                vm_op::REST => {
                    self.push_out(vm_op::REST, &[ev.arg0])?;
                    cursor += ev.arg0 as i64;
                }
                vm_op::TEMPO => self.push_out(vm_op::TEMPO, &[ev.arg0])?,
                vm_op::CC => self.push_out(vm_op::CC, &[ev.arg0, ev.arg1])?,
                vm_op::BEND => self.push_out(vm_op::BEND, &[ev.arg0])?,
                other => unreachable!("flat event with unexpected opcode {}", other),
            }
        }

        let mut child = self.scopes[scope_id].first_child;
        while child >= 0 {
            let child_id = child as usize;
            let cs = self.scopes[child_id];
            match cs.struct_op {
                StructOp::Loop => {
                    self.push_out(vm_op::LOOP_START, &[cs.count])?;
                    self.emit_scope(child_id)?;
                    self.push_out(vm_op::LOOP_END, &[])?;
                }
                StructOp::UnrolledBody => {
                    self.emit_scope(child_id)?;
                }
                StructOp::Branch => {
                    // Reached outside a Stack only via the tolerant
                    // malformed-input fallback; no bracket pair to balance.
                    self.emit_scope(child_id)?;
                }
                StructOp::Stack => {
                    self.push_out(vm_op::STACK_START, &[cs.count])?;
                    let mut b = cs.first_child;
                    while b >= 0 {
                        self.push_out(vm_op::BRANCH_START, &[])?;
                        self.emit_scope(b as usize)?;
                        self.push_out(vm_op::BRANCH_END, &[])?;
                        b = self.scopes[b as usize].next_sibling;
                    }
                    self.push_out(vm_op::STACK_END, &[])?;
                }
                StructOp::Root => unreachable!("root is never a child"),
            }
            child = self.scopes[child_id].next_sibling;
        }

        Ok(())
    }
}
