//! Phase 3: stable per-scope sort by `(final_tick, event_index)`.
//!
//! Structural nesting is a partition of the event set; sorting one scope's
//! event list never touches another scope's, so this is always safe to run
//! scope-by-scope regardless of traversal order.

use super::model::CompileState;

pub fn sort_all_scopes(state: &mut CompileState) {
    for scope in &mut state.scopes {
        let events = &state.events;
        scope.events.sort_by(|&a, &b| {
            let ea = &events[a];
            let eb = &events[b];
            ea.final_tick
                .cmp(&eb.final_tick)
                .then(ea.event_index.cmp(&eb.event_index))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::model::{BlockContext, EventKind, ExtractedEvent, Scope, ScopeKind};

    fn push(state: &mut CompileState, final_tick: i64, event_index: u64) -> usize {
        let idx = state.events.len();
        state.events.push(ExtractedEvent {
            kind: EventKind::Rest { duration: 0 },
            abs_tick: final_tick,
            final_tick,
            context: BlockContext::default(),
            event_index,
            scope: 0,
            source_offset: 0,
            extra_seed: 0,
        });
        idx
    }

    #[test]
    fn sorts_by_tick_then_insertion_order() {
        let mut state = CompileState::new();
        let a = push(&mut state, 96, 0);
        let b = push(&mut state, 0, 1);
        let c = push(&mut state, 96, 2);
        state.scopes[0].events = vec![a, b, c];
        sort_all_scopes(&mut state);
        assert_eq!(state.scopes[0].events, vec![b, a, c]);
    }

    #[test]
    fn independent_scopes_sort_independently() {
        let mut state = CompileState::new();
        let a = push(&mut state, 50, 0);
        let b = push(&mut state, 10, 1);
        state.scopes.push(Scope::new(ScopeKind::Branch, Some(0), 0));
        state.scopes[0].events = vec![a, b];
        state.scopes[1].events = vec![a, b];
        sort_all_scopes(&mut state);
        assert_eq!(state.scopes[0].events, vec![b, a]);
        assert_eq!(state.scopes[1].events, vec![b, a]);
    }
}
