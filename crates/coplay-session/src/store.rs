use coplay_core::InflightId;
use tracing::debug;

use crate::ledger::InflightLedger;

/// Pure state transition applied for every action.
pub type Reducer<S, A> = Box<dyn Fn(&S, &A) -> S>;

/// Application state with speculative actions layered on top.
///
/// `canonical` holds confirmed state only. The view is `canonical` with every
/// ledger entry replayed in order; it is what the UI should render.
pub struct Store<S, A> {
    canonical: S,
    view: S,
    ledger: InflightLedger<A>,
    reducer: Reducer<S, A>,
    rejected: Vec<InflightId>,
}

impl<S: Clone, A> Store<S, A> {
    pub fn new(initial: S, reducer: impl Fn(&S, &A) -> S + 'static) -> Self {
        Self {
            view: initial.clone(),
            canonical: initial,
            ledger: InflightLedger::new(),
            reducer: Box::new(reducer),
            rejected: Vec::new(),
        }
    }

    /// Speculative view: canonical state plus pending actions.
    pub fn state(&self) -> &S {
        &self.view
    }

    /// Confirmed state only.
    pub fn canonical(&self) -> &S {
        &self.canonical
    }

    pub fn ledger(&self) -> &InflightLedger<A> {
        &self.ledger
    }

    /// Applies `action`. Tagged actions are speculative and go to the ledger;
    /// untagged ones are final.
    pub fn apply(&mut self, action: A, inflight: Option<InflightId>) {
        match inflight {
            Some(id) => {
                self.view = (self.reducer)(&self.view, &action);
                self.ledger.push(action, id);
            }
            None => {
                self.canonical = (self.reducer)(&self.canonical, &action);
                if self.ledger.is_empty() {
                    self.view = (self.reducer)(&self.view, &action);
                } else {
                    self.rebuild_view();
                }
            }
        }
    }

    /// Confirms every pending entry tagged `id`. Returns how many entries
    /// were folded into canonical state.
    pub fn commit(&mut self, id: InflightId) -> usize {
        while self.ledger.mark_committed(id) {}
        self.compact()
    }

    /// Drops every entry tagged `id` and replays the rest.
    pub fn reject(&mut self, id: InflightId) -> usize {
        let mut removed = 0;
        while self.ledger.reject(id).is_some() {
            removed += 1;
        }
        if removed > 0 {
            debug!(%id, removed, "rejected inflight actions");
            self.rejected.push(id);
            self.compact();
            self.rebuild_view();
        }
        removed
    }

    pub fn compact(&mut self) -> usize {
        let reducer = &self.reducer;
        self.ledger.compact(&mut self.canonical, reducer)
    }

    /// Ids rejected since the last call, oldest first.
    pub fn drain_rejections(&mut self) -> Vec<InflightId> {
        std::mem::take(&mut self.rejected)
    }

    fn rebuild_view(&mut self) {
        let reducer = &self.reducer;
        self.view = self
            .ledger
            .iter()
            .fold(self.canonical.clone(), |state, entry| {
                reducer(&state, &entry.action)
            });
    }
}

#[cfg(test)]
mod tests {
    use coplay_core::InflightId;

    use super::Store;

    fn store() -> Store<Vec<u32>, u32> {
        Store::new(Vec::new(), |state: &Vec<u32>, action: &u32| {
            let mut next = state.clone();
            next.push(*action);
            next
        })
    }

    #[test]
    fn speculative_actions_show_in_view_only() {
        let mut store = store();
        store.apply(1, Some(InflightId(1)));
        assert_eq!(store.state(), &vec![1]);
        assert!(store.canonical().is_empty());

        assert_eq!(store.commit(InflightId(1)), 1);
        assert_eq!(store.canonical(), &vec![1]);
        assert_eq!(store.state(), &vec![1]);
    }

    #[test]
    fn untagged_action_lands_under_pending_ones() {
        let mut store = store();
        store.apply(1, Some(InflightId(1)));
        store.apply(9, None);
        assert_eq!(store.canonical(), &vec![9]);
        assert_eq!(store.state(), &vec![9, 1]);
    }

    #[test]
    fn reject_rolls_back_view_and_is_reported() {
        let mut store = store();
        store.apply(1, Some(InflightId(1)));
        store.apply(2, Some(InflightId(1)));
        store.apply(3, Some(InflightId(2)));
        store.commit(InflightId(2));

        assert_eq!(store.reject(InflightId(1)), 2);
        assert_eq!(store.canonical(), &vec![3]);
        assert_eq!(store.state(), &vec![3]);
        assert!(store.ledger().is_empty());
        assert_eq!(store.drain_rejections(), vec![InflightId(1)]);
        assert!(store.drain_rejections().is_empty());
    }

    #[test]
    fn unknown_reject_changes_nothing() {
        let mut store = store();
        store.apply(1, Some(InflightId(1)));
        assert_eq!(store.reject(InflightId(7)), 0);
        assert_eq!(store.state(), &vec![1]);
        assert!(store.drain_rejections().is_empty());
    }
}
