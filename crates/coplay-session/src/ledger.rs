use std::collections::VecDeque;

use coplay_core::InflightId;

/// One speculatively applied action awaiting its round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflightEntry<A> {
    pub id: InflightId,
    pub action: A,
    pub committed: bool,
}

/// Ordered queue of speculative actions, in dispatch order.
///
/// Canonical state only ever absorbs the committed prefix, so actions land in
/// dispatch order no matter which order confirmations arrive in. Entries never
/// expire: one that is neither committed nor rejected holds back everything
/// behind it.
#[derive(Debug, Clone)]
pub struct InflightLedger<A> {
    entries: VecDeque<InflightEntry<A>>,
}

impl<A> Default for InflightLedger<A> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<A> InflightLedger<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: A, id: InflightId) {
        self.entries.push_back(InflightEntry {
            id,
            action,
            committed: false,
        });
    }

    /// Removes the first entry carrying `id`. Unknown ids are a no-op.
    pub fn reject(&mut self, id: InflightId) -> Option<A> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(index).map(|entry| entry.action)
    }

    /// Marks the first uncommitted entry carrying `id` as committed.
    pub fn mark_committed(&mut self, id: InflightId) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id && !entry.committed)
        {
            Some(entry) => {
                entry.committed = true;
                true
            }
            None => false,
        }
    }

    /// Marks `id` committed, then folds the committed prefix into `state`.
    ///
    /// Returns how many entries were folded.
    pub fn commit<S, F>(&mut self, id: InflightId, state: &mut S, reducer: F) -> usize
    where
        F: Fn(&S, &A) -> S,
    {
        self.mark_committed(id);
        self.compact(state, reducer)
    }

    /// Pops committed entries off the front into `state`, stopping at the
    /// first uncommitted one.
    pub fn compact<S, F>(&mut self, state: &mut S, reducer: F) -> usize
    where
        F: Fn(&S, &A) -> S,
    {
        let mut folded = 0;
        while self.entries.front().is_some_and(|entry| entry.committed) {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            *state = reducer(&*state, &entry.action);
            folded += 1;
        }
        folded
    }

    /// Whether any entry carrying `id` still awaits confirmation.
    pub fn has_uncommitted(&self, id: InflightId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.id == id && !entry.committed)
    }

    pub fn contains(&self, id: InflightId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InflightEntry<A>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
