use bms_core::feed_contracts::{Event, EventId};
use bms_core::Scope;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub(crate) struct StoredEvent {
    pub event: Event,
    /// Position in arrival order; breaks `created_at` ties.
    pub arrival: u64,
}

/// Ordered, id-deduplicated events of one scope.
#[derive(Debug, Default)]
pub struct EventStore {
    scope: Option<Scope>,
    entries: Vec<StoredEvent>,
    ids: HashSet<EventId>,
    next_arrival: u64,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Drops every resident event and rebinds the store to `scope`.
    pub fn reset(&mut self, scope: Option<Scope>) {
        self.scope = scope;
        self.entries.clear();
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &EventId) -> Option<&Event> {
        if !self.ids.contains(id) {
            return None;
        }
        self.entries
            .iter()
            .map(|entry| &entry.event)
            .find(|event| &event.id == id)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter().map(|entry| &entry.event)
    }

    pub fn to_vec(&self) -> Vec<Event> {
        self.events().cloned().collect()
    }

    pub(crate) fn position(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.entries.iter().position(|entry| predicate(&entry.event))
    }

    pub(crate) fn event_mut(&mut self, index: usize) -> Option<&mut Event> {
        self.entries.get_mut(index).map(|entry| &mut entry.event)
    }

    pub(crate) fn append(&mut self, event: Event) {
        let arrival = self.take_arrival();
        self.ids.insert(event.id.clone());
        self.entries.push(StoredEvent { event, arrival });
        self.sort();
    }

    /// Swaps the event at `index` in place, keeping its arrival slot.
    pub(crate) fn replace_at(&mut self, index: usize, event: Event) {
        let Some(entry) = self.entries.get_mut(index) else {
            return;
        };
        self.ids.remove(&entry.event.id);
        self.ids.insert(event.id.clone());
        entry.event = event;
        self.sort();
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Option<Event> {
        if index >= self.entries.len() {
            return None;
        }
        let entry = self.entries.remove(index);
        self.ids.remove(&entry.event.id);
        Some(entry.event)
    }

    pub(crate) fn take_entries(&mut self) -> Vec<StoredEvent> {
        self.ids.clear();
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn rebuild(&mut self, entries: Vec<StoredEvent>) {
        self.ids = entries.iter().map(|entry| entry.event.id.clone()).collect();
        self.entries = entries;
        self.sort();
    }

    pub(crate) fn take_arrival(&mut self) -> u64 {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        arrival
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.event
                .created_at
                .cmp(&b.event.created_at)
                .then(a.arrival.cmp(&b.arrival))
        });
    }
}
