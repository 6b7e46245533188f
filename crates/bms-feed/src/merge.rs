use crate::store::{EventStore, StoredEvent};
use bms_core::feed_contracts::{Delivery, Event, EventId, Origin};
use bms_core::Scope;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// An authoritative event took over the slot of a pending provisional one.
    Confirmed { provisional: Uuid },
    /// A relayed provisional event whose authoritative echo is already resident.
    Absorbed { provisional: Uuid },
    /// A sibling reported that its write for this relayed provisional event failed.
    MarkedFailed { provisional: Uuid },
    Duplicate,
    ForeignScope,
}

impl MergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Confirmed { .. } => "confirmed",
            Self::Absorbed { .. } => "absorbed",
            Self::MarkedFailed { .. } => "marked_failed",
            Self::Duplicate => "duplicate",
            Self::ForeignScope => "foreign_scope",
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Inserted | Self::Confirmed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotOutcome {
    pub applied: bool,
    pub changed: bool,
    pub confirmed: usize,
    pub pending_kept: usize,
    pub retained_newer: usize,
    pub relayed_expired: usize,
    pub foreign: usize,
}

/// Single funnel every producer feeds; the only writer of the [`EventStore`].
#[derive(Debug)]
pub struct MergeEngine {
    store: EventStore,
    echo_tolerance_ms: i64,
    revision: u64,
}

impl MergeEngine {
    pub fn new(echo_tolerance_ms: i64) -> Self {
        Self {
            store: EventStore::new(),
            echo_tolerance_ms,
            revision: 0,
        }
    }

    pub fn active_scope(&self) -> Option<&Scope> {
        self.store.scope()
    }

    /// Bumped exactly once per call that changed the store.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.store.events()
    }

    pub fn to_vec(&self) -> Vec<Event> {
        self.store.to_vec()
    }

    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.store.get(id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.store.events().filter(|event| event.is_pending_echo()).count()
    }

    pub fn activate(&mut self, scope: Scope) {
        self.store.reset(Some(scope));
        self.bump();
    }

    pub fn deactivate(&mut self) {
        if self.store.scope().is_none() && self.store.is_empty() {
            return;
        }
        self.store.reset(None);
        self.bump();
    }

    pub fn merge(&mut self, mut event: Event) -> MergeOutcome {
        let outcome = match self.store.scope() {
            Some(active) if *active == event.scope => {
                if self.store.contains(&event.id) {
                    self.merge_resident(&event)
                } else if event.is_authoritative() {
                    event.confirmed = true;
                    self.merge_authoritative(event.clone())
                } else {
                    event.confirmed = false;
                    self.merge_provisional(event.clone())
                }
            }
            _ => MergeOutcome::ForeignScope,
        };

        debug!(
            event = "feed_merge",
            outcome = outcome.as_str(),
            origin = event.origin.as_str(),
            id = %event.id,
            scope = %event.scope
        );
        outcome
    }

    /// An id already in the store can still carry news: the exact key of a
    /// provisional event it retires, or a sibling's failed write.
    fn merge_resident(&mut self, event: &Event) -> MergeOutcome {
        if event.is_authoritative() {
            if let Some(provisional) = event.echo_of {
                if self.retire_exact(&event.id, provisional) {
                    return MergeOutcome::Confirmed { provisional };
                }
            }
            return MergeOutcome::Duplicate;
        }
        if event.origin == Origin::CrossTab && event.delivery == Delivery::Failed {
            if let Some(provisional) = event.id.provisional() {
                if self.mark_failed(provisional) {
                    return MergeOutcome::MarkedFailed { provisional };
                }
            }
        }
        MergeOutcome::Duplicate
    }

    /// Drops the pending provisional entry `provisional` in favour of the resident
    /// authoritative event `id`, which inherits the key.
    fn retire_exact(&mut self, id: &EventId, provisional: Uuid) -> bool {
        let exact = EventId::Provisional(provisional);
        let Some(index) = self
            .store
            .position(|resident| resident.id == exact && resident.is_pending_echo())
        else {
            return false;
        };
        self.store.remove_at(index);
        if let Some(resident) = self
            .store
            .position(|resident| &resident.id == id)
            .and_then(|index| self.store.event_mut(index))
        {
            resident.echo_of = Some(provisional);
        }
        self.bump();
        true
    }

    fn merge_authoritative(&mut self, mut event: Event) -> MergeOutcome {
        if let Some(index) = self.find_pending_echo(&event) {
            let provisional = self
                .store
                .events()
                .nth(index)
                .and_then(|pending| pending.id.provisional());
            if let Some(provisional) = provisional {
                event.delivery = Delivery::Pending;
                event.echo_of = Some(provisional);
                self.store.replace_at(index, event);
                self.bump();
                return MergeOutcome::Confirmed { provisional };
            }
        }
        self.store.append(event);
        self.bump();
        MergeOutcome::Inserted
    }

    fn merge_provisional(&mut self, event: Event) -> MergeOutcome {
        let Some(provisional) = event.id.provisional() else {
            return MergeOutcome::Duplicate;
        };

        if event.origin == Origin::CrossTab {
            // A sibling's failed write we never saw pending is nothing to show.
            if event.delivery == Delivery::Failed {
                return MergeOutcome::Duplicate;
            }
            if self
                .store
                .events()
                .any(|resident| resident.echo_of == Some(provisional))
            {
                return MergeOutcome::Duplicate;
            }
            let tolerance = self.echo_tolerance_ms;
            if let Some(index) = self.store.position(|resident| {
                resident.is_authoritative()
                    && resident.echo_of.is_none()
                    && event.echoes(resident, tolerance)
            }) {
                if let Some(resident) = self.store.event_mut(index) {
                    resident.echo_of = Some(provisional);
                }
                self.bump();
                return MergeOutcome::Absorbed { provisional };
            }
        }

        self.store.append(event);
        self.bump();
        MergeOutcome::Inserted
    }

    /// Exact `echo_of` key first, then the heuristic match in display order.
    fn find_pending_echo(&self, event: &Event) -> Option<usize> {
        if let Some(echo_of) = event.echo_of {
            let exact = EventId::Provisional(echo_of);
            if let Some(index) = self
                .store
                .position(|resident| resident.id == exact && resident.is_pending_echo())
            {
                return Some(index);
            }
        }
        let tolerance = self.echo_tolerance_ms;
        self.store
            .position(|resident| resident.is_pending_echo() && resident.echoes(event, tolerance))
    }

    /// Full-list refresh: the snapshot replaces authoritative state while pending
    /// provisional events and authoritative events newer than the snapshot survive.
    pub fn merge_snapshot(&mut self, scope: &Scope, snapshot: Vec<Event>) -> SnapshotOutcome {
        let mut outcome = SnapshotOutcome::default();
        if self.store.scope() != Some(scope) {
            debug!(event = "feed_snapshot_foreign", scope = %scope);
            return outcome;
        }
        outcome.applied = true;

        let before = self.store.to_vec();
        let tolerance = self.echo_tolerance_ms;
        let (mut pending, resident): (Vec<StoredEvent>, Vec<StoredEvent>) = self
            .store
            .take_entries()
            .into_iter()
            .partition(|entry| entry.event.is_pending_echo());
        let mut resident: HashMap<EventId, StoredEvent> = resident
            .into_iter()
            .map(|entry| (entry.event.id.clone(), entry))
            .collect();

        let horizon = snapshot
            .iter()
            .filter(|event| event.scope == *scope)
            .map(|event| event.created_at)
            .max();

        let mut seen = HashSet::new();
        let mut rebuilt = Vec::with_capacity(snapshot.len() + pending.len());
        for mut event in snapshot {
            if event.scope != *scope {
                outcome.foreign += 1;
                continue;
            }
            if !event.is_authoritative() || !seen.insert(event.id.clone()) {
                continue;
            }
            event.confirmed = true;

            if let Some(previous) = resident.remove(&event.id) {
                event.echo_of = event.echo_of.or(previous.event.echo_of);
                if let Some(echo_of) = event.echo_of {
                    if let Some(index) = pending
                        .iter()
                        .position(|entry| entry.event.id.provisional() == Some(echo_of))
                    {
                        pending.remove(index);
                        outcome.confirmed += 1;
                    }
                }
                rebuilt.push(StoredEvent {
                    event,
                    arrival: previous.arrival,
                });
                continue;
            }

            let matched = pending.iter().position(|entry| {
                event.echo_of.is_some() && entry.event.id.provisional() == event.echo_of
            });
            let matched = matched.or_else(|| {
                pending
                    .iter()
                    .position(|entry| entry.event.echoes(&event, tolerance))
            });
            if let Some(index) = matched {
                let previous = pending.remove(index);
                event.echo_of = previous.event.id.provisional();
                outcome.confirmed += 1;
                rebuilt.push(StoredEvent {
                    event,
                    arrival: previous.arrival,
                });
                continue;
            }

            let arrival = self.store.take_arrival();
            rebuilt.push(StoredEvent { event, arrival });
        }

        for (_, previous) in resident {
            let newer = horizon.map_or(true, |horizon| previous.event.created_at > horizon);
            if newer {
                outcome.retained_newer += 1;
                rebuilt.push(previous);
            }
        }

        // Relayed provisional events have no local write to resolve them. One the
        // server has moved past by more than the tolerance was never stored.
        if let Some(horizon) = horizon {
            let before_expiry = pending.len();
            pending.retain(|entry| {
                entry.event.origin != Origin::CrossTab
                    || (horizon - entry.event.created_at).num_milliseconds() <= tolerance
            });
            outcome.relayed_expired = before_expiry - pending.len();
        }

        outcome.pending_kept = pending.len();
        rebuilt.extend(pending);
        self.store.rebuild(rebuilt);

        if self.store.to_vec() != before {
            outcome.changed = true;
            self.bump();
        }
        debug!(
            event = "feed_snapshot_merge",
            scope = %scope,
            changed = outcome.changed,
            confirmed = outcome.confirmed,
            pending_kept = outcome.pending_kept,
            retained_newer = outcome.retained_newer,
            relayed_expired = outcome.relayed_expired,
            foreign = outcome.foreign
        );
        outcome
    }

    /// Flags a provisional event whose write failed. It stays visible until a
    /// matching authoritative event or a re-submit supersedes it.
    pub fn mark_failed(&mut self, provisional: Uuid) -> bool {
        let id = EventId::Provisional(provisional);
        let Some(index) = self
            .store
            .position(|event| event.id == id && event.is_pending_echo())
        else {
            return false;
        };
        let Some(event) = self.store.event_mut(index) else {
            return false;
        };
        if event.delivery == Delivery::Failed {
            return false;
        }
        event.delivery = Delivery::Failed;
        self.bump();
        true
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bms_core::feed_contracts::Payload;
    use chrono::{DateTime, TimeZone, Utc};

    const TOLERANCE_MS: i64 = 10_000;

    fn ts(offset_ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_760_000_000_000 + offset_ms)
            .single()
            .expect("valid test timestamp")
    }

    fn admin() -> Scope {
        Scope::department("Admin")
    }

    fn server(id: &str, scope: Scope, text: &str, at: i64, origin: Origin) -> Event {
        Event::authoritative(id, scope, Payload::chat("ana", text), ts(at), origin)
    }

    fn engine() -> MergeEngine {
        let mut engine = MergeEngine::new(TOLERANCE_MS);
        engine.activate(admin());
        engine
    }

    fn ids(engine: &MergeEngine) -> Vec<String> {
        engine.events().map(|event| event.id.to_string()).collect()
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let mut engine = engine();
        let event = server("1", admin(), "hola", 0, Origin::Push);
        assert_eq!(engine.merge(event.clone()), MergeOutcome::Inserted);
        let after_first = engine.to_vec();
        let revision = engine.revision();

        assert_eq!(engine.merge(event), MergeOutcome::Duplicate);
        assert_eq!(engine.to_vec(), after_first);
        assert_eq!(engine.revision(), revision);
    }

    #[test]
    fn events_for_another_scope_are_rejected() {
        let mut engine = engine();
        let foreign = server("1", Scope::department("Seguridad"), "x", 0, Origin::Push);
        assert_eq!(engine.merge(foreign.clone()), MergeOutcome::ForeignScope);
        assert!(engine.is_empty());

        let outcome = engine.merge_snapshot(&Scope::department("Seguridad"), vec![foreign]);
        assert!(!outcome.applied);
        assert!(engine.is_empty());
    }

    #[test]
    fn order_is_independent_of_producer_arrival_order() {
        let events = vec![
            server("3", admin(), "c", 300, Origin::Push),
            server("1", admin(), "a", 100, Origin::CrossTab),
            server("2", admin(), "b", 200, Origin::Push),
        ];

        let mut pushed_first = engine();
        for event in events.clone() {
            pushed_first.merge(event);
        }
        pushed_first.merge_snapshot(&admin(), events.clone());

        let mut polled_first = engine();
        polled_first.merge_snapshot(&admin(), events.iter().rev().cloned().collect());
        for event in events {
            polled_first.merge(event);
        }

        assert_eq!(ids(&pushed_first), vec!["1", "2", "3"]);
        assert_eq!(ids(&polled_first), vec!["1", "2", "3"]);
    }

    #[test]
    fn authoritative_echo_collapses_pending_optimistic_entry() {
        let mut engine = engine();
        let earlier = server("0", admin(), "before", -5_000, Origin::Poll);
        engine.merge(earlier);
        let pending = Event::provisional(admin(), Payload::chat("ana", "hola"), ts(0));
        let provisional = pending.id.provisional().expect("provisional id");
        engine.merge(pending);
        engine.merge(server("9", admin(), "later", 100, Origin::Push));

        let echo = server("5", admin(), "hola", 1_500, Origin::Push);
        assert_eq!(
            engine.merge(echo),
            MergeOutcome::Confirmed { provisional }
        );

        assert_eq!(engine.len(), 3);
        let confirmed = engine
            .get(&EventId::Server("5".to_string()))
            .expect("confirmed entry");
        assert!(confirmed.confirmed);
        assert_eq!(confirmed.echo_of, Some(provisional));
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(ids(&engine), vec!["0", "9", "5"]);
    }

    #[test]
    fn echo_outside_tolerance_is_a_new_event() {
        let mut engine = engine();
        engine.merge(Event::provisional(admin(), Payload::chat("ana", "hola"), ts(0)));
        let late = server("5", admin(), "hola", TOLERANCE_MS + 1, Origin::Push);
        assert_eq!(engine.merge(late), MergeOutcome::Inserted);
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.pending_count(), 1);
    }

    #[test]
    fn second_send_before_confirmation_is_distinct() {
        let mut engine = engine();
        engine.merge(Event::provisional(admin(), Payload::chat("ana", "ok"), ts(0)));
        engine.merge(Event::provisional(admin(), Payload::chat("ana", "ok"), ts(10)));
        assert_eq!(engine.pending_count(), 2);

        engine.merge(server("1", admin(), "ok", 50, Origin::Push));
        engine.merge(server("2", admin(), "ok", 60, Origin::Push));
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn snapshot_preserves_pending_optimistic_events() {
        let mut engine = engine();
        engine.merge(server("1", admin(), "a", 0, Origin::Poll));
        let pending = Event::provisional(admin(), Payload::chat("ana", "in flight"), ts(500));
        let pending_id = pending.id.clone();
        engine.merge(pending);

        let outcome = engine.merge_snapshot(
            &admin(),
            vec![
                server("2", admin(), "b", 200, Origin::Poll),
                server("1", admin(), "a", 0, Origin::Poll),
            ],
        );

        assert!(outcome.changed);
        assert_eq!(outcome.pending_kept, 1);
        assert!(engine.get(&pending_id).is_some());
        assert_eq!(ids(&engine)[..2], ["1".to_string(), "2".to_string()]);
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn snapshot_confirms_matching_pending_event() {
        let mut engine = engine();
        let pending = Event::provisional(admin(), Payload::chat("ana", "hola"), ts(0));
        let provisional = pending.id.provisional();
        engine.merge(pending);

        let outcome = engine.merge_snapshot(&admin(), vec![server("7", admin(), "hola", 800, Origin::Poll)]);
        assert_eq!(outcome.confirmed, 1);
        assert_eq!(outcome.pending_kept, 0);
        assert_eq!(engine.len(), 1);
        let event = engine.get(&EventId::Server("7".to_string())).expect("confirmed");
        assert_eq!(event.echo_of, provisional);
    }

    #[test]
    fn snapshot_keeps_pushed_events_newer_than_its_horizon() {
        let mut engine = engine();
        engine.merge(server("1", admin(), "old", 0, Origin::Poll));
        engine.merge(server("2", admin(), "gone", 50, Origin::Push));
        engine.merge(server("3", admin(), "fresh", 900, Origin::Push));

        let outcome = engine.merge_snapshot(&admin(), vec![server("1", admin(), "old", 0, Origin::Poll), server("4", admin(), "mid", 100, Origin::Poll)]);
        assert_eq!(outcome.retained_newer, 1);
        assert_eq!(ids(&engine), vec!["1", "4", "3"]);
    }

    #[test]
    fn unchanged_snapshot_does_not_bump_revision() {
        let mut engine = engine();
        let rows = vec![server("1", admin(), "a", 0, Origin::Poll)];
        engine.merge_snapshot(&admin(), rows.clone());
        let revision = engine.revision();
        let outcome = engine.merge_snapshot(&admin(), rows);
        assert!(outcome.applied);
        assert!(!outcome.changed);
        assert_eq!(engine.revision(), revision);
    }

    #[test]
    fn relayed_provisional_is_absorbed_by_resident_echo() {
        let mut engine = engine();
        engine.merge(server("1", admin(), "hola", 100, Origin::Push));

        let mut relayed = Event::provisional(admin(), Payload::chat("ana", "hola"), ts(0));
        relayed.origin = Origin::CrossTab;
        let provisional = relayed.id.provisional().expect("provisional id");
        assert_eq!(
            engine.merge(relayed.clone()),
            MergeOutcome::Absorbed { provisional }
        );
        assert_eq!(engine.merge(relayed), MergeOutcome::Duplicate);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn relayed_authoritative_replaces_exact_provisional() {
        let mut engine = engine();
        let mut relayed = Event::provisional(admin(), Payload::chat("ana", "hola"), ts(0));
        relayed.origin = Origin::CrossTab;
        let provisional = relayed.id.provisional().expect("provisional id");
        engine.merge(relayed);

        let mut confirmed = server("8", admin(), "hola", 20_000, Origin::CrossTab);
        confirmed.echo_of = Some(provisional);
        assert_eq!(
            engine.merge(confirmed),
            MergeOutcome::Confirmed { provisional }
        );
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn ack_retires_provisional_after_unmatched_push_of_same_row() {
        let mut engine = engine();
        let pending = Event::provisional(admin(), Payload::chat("ana", "hola"), ts(0));
        let provisional = pending.id.provisional().expect("provisional id");
        engine.merge(pending);

        // Server clock ahead of ours: push lands outside the echo tolerance.
        let pushed = server("5", admin(), "hola", 15_000, Origin::Push);
        assert_eq!(engine.merge(pushed), MergeOutcome::Inserted);
        assert_eq!(engine.len(), 2);

        let mut ack = server("5", admin(), "hola", 15_000, Origin::Poll);
        ack.echo_of = Some(provisional);
        let revision = engine.revision();
        assert_eq!(engine.merge(ack.clone()), MergeOutcome::Confirmed { provisional });
        assert_eq!(engine.revision(), revision + 1);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(
            engine.get(&EventId::Server("5".to_string())).and_then(|event| event.echo_of),
            Some(provisional)
        );

        assert_eq!(engine.merge(ack), MergeOutcome::Duplicate);
        engine.merge_snapshot(&admin(), vec![server("5", admin(), "hola", 15_000, Origin::Poll)]);
        assert_eq!(ids(&engine), vec!["5"]);
    }

    #[test]
    fn snapshot_row_with_exact_key_retires_pending_entry() {
        let mut engine = engine();
        let pending = Event::provisional(admin(), Payload::chat("ana", "hola"), ts(0));
        let provisional = pending.id.provisional().expect("provisional id");
        engine.merge(pending);
        engine.merge(server("5", admin(), "hola", 30_000, Origin::Push));

        let mut row = server("5", admin(), "hola", 30_000, Origin::Poll);
        row.echo_of = Some(provisional);
        let outcome = engine.merge_snapshot(&admin(), vec![row]);
        assert_eq!(outcome.confirmed, 1);
        assert_eq!(outcome.pending_kept, 0);
        assert_eq!(ids(&engine), vec!["5"]);
    }

    #[test]
    fn relayed_provisional_expires_once_snapshots_move_past_it() {
        let mut engine = engine();
        let mut relayed = Event::provisional(admin(), Payload::chat("luis", "never stored"), ts(0));
        relayed.origin = Origin::CrossTab;
        engine.merge(relayed);
        let own = Event::provisional(admin(), Payload::chat("ana", "slow write"), ts(0));
        let own_id = own.id.clone();
        engine.merge(own);

        let within = engine.merge_snapshot(&admin(), vec![server("1", admin(), "a", TOLERANCE_MS, Origin::Poll)]);
        assert_eq!(within.relayed_expired, 0);
        assert_eq!(engine.pending_count(), 2);

        for round in 0..5 {
            engine.merge_snapshot(
                &admin(),
                vec![
                    server("1", admin(), "a", TOLERANCE_MS, Origin::Poll),
                    server("2", admin(), "b", TOLERANCE_MS + 1 + round, Origin::Poll),
                ],
            );
        }
        assert_eq!(engine.pending_count(), 1);
        assert!(engine.get(&own_id).is_some());
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn sibling_failure_flags_relayed_copy_only_when_resident() {
        let mut engine = engine();
        let mut relayed = Event::provisional(admin(), Payload::chat("luis", "hola"), ts(0));
        relayed.origin = Origin::CrossTab;
        let provisional = relayed.id.provisional().expect("provisional id");
        engine.merge(relayed.clone());

        let mut failed = relayed;
        failed.delivery = Delivery::Failed;
        assert_eq!(
            engine.merge(failed.clone()),
            MergeOutcome::MarkedFailed { provisional }
        );
        assert_eq!(engine.merge(failed), MergeOutcome::Duplicate);
        assert_eq!(
            engine.get(&EventId::Provisional(provisional)).map(|event| event.delivery),
            Some(Delivery::Failed)
        );

        let mut unseen = Event::provisional(admin(), Payload::chat("luis", "otro"), ts(5));
        unseen.origin = Origin::CrossTab;
        unseen.delivery = Delivery::Failed;
        assert_eq!(engine.merge(unseen), MergeOutcome::Duplicate);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn failed_writes_stay_visible_and_flagged() {
        let mut engine = engine();
        let pending = Event::provisional(admin(), Payload::chat("ana", "hola"), ts(0));
        let provisional = pending.id.provisional().expect("provisional id");
        engine.merge(pending);

        assert!(engine.mark_failed(provisional));
        assert!(!engine.mark_failed(provisional));
        let event = engine
            .get(&EventId::Provisional(provisional))
            .expect("still resident");
        assert_eq!(event.delivery, Delivery::Failed);
        assert!(!event.confirmed);
    }
}
