use std::fmt::Debug;

use tracing::{debug, warn};

/// Handle for one in-flight resolution. Only the most recently issued
/// ticket can apply its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    key: K,
    generation: u64,
}

impl<K> Ticket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A derived value keyed by a tuple of draft fields, recomputed only when
/// the key changes value, with last-key-wins arbitration between overlapping
/// resolutions.
#[derive(Debug, Clone)]
pub struct KeyedResolution<K, V> {
    requested: Option<K>,
    resolved: Option<K>,
    value: Option<V>,
    generation: u64,
    in_flight: bool,
}

impl<K, V> Default for KeyedResolution<K, V> {
    fn default() -> Self {
        Self {
            requested: None,
            resolved: None,
            value: None,
            generation: 0,
            in_flight: false,
        }
    }
}

impl<K: Clone + PartialEq + Debug, V> KeyedResolution<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket if `key` differs from the last requested key.
    pub fn schedule(&mut self, key: K) -> Option<Ticket<K>> {
        if self.requested.as_ref() == Some(&key) {
            return None;
        }
        self.generation += 1;
        self.requested = Some(key.clone());
        self.in_flight = true;
        debug!("Scheduled resolution #{} for {:?}", self.generation, key);
        Some(Ticket { key, generation: self.generation })
    }

    /// Apply a finished resolution. Stale tickets are dropped.
    pub fn apply(&mut self, ticket: Ticket<K>, value: V) -> bool {
        if ticket.generation != self.generation {
            warn!(
                "Dropping stale resolution #{} for {:?} (current #{})",
                ticket.generation, ticket.key, self.generation
            );
            return false;
        }
        self.resolved = Some(ticket.key);
        self.value = Some(value);
        self.in_flight = false;
        true
    }

    /// The resolution behind `ticket` will never report back. If it is still
    /// the current one, clear the in-flight marker so the key can be
    /// scheduled again; superseded tickets are ignored.
    pub fn abandon(&mut self, ticket: &Ticket<K>) {
        if ticket.generation != self.generation || !self.in_flight {
            return;
        }
        debug!("Abandoned resolution #{} for {:?}", ticket.generation, ticket.key);
        self.requested = self.resolved.clone();
        self.in_flight = false;
    }

    /// Overwrite the value for the current key outside the scheduling cycle.
    pub fn override_current(&mut self, key: K, value: V) {
        self.generation += 1;
        self.requested = Some(key.clone());
        self.resolved = Some(key);
        self.value = Some(value);
        self.in_flight = false;
    }

    /// Forget everything; any in-flight ticket becomes stale.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.requested = None;
        self.resolved = None;
        self.value = None;
        self.in_flight = false;
    }

    /// Last applied value, possibly for an older key.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Value only if it was resolved for `key`.
    pub fn value_for(&self, key: &K) -> Option<&V> {
        match &self.resolved {
            Some(resolved) if resolved == key => self.value.as_ref(),
            _ => None,
        }
    }

    pub fn resolved_key(&self) -> Option<&K> {
        self.resolved.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// The shown value no longer matches the latest requested key.
    pub fn is_stale(&self) -> bool {
        self.in_flight || self.requested != self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_is_not_rescheduled() {
        let mut resolution: KeyedResolution<&str, u32> = KeyedResolution::new();
        let ticket = resolution.schedule("a").expect("first key schedules");
        assert!(resolution.schedule("a").is_none());
        assert!(resolution.apply(ticket, 1));
        assert!(resolution.schedule("a").is_none());
        assert!(resolution.schedule("b").is_some());
    }

    #[test]
    fn test_last_key_wins() {
        let mut resolution: KeyedResolution<&str, u32> = KeyedResolution::new();
        let first = resolution.schedule("a").unwrap();
        let second = resolution.schedule("b").unwrap();

        assert!(resolution.apply(second, 2));
        assert!(!resolution.apply(first, 1));
        assert_eq!(resolution.value(), Some(&2));
        assert_eq!(resolution.resolved_key(), Some(&"b"));
    }

    #[test]
    fn test_previous_value_survives_while_in_flight() {
        let mut resolution: KeyedResolution<&str, u32> = KeyedResolution::new();
        let first = resolution.schedule("a").unwrap();
        resolution.apply(first, 1);

        let _pending = resolution.schedule("b").unwrap();
        assert!(resolution.is_stale());
        assert_eq!(resolution.value(), Some(&1));
        assert_eq!(resolution.value_for(&"b"), None);
    }

    #[test]
    fn test_invalidate_drops_late_results() {
        let mut resolution: KeyedResolution<&str, u32> = KeyedResolution::new();
        let ticket = resolution.schedule("a").unwrap();
        resolution.invalidate();

        assert!(!resolution.apply(ticket, 1));
        assert!(resolution.value().is_none());
        assert!(resolution.schedule("a").is_some());
    }

    #[test]
    fn test_abandoned_ticket_allows_rescheduling() {
        let mut resolution: KeyedResolution<&str, u32> = KeyedResolution::new();
        let first = resolution.schedule("a").unwrap();
        resolution.apply(first, 1);

        let dropped = resolution.schedule("b").unwrap();
        resolution.abandon(&dropped);

        assert!(!resolution.is_in_flight());
        assert!(!resolution.is_stale());
        assert_eq!(resolution.value(), Some(&1));
        assert!(resolution.schedule("b").is_some());
    }

    #[test]
    fn test_abandoning_superseded_ticket_keeps_current_one() {
        let mut resolution: KeyedResolution<&str, u32> = KeyedResolution::new();
        let superseded = resolution.schedule("a").unwrap();
        let current = resolution.schedule("b").unwrap();

        resolution.abandon(&superseded);

        assert!(resolution.is_in_flight());
        assert!(resolution.apply(current, 2));
    }
}
