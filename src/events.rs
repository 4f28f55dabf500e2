//! Fan-out of [`SimEvent`]s to presentation and network observers.
//!
//! The simulation returns its events from every tick; whoever drives the tick
//! hands them to an [`EventBus`], which forwards each event to every
//! subscribed [`SimObserver`] in subscription order.

use crate::game::SimEvent;
use std::collections::VecDeque;
use std::fmt;

/// Something that wants to hear about simulation events.
pub trait SimObserver: Send {
    fn on_event(&mut self, event: &SimEvent);
}

impl<F> SimObserver for F
where
    F: FnMut(&SimEvent) + Send,
{
    fn on_event(&mut self, event: &SimEvent) {
        self(event);
    }
}

/// Ordered list of observers. Publishing with no observers is a no-op.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn SimObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl SimObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn publish(&mut self, events: &[SimEvent]) {
        for event in events {
            for observer in &mut self.observers {
                observer.on_event(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Human-readable log of the last few notable events, plus running totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentEvents {
    capacity: usize,
    lines: VecDeque<String>,
    pub kills: u32,
    pub leaks: u32,
    pub shots: u32,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
            kills: 0,
            leaks: 0,
            shots: 0,
        }
    }

    /// Newest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().rev().map(String::as_str)
    }

    fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

impl SimObserver for RecentEvents {
    fn on_event(&mut self, event: &SimEvent) {
        match event {
            SimEvent::TowerCreated(tower) => {
                self.push(format!("{} tower built", tower.kind));
            }
            SimEvent::TowerUpgraded { level, .. } => {
                self.push(format!("Tower upgraded to level {level}"));
            }
            SimEvent::PriorityChanged { priority, .. } => {
                self.push(format!("Tower now targets {priority}"));
            }
            SimEvent::EnemyDied { reward, .. } => {
                self.kills += 1;
                self.push(format!("Enemy slain, +{reward} gold"));
            }
            SimEvent::EnemyLeaked { .. } => {
                self.leaks += 1;
                self.push("An enemy broke through! -1 life".to_owned());
            }
            SimEvent::ProjectileCreated(_) => self.shots += 1,
            SimEvent::WaveStarted { number } => self.push(format!("Wave {number} incoming")),
            SimEvent::WaveCleared { number } => self.push(format!("Wave {number} cleared")),
            SimEvent::GameOver => self.push("Defeat".to_owned()),
            SimEvent::Victory => self.push("Victory!".to_owned()),
            SimEvent::EnemySpawned(_) | SimEvent::EnemyUpdated { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityId;
    use std::sync::{Arc, Mutex};

    fn died(id: u64) -> SimEvent {
        SimEvent::EnemyDied {
            id: EntityId(id),
            reward: 10,
        }
    }

    #[test]
    fn publish_without_observers_is_fine() {
        let mut bus = EventBus::new();
        bus.publish(&[died(1), SimEvent::GameOver]);
        assert!(bus.is_empty());
    }

    #[test]
    fn every_observer_sees_every_event_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event: &SimEvent| {
                seen.lock().expect("not poisoned").push((tag, event.clone()));
            });
        }

        bus.publish(&[died(1), SimEvent::Victory]);

        let seen = seen.lock().expect("not poisoned");
        assert_eq!(
            *seen,
            vec![
                ("a", died(1)),
                ("b", died(1)),
                ("a", SimEvent::Victory),
                ("b", SimEvent::Victory),
            ]
        );
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn feed_counts_and_caps() {
        let mut feed = RecentEvents::new(2);
        feed.on_event(&SimEvent::WaveStarted { number: 1 });
        feed.on_event(&died(1));
        feed.on_event(&SimEvent::EnemyLeaked { id: EntityId(2) });

        assert_eq!(feed.kills, 1);
        assert_eq!(feed.leaks, 1);
        let lines: Vec<&str> = feed.lines().collect();
        assert_eq!(lines, vec!["An enemy broke through! -1 life", "Enemy slain, +10 gold"]);
    }

    #[test]
    fn feed_ignores_movement() {
        let mut feed = RecentEvents::new(4);
        feed.on_event(&SimEvent::EnemyUpdated {
            id: EntityId(1),
            position: glam::Vec3::ZERO,
            delta: glam::Vec3::X,
        });
        assert_eq!(feed.lines().count(), 0);
    }
}
