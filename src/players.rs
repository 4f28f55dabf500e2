//! Player resources.
//!
//! The simulation never owns player data; it talks to a [`PlayerRegistry`]
//! handed to it at construction. [`Ledger`] is the in-memory implementation
//! used by the viewer and the server.

use crate::ecs::PlayerId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Resources of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purse {
    pub name: String,
    pub gold: u32,
    pub lives: u32,
    pub score: u64,
}

/// Capability the simulation uses to charge, reward and penalise players.
pub trait PlayerRegistry: Send {
    /// Add a participant and return their id.
    fn register(&mut self, name: String) -> PlayerId;

    /// Remove a participant, returning what they held.
    fn unregister(&mut self, player: PlayerId) -> Option<Purse>;

    fn contains(&self, player: PlayerId) -> bool;

    /// Deduct `amount` gold. Returns `false`, changing nothing, when the player
    /// is unknown or cannot afford it.
    fn try_spend(&mut self, player: PlayerId, amount: u32) -> bool;

    /// Credit a kill reward to every participant.
    fn credit_all(&mut self, amount: u32);

    /// Take one life from every participant. Returns `true` when at least one
    /// of them has no lives left afterwards.
    fn drain_life_all(&mut self) -> bool;

    /// Every participant, ordered by id.
    fn roster(&self) -> Vec<(PlayerId, Purse)>;
}

/// In-memory [`PlayerRegistry`].
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    next: u32,
    starting_gold: u32,
    starting_lives: u32,
    purses: FxHashMap<PlayerId, Purse>,
}

impl Ledger {
    pub fn new(starting_gold: u32, starting_lives: u32) -> Self {
        Self {
            next: 0,
            starting_gold,
            starting_lives,
            purses: FxHashMap::default(),
        }
    }

    pub fn purse(&self, player: PlayerId) -> Option<&Purse> {
        self.purses.get(&player)
    }
}

impl PlayerRegistry for Ledger {
    fn register(&mut self, name: String) -> PlayerId {
        self.next += 1;
        let id = PlayerId(self.next);
        log::info!("Player {name} joined as {id:?}");
        self.purses.insert(
            id,
            Purse {
                name,
                gold: self.starting_gold,
                lives: self.starting_lives,
                score: 0,
            },
        );
        id
    }

    fn unregister(&mut self, player: PlayerId) -> Option<Purse> {
        self.purses.remove(&player)
    }

    fn contains(&self, player: PlayerId) -> bool {
        self.purses.contains_key(&player)
    }

    fn try_spend(&mut self, player: PlayerId, amount: u32) -> bool {
        match self.purses.get_mut(&player) {
            Some(purse) if purse.gold >= amount => {
                purse.gold -= amount;
                true
            }
            _ => false,
        }
    }

    fn credit_all(&mut self, amount: u32) {
        #[expect(clippy::iter_over_hash_type, reason = "every purse gets the same credit")]
        for purse in self.purses.values_mut() {
            purse.gold = purse.gold.saturating_add(amount);
            purse.score = purse.score.saturating_add(u64::from(amount) * 10);
        }
    }

    fn drain_life_all(&mut self) -> bool {
        let mut anyone_out = false;
        #[expect(clippy::iter_over_hash_type, reason = "order not significant")]
        for purse in self.purses.values_mut() {
            purse.lives = purse.lives.saturating_sub(1);
            anyone_out |= purse.lives == 0;
        }
        anyone_out
    }

    fn roster(&self) -> Vec<(PlayerId, Purse)> {
        let mut roster: Vec<(PlayerId, Purse)> = self
            .purses
            .iter()
            .map(|(id, purse)| (*id, purse.clone()))
            .collect();
        roster.sort_by_key(|(id, _)| *id);
        roster
    }
}
