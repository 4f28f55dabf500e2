//! Where enemies enter the field and which kinds get drawn.

use catalog::{EnemyKind, Route};
use glam::Vec3;
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom as _;

/// Source of entry points for newly spawned enemies.
pub trait SpawnPoints: Send {
    fn entry_points(&self) -> &[Vec3];
}

/// A route spawns everything at its first waypoint.
impl SpawnPoints for Route {
    fn entry_points(&self) -> &[Vec3] {
        self.waypoints().get(..1).unwrap_or(&[])
    }
}

/// A fixed list of entry points, for maps with several gates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FixedSpawnPoints(pub Vec<Vec3>);

impl SpawnPoints for FixedSpawnPoints {
    fn entry_points(&self) -> &[Vec3] {
        &self.0
    }
}

/// Seeded source of every random spawning decision.
#[derive(Debug, Clone)]
pub struct Spawner {
    rng: StdRng,
}

impl Spawner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn pick_entry(&mut self, points: &dyn SpawnPoints) -> Option<Vec3> {
        match points.entry_points() {
            [] => None,
            [only] => Some(*only),
            many => many.choose(&mut self.rng).copied(),
        }
    }

    pub fn pick_kind(&mut self, roster: &[EnemyKind]) -> Option<EnemyKind> {
        roster.choose(&mut self.rng).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_enters_at_first_waypoint() {
        let route = Route::new(vec![Vec3::new(-5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)]);
        let mut spawner = Spawner::new(1);
        assert_eq!(spawner.pick_entry(&route), Some(Vec3::new(-5.0, 0.0, 0.0)));
    }

    #[test]
    fn no_points_means_no_entry() {
        let mut spawner = Spawner::new(1);
        assert_eq!(spawner.pick_entry(&FixedSpawnPoints::default()), None);
    }

    #[test]
    fn same_seed_same_draws() {
        let roster = [EnemyKind::Goblin, EnemyKind::Orc, EnemyKind::Troll];
        let mut a = Spawner::new(7);
        let mut b = Spawner::new(7);
        let draws_a: Vec<_> = (0..32).map(|_| a.pick_kind(&roster)).collect();
        let draws_b: Vec<_> = (0..32).map(|_| b.pick_kind(&roster)).collect();
        assert_eq!(draws_a, draws_b);
        assert!(draws_a.iter().all(Option::is_some));
    }

    #[test]
    fn draws_stay_inside_the_gate_list() {
        let gates = FixedSpawnPoints(vec![Vec3::X, Vec3::Y, Vec3::Z]);
        let mut spawner = Spawner::new(3);
        for _ in 0..16 {
            let point = spawner.pick_entry(&gates).expect("non-empty");
            assert!(gates.0.contains(&point));
        }
    }

    #[test]
    fn empty_roster_draws_nothing() {
        let mut spawner = Spawner::new(3);
        assert_eq!(spawner.pick_kind(&[]), None);
    }
}
