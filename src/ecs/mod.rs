//! Entity storage and core value types.
//!
//! This module owns the data layout for towers, enemies and projectiles and the
//! [`EntityStore`] that holds them. It is intentionally free of simulation
//! rules, networking, and rendering concerns.

use catalog::{EnemyKind, TowerKind};
use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Core value types
// ---------------------------------------------------------------------------

/// Unique identifier for an entity in the simulated world.
///
/// Ids are shared across all entity kinds and never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Monotonically increasing generator for [`EntityId`] values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityGenerator(u64);

impl EntityGenerator {
    pub fn next_id(&mut self) -> EntityId {
        self.0 += 1;
        EntityId(self.0)
    }
}

/// Identifier of a participant who can place towers and receive rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Tower,
    Enemy,
    Projectile,
}

/// How a tower ranks the enemies in its range.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetPriority {
    #[default]
    Closest,
    /// Furthest along the path.
    First,
    /// Least far along the path.
    Last,
    Strongest,
    Weakest,
}

impl TargetPriority {
    pub const ALL: [Self; 5] = [
        Self::Closest,
        Self::First,
        Self::Last,
        Self::Strongest,
        Self::Weakest,
    ];
}

impl fmt::Display for TargetPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closest => "closest",
            Self::First => "first",
            Self::Last => "last",
            Self::Strongest => "strongest",
            Self::Weakest => "weakest",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tower {
    pub id: EntityId,
    pub kind: TowerKind,
    pub position: Vec3,
    pub owner: Option<PlayerId>,
    pub level: u32,
    pub damage: f32,
    pub range: f32,
    /// Attacks per second.
    pub attack_speed: f32,
    pub projectile_speed: f32,
    pub priority: TargetPriority,
    /// Weak reference; may point at an enemy that no longer exists.
    pub target: Option<EntityId>,
    /// Simulation time of the last shot, `None` until the first one.
    pub last_attack: Option<f64>,
}

impl Tower {
    /// Seconds between two shots.
    pub fn cooldown(&self) -> f64 {
        1.0 / f64::from(self.attack_speed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub id: EntityId,
    pub kind: EnemyKind,
    pub position: Vec3,
    /// Unit heading of the last movement step (zero while standing still).
    pub direction: Vec3,
    pub speed: f32,
    pub health: f32,
    pub max_health: f32,
    pub reward: u32,
    pub armor: f32,
    /// Index into the route of the waypoint currently walked towards.
    pub next_waypoint: usize,
    /// Distance walked so far.
    pub travelled: f32,
    /// Set once the enemy walks past the final waypoint.
    pub escaped: bool,
    /// Wave the enemy was released by, if any.
    pub wave: Option<u32>,
}

impl Enemy {
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Alive and still on the field.
    pub fn is_targetable(&self) -> bool {
        self.is_alive() && !self.escaped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub id: EntityId,
    pub source: EntityId,
    /// Weak reference; the projectile is discarded if this enemy goes away.
    pub target: EntityId,
    pub position: Vec3,
    /// Position at the start of the last movement step.
    pub previous: Vec3,
    pub velocity: Vec3,
    pub damage: f32,
    pub travelled: f32,
}

// ---------------------------------------------------------------------------
// Creation attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NewTower {
    pub kind: TowerKind,
    pub position: Vec3,
    pub owner: Option<PlayerId>,
    pub damage: f32,
    pub range: f32,
    pub attack_speed: f32,
    pub projectile_speed: f32,
    pub priority: TargetPriority,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEnemy {
    pub kind: EnemyKind,
    pub position: Vec3,
    pub speed: f32,
    pub health: f32,
    pub reward: u32,
    pub armor: f32,
    pub wave: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProjectile {
    pub source: EntityId,
    pub target: EntityId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub damage: f32,
}

/// Borrowed view of any entity, as returned by [`EntityStore::get`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    Tower(&'a Tower),
    Enemy(&'a Enemy),
    Projectile(&'a Projectile),
}

impl EntityRef<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Tower(_) => EntityKind::Tower,
            Self::Enemy(_) => EntityKind::Enemy,
            Self::Projectile(_) => EntityKind::Projectile,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Authoritative collections of every live entity, one keyed map per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    entity_gen: EntityGenerator,
    pub(crate) towers: FxHashMap<EntityId, Tower>,
    pub(crate) enemies: FxHashMap<EntityId, Enemy>,
    pub(crate) projectiles: FxHashMap<EntityId, Projectile>,
}

impl EntityStore {
    pub fn create_tower(&mut self, new: NewTower) -> EntityId {
        let id = self.entity_gen.next_id();
        self.towers.insert(
            id,
            Tower {
                id,
                kind: new.kind,
                position: new.position,
                owner: new.owner,
                level: 1,
                damage: new.damage,
                range: new.range,
                attack_speed: new.attack_speed,
                projectile_speed: new.projectile_speed,
                priority: new.priority,
                target: None,
                last_attack: None,
            },
        );
        id
    }

    pub fn create_enemy(&mut self, new: NewEnemy) -> EntityId {
        let id = self.entity_gen.next_id();
        self.enemies.insert(
            id,
            Enemy {
                id,
                kind: new.kind,
                position: new.position,
                direction: Vec3::ZERO,
                speed: new.speed,
                health: new.health,
                max_health: new.health,
                reward: new.reward,
                armor: new.armor,
                next_waypoint: 0,
                travelled: 0.0,
                escaped: false,
                wave: new.wave,
            },
        );
        id
    }

    pub fn create_projectile(&mut self, new: NewProjectile) -> EntityId {
        let id = self.entity_gen.next_id();
        self.projectiles.insert(
            id,
            Projectile {
                id,
                source: new.source,
                target: new.target,
                position: new.position,
                previous: new.position,
                velocity: new.velocity,
                damage: new.damage,
                travelled: 0.0,
            },
        );
        id
    }

    pub fn get(&self, id: EntityId) -> Option<EntityRef<'_>> {
        if let Some(tower) = self.towers.get(&id) {
            return Some(EntityRef::Tower(tower));
        }
        if let Some(enemy) = self.enemies.get(&id) {
            return Some(EntityRef::Enemy(enemy));
        }
        self.projectiles.get(&id).map(EntityRef::Projectile)
    }

    pub fn tower(&self, id: EntityId) -> Option<&Tower> {
        self.towers.get(&id)
    }

    pub fn tower_mut(&mut self, id: EntityId) -> Option<&mut Tower> {
        self.towers.get_mut(&id)
    }

    pub fn enemy(&self, id: EntityId) -> Option<&Enemy> {
        self.enemies.get(&id)
    }

    pub fn enemy_mut(&mut self, id: EntityId) -> Option<&mut Enemy> {
        self.enemies.get_mut(&id)
    }

    pub fn projectile(&self, id: EntityId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    pub fn projectile_mut(&mut self, id: EntityId) -> Option<&mut Projectile> {
        self.projectiles.get_mut(&id)
    }

    /// Remove an entity of any kind. Returns whether something was removed;
    /// removing an absent id is a no-op.
    pub fn remove(&mut self, id: EntityId) -> bool {
        self.towers.remove(&id).is_some()
            || self.enemies.remove(&id).is_some()
            || self.projectiles.remove(&id).is_some()
    }

    /// Snapshot of the ids of one kind, in ascending (creation) order.
    ///
    /// The returned list is detached from the store, so entities may be created
    /// or removed while walking it.
    pub fn query_all(&self, kind: EntityKind) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = match kind {
            EntityKind::Tower => self.towers.keys().copied().collect(),
            EntityKind::Enemy => self.enemies.keys().copied().collect(),
            EntityKind::Projectile => self.projectiles.keys().copied().collect(),
        };
        ids.sort_unstable();
        ids
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Tower => self.towers.len(),
            EntityKind::Enemy => self.enemies.len(),
            EntityKind::Projectile => self.projectiles.len(),
        }
    }

    /// Towers in creation order.
    pub fn towers(&self) -> Vec<&Tower> {
        self.query_all(EntityKind::Tower)
            .into_iter()
            .filter_map(|id| self.towers.get(&id))
            .collect()
    }

    /// Enemies in creation order.
    pub fn enemies(&self) -> Vec<&Enemy> {
        self.query_all(EntityKind::Enemy)
            .into_iter()
            .filter_map(|id| self.enemies.get(&id))
            .collect()
    }

    /// Projectiles in creation order.
    pub fn projectiles(&self) -> Vec<&Projectile> {
        self.query_all(EntityKind::Projectile)
            .into_iter()
            .filter_map(|id| self.projectiles.get(&id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn goblin_at(position: Vec3) -> NewEnemy {
        NewEnemy {
            kind: EnemyKind::Goblin,
            position,
            speed: 0.0,
            health: 100.0,
            reward: 10,
            armor: 0.0,
            wave: None,
        }
    }

    fn archer_at(position: Vec3) -> NewTower {
        NewTower {
            kind: TowerKind::Archer,
            position,
            owner: None,
            damage: 25.0,
            range: 20.0,
            attack_speed: 1.5,
            projectile_speed: 40.0,
            priority: TargetPriority::Closest,
        }
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut store = EntityStore::default();
        let tower = store.create_tower(archer_at(Vec3::ZERO));
        let enemy = store.create_enemy(goblin_at(Vec3::X));
        let projectile = store.create_projectile(NewProjectile {
            source: tower,
            target: enemy,
            position: Vec3::ZERO,
            velocity: Vec3::X,
            damage: 1.0,
        });

        assert_ne!(tower, enemy);
        assert_ne!(enemy, projectile);
        assert_eq!(store.get(tower).map(|e| e.kind()), Some(EntityKind::Tower));
        assert_eq!(store.get(enemy).map(|e| e.kind()), Some(EntityKind::Enemy));
        assert_eq!(
            store.get(projectile).map(|e| e.kind()),
            Some(EntityKind::Projectile)
        );
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut store = EntityStore::default();
        let first = store.create_enemy(goblin_at(Vec3::ZERO));
        assert!(store.remove(first));
        let second = store.create_enemy(goblin_at(Vec3::ZERO));
        assert_ne!(first, second);
    }

    #[test]
    fn get_of_removed_id_is_absent() {
        let mut store = EntityStore::default();
        let id = store.create_enemy(goblin_at(Vec3::ZERO));
        store.remove(id);
        assert!(store.get(id).is_none());
        assert!(store.enemy(id).is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = EntityStore::default();
        let id = store.create_tower(archer_at(Vec3::ZERO));
        assert!(store.remove(id));
        assert!(!store.remove(id));
        assert!(!store.remove(EntityId(999)));
        assert_eq!(store.count(EntityKind::Tower), 0);
    }

    #[test]
    fn query_all_is_in_creation_order() {
        let mut store = EntityStore::default();
        let ids: Vec<EntityId> = (0..20)
            .map(|i| store.create_enemy(goblin_at(Vec3::new(i as f32, 0.0, 0.0))))
            .collect();
        assert_eq!(store.query_all(EntityKind::Enemy), ids);
    }

    #[test]
    fn query_all_snapshot_survives_removal_during_walk() {
        let mut store = EntityStore::default();
        for i in 0..5 {
            store.create_enemy(goblin_at(Vec3::new(i as f32, 0.0, 0.0)));
        }
        let mut visited = 0;
        for id in store.query_all(EntityKind::Enemy) {
            visited += 1;
            store.remove(id);
            store.create_projectile(NewProjectile {
                source: id,
                target: id,
                position: Vec3::ZERO,
                velocity: Vec3::ZERO,
                damage: 0.0,
            });
        }
        assert_eq!(visited, 5);
        assert_eq!(store.count(EntityKind::Enemy), 0);
        assert_eq!(store.count(EntityKind::Projectile), 5);
    }

    #[test]
    fn typed_mut_access_is_kind_checked() {
        let mut store = EntityStore::default();
        let enemy = store.create_enemy(goblin_at(Vec3::ZERO));
        let projectile = store.create_projectile(NewProjectile {
            source: enemy,
            target: enemy,
            position: Vec3::ZERO,
            velocity: Vec3::X,
            damage: 1.0,
        });

        if let Some(p) = store.projectile_mut(projectile) {
            p.travelled = 7.5;
        }

        assert!(store.projectile_mut(enemy).is_none());
        assert!(store.enemy_mut(projectile).is_none());
        assert_eq!(store.projectile(projectile).map(|p| p.travelled), Some(7.5));
    }

    #[test]
    fn new_enemy_starts_at_full_health() {
        let mut store = EntityStore::default();
        let id = store.create_enemy(goblin_at(Vec3::ZERO));
        let enemy = store.enemy(id).expect("just created");
        assert!((enemy.health - enemy.max_health).abs() < f32::EPSILON);
        assert!(enemy.is_targetable());
        assert!(!enemy.escaped);
    }

    #[test]
    fn tower_cooldown_is_inverse_attack_speed() {
        let mut store = EntityStore::default();
        let id = store.create_tower(archer_at(Vec3::ZERO));
        let tower = store.tower(id).expect("just created");
        assert!((tower.cooldown() - 1.0 / 1.5).abs() < 1e-9);
        assert_eq!(tower.level, 1);
        assert!(tower.target.is_none());
    }
}
