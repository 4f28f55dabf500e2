//! The combat simulation: pure, deterministic, no `egui` or networking dependencies.
//!
//! [`Simulation`] owns the [`EntityStore`] and advances it once per
//! [`Simulation::tick`], in a fixed phase order:
//!
//! 0. queued [`SimCommand`]s are applied
//! 1. enemies walk the route, projectiles fly
//! 2. towers validate or pick their target
//! 3. towers off cooldown fire
//! 4. projectiles hit, miss or expire
//! 5. spent projectiles, dead and escaped enemies are removed
//! 6. waves release enemies, the replenish floor is topped up
//!
//! Given the same catalog, config, command sequence and deltas two simulations
//! end in identical [`WorldSnapshot`]s.

pub mod combat;
pub mod spawn;
pub mod waves;


use crate::config::SimConfig;
use crate::ecs::{
    Enemy, EntityId, EntityKind, EntityStore, NewEnemy, NewProjectile, NewTower, PlayerId,
    Projectile, TargetPriority, Tower,
};
use crate::players::{Ledger, PlayerRegistry, Purse};
use catalog::{Catalog, EnemyKind, TowerKind};
use combat::Candidate;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use spawn::{SpawnPoints, Spawner};
use std::fmt;
use std::mem;
use waves::{WaveDirector, WaveStart, WaveStatus};

// ---------------------------------------------------------------------------
// Commands & events
// ---------------------------------------------------------------------------

/// Every outside request to change the world. Queued with
/// [`Simulation::enqueue`] and applied at the start of the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimCommand {
    /// `requester: None` is a scripted placement and costs nothing.
    PlaceTower {
        kind: TowerKind,
        position: Vec3,
        requester: Option<PlayerId>,
    },
    UpgradeTower {
        tower: EntityId,
        requester: Option<PlayerId>,
    },
    /// Change how a tower ranks enemies. Its current target is dropped.
    SetPriority {
        tower: EntityId,
        priority: TargetPriority,
        requester: Option<PlayerId>,
    },
    StartWave,
}

/// What happened during a tick, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    TowerCreated(Tower),
    TowerUpgraded {
        id: EntityId,
        level: u32,
        damage: f32,
        range: f32,
        attack_speed: f32,
    },
    PriorityChanged {
        id: EntityId,
        priority: TargetPriority,
    },
    EnemySpawned(Enemy),
    EnemyUpdated {
        id: EntityId,
        position: Vec3,
        delta: Vec3,
    },
    EnemyDied {
        id: EntityId,
        reward: u32,
    },
    EnemyLeaked {
        id: EntityId,
    },
    ProjectileCreated(Projectile),
    WaveStarted {
        number: u32,
    },
    WaveCleared {
        number: u32,
    },
    GameOver,
    Victory,
}

/// Why a command was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandRejected {
    #[error("the match is over")]
    MatchOver,
    #[error("no stats for tower kind {0}")]
    UnknownKind(TowerKind),
    #[error("position is not finite")]
    InvalidPosition,
    #[error("tower limit of {0} reached")]
    TowerLimit(usize),
    #[error("too close to tower {0:?}")]
    TooClose(EntityId),
    #[error("unknown player {0:?}")]
    UnknownPlayer(PlayerId),
    #[error("{player:?} cannot afford {cost} gold")]
    InsufficientGold { player: PlayerId, cost: u32 },
    #[error("no tower {0:?}")]
    UnknownTower(EntityId),
    #[error("tower {0:?} belongs to another player")]
    NotOwner(EntityId),
    #[error("tower {0:?} is fully upgraded")]
    MaxLevel(EntityId),
    #[error("a wave is already running")]
    WaveInProgress,
    #[error("every wave has been played")]
    NoWavesLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Defeat,
    Victory,
}

/// Everything a viewer needs to draw one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub clock: f64,
    pub towers: Vec<Tower>,
    pub enemies: Vec<Enemy>,
    pub projectiles: Vec<Projectile>,
    pub players: Vec<(PlayerId, Purse)>,
    pub waves: WaveStatus,
    pub outcome: Option<Outcome>,
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

pub struct Simulation {
    catalog: Catalog,
    config: SimConfig,
    store: EntityStore,
    players: Box<dyn PlayerRegistry>,
    spawn_points: Box<dyn SpawnPoints>,
    spawner: Spawner,
    waves: WaveDirector,
    commands: Vec<SimCommand>,
    events: Vec<SimEvent>,
    clock: f64,
    ticks: u64,
    outcome: Option<Outcome>,
}

impl Simulation {
    /// Wire a simulation to its collaborators.
    pub fn new(
        catalog: Catalog,
        config: SimConfig,
        players: Box<dyn PlayerRegistry>,
        spawn_points: Box<dyn SpawnPoints>,
    ) -> Self {
        let spawner = Spawner::new(config.seed);
        Self {
            catalog,
            config,
            store: EntityStore::default(),
            players,
            spawn_points,
            spawner,
            waves: WaveDirector::default(),
            commands: Vec::new(),
            events: Vec::new(),
            clock: 0.0,
            ticks: 0,
            outcome: None,
        }
    }

    /// An in-memory [`Ledger`] and enemies entering at the start of the route.
    pub fn with_defaults(catalog: Catalog, config: SimConfig) -> Self {
        let players = Ledger::new(config.starting_gold, config.starting_lives);
        let route = catalog.path.clone();
        Self::new(catalog, config, Box::new(players), Box::new(route))
    }

    pub fn enqueue(&mut self, command: SimCommand) {
        self.commands.push(command);
    }

    pub fn register_player(&mut self, name: String) -> PlayerId {
        self.players.register(name)
    }

    /// Towers the player built stay on the field, unowned by anyone present.
    pub fn unregister_player(&mut self, player: PlayerId) -> Option<Purse> {
        self.players.unregister(player)
    }

    /// Advance the world by `delta` seconds and return what happened.
    ///
    /// Once the match is decided, queued commands are still drained (and
    /// rejected) but the world no longer moves.
    ///
    /// # Panics
    /// In debug builds, on a negative or non-finite `delta`. Release builds
    /// treat it as zero.
    pub fn tick(&mut self, delta: f32) -> Vec<SimEvent> {
        debug_assert!(
            delta.is_finite() && delta >= 0.0,
            "tick delta must be finite and non-negative, got {delta}"
        );
        let dt = if delta.is_finite() && delta > 0.0 {
            delta.min(self.config.max_delta)
        } else {
            0.0
        };

        self.drain_commands();

        if self.outcome.is_none() {
            self.ticks += 1;
            self.clock += f64::from(dt);
            self.move_entities(dt);
            self.acquire_targets();
            self.fire();
            let spent = self.resolve_projectiles();
            self.clean_up(spent);
            self.advance_waves(dt);
        }

        mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.ticks,
            clock: self.clock,
            towers: self.store.towers().into_iter().cloned().collect(),
            enemies: self.store.enemies().into_iter().cloned().collect(),
            projectiles: self.store.projectiles().into_iter().cloned().collect(),
            players: self.players.roster(),
            waves: self.waves.status(&self.catalog.waves),
            outcome: self.outcome,
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Direct access for scripted setups. Changes made here emit no events.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn players(&self) -> &dyn PlayerRegistry {
        self.players.as_ref()
    }

    /// Simulated seconds since the first tick.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    // -- phase 0: commands ---------------------------------------------------

    fn drain_commands(&mut self) {
        for command in mem::take(&mut self.commands) {
            if let Err(reason) = self.apply_command(&command) {
                log::warn!("Rejected {command:?}: {reason}");
            }
        }
    }

    fn apply_command(&mut self, command: &SimCommand) -> Result<(), CommandRejected> {
        if self.outcome.is_some() {
            return Err(CommandRejected::MatchOver);
        }
        match *command {
            SimCommand::PlaceTower {
                kind,
                position,
                requester,
            } => self.place_tower(kind, position, requester),
            SimCommand::UpgradeTower { tower, requester } => self.upgrade_tower(tower, requester),
            SimCommand::SetPriority {
                tower,
                priority,
                requester,
            } => self.set_priority(tower, priority, requester),
            SimCommand::StartWave => self.start_wave(),
        }
    }

    fn place_tower(
        &mut self,
        kind: TowerKind,
        position: Vec3,
        requester: Option<PlayerId>,
    ) -> Result<(), CommandRejected> {
        let stats = self
            .catalog
            .tower(kind)
            .ok_or(CommandRejected::UnknownKind(kind))?;
        if !position.is_finite() {
            return Err(CommandRejected::InvalidPosition);
        }
        if self.store.count(EntityKind::Tower) >= self.config.max_towers {
            return Err(CommandRejected::TowerLimit(self.config.max_towers));
        }
        let spacing = self.config.min_tower_spacing;
        if let Some(blocking) = self
            .store
            .towers()
            .into_iter()
            .find(|tower| tower.position.distance(position) < spacing)
        {
            return Err(CommandRejected::TooClose(blocking.id));
        }
        if let Some(player) = requester {
            charge(self.players.as_mut(), player, stats.cost)?;
        }

        let id = self.store.create_tower(NewTower {
            kind,
            position,
            owner: requester,
            damage: stats.damage,
            range: stats.range,
            attack_speed: stats.attack_speed,
            projectile_speed: stats.projectile_speed,
            priority: TargetPriority::default(),
        });
        log::info!("{kind} tower {id:?} placed at {position}");
        if let Some(tower) = self.store.tower(id) {
            self.events.push(SimEvent::TowerCreated(tower.clone()));
        }
        Ok(())
    }

    fn upgrade_tower(
        &mut self,
        id: EntityId,
        requester: Option<PlayerId>,
    ) -> Result<(), CommandRejected> {
        let tower = self
            .store
            .tower(id)
            .ok_or(CommandRejected::UnknownTower(id))?;
        if tower.owner.is_some() && tower.owner != requester {
            return Err(CommandRejected::NotOwner(id));
        }
        let stats = self
            .catalog
            .tower(tower.kind)
            .ok_or(CommandRejected::UnknownKind(tower.kind))?;
        let tier = tower.level.saturating_sub(1) as usize;
        let upgrade = *stats
            .upgrades
            .get(tier)
            .ok_or(CommandRejected::MaxLevel(id))?;
        if let Some(player) = requester {
            charge(self.players.as_mut(), player, upgrade.cost)?;
        }

        let tower = self
            .store
            .tower_mut(id)
            .ok_or(CommandRejected::UnknownTower(id))?;
        tower.level += 1;
        tower.damage += upgrade.damage_bonus;
        tower.range += upgrade.range_bonus;
        tower.attack_speed += upgrade.attack_speed_bonus;
        log::info!("{} tower {id:?} upgraded to level {}", tower.kind, tower.level);
        self.events.push(SimEvent::TowerUpgraded {
            id,
            level: tower.level,
            damage: tower.damage,
            range: tower.range,
            attack_speed: tower.attack_speed,
        });
        Ok(())
    }

    fn set_priority(
        &mut self,
        id: EntityId,
        priority: TargetPriority,
        requester: Option<PlayerId>,
    ) -> Result<(), CommandRejected> {
        let tower = self
            .store
            .tower_mut(id)
            .ok_or(CommandRejected::UnknownTower(id))?;
        if tower.owner.is_some() && tower.owner != requester {
            return Err(CommandRejected::NotOwner(id));
        }
        tower.priority = priority;
        tower.target = None;
        log::info!("Tower {id:?} now targets {priority}");
        self.events.push(SimEvent::PriorityChanged { id, priority });
        Ok(())
    }

    fn start_wave(&mut self) -> Result<(), CommandRejected> {
        match self.waves.start_next(&self.catalog.waves) {
            WaveStart::Started(number) => {
                log::info!("Wave {number} started");
                self.events.push(SimEvent::WaveStarted { number });
                Ok(())
            }
            WaveStart::Busy => Err(CommandRejected::WaveInProgress),
            WaveStart::Exhausted => Err(CommandRejected::NoWavesLeft),
        }
    }

    // -- phase 1: movement ---------------------------------------------------

    fn move_entities(&mut self, dt: f32) {
        let route = self.catalog.path.waypoints();
        for id in self.store.query_all(EntityKind::Enemy) {
            let Some(enemy) = self.store.enemies.get_mut(&id) else {
                continue;
            };
            if !enemy.is_targetable() {
                continue;
            }
            let before = enemy.position;
            let budget = enemy.speed * dt;
            walk(enemy, route, budget);
            let delta = enemy.position - before;
            if delta != Vec3::ZERO {
                self.events.push(SimEvent::EnemyUpdated {
                    id,
                    position: enemy.position,
                    delta,
                });
            }
        }

        #[expect(
            clippy::iter_over_hash_type,
            reason = "projectiles move independently of each other"
        )]
        for projectile in self.store.projectiles.values_mut() {
            let step = projectile.velocity * dt;
            projectile.previous = projectile.position;
            projectile.position += step;
            projectile.travelled += step.length();
        }
    }

    // -- phase 2: targeting --------------------------------------------------

    fn acquire_targets(&mut self) {
        let candidates: Vec<Candidate> = self
            .store
            .enemies()
            .into_iter()
            .filter(|enemy| enemy.is_targetable())
            .map(|enemy| Candidate {
                id: enemy.id,
                position: enemy.position,
                health: enemy.health,
                travelled: enemy.travelled,
            })
            .collect();

        for id in self.store.query_all(EntityKind::Tower) {
            let Some(tower) = self.store.towers.get_mut(&id) else {
                continue;
            };
            let keep = tower
                .target
                .and_then(|target| self.store.enemies.get(&target))
                .is_some_and(|enemy| {
                    enemy.is_targetable() && enemy.position.distance(tower.position) < tower.range
                });
            if !keep {
                tower.target = combat::select_target(
                    tower.position,
                    tower.range,
                    tower.priority,
                    &candidates,
                );
            }
        }
    }

    // -- phase 3: attacking --------------------------------------------------

    fn fire(&mut self) {
        let now = self.clock;
        let mut shots = Vec::new();

        for id in self.store.query_all(EntityKind::Tower) {
            let Some(tower) = self.store.towers.get_mut(&id) else {
                continue;
            };
            let Some(target) = tower.target else {
                continue;
            };
            let Some(enemy) = self
                .store
                .enemies
                .get(&target)
                .filter(|enemy| enemy.is_targetable())
            else {
                continue;
            };
            let cooldown = tower.cooldown();
            if tower.last_attack.is_some_and(|last| now - last < cooldown) {
                continue;
            }
            if tower.position.distance(enemy.position) > tower.range {
                continue;
            }

            let direction = (enemy.position - tower.position).normalize_or_zero();
            tower.last_attack = Some(now);
            shots.push(NewProjectile {
                source: id,
                target,
                position: tower.position,
                velocity: direction * tower.projectile_speed,
                damage: tower.damage,
            });
        }

        for shot in shots {
            let id = self.store.create_projectile(shot);
            if let Some(projectile) = self.store.projectile(id) {
                log::debug!(
                    "Tower {:?} fired {id:?} at {:?}",
                    projectile.source,
                    projectile.target
                );
                self.events
                    .push(SimEvent::ProjectileCreated(projectile.clone()));
            }
        }
    }

    // -- phase 4: projectile resolution --------------------------------------

    /// Apply hits and return every projectile that is done.
    fn resolve_projectiles(&mut self) -> Vec<EntityId> {
        let mut spent = Vec::new();

        for id in self.store.query_all(EntityKind::Projectile) {
            let Some(projectile) = self.store.projectiles.get(&id) else {
                continue;
            };
            let Some(enemy) = self
                .store
                .enemies
                .get_mut(&projectile.target)
                .filter(|enemy| enemy.is_targetable())
            else {
                spent.push(id);
                continue;
            };

            let miss =
                combat::segment_distance(projectile.previous, projectile.position, enemy.position);
            if miss <= self.config.hit_radius {
                let damage =
                    combat::effective_damage(self.config.damage_model, projectile.damage, enemy.armor);
                enemy.health = combat::apply_damage(enemy.health, damage);
                log::debug!("{id:?} hit {:?} for {damage}", enemy.id);
                spent.push(id);
            } else if projectile.travelled > self.config.max_travel {
                spent.push(id);
            }
        }

        spent
    }

    // -- phase 5: cleanup ----------------------------------------------------

    fn clean_up(&mut self, spent: Vec<EntityId>) {
        for id in spent {
            self.store.remove(id);
        }

        for id in self.store.query_all(EntityKind::Enemy) {
            let Some(enemy) = self.store.enemies.get(&id) else {
                continue;
            };
            let (kind, reward, wave) = (enemy.kind, enemy.reward, enemy.wave);

            if !enemy.is_alive() {
                self.store.remove(id);
                self.waves.enemy_removed(wave);
                self.players.credit_all(reward);
                log::info!("{kind} {id:?} died, {reward} gold to every player");
                self.events.push(SimEvent::EnemyDied { id, reward });
            } else if enemy.escaped {
                self.store.remove(id);
                self.waves.enemy_removed(wave);
                log::info!("{kind} {id:?} reached the end of the path");
                self.events.push(SimEvent::EnemyLeaked { id });
                if self.players.drain_life_all() && self.outcome.is_none() {
                    log::info!("Out of lives, game over");
                    self.outcome = Some(Outcome::Defeat);
                    self.events.push(SimEvent::GameOver);
                }
            }
        }
    }

    // -- phase 6: waves & replenishment --------------------------------------

    fn advance_waves(&mut self, dt: f32) {
        if self.outcome.is_some() {
            return;
        }

        for release in self.waves.advance(dt, &self.catalog.waves) {
            let spawned = self.spawn_enemy(
                release.kind,
                Some(release.wave),
                release.health_multiplier,
                release.reward_multiplier,
            );
            if spawned.is_none() {
                self.waves.release_failed(release.wave);
            }
        }

        if let Some((number, last)) = self.waves.poll_cleared(&self.catalog.waves) {
            log::info!("Wave {number} cleared");
            self.events.push(SimEvent::WaveCleared { number });
            if last {
                log::info!("Final wave cleared, victory");
                self.outcome = Some(Outcome::Victory);
                self.events.push(SimEvent::Victory);
                return;
            }
        }

        self.replenish();
    }

    fn replenish(&mut self) {
        let Some(floor) = self.config.replenish_floor else {
            return;
        };
        let live = self.store.count(EntityKind::Enemy);
        for _ in live..floor {
            let Some(kind) = self.spawner.pick_kind(&self.config.replenish_roster) else {
                break;
            };
            if self.spawn_enemy(kind, None, 1.0, 1.0).is_none() {
                break;
            }
        }
    }

    fn spawn_enemy(
        &mut self,
        kind: EnemyKind,
        wave: Option<u32>,
        health_multiplier: f32,
        reward_multiplier: f32,
    ) -> Option<EntityId> {
        let Some(stats) = self.catalog.enemy(kind).copied() else {
            log::warn!("No stats for enemy kind {kind}, not spawning");
            return None;
        };
        let Some(position) = self.spawner.pick_entry(self.spawn_points.as_ref()) else {
            log::warn!("No spawn point available for {kind}");
            return None;
        };

        let reward = (stats.reward as f32 * reward_multiplier).round() as u32;
        let id = self.store.create_enemy(NewEnemy {
            kind,
            position,
            speed: stats.speed,
            health: stats.health * health_multiplier,
            reward,
            armor: stats.armor,
            wave,
        });
        log::debug!("Spawned {kind} {id:?} at {position}");
        if let Some(enemy) = self.store.enemy(id) {
            self.events.push(SimEvent::EnemySpawned(enemy.clone()));
        }
        Some(id)
    }
}

fn charge(
    players: &mut dyn PlayerRegistry,
    player: PlayerId,
    cost: u32,
) -> Result<(), CommandRejected> {
    if !players.contains(player) {
        return Err(CommandRejected::UnknownPlayer(player));
    }
    if !players.try_spend(player, cost) {
        return Err(CommandRejected::InsufficientGold { player, cost });
    }
    Ok(())
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("ticks", &self.ticks)
            .field("clock", &self.clock)
            .field("store", &self.store)
            .field("waves", &self.waves)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Walk `enemy` up to `budget` units along `route`, crossing as many
/// waypoints as the budget allows.
fn walk(enemy: &mut Enemy, route: &[Vec3], mut budget: f32) {
    while budget > 0.0 {
        let Some(&waypoint) = route.get(enemy.next_waypoint) else {
            enemy.escaped = true;
            return;
        };
        let to = waypoint - enemy.position;
        let gap = to.length();

        if gap <= budget {
            if gap > 0.0 {
                enemy.direction = to / gap;
            }
            enemy.position = waypoint;
            enemy.travelled += gap;
            enemy.next_waypoint += 1;
            budget -= gap;
            if enemy.next_waypoint >= route.len() {
                enemy.escaped = true;
                return;
            }
        } else {
            enemy.direction = to / gap;
            enemy.position += enemy.direction * budget;
            enemy.travelled += budget;
            return;
        }
    }
}
