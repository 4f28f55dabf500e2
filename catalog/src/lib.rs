//! Static content tables for the tower-defense simulation.
//!
//! Everything here is loaded once at startup and treated as immutable for the
//! rest of the session: per-kind tower and enemy stats, tower upgrade tiers,
//! the enemy route and the wave schedule. The default content ships embedded in
//! the binary (`data/catalog.json`); [`Catalog::from_path`] loads an override.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const BUILTIN_JSON: &str = include_str!("../data/catalog.json");

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to load or validate a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid catalog: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TowerKind {
    Archer,
    Mage,
    Cannon,
}

impl TowerKind {
    pub const ALL: [Self; 3] = [Self::Archer, Self::Mage, Self::Cannon];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Archer => "Archer",
            Self::Mage => "Mage",
            Self::Cannon => "Cannon",
        }
    }
}

impl fmt::Display for TowerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TowerKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CatalogError::Invalid(format!("unknown tower kind `{s}`")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnemyKind {
    Goblin,
    Orc,
    Troll,
    Boss,
}

impl EnemyKind {
    pub const ALL: [Self; 4] = [Self::Goblin, Self::Orc, Self::Troll, Self::Boss];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Goblin => "Goblin",
            Self::Orc => "Orc",
            Self::Troll => "Troll",
            Self::Boss => "Boss",
        }
    }
}

impl fmt::Display for EnemyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnemyKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CatalogError::Invalid(format!("unknown enemy kind `{s}`")))
    }
}

// ---------------------------------------------------------------------------
// Stat tables
// ---------------------------------------------------------------------------

/// One purchasable upgrade tier. Bonuses are added to the tower's current stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Upgrade {
    pub cost: u32,
    #[serde(default)]
    pub damage_bonus: f32,
    #[serde(default)]
    pub range_bonus: f32,
    #[serde(default)]
    pub attack_speed_bonus: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerStats {
    pub cost: u32,
    pub damage: f32,
    pub range: f32,
    /// Attacks per second.
    pub attack_speed: f32,
    pub projectile_speed: f32,
    #[serde(default)]
    pub upgrades: Vec<Upgrade>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyStats {
    pub health: f32,
    pub speed: f32,
    pub reward: u32,
    #[serde(default)]
    pub armor: f32,
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Polyline that enemies walk from the first waypoint to the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route {
    waypoints: Vec<Vec3>,
}

impl Route {
    pub fn new(waypoints: Vec<Vec3>) -> Self {
        Self { waypoints }
    }

    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    /// Where enemies enter the field.
    pub fn entry(&self) -> Option<Vec3> {
        self.waypoints.first().copied()
    }

    /// Total length of the polyline.
    pub fn length(&self) -> f32 {
        self.waypoints
            .windows(2)
            .map(|pair| match pair {
                [a, b] => a.distance(*b),
                _ => 0.0,
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Waves
// ---------------------------------------------------------------------------

/// `count` enemies of one kind, released every `interval` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveGroup {
    pub kind: EnemyKind,
    pub count: u32,
    pub interval: f32,
    #[serde(default = "one")]
    pub health_multiplier: f32,
    #[serde(default = "one")]
    pub reward_multiplier: f32,
}

const fn one() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveSpec {
    pub groups: Vec<WaveGroup>,
}

impl WaveSpec {
    pub fn total_enemies(&self) -> u32 {
        self.groups.iter().map(|g| g.count).sum()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub towers: BTreeMap<TowerKind, TowerStats>,
    pub enemies: BTreeMap<EnemyKind, EnemyStats>,
    pub path: Route,
    #[serde(default)]
    pub waves: Vec<WaveSpec>,
}

impl Catalog {
    /// The content shipped with the game.
    ///
    /// # Errors
    /// Only if the embedded JSON is malformed or fails validation.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_JSON)
    }

    /// Parse and validate a catalog from JSON text.
    ///
    /// # Errors
    /// [`CatalogError::Json`] on malformed input, [`CatalogError::Invalid`]
    /// when a value is out of range.
    pub fn from_json(text: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Read a catalog file from disk.
    ///
    /// # Errors
    /// IO, parse and validation failures.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn tower(&self, kind: TowerKind) -> Option<&TowerStats> {
        self.towers.get(&kind)
    }

    pub fn enemy(&self, kind: EnemyKind) -> Option<&EnemyStats> {
        self.enemies.get(&kind)
    }

    pub fn wave(&self, index: usize) -> Option<&WaveSpec> {
        self.waves.get(index)
    }

    /// Check every table for values the simulation cannot work with.
    ///
    /// # Errors
    /// The first offending entry, as [`CatalogError::Invalid`].
    pub fn validate(&self) -> Result<()> {
        for (kind, stats) in &self.towers {
            if !(stats.projectile_speed.is_finite() && stats.projectile_speed > 0.0) {
                return Err(invalid(format!("{kind}: projectile_speed must be positive")));
            }
            let (mut damage, mut range, mut attack_speed) =
                (stats.damage, stats.range, stats.attack_speed);
            check_combat_stats(&kind.to_string(), damage, range, attack_speed)?;

            // Bonuses stack, so every tier must leave a usable tower.
            for (tier, upgrade) in stats.upgrades.iter().enumerate() {
                let level = tier + 2;
                if upgrade.cost == 0 {
                    return Err(invalid(format!("{kind} level {level}: cost must be positive")));
                }
                damage += upgrade.damage_bonus;
                range += upgrade.range_bonus;
                attack_speed += upgrade.attack_speed_bonus;
                check_combat_stats(&format!("{kind} level {level}"), damage, range, attack_speed)?;
            }
        }

        for (kind, stats) in &self.enemies {
            if !(stats.health > 0.0) {
                return Err(invalid(format!("{kind}: health must be positive")));
            }
            if !(stats.speed >= 0.0) {
                return Err(invalid(format!("{kind}: speed must be non-negative")));
            }
            if !(stats.armor >= 0.0) {
                return Err(invalid(format!("{kind}: armor must be non-negative")));
            }
        }

        if self.path.waypoints().len() < 2 {
            return Err(invalid("path needs at least two waypoints".to_owned()));
        }

        for (index, wave) in self.waves.iter().enumerate() {
            let number = index + 1;
            if wave.groups.is_empty() {
                return Err(invalid(format!("wave {number} has no groups")));
            }
            for group in &wave.groups {
                if !self.enemies.contains_key(&group.kind) {
                    return Err(invalid(format!(
                        "wave {number} spawns {} which has no stats",
                        group.kind
                    )));
                }
                if !(group.interval >= 0.0) {
                    return Err(invalid(format!("wave {number}: interval must be non-negative")));
                }
                if !(group.health_multiplier > 0.0 && group.reward_multiplier >= 0.0) {
                    return Err(invalid(format!("wave {number}: bad multiplier")));
                }
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> CatalogError {
    CatalogError::Invalid(message)
}

fn check_combat_stats(what: &str, damage: f32, range: f32, attack_speed: f32) -> Result<()> {
    if !(damage.is_finite() && damage >= 0.0) {
        return Err(invalid(format!("{what}: damage must be non-negative")));
    }
    if !(range.is_finite() && range > 0.0) {
        return Err(invalid(format!("{what}: range must be positive")));
    }
    if !(attack_speed.is_finite() && attack_speed > 0.0) {
        return Err(invalid(format!("{what}: attack_speed must be positive")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_loads() {
        let catalog = Catalog::builtin().expect("embedded catalog is valid");

        for kind in TowerKind::ALL {
            let stats = catalog.tower(kind).expect("every tower kind has stats");
            assert!(stats.cost > 0);
            assert!(stats.range > 0.0);
        }
        for kind in EnemyKind::ALL {
            let stats = catalog.enemy(kind).expect("every enemy kind has stats");
            assert!(stats.reward > 0);
        }
        assert_eq!(catalog.waves.len(), 5);
    }

    #[test]
    fn archer_matches_reference_stats() {
        let catalog = Catalog::builtin().expect("valid");
        let archer = catalog.tower(TowerKind::Archer).expect("archer");
        assert_eq!(archer.cost, 100);
        assert!((archer.damage - 25.0).abs() < f32::EPSILON);
        assert!((archer.range - 20.0).abs() < f32::EPSILON);
        assert!((archer.attack_speed - 1.5).abs() < f32::EPSILON);
        assert_eq!(archer.upgrades.len(), 2);
    }

    #[test]
    fn first_wave_is_ten_goblins() {
        let catalog = Catalog::builtin().expect("valid");
        let wave = catalog.wave(0).expect("wave 1");
        assert_eq!(wave.total_enemies(), 10);
        assert_eq!(wave.groups.first().map(|g| g.kind), Some(EnemyKind::Goblin));
    }

    #[test]
    fn multipliers_default_to_one() {
        let catalog = Catalog::builtin().expect("valid");
        let group = catalog.wave(0).and_then(|w| w.groups.first()).expect("group");
        assert!((group.health_multiplier - 1.0).abs() < f32::EPSILON);
        assert!((group.reward_multiplier - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn route_length_sums_segments() {
        let route = Route::new(vec![
            Vec3::ZERO,
            Vec3::new(3.0, 0.0, 4.0),
            Vec3::new(3.0, 0.0, 14.0),
        ]);
        assert!((route.length() - 15.0).abs() < 1e-5);
        assert_eq!(route.entry(), Some(Vec3::ZERO));
    }

    #[test]
    fn rejects_zero_attack_speed() {
        let mut catalog = Catalog::builtin().expect("valid");
        if let Some(archer) = catalog.towers.get_mut(&TowerKind::Archer) {
            archer.attack_speed = 0.0;
        }
        let err = catalog.validate().expect_err("zero attack speed is invalid");
        assert!(matches!(err, CatalogError::Invalid(_)));
    }

    #[test]
    fn rejects_upgrade_that_breaks_stats() {
        let broken = [
            Upgrade {
                cost: 150,
                damage_bonus: 0.0,
                range_bonus: 0.0,
                attack_speed_bonus: -5.0,
            },
            Upgrade {
                cost: 150,
                damage_bonus: 0.0,
                range_bonus: 0.0,
                attack_speed_bonus: -1.5,
            },
            Upgrade {
                cost: 150,
                damage_bonus: 0.0,
                range_bonus: -25.0,
                attack_speed_bonus: 0.0,
            },
            Upgrade {
                cost: 150,
                damage_bonus: f32::INFINITY,
                range_bonus: 0.0,
                attack_speed_bonus: 0.0,
            },
            Upgrade {
                cost: 0,
                damage_bonus: 10.0,
                range_bonus: 0.0,
                attack_speed_bonus: 0.0,
            },
        ];
        for upgrade in broken {
            let mut catalog = Catalog::builtin().expect("valid");
            if let Some(archer) = catalog.towers.get_mut(&TowerKind::Archer) {
                archer.upgrades = vec![upgrade];
            }
            let err = catalog.validate().expect_err("broken tier is invalid");
            assert!(matches!(&err, CatalogError::Invalid(m) if m.contains("level 2")), "{err}");
        }
    }

    #[test]
    fn later_tier_is_checked_against_the_running_total() {
        let mut catalog = Catalog::builtin().expect("valid");
        if let Some(archer) = catalog.towers.get_mut(&TowerKind::Archer) {
            // 1.5 + 1.0 - 3.0 < 0 only once both tiers apply.
            archer.upgrades = vec![
                Upgrade {
                    cost: 100,
                    damage_bonus: 0.0,
                    range_bonus: 0.0,
                    attack_speed_bonus: 1.0,
                },
                Upgrade {
                    cost: 100,
                    damage_bonus: 0.0,
                    range_bonus: 0.0,
                    attack_speed_bonus: -3.0,
                },
            ];
        }
        let err = catalog.validate().expect_err("third level is unusable");
        assert!(matches!(&err, CatalogError::Invalid(m) if m.contains("level 3")), "{err}");
    }

    #[test]
    fn rejects_wave_with_unknown_enemy() {
        let mut catalog = Catalog::builtin().expect("valid");
        catalog.enemies.remove(&EnemyKind::Boss);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn rejects_single_point_path() {
        let mut catalog = Catalog::builtin().expect("valid");
        catalog.path = Route::new(vec![Vec3::ZERO]);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Catalog::from_json("{ not json"),
            Err(CatalogError::Json(_))
        ));
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("archer".parse::<TowerKind>().ok(), Some(TowerKind::Archer));
        assert_eq!("TROLL".parse::<EnemyKind>().ok(), Some(EnemyKind::Troll));
        assert!("Dragon".parse::<EnemyKind>().is_err());
    }
}
