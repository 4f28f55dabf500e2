//! Simulation tuning.
//!
//! Static content (stats, waves, the route) lives in the `catalog` crate; this
//! module holds the knobs of the simulation itself. All fields have defaults,
//! so a config file only needs to mention what it overrides.

use catalog::{Catalog, CatalogError, EnemyKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// How projectile damage is turned into lost health.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageModel {
    /// Damage is subtracted as-is.
    #[default]
    Flat,
    /// Damage is first scaled by `100 / (100 + armor)`.
    Armor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// A projectile passing this close to its target hits it.
    pub hit_radius: f32,
    /// Projectiles are dropped after flying this far.
    pub max_travel: f32,
    /// Longest step a single tick may simulate, in seconds.
    pub max_delta: f32,
    pub damage_model: DamageModel,
    /// Keep at least this many enemies on the field, if set.
    pub replenish_floor: Option<usize>,
    /// Kinds drawn from when replenishing; duplicates weight the draw.
    pub replenish_roster: Vec<EnemyKind>,
    /// Seed for every random choice the simulation makes.
    pub seed: u64,
    pub starting_gold: u32,
    pub starting_lives: u32,
    pub min_tower_spacing: f32,
    pub max_towers: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            hit_radius: 1.0,
            max_travel: 200.0,
            max_delta: 0.25,
            damage_model: DamageModel::Flat,
            replenish_floor: None,
            replenish_roster: vec![
                EnemyKind::Goblin,
                EnemyKind::Goblin,
                EnemyKind::Orc,
                EnemyKind::Troll,
            ],
            seed: 0x5eed,
            starting_gold: 500,
            starting_lives: 20,
            min_tower_spacing: 3.0,
            max_towers: 50,
        }
    }
}

impl SimConfig {
    /// Parse a JSON config and validate it.
    ///
    /// # Errors
    /// Malformed JSON or values the simulation cannot run with.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults for missing fields.
    ///
    /// # Errors
    /// IO, parse and validation failures.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded simulation config from {}", path.display());
        Ok(config)
    }

    /// # Errors
    /// The first field found out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.hit_radius > 0.0) {
            return Err(ConfigError::Invalid("hit_radius must be positive"));
        }
        if !(self.max_travel > 0.0) {
            return Err(ConfigError::Invalid("max_travel must be positive"));
        }
        if !(self.max_delta > 0.0) {
            return Err(ConfigError::Invalid("max_delta must be positive"));
        }
        if !(self.min_tower_spacing >= 0.0) {
            return Err(ConfigError::Invalid("min_tower_spacing must be non-negative"));
        }
        if self.replenish_floor.is_some_and(|floor| floor > 0) && self.replenish_roster.is_empty()
        {
            return Err(ConfigError::Invalid(
                "replenish_roster must not be empty when replenishing",
            ));
        }
        Ok(())
    }
}

/// Content and tuning for one match: the files at the given paths, or the
/// built-in catalog and default config where a path is missing.
///
/// # Errors
/// Any failure to read, parse or validate either file.
pub fn load_setup(
    config_path: Option<&Path>,
    catalog_path: Option<&Path>,
) -> Result<(Catalog, SimConfig), ConfigError> {
    let config = match config_path {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    let catalog = match catalog_path {
        Some(path) => {
            let catalog = Catalog::from_path(path)?;
            log::info!("Loaded catalog from {}", path.display());
            catalog
        }
        None => Catalog::builtin()?,
    };
    Ok((catalog, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{ "damage_model": "Armor", "replenish_floor": 5 }"#)
            .expect("valid config");
        assert_eq!(config.damage_model, DamageModel::Armor);
        assert_eq!(config.replenish_floor, Some(5));
        assert_eq!(config.starting_lives, SimConfig::default().starting_lives);
    }

    #[test]
    fn rejects_non_positive_hit_radius() {
        let err = SimConfig::from_json(r#"{ "hit_radius": 0.0 }"#).expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_roster_with_floor() {
        let config = SimConfig {
            replenish_floor: Some(3),
            replenish_roster: Vec::new(),
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_damage_model_is_a_parse_error() {
        assert!(matches!(
            SimConfig::from_json(r#"{ "damage_model": "Magic" }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn setup_without_paths_uses_builtins() {
        let (catalog, config) = load_setup(None, None).expect("builtins load");
        assert_eq!(config, SimConfig::default());
        assert_eq!(catalog, Catalog::builtin().expect("embedded catalog is valid"));
    }

    #[test]
    fn setup_reports_a_missing_catalog() {
        let missing = Path::new("/definitely/not/here/catalog.json");
        assert!(matches!(
            load_setup(None, Some(missing)),
            Err(ConfigError::Catalog(CatalogError::Io(_)))
        ));
    }
}
