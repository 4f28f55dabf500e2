//! Wave schedule: which enemies are due and when a wave is over.

use catalog::{EnemyKind, WaveSpec};
use serde::{Deserialize, Serialize};

/// One enemy the active wave wants on the field now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Release {
    pub wave: u32,
    pub kind: EnemyKind,
    pub health_multiplier: f32,
    pub reward_multiplier: f32,
}

/// Result of asking for the next wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveStart {
    Started(u32),
    /// A wave is still running.
    Busy,
    /// Every wave has been played.
    Exhausted,
}

/// Progress shown to players.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveStatus {
    /// Number of the most recently started wave, 0 before the first.
    pub current: u32,
    pub total: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveWave {
    number: u32,
    elapsed: f32,
    /// Enemies released so far, per group.
    released: Vec<u32>,
    alive: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveDirector {
    started: u32,
    active: Option<ActiveWave>,
}

impl WaveDirector {
    pub fn start_next(&mut self, waves: &[WaveSpec]) -> WaveStart {
        if self.active.is_some() {
            return WaveStart::Busy;
        }
        let Some(spec) = waves.get(self.started as usize) else {
            return WaveStart::Exhausted;
        };
        self.started += 1;
        self.active = Some(ActiveWave {
            number: self.started,
            elapsed: 0.0,
            released: vec![0; spec.groups.len()],
            alive: 0,
        });
        WaveStart::Started(self.started)
    }

    /// Advance the wave clock and return every enemy that became due.
    ///
    /// Each group releases its first enemy immediately, then one every
    /// `interval` seconds.
    pub fn advance(&mut self, dt: f32, waves: &[WaveSpec]) -> Vec<Release> {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        let Some(spec) = waves.get(active.number as usize - 1) else {
            return Vec::new();
        };
        active.elapsed += dt;

        let mut due = Vec::new();
        for (group, released) in spec.groups.iter().zip(active.released.iter_mut()) {
            let target = if group.interval > 0.0 {
                let ticks = (active.elapsed / group.interval).floor() as u32;
                group.count.min(ticks.saturating_add(1))
            } else {
                group.count
            };
            while *released < target {
                *released += 1;
                due.push(Release {
                    wave: active.number,
                    kind: group.kind,
                    health_multiplier: group.health_multiplier,
                    reward_multiplier: group.reward_multiplier,
                });
            }
        }
        active.alive += u32::try_from(due.len()).unwrap_or(u32::MAX);
        due
    }

    /// Account for an enemy of `wave` leaving the field, by death or leak.
    pub fn enemy_removed(&mut self, wave: Option<u32>) {
        if let Some(active) = self.active.as_mut()
            && wave == Some(active.number)
        {
            active.alive = active.alive.saturating_sub(1);
        }
    }

    /// A spawned enemy never made it onto the field.
    pub fn release_failed(&mut self, wave: u32) {
        self.enemy_removed(Some(wave));
    }

    /// Close the active wave if it is fully released and fully removed.
    /// Returns its number and whether it was the last one.
    pub fn poll_cleared(&mut self, waves: &[WaveSpec]) -> Option<(u32, bool)> {
        let active = self.active.as_ref()?;
        let spec = waves.get(active.number as usize - 1)?;
        let all_released = spec
            .groups
            .iter()
            .zip(&active.released)
            .all(|(group, released)| *released >= group.count);
        if !all_released || active.alive > 0 {
            return None;
        }
        let number = active.number;
        self.active = None;
        Some((number, number as usize >= waves.len()))
    }

    pub fn status(&self, waves: &[WaveSpec]) -> WaveStatus {
        WaveStatus {
            current: self.started,
            total: u32::try_from(waves.len()).unwrap_or(u32::MAX),
            active: self.active.is_some(),
        }
    }
}
