//! Combat math: damage models, target selection, hit detection.
//!
//! Pure functions only; the tick driver in [`super`] decides when to call them.

use crate::config::DamageModel;
use crate::ecs::{EntityId, TargetPriority};
use glam::Vec3;

/// Subtract `damage` from `health`, never going below zero.
pub fn apply_damage(health: f32, damage: f32) -> f32 {
    (health - damage.max(0.0)).max(0.0)
}

/// Damage left after armor: `base * (1 - armor / (armor + 100))`.
pub fn calculate_damage(base: f32, armor: f32) -> f32 {
    let armor = armor.max(0.0);
    base * (1.0 - armor / (armor + 100.0))
}

/// Damage a projectile deals to a target under the session's damage model.
pub fn effective_damage(model: DamageModel, base: f32, armor: f32) -> f32 {
    match model {
        DamageModel::Flat => base,
        DamageModel::Armor => calculate_damage(base, armor),
    }
}

/// What targeting needs to know about an enemy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: EntityId,
    pub position: Vec3,
    pub health: f32,
    pub travelled: f32,
}

/// Pick the best candidate strictly inside `range` of `origin`.
///
/// Lower score wins and only a strictly lower score replaces the current best,
/// so among equal scores the first candidate in `candidates` is chosen.
pub fn select_target(
    origin: Vec3,
    range: f32,
    priority: TargetPriority,
    candidates: &[Candidate],
) -> Option<EntityId> {
    let mut best: Option<(f32, EntityId)> = None;

    for candidate in candidates {
        let distance = origin.distance(candidate.position);
        if distance >= range {
            continue;
        }
        let score = match priority {
            TargetPriority::Closest => distance,
            TargetPriority::First => -candidate.travelled,
            TargetPriority::Last => candidate.travelled,
            TargetPriority::Strongest => -candidate.health,
            TargetPriority::Weakest => candidate.health,
        };
        if best.is_none_or(|(best_score, _)| score < best_score) {
            best = Some((score, candidate.id));
        }
    }

    best.map(|(_, id)| id)
}

/// Shortest distance from `point` to the segment `start..end`.
pub fn segment_distance(start: Vec3, end: Vec3, point: Vec3) -> f32 {
    let segment = end - start;
    let length_sq = segment.length_squared();
    if length_sq <= f32::EPSILON {
        return start.distance(point);
    }
    let t = ((point - start).dot(segment) / length_sq).clamp(0.0, 1.0);
    (start + segment * t).distance(point)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u64, x: f32, health: f32, travelled: f32) -> Candidate {
        Candidate {
            id: EntityId(id),
            position: Vec3::new(x, 0.0, 0.0),
            health,
            travelled,
        }
    }

    #[test]
    fn flat_damage_subtracts() {
        assert!((apply_damage(100.0, 30.0) - 70.0).abs() < f32::EPSILON);
    }

    #[test]
    fn flat_damage_clamps_at_zero() {
        assert!(apply_damage(20.0, 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn negative_damage_never_heals() {
        assert!((apply_damage(50.0, -10.0) - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn armor_reduces_damage() {
        let damage = calculate_damage(100.0, 10.0);
        assert!((damage - 100.0 * (1.0 - 10.0 / 110.0)).abs() < 1e-4);
        assert!((damage - 90.91).abs() < 0.01);
    }

    #[test]
    fn zero_armor_is_full_damage() {
        assert!((calculate_damage(42.0, 0.0) - 42.0).abs() < f32::EPSILON);
    }

    #[test]
    fn model_switches_formula() {
        assert!((effective_damage(DamageModel::Flat, 100.0, 10.0) - 100.0).abs() < f32::EPSILON);
        assert!(effective_damage(DamageModel::Armor, 100.0, 10.0) < 100.0);
    }

    #[test]
    fn closest_in_range_wins() {
        let candidates = [candidate(1, 15.0, 100.0, 0.0), candidate(2, 5.0, 100.0, 0.0)];
        assert_eq!(
            select_target(Vec3::ZERO, 20.0, TargetPriority::Closest, &candidates),
            Some(EntityId(2))
        );
    }

    #[test]
    fn range_is_strict() {
        let candidates = [candidate(1, 20.0, 100.0, 0.0)];
        assert_eq!(
            select_target(Vec3::ZERO, 20.0, TargetPriority::Closest, &candidates),
            None
        );
    }

    #[test]
    fn equal_distance_tie_goes_to_first_candidate() {
        let candidates = [candidate(7, 10.0, 100.0, 0.0), candidate(3, -10.0, 100.0, 0.0)];
        assert_eq!(
            select_target(Vec3::ZERO, 20.0, TargetPriority::Closest, &candidates),
            Some(EntityId(7))
        );
    }

    #[test]
    fn priorities_rank_differently() {
        let candidates = [
            candidate(1, 2.0, 300.0, 10.0),
            candidate(2, 8.0, 50.0, 40.0),
            candidate(3, 30.0, 10.0, 90.0), // out of range
        ];
        let pick = |priority| select_target(Vec3::ZERO, 20.0, priority, &candidates);
        assert_eq!(pick(TargetPriority::First), Some(EntityId(2)));
        assert_eq!(pick(TargetPriority::Last), Some(EntityId(1)));
        assert_eq!(pick(TargetPriority::Strongest), Some(EntityId(1)));
        assert_eq!(pick(TargetPriority::Weakest), Some(EntityId(2)));
    }

    #[test]
    fn segment_distance_catches_pass_through() {
        // Fast projectile jumps from one side of the target to the other.
        let distance = segment_distance(
            Vec3::new(-5.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(0.0, 0.5, 0.0),
        );
        assert!((distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn segment_distance_of_point_segment() {
        let distance = segment_distance(Vec3::ZERO, Vec3::ZERO, Vec3::new(3.0, 4.0, 0.0));
        assert!((distance - 5.0).abs() < 1e-6);
    }
}
