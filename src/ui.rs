//! UI / rendering helpers.
//!
//! This module owns everything that depends on `egui` for presentation. It
//! maps the ground plane (world `x`, `z`) to screen space and decides how each
//! entity kind looks; no game logic lives here.

use crate::ecs::{EntityId, Tower};
use catalog::{EnemyKind, TowerKind};
use egui::{Color32, Pos2, Rect, pos2};
use glam::{Vec2, Vec3};

pub const BACKGROUND: Color32 = Color32::from_rgb(24, 32, 24);
pub const PATH_COLOR: Color32 = Color32::from_rgb(120, 96, 64);
pub const PROJECTILE_COLOR: Color32 = Color32::from_rgb(255, 240, 160);
pub const RANGE_COLOR: Color32 = Color32::from_rgba_premultiplied(80, 80, 80, 80);

/// Visual representation of one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub character: &'static str,
    pub color: Color32,
    /// World units.
    pub radius: f32,
}

pub fn tower_glyph(kind: TowerKind) -> Glyph {
    match kind {
        TowerKind::Archer => Glyph {
            character: "A",
            color: Color32::from_rgb(90, 160, 90),
            radius: 1.4,
        },
        TowerKind::Mage => Glyph {
            character: "M",
            color: Color32::from_rgb(110, 110, 220),
            radius: 1.4,
        },
        TowerKind::Cannon => Glyph {
            character: "C",
            color: Color32::from_rgb(150, 150, 150),
            radius: 1.6,
        },
    }
}

pub fn enemy_glyph(kind: EnemyKind) -> Glyph {
    match kind {
        EnemyKind::Goblin => Glyph {
            character: "g",
            color: Color32::from_rgb(120, 200, 60),
            radius: 0.8,
        },
        EnemyKind::Orc => Glyph {
            character: "o",
            color: Color32::from_rgb(60, 140, 60),
            radius: 1.0,
        },
        EnemyKind::Troll => Glyph {
            character: "T",
            color: Color32::from_rgb(140, 110, 90),
            radius: 1.3,
        },
        EnemyKind::Boss => Glyph {
            character: "B",
            color: Color32::from_rgb(200, 40, 40),
            radius: 1.8,
        },
    }
}

/// Red when empty, green when full.
pub fn health_color(fraction: f32) -> Color32 {
    let f = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Color32::from_rgb(((1.0 - f) * 220.0) as u8, (f * 200.0) as u8, 40)
}

/// First tower within `radius` of `point`, in creation order.
pub fn pick_tower(towers: &[Tower], point: Vec3, radius: f32) -> Option<EntityId> {
    towers
        .iter()
        .find(|tower| tower.position.distance(point) <= radius)
        .map(|tower| tower.id)
}

/// Ground-plane bounds of `waypoints` grown by `margin` on every side.
pub fn route_bounds(waypoints: &[Vec3], margin: f32) -> (Vec2, Vec2) {
    if waypoints.is_empty() {
        return (Vec2::splat(-margin), Vec2::splat(margin));
    }
    let (min, max) = waypoints.iter().fold(
        (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
        |(min, max), point| {
            let flat = Vec2::new(point.x, point.z);
            (min.min(flat), max.max(flat))
        },
    );
    (min - margin, max + margin)
}

// ---------------------------------------------------------------------------
// Viewport
// ---------------------------------------------------------------------------

/// Uniform-scale mapping between the ground plane and a screen rectangle.
/// World `x` runs right, world `z` runs down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    origin: Pos2,
    min: Vec2,
    scale: f32,
}

impl Viewport {
    /// Largest view of `min..max` that fits in `screen`, centred.
    pub fn fit(screen: Rect, min: Vec2, max: Vec2) -> Self {
        let size = (max - min).max(Vec2::splat(f32::EPSILON));
        let scale = (screen.width() / size.x)
            .min(screen.height() / size.y)
            .max(f32::EPSILON);
        let used = size * scale;
        let center = screen.center();
        Self {
            origin: pos2(center.x - used.x / 2.0, center.y - used.y / 2.0),
            min,
            scale,
        }
    }

    pub fn to_screen(&self, world: Vec3) -> Pos2 {
        pos2(
            self.origin.x + (world.x - self.min.x) * self.scale,
            self.origin.y + (world.z - self.min.y) * self.scale,
        )
    }

    /// Point on the ground plane (`y = 0`) under `screen`.
    pub fn to_world(&self, screen: Pos2) -> Vec3 {
        Vec3::new(
            self.min.x + (screen.x - self.origin.x) / self.scale,
            0.0,
            self.min.y + (screen.y - self.origin.y) / self.scale,
        )
    }

    /// Screen length of a world distance.
    pub fn length(&self, world: f32) -> f32 {
        world * self.scale
    }
}
