//! Authoritative world state and the interpolation helpers the client blends it with

use crate::error::MessageError;
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};

/// Upper bound for a decoded state body.
const MAX_STATE_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` radians.
    pub fn heading(angle: f64) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    pub fn magnitude(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn normalize(self) -> Self {
        let length = self.magnitude();
        if length == 0.0 {
            return self;
        }
        Self {
            x: self.x / length,
            y: self.y / length,
        }
    }

    pub fn lerp(self, other: Vec2, t: f64) -> Self {
        Self {
            x: lerp(self.x, other.x, t),
            y: lerp(self.y, other.y, t),
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f64,
}

impl Transform {
    pub fn lerp(&self, other: &Transform, t: f64) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            velocity: self.velocity.lerp(other.velocity, t),
            rotation: lerp_angle(self.rotation, other.rotation, t),
        }
    }
}

/// Anything in the world. `id` is assigned once by the simulation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Entity {
    pub id: u32,
    pub transform: Transform,
}

impl Entity {
    pub fn new(id: u32, position: Vec2) -> Self {
        Self {
            id,
            transform: Transform {
                position,
                ..Transform::default()
            },
        }
    }

    pub fn position(&self) -> Vec2 {
        self.transform.position
    }
}

/// One authoritative frame. Each entity list is kept sorted by ID.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    pub players: Vec<Entity>,
    pub bullets: Vec<Entity>,
    pub asteroids: Vec<Entity>,
    pub total_score: u64,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_count(&self) -> usize {
        self.players.len() + self.bullets.len() + self.asteroids.len()
    }

    /// Restores ID order, e.g. after decoding a state built by another implementation.
    pub fn normalize(&mut self) {
        self.players.sort_by_key(|entity| entity.id);
        self.bullets.sort_by_key(|entity| entity.id);
        self.asteroids.sort_by_key(|entity| entity.id);
    }

    /// Blends `self` toward `other` by `t`, matching entities by stable ID.
    ///
    /// `t <= 0` yields `self` and `t >= 1` yields `other` exactly. In between, entities present
    /// in both frames are interpolated, entities missing from `other` keep their current value,
    /// and entities that only exist in `other` are left out until a later frame.
    pub fn merge_interpolate(&self, other: &State, t: f64) -> State {
        if t <= 0.0 {
            return self.clone();
        }
        if t >= 1.0 {
            return other.clone();
        }

        State {
            players: merge_entities(&self.players, &other.players, t),
            bullets: merge_entities(&self.bullets, &other.bullets, t),
            asteroids: merge_entities(&self.asteroids, &other.asteroids, t),
            total_score: self.total_score,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        Ok(codec().serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<State, MessageError> {
        let mut state: State = codec().deserialize(bytes)?;
        state.normalize();
        Ok(state)
    }
}

/// Big-endian, fixed-width integers: `u64` list lengths and raw `u32`/`f64` fields.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
        .with_limit(MAX_STATE_BYTES)
}

/// Two-pointer merge over ID-sorted lists.
fn merge_entities(prev: &[Entity], next: &[Entity], t: f64) -> Vec<Entity> {
    let mut merged = Vec::with_capacity(prev.len());
    let mut j = 0;

    for entity in prev {
        while j < next.len() && next[j].id < entity.id {
            j += 1;
        }

        match next.get(j) {
            Some(target) if target.id == entity.id => {
                merged.push(Entity {
                    id: entity.id,
                    transform: entity.transform.lerp(&target.transform, t),
                });
                j += 1;
            }
            _ => merged.push(*entity),
        }
    }

    merged
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }
    a + (b - a) * t
}

/// Interpolates between two angles along the shorter arc.
///
/// Blends the unit vectors `(cos, sin)` and takes `atan2` of the result, so crossing the ±π seam
/// does not swing through zero.
pub fn lerp_angle(a: f64, b: f64, t: f64) -> f64 {
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }

    let x = lerp(a.cos(), b.cos(), t);
    let y = lerp(a.sin(), b.sin(), t);
    if x.hypot(y) < 1e-9 {
        // exactly opposite angles at the midpoint
        return wrap_angle(a + wrap_angle(b - a) * t);
    }
    y.atan2(x)
}

/// Maps an angle into `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn entity(id: u32, x: f64, y: f64, rotation: f64) -> Entity {
        Entity {
            id,
            transform: Transform {
                position: Vec2::new(x, y),
                velocity: Vec2::ZERO,
                rotation,
            },
        }
    }

    #[test]
    fn test_lerp_boundaries() {
        assert_eq!(lerp(2.0, 10.0, -0.5), 2.0);
        assert_eq!(lerp(2.0, 10.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 10.0, 1.0), 10.0);
        assert_eq!(lerp(2.0, 10.0, 3.0), 10.0);
        assert_approx_eq!(lerp(2.0, 10.0, 0.25), 4.0);
    }

    #[test]
    fn test_lerp_angle_short_arc() {
        let mid = lerp_angle(-3.0, 3.0, 0.5);
        assert!(mid.abs() > 3.0, "went through zero: {mid}");
        assert_approx_eq!(mid.abs(), PI, 1e-6);
    }

    #[test]
    fn test_lerp_angle_small_step() {
        assert_approx_eq!(lerp_angle(0.0, 1.0, 0.5), 0.5, 1e-9);
        assert_approx_eq!(lerp_angle(0.1, -0.1, 0.5), 0.0, 1e-9);
    }

    #[test]
    fn test_lerp_angle_opposite() {
        let mid = lerp_angle(0.0, PI, 0.5);
        assert_approx_eq!(mid.abs(), PI / 2.0, 1e-9);
    }

    #[test]
    fn test_wrap_angle() {
        assert_eq!(wrap_angle(PI), PI);
        assert_approx_eq!(wrap_angle(-PI / 2.0), -PI / 2.0, 1e-9);
        assert_approx_eq!(wrap_angle(2.0 * PI + 0.5), 0.5, 1e-9);
    }

    #[test]
    fn test_merge_interpolate_boundaries_are_exact() {
        let prev = State {
            players: vec![entity(1, 0.0, 0.0, 0.0)],
            ..State::default()
        };
        let next = State {
            players: vec![entity(1, 10.0, 20.0, 1.0), entity(2, 5.0, 5.0, 0.0)],
            total_score: 3,
            ..State::default()
        };

        assert_eq!(prev.merge_interpolate(&next, 0.0), prev);
        assert_eq!(prev.merge_interpolate(&next, -1.0), prev);
        assert_eq!(prev.merge_interpolate(&next, 1.0), next);
        assert_eq!(prev.merge_interpolate(&next, 7.5), next);
    }

    #[test]
    fn test_merge_interpolate_matches_by_id() {
        let prev = State {
            players: vec![entity(1, 0.0, 0.0, 0.0), entity(4, 100.0, 100.0, 0.0)],
            bullets: vec![entity(2, 0.0, 0.0, 0.0), entity(3, 50.0, 0.0, 0.0)],
            ..State::default()
        };
        let next = State {
            players: vec![entity(1, 10.0, 20.0, 0.0)],
            bullets: vec![entity(3, 60.0, 0.0, 0.0), entity(5, 0.0, 0.0, 0.0)],
            ..State::default()
        };

        let mid = prev.merge_interpolate(&next, 0.5);

        assert_eq!(mid.players.len(), 2);
        assert_approx_eq!(mid.players[0].position().x, 5.0);
        assert_approx_eq!(mid.players[0].position().y, 10.0);
        // gone from the newer frame: left where it was
        assert_eq!(mid.players[1], prev.players[1]);

        let bullet_ids: Vec<u32> = mid.bullets.iter().map(|b| b.id).collect();
        assert_eq!(bullet_ids, vec![2, 3]);
        assert_eq!(mid.bullets[0], prev.bullets[0]);
        assert_approx_eq!(mid.bullets[1].position().x, 55.0);
    }

    #[test]
    fn test_state_encoding_layout() {
        let state = State {
            players: vec![entity(7, 1.0, 2.0, 0.5)],
            ..State::default()
        };
        let bytes = state.encode().unwrap();

        // u64 count, then id u32 + 5 f64 per entity, two more empty lists, u64 score
        assert_eq!(bytes.len(), 8 + (4 + 5 * 8) + 8 + 8 + 8);
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 7]);
        assert_eq!(&bytes[12..20], &1.0f64.to_be_bytes());
    }

    #[test]
    fn test_state_decode_roundtrip_restores_order() {
        let state = State {
            players: vec![entity(9, 1.0, 1.0, 0.0), entity(2, 3.0, 3.0, 0.0)],
            asteroids: vec![entity(4, 300.0, 200.0, -1.0)],
            total_score: 12,
            ..State::default()
        };

        let decoded = State::decode(&state.encode().unwrap()).unwrap();
        let ids: Vec<u32> = decoded.players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 9]);
        assert_eq!(decoded.asteroids, state.asteroids);
        assert_eq!(decoded.total_score, 12);
    }

    #[test]
    fn test_state_decode_rejects_garbage() {
        assert!(State::decode(&[0, 0, 0]).is_err());
        assert!(State::decode(&[0xff; 16]).is_err());
    }

    #[test]
    fn test_vec2_ops() {
        let v = Vec2::new(3.0, 4.0);
        assert_eq!(v.magnitude(), 5.0);
        assert_approx_eq!(v.normalize().x, 0.6);
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
        assert_eq!(v + Vec2::new(1.0, 1.0), Vec2::new(4.0, 5.0));
        assert_eq!(v * 2.0, Vec2::new(6.0, 8.0));
        assert_approx_eq!(Vec2::heading(PI / 2.0).y, 1.0);
    }
}
