//! Authoritative world simulation driven by per-peer inputs

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Entity, Input, State, Vec2, ASTEROID_SIZE, BULLET_SIZE, WORLD_HEIGHT, WORLD_WIDTH};
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, PI};
use std::net::SocketAddr;
use std::time::Duration;

pub const PLAYER_TURN_RATE: f64 = 0.3;
pub const PLAYER_ACCEL: f64 = 500.0;
pub const PLAYER_MAX_SPEED: f64 = 400.0;
pub const BULLET_SPEED: f64 = 600.0;
pub const ASTEROID_SPEED: f64 = 80.0;
pub const SPAWN_POSITION: Vec2 = Vec2 { x: 80.0, y: 80.0 };

/// Peers are identified by the address their session is bound to.
pub type PeerKey = SocketAddr;

/// The game rules, as seen by the server loop.
pub trait Simulation: Send {
    fn add_entity(&mut self, key: PeerKey);

    fn remove_entity(&mut self, key: PeerKey);

    /// Steps the world by `dt` and returns the resulting frame.
    fn advance(&mut self, dt: Duration, inputs: &HashMap<PeerKey, Input>) -> State;
}

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub max_asteroids: usize,
    /// Ticks between asteroid spawns while below `max_asteroids`.
    pub asteroid_spawn_ticks: u32,
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_asteroids: 8,
            asteroid_spawn_ticks: 20,
            seed: 0x5eed,
        }
    }
}

/// Ships, bullets and asteroids on a wrapping 1920×1080 field.
pub struct World {
    config: WorldConfig,
    state: State,
    players: HashMap<PeerKey, u32>,
    next_id: u32,
    ticks: u64,
    rng: StdRng,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: State::new(),
            players: HashMap::new(),
            next_id: 1,
            ticks: 0,
            rng,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn player_id(&self, key: &PeerKey) -> Option<u32> {
        self.players.get(key).copied()
    }

    pub fn spawn_asteroid(&mut self, position: Vec2, velocity: Vec2) -> u32 {
        let id = self.allocate_id();
        let mut asteroid = Entity::new(id, position);
        asteroid.transform.velocity = velocity;
        self.state.asteroids.push(asteroid);
        id
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn maybe_spawn_asteroid(&mut self) {
        let spawn_ticks = u64::from(self.config.asteroid_spawn_ticks.max(1));
        if self.state.asteroids.len() >= self.config.max_asteroids || self.ticks % spawn_ticks != 0 {
            return;
        }

        let along = self.rng.gen_range(0.0..1.0);
        let position = match self.rng.gen_range(0..4) {
            0 => Vec2::new(along * WORLD_WIDTH, 0.0),
            1 => Vec2::new(along * WORLD_WIDTH, WORLD_HEIGHT),
            2 => Vec2::new(0.0, along * WORLD_HEIGHT),
            _ => Vec2::new(WORLD_WIDTH, along * WORLD_HEIGHT),
        };
        let velocity = Vec2::heading(self.rng.gen_range(-PI..PI)) * ASTEROID_SPEED;
        let id = self.spawn_asteroid(position, velocity);
        debug!("Spawned asteroid {} at ({:.0}, {:.0})", id, position.x, position.y);
    }

    fn move_players(&mut self, dt: f64, inputs: &HashMap<PeerKey, Input>) {
        let owners: HashMap<u32, PeerKey> = self.players.iter().map(|(k, id)| (*id, *k)).collect();
        let mut fired = Vec::new();

        for player in &mut self.state.players {
            let input = owners
                .get(&player.id)
                .and_then(|key| inputs.get(key))
                .copied()
                .unwrap_or_default();
            let transform = &mut player.transform;

            transform.rotation += PLAYER_TURN_RATE * input.turn();
            let facing = forward(transform.rotation);
            let accel = facing * (PLAYER_ACCEL * input.thrust());

            transform.position =
                transform.position + transform.velocity * dt + accel * (0.5 * dt * dt);
            transform.velocity = transform.velocity + accel * dt;
            if transform.velocity.magnitude() > PLAYER_MAX_SPEED {
                transform.velocity = transform.velocity.normalize() * PLAYER_MAX_SPEED;
            }
            transform.position = wrap(transform.position);

            if input.fires() {
                fired.push((transform.position, facing, transform.rotation));
            }
        }

        for (position, direction, rotation) in fired {
            let id = self.allocate_id();
            let mut bullet = Entity::new(id, position);
            bullet.transform.velocity = direction * BULLET_SPEED;
            bullet.transform.rotation = rotation;
            self.state.bullets.push(bullet);
        }
    }

    fn move_projectiles(&mut self, dt: f64) {
        for bullet in &mut self.state.bullets {
            bullet.transform.position = bullet.transform.position + bullet.transform.velocity * dt;
        }
        self.state.bullets.retain(|bullet| in_bounds(bullet.position()));

        for asteroid in &mut self.state.asteroids {
            let transform = &mut asteroid.transform;
            transform.position = wrap(transform.position + transform.velocity * dt);
        }
    }

    fn resolve_hits(&mut self) {
        let reach = (ASTEROID_SIZE + BULLET_SIZE) / 2.0;
        let mut spent_bullets = Vec::new();

        let bullets = &self.state.bullets;
        self.state.asteroids.retain(|asteroid| {
            let hit = bullets.iter().find(|bullet| {
                !spent_bullets.contains(&bullet.id)
                    && (bullet.position() - asteroid.position()).magnitude() < reach
            });
            match hit {
                Some(bullet) => {
                    spent_bullets.push(bullet.id);
                    false
                }
                None => true,
            }
        });

        if !spent_bullets.is_empty() {
            self.state.total_score += spent_bullets.len() as u64;
            self.state.bullets.retain(|bullet| !spent_bullets.contains(&bullet.id));
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl Simulation for World {
    fn add_entity(&mut self, key: PeerKey) {
        if self.players.contains_key(&key) {
            return;
        }
        let id = self.allocate_id();
        self.players.insert(key, id);
        self.state.players.push(Entity::new(id, SPAWN_POSITION));
        debug!("Player {} spawned for {}", id, key);
    }

    fn remove_entity(&mut self, key: PeerKey) {
        if let Some(id) = self.players.remove(&key) {
            self.state.players.retain(|player| player.id != id);
            debug!("Player {} removed for {}", id, key);
        }
    }

    fn advance(&mut self, dt: Duration, inputs: &HashMap<PeerKey, Input>) -> State {
        let dt = dt.as_secs_f64();
        self.ticks += 1;

        self.move_players(dt, inputs);
        self.move_projectiles(dt);
        self.resolve_hits();
        self.maybe_spawn_asteroid();

        self.state.clone()
    }
}

/// Direction a ship accelerates in when thrusting and fires along.
fn forward(rotation: f64) -> Vec2 {
    Vec2::heading(FRAC_PI_2 + rotation) * -1.0
}

fn in_bounds(position: Vec2) -> bool {
    (0.0..=WORLD_WIDTH).contains(&position.x) && (0.0..=WORLD_HEIGHT).contains(&position.y)
}

fn wrap(position: Vec2) -> Vec2 {
    Vec2::new(
        position.x.rem_euclid(WORLD_WIDTH),
        position.y.rem_euclid(WORLD_HEIGHT),
    )
}
