use macroquad::prelude::*;
use shared::{Entity, State, ASTEROID_SIZE, BULLET_SIZE, PLAYER_SIZE, WORLD_HEIGHT, WORLD_WIDTH};

/// Maps world coordinates onto the window, preserving the aspect ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Viewport {
    /// Largest centered viewport showing the whole world inside `width` x `height`
    pub fn fit(width: f32, height: f32) -> Self {
        let scale = (width / WORLD_WIDTH as f32).min(height / WORLD_HEIGHT as f32);
        Self {
            scale,
            offset_x: (width - WORLD_WIDTH as f32 * scale) / 2.0,
            offset_y: (height - WORLD_HEIGHT as f32 * scale) / 2.0,
        }
    }

    pub fn to_screen(&self, position: shared::Vec2) -> Vec2 {
        vec2(
            self.offset_x + position.x as f32 * self.scale,
            self.offset_y + position.y as f32 * self.scale,
        )
    }

    pub fn length(&self, world_length: f64) -> f32 {
        world_length as f32 * self.scale
    }
}

/// Screen-space unit vector a ship with `rotation` points along; rotation 0 faces up.
fn facing(rotation: f64) -> Vec2 {
    vec2(rotation.sin() as f32, -(rotation.cos() as f32))
}

pub struct Renderer {
    background: Color,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            background: Color::from_rgba(10, 10, 20, 255),
        }
    }

    /// Draws one frame. `None` means no snapshot has arrived yet.
    pub fn render(&mut self, state: Option<&State>, connected: bool) {
        clear_background(self.background);
        let viewport = Viewport::fit(screen_width(), screen_height());

        draw_rectangle_lines(
            viewport.offset_x,
            viewport.offset_y,
            viewport.length(WORLD_WIDTH),
            viewport.length(WORLD_HEIGHT),
            1.0,
            DARKGRAY,
        );

        let Some(state) = state else {
            let message = if connected { "Waiting for server..." } else { "Disconnected" };
            draw_text(message, 20.0, 40.0, 32.0, WHITE);
            return;
        };

        for asteroid in &state.asteroids {
            self.draw_asteroid(&viewport, asteroid);
        }
        for bullet in &state.bullets {
            let center = viewport.to_screen(bullet.position());
            draw_circle(center.x, center.y, viewport.length(BULLET_SIZE / 2.0), YELLOW);
        }
        for player in &state.players {
            self.draw_player(&viewport, player);
        }

        self.draw_hud(state, connected);
    }

    fn draw_player(&mut self, viewport: &Viewport, player: &Entity) {
        let center = viewport.to_screen(player.position());
        let forward = facing(player.transform.rotation);
        let side = vec2(-forward.y, forward.x);
        let half = viewport.length(PLAYER_SIZE / 2.0);

        let nose = center + forward * half;
        let left = center - forward * half + side * (half * 0.7);
        let right = center - forward * half - side * (half * 0.7);

        draw_triangle(nose, left, right, player_color(player.id));
        draw_triangle_lines(nose, left, right, 2.0, WHITE);
    }

    fn draw_asteroid(&mut self, viewport: &Viewport, asteroid: &Entity) {
        let center = viewport.to_screen(asteroid.position());
        let radius = viewport.length(ASTEROID_SIZE / 2.0);
        draw_poly(
            center.x,
            center.y,
            7,
            radius,
            asteroid.transform.rotation.to_degrees() as f32,
            Color::from_rgba(110, 100, 90, 255),
        );
        draw_poly_lines(
            center.x,
            center.y,
            7,
            radius,
            asteroid.transform.rotation.to_degrees() as f32,
            1.5,
            LIGHTGRAY,
        );
    }

    fn draw_hud(&mut self, state: &State, connected: bool) {
        let score = format!("Score {}", state.total_score);
        draw_text(&score, 20.0, 30.0, 28.0, WHITE);

        let players = format!("{} players", state.players.len());
        draw_text(&players, 20.0, 55.0, 20.0, LIGHTGRAY);

        let status_color = if connected { GREEN } else { RED };
        draw_circle(screen_width() - 20.0, 20.0, 6.0, status_color);
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn player_color(id: u32) -> Color {
    match id % 6 {
        0 => Color::from_rgba(0, 255, 255, 255),
        1 => GREEN,
        2 => ORANGE,
        3 => MAGENTA,
        4 => SKYBLUE,
        _ => PINK,
    }
}
