//! Keyboard sampling into the one-byte input bitset sent to the server

use log::debug;
use macroquad::prelude::*;
use shared::Input;

/// Key bindings, WASD plus arrow keys for movement and Space to fire
const BINDINGS: [(KeyCode, Input); 9] = [
    (KeyCode::A, Input::LEFT),
    (KeyCode::Left, Input::LEFT),
    (KeyCode::D, Input::RIGHT),
    (KeyCode::Right, Input::RIGHT),
    (KeyCode::W, Input::UP),
    (KeyCode::Up, Input::UP),
    (KeyCode::S, Input::DOWN),
    (KeyCode::Down, Input::DOWN),
    (KeyCode::Space, Input::SPACE),
];

/// Builds an input from whichever bound keys `is_down` reports as held
pub fn input_from_keys(is_down: impl Fn(KeyCode) -> bool) -> Input {
    BINDINGS
        .iter()
        .filter(|(key, _)| is_down(*key))
        .fold(Input::empty(), |input, (_, flag)| input | *flag)
}

/// Samples the keyboard once per frame
#[derive(Debug, Default)]
pub struct InputManager {
    current: Input,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the held keys. Every frame produces an input, changed or not.
    pub fn sample(&mut self) -> Input {
        let input = input_from_keys(is_key_down);
        if input != self.current {
            debug!("Input changed: {:?}", input);
        }
        self.current = input;
        input
    }

    pub fn current(&self) -> Input {
        self.current
    }

    pub fn quit_requested(&self) -> bool {
        is_key_pressed(KeyCode::Escape)
    }
}
