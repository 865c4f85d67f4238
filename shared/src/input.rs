//! Player input bitset, one byte on the wire

use bitflags::bitflags;

pub const INPUT_SIZE: usize = 1;

bitflags! {
    /// Keys held during one client frame. An empty set leaves the player untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Input: u8 {
        const LEFT  = 0b0000_0001;
        const DOWN  = 0b0000_0010;
        const UP    = 0b0000_0100;
        const RIGHT = 0b0000_1000;
        const SPACE = 0b0001_0000;
    }
}

impl Input {
    pub fn to_byte(self) -> u8 {
        self.bits()
    }

    pub fn from_byte(byte: u8) -> Self {
        Self::from_bits_truncate(byte)
    }

    /// Forward thrust: +1 for UP, -1 for DOWN, 0 when both or neither are held.
    pub fn thrust(self) -> f64 {
        let mut thrust = 0.0;
        if self.contains(Input::UP) {
            thrust += 1.0;
        }
        if self.contains(Input::DOWN) {
            thrust -= 1.0;
        }
        thrust
    }

    /// Turn direction: -1 for LEFT, +1 for RIGHT.
    pub fn turn(self) -> f64 {
        let mut turn = 0.0;
        if self.contains(Input::LEFT) {
            turn -= 1.0;
        }
        if self.contains(Input::RIGHT) {
            turn += 1.0;
        }
        turn
    }

    pub fn fires(self) -> bool {
        self.contains(Input::SPACE)
    }
}
