//! Suzy: the Lynx's sprite/math coprocessor. Owns the SCB chain walker, the 16x16->32
//! multiply/32-16 divide math unit, the 16-entry collision buffer, and the joystick/switches
//! latch, all addressed through the $FC00-$FCFF register window (§4.6-§4.8).
//!
//! Cart I/O (CART0/CART1/CARTDATA) lives inside this same address window on real hardware but is
//! routed straight to [`crate::cartridge::Cartridge`] by [`crate::bus::Bus`]; Suzy itself never
//! sees those three offsets.

pub mod collision;
pub mod math;
pub mod sprite;

use crate::suzy::collision::CollisionBuffer;
use crate::suzy::math::MathUnit;
use crate::suzy::sprite::SpriteEngine;
use bincode::{Decode, Encode};
use jgenesis_common::num::{GetBit, U16Ext};
use lynx_config::LynxJoypadState;

const SCBNEXT_LOW_OFFSET: u16 = 0x10;
const SCBNEXT_HIGH_OFFSET: u16 = 0x11;
const SPRGO_OFFSET: u16 = 0x91;
const SPRSYS_OFFSET: u16 = 0x92;
const PEN_PALETTE_START_OFFSET: u16 = 0xA0;
const PEN_PALETTE_END_OFFSET: u16 = 0xAF;
const JOYSTICK_OFFSET: u16 = 0xB0;
const SWITCHES_OFFSET: u16 = 0xB1;

const MATH_A_HIGH: u16 = 0xC0;
const MATH_A_LOW: u16 = 0xC1;
const MATH_B_HIGH: u16 = 0xC2;
const MATH_B_LOW: u16 = 0xC3;
const MATH_C_HIGH: u16 = 0xC4;
const MATH_C_LOW: u16 = 0xC5;
const MATH_D_HIGH: u16 = 0xC6;
const MATH_D_LOW: u16 = 0xC7;
const MATH_E: u16 = 0xC8;
const MATH_F: u16 = 0xC9;
const MATH_G: u16 = 0xCA;
const MATH_H: u16 = 0xCB;
const MATH_CONTROL_OFFSET: u16 = 0xCC;

/// Sign bit of whichever operand most recently triggered a signed multiply or divide; exposed to
/// the CPU as `SPRSYS`'s `MathSign` readout is folded into the math unit's own flags instead, so
/// this aggregate only needs to forward `MathUnit::flags`.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Suzy {
    sprites: SpriteEngine,
    math: MathUnit,
    collisions: CollisionBuffer,
    joypad: LynxJoypadState,
    switches: u8,
    sprite_go: bool,
    everon: bool,
}

impl Suzy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sprites: SpriteEngine::new(),
            math: MathUnit::default(),
            collisions: CollisionBuffer::new(),
            joypad: LynxJoypadState::default(),
            switches: 0,
            sprite_go: false,
            everon: false,
        }
    }

    pub fn reset(&mut self) {
        self.sprites.reset();
        self.math.reset();
        self.collisions.reset();
        self.sprite_go = false;
        self.everon = false;
    }

    pub fn set_joypad(&mut self, joypad: LynxJoypadState) {
        self.joypad = joypad;
    }

    #[must_use]
    pub fn collisions(&self) -> &CollisionBuffer {
        &self.collisions
    }

    /// Drain a pending `SPRGO` strike, walking the whole SCB chain into `ram` if one was
    /// requested this tick. Mirrors real hardware, where Suzy runs the chain to completion once
    /// started rather than yielding mid-sprite; the bus borrow that made this possible is set up
    /// by [`crate::bus::Bus`], which is why `ram` and `display_address` arrive as parameters
    /// instead of living on `Suzy` itself.
    pub fn service_sprite_engine(&mut self, ram: &mut [u8], display_address: u16) {
        if std::mem::take(&mut self.sprite_go) {
            self.sprites.process_sprites(ram, &mut self.collisions, display_address);
        }
    }

    #[must_use]
    pub fn read_register(&self, offset: u16) -> u8 {
        match offset {
            SCBNEXT_LOW_OFFSET => self.sprites.scb_pointer().lsb(),
            SCBNEXT_HIGH_OFFSET => self.sprites.scb_pointer().msb(),
            SPRGO_OFFSET => u8::from(self.sprite_go) | (u8::from(self.everon) << 2),
            SPRSYS_OFFSET => self.read_sprsys(),
            PEN_PALETTE_START_OFFSET..=PEN_PALETTE_END_OFFSET => 0,
            JOYSTICK_OFFSET => self.read_joystick(),
            SWITCHES_OFFSET => self.switches,
            MATH_A_HIGH => self.math.registers.a.msb(),
            MATH_A_LOW => self.math.registers.a.lsb(),
            MATH_B_HIGH => self.math.registers.b.msb(),
            MATH_B_LOW => self.math.registers.b.lsb(),
            MATH_C_HIGH => self.math.registers.c.msb(),
            MATH_C_LOW => self.math.registers.c.lsb(),
            MATH_D_HIGH => self.math.registers.d.msb(),
            MATH_D_LOW => self.math.registers.d.lsb(),
            MATH_E => (self.math.registers.efgh >> 24) as u8,
            MATH_F => (self.math.registers.efgh >> 16) as u8,
            MATH_G => (self.math.registers.efgh >> 8) as u8,
            MATH_H => self.math.registers.efgh as u8,
            MATH_CONTROL_OFFSET => self.read_math_control(),
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, offset: u16, value: u8) {
        match offset {
            SCBNEXT_LOW_OFFSET => {
                let mut ptr = self.sprites.scb_pointer();
                ptr.set_lsb(value);
                self.sprites.set_scb_pointer(ptr);
            }
            SCBNEXT_HIGH_OFFSET => {
                let mut ptr = self.sprites.scb_pointer();
                ptr.set_msb(value);
                self.sprites.set_scb_pointer(ptr);
            }
            SPRGO_OFFSET => {
                self.sprite_go = value.bit(0);
                self.everon = value.bit(2);
            }
            SPRSYS_OFFSET => self.write_sprsys(value),
            PEN_PALETTE_START_OFFSET..=PEN_PALETTE_END_OFFSET => {
                let pair = (offset - PEN_PALETTE_START_OFFSET) as usize;
                self.sprites.set_pen(pair * 2, value & 0x0F);
                self.sprites.set_pen(pair * 2 + 1, (value >> 4) & 0x0F);
            }
            SWITCHES_OFFSET => self.switches = value,
            MATH_A_HIGH => self.math.registers.a.set_msb(value),
            MATH_A_LOW => self.math.registers.a.set_lsb(value),
            MATH_B_HIGH => self.math.registers.b.set_msb(value),
            MATH_B_LOW => self.math.registers.b.set_lsb(value),
            MATH_C_HIGH => {
                self.math.registers.c.set_msb(value);
                self.trigger_multiply();
            }
            MATH_C_LOW => {
                self.math.registers.c.set_lsb(value);
                self.trigger_multiply();
            }
            MATH_D_HIGH => {
                self.math.registers.d.set_msb(value);
                self.trigger_divide();
            }
            MATH_D_LOW => {
                self.math.registers.d.set_lsb(value);
                self.trigger_divide();
            }
            MATH_CONTROL_OFFSET => self.write_math_control(value),
            _ => {}
        }
    }

    /// `SPRSYS` bit layout: bit 7 `UnsafeAccess` (write-1-to-clear), bit 6
    /// `SpriteToSpriteCollision`, bit 5 `VStretch`, bit 2 `LeftHand`, bit 1 `LastCarry`. The
    /// remaining bits are unused by this implementation's feature set and read back as 0.
    fn read_sprsys(&self) -> u8 {
        (u8::from(self.sprites.unsafe_access()) << 7)
            | (u8::from(self.sprites.sprite_to_sprite_collision()) << 6)
            | (u8::from(self.sprites.vstretch()) << 5)
            | (u8::from(self.sprites.left_hand()) << 2)
            | (u8::from(self.sprites.last_carry()) << 1)
    }

    fn write_sprsys(&mut self, value: u8) {
        if value.bit(7) {
            self.sprites.clear_unsafe_access();
        }
        self.sprites.set_vstretch(value.bit(5));
        self.sprites.set_left_hand(value.bit(2));
    }

    /// Math control bits: bit 6 `MathSign`, bit 3 `MathAccumulate`, bit 1 `MathInProgress`, bit 0
    /// `MathOverflow`.
    fn read_math_control(&self) -> u8 {
        (u8::from(self.math.flags.sign) << 6)
            | (u8::from(self.math.flags.accumulate) << 3)
            | (u8::from(self.math.flags.in_progress) << 1)
            | u8::from(self.math.flags.overflow)
    }

    fn write_math_control(&mut self, value: u8) {
        self.math.flags.sign = value.bit(6);
        self.math.flags.accumulate = value.bit(3);
    }

    fn trigger_multiply(&mut self) {
        if self.math.flags.sign {
            self.math.multiply_signed(self.math.registers.a, self.math.registers.c);
        } else {
            self.math.multiply_unsigned(self.math.registers.a, self.math.registers.c);
        }
    }

    fn trigger_divide(&mut self) {
        let dividend = (u32::from(self.math.registers.a) << 16) | u32::from(self.math.registers.b);
        if self.math.flags.sign {
            let (quotient, remainder) =
                self.math.divide_signed(dividend as i32, self.math.registers.d as i16);
            self.math.registers.efgh = quotient as u32 as u64;
            self.math.registers.b = remainder;
        } else {
            let (quotient, remainder) = self.math.divide_unsigned(dividend, self.math.registers.d);
            self.math.registers.efgh = u64::from(quotient);
            self.math.registers.b = remainder;
        }
    }

    /// Joystick byte layout mirrors `LynxButton` ordering: bits 7:4 Up/Down/Left/Right, bits 3:2
    /// Option1/Option2, bits 1:0 A/B. `LeftHand` (`SPRSYS` bit 2) swaps Left/Right and A/B to
    /// support the Lynx's reversible grip.
    fn read_joystick(&self) -> u8 {
        let (left, right) = if self.sprites.left_hand() {
            (self.joypad.right, self.joypad.left)
        } else {
            (self.joypad.left, self.joypad.right)
        };
        let (a, b) = if self.sprites.left_hand() {
            (self.joypad.b, self.joypad.a)
        } else {
            (self.joypad.a, self.joypad.b)
        };

        (u8::from(self.joypad.up) << 7)
            | (u8::from(self.joypad.down) << 6)
            | (u8::from(left) << 5)
            | (u8::from(right) << 4)
            | (u8::from(self.joypad.option1) << 3)
            | (u8::from(self.joypad.option2) << 2)
            | (u8::from(a) << 1)
            | u8::from(b)
    }
}

impl Default for Suzy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprgo_write_then_read_round_trips_go_and_everon() {
        let mut suzy = Suzy::new();
        suzy.write_register(SPRGO_OFFSET, 0b0000_0101);
        assert_eq!(suzy.read_register(SPRGO_OFFSET) & 0b0101, 0b0101);
    }

    #[test]
    fn unsigned_multiply_via_registers_lands_in_efgh() {
        let mut suzy = Suzy::new();
        suzy.write_register(MATH_A_HIGH, 0x00);
        suzy.write_register(MATH_A_LOW, 0x05);
        suzy.write_register(MATH_C_HIGH, 0x00);
        suzy.write_register(MATH_C_LOW, 0x03);
        let product = u32::from(suzy.read_register(MATH_E)) << 24
            | u32::from(suzy.read_register(MATH_F)) << 16
            | u32::from(suzy.read_register(MATH_G)) << 8
            | u32::from(suzy.read_register(MATH_H));
        assert_eq!(product, 15);
    }

    #[test]
    fn left_hand_swaps_left_right_and_a_b() {
        let mut suzy = Suzy::new();
        suzy.write_register(SPRSYS_OFFSET, 0b0000_0100);
        suzy.set_joypad(LynxJoypadState { left: true, ..Default::default() });
        assert_eq!(suzy.read_joystick() & 0b0011_0000, 0b0001_0000);
    }

    #[test]
    fn unsafe_access_clears_only_on_write_one() {
        let mut suzy = Suzy::new();
        suzy.sprites.mark_unsafe_access();
        assert_eq!(suzy.read_register(SPRSYS_OFFSET) & 0x80, 0x80);
        suzy.write_register(SPRSYS_OFFSET, 0x80);
        assert_eq!(suzy.read_register(SPRSYS_OFFSET) & 0x80, 0);
    }
}
