use bincode::{Decode, Encode};
use jgenesis_common::define_controller_inputs;
use jgenesis_proc_macros::{ConfigDisplay, EnumAll, EnumDisplay, EnumFromStr};

/// Lynx native frame rate is fixed by the hardware clock, not tied to a film-style 50/60 Hz
/// toggle like the other consoles in this workspace.
pub const LYNX_MASTER_CLOCK_FREQUENCY: u32 = 16_000_000;
pub const LYNX_CPU_CLOCK_FREQUENCY: u32 = 4_000_000;
pub const LYNX_CPU_CYCLES_PER_FRAME: u32 = 53_333;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, EnumDisplay, EnumFromStr, EnumAll)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(jgenesis_proc_macros::CustomValueEnum))]
pub enum LynxRotation {
    #[default]
    None,
    Left,
    Right,
}

define_controller_inputs! {
    buttons: LynxButton {
        Up -> up,
        Down -> down,
        Left -> left,
        Right -> right,
        A -> a,
        B -> b,
        Option1 -> option1,
        Option2 -> option2,
    },
    joypad: LynxJoypadState,
}

/// Configuration the host passes into `lynx-core::Core::new`.
///
/// Rotation defaults to whatever the LNX header declares; `rotation_override` lets the host force
/// a different orientation (e.g. a frontend that always wants to letterbox rather than rotate the
/// display surface).
#[derive(Debug, Clone, Encode, Decode, ConfigDisplay)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct LynxEmulatorConfig {
    #[cfg_attr(feature = "clap", arg(long))]
    pub rotation_override: Option<LynxRotation>,

    /// Mute the 12-bit LFSR audio channels without disabling the rest of Mikey; useful for
    /// headless test runs.
    #[cfg_attr(feature = "clap", arg(long, default_value_t = true))]
    pub audio_enabled: bool,
}

impl LynxEmulatorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self { rotation_override: None, audio_enabled: true }
    }
}

impl Default for LynxEmulatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_rotations_display_and_parse_round_trip() {
        for rotation in LynxRotation::ALL {
            let displayed = rotation.to_string();
            assert_eq!(displayed.parse::<LynxRotation>().unwrap(), rotation);
        }
    }

    #[test]
    fn config_display_shows_each_field() {
        let config = LynxEmulatorConfig { rotation_override: Some(LynxRotation::Left), audio_enabled: false };
        let displayed = config.to_string();
        assert!(displayed.contains("rotation_override: Left"));
        assert!(displayed.contains("audio_enabled: false"));
    }

    #[test]
    fn joypad_set_button_is_independent_per_field() {
        let mut joypad = LynxJoypadState::default();
        joypad.set_button(LynxButton::A, true);
        joypad.set_button(LynxButton::Up, true);
        assert!(joypad.a);
        assert!(joypad.up);
        assert!(!joypad.b);
        assert!(!joypad.down);
    }
}
