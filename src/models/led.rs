use serde::{Deserialize, Serialize};
use strum::Display;

/// Single-character command understood by the LED firmware.
///
/// The LED is wired active-low, so `On` is sent as `'0'` and `Off` as `'1'`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum LedCommand {
    On,
    Off,
}

impl LedCommand {
    pub fn as_char(self) -> char {
        match self {
            LedCommand::On => '0',
            LedCommand::Off => '1',
        }
    }

    /// Command matching the new position of the send toggle.
    pub fn for_toggle(pressed: bool) -> Self {
        if pressed {
            LedCommand::On
        } else {
            LedCommand::Off
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_ascii_digits() {
        assert_eq!(LedCommand::On.as_char() as u8, 0x30);
        assert_eq!(LedCommand::Off.as_char() as u8, 0x31);
    }

    #[test]
    fn pressed_toggle_turns_led_on() {
        assert_eq!(LedCommand::for_toggle(true), LedCommand::On);
        assert_eq!(LedCommand::for_toggle(false), LedCommand::Off);
    }
}
