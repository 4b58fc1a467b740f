//! Process-wide state: global flags, the registry and the UI position.

use crate::bank::{BankSlot, Registry};
use crate::sensor::Sensors;
use crate::ui::UiState;

/// Velocity profile. Harder profiles reach full velocity with less force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    Soft = 0,
    #[default]
    Medium = 1,
    Hard = 2,
}

impl Profile {
    pub const COUNT: u8 = 3;

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Profile::Soft),
            1 => Some(Profile::Medium),
            2 => Some(Profile::Hard),
            _ => None,
        }
    }

    /// Step by `delta` with wrap-around.
    pub fn step(self, delta: i8) -> Self {
        let v = (self as i16 + delta as i16).rem_euclid(Self::COUNT as i16) as u8;
        Self::from_u8(v).unwrap_or_default()
    }
}

/// Highest value of the MIDI channel setting. 0 means all channels.
pub const MAX_CHANNEL_SETTING: u8 = 16;

/// Global settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub uart_enabled: bool,
    /// 0 = broadcast on all channels, 1..=16 = that channel.
    pub midi_channel: u8,
    pub velocity_profile: Profile,
    pub kick_velocity_profile: Profile,
    pub cc_enabled: bool,
    pub kick_enabled: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            uart_enabled: false,
            midi_channel: 10,
            velocity_profile: Profile::Medium,
            kick_velocity_profile: Profile::Medium,
            cc_enabled: true,
            kick_enabled: true,
        }
    }
}

/// Everything that is persisted: flags plus the mapping table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub flags: Flags,
    pub registry: Registry,
}

/// The single owner of all mutable controller state.
#[derive(Debug, Clone, Default)]
pub struct SystemState {
    pub config: Config,
    pub ui: UiState,
}

impl SystemState {
    pub fn new(config: Config) -> Self {
        SystemState {
            config,
            ui: UiState::default(),
        }
    }

    pub fn flags(&self) -> &Flags {
        &self.config.flags
    }

    pub fn active(&self) -> BankSlot {
        self.ui.active()
    }

    /// Reapply the active bank/slot to the live sensors.
    pub fn reactivate(&self, sensors: &mut Sensors) {
        self.config.registry.activate(self.active(), sensors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_wraps() {
        assert_eq!(Profile::Hard.step(1), Profile::Soft);
        assert_eq!(Profile::Soft.step(-1), Profile::Hard);
        assert_eq!(Profile::Medium.step(1), Profile::Hard);
        assert_eq!(Profile::from_u8(3), None);
    }
}
