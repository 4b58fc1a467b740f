//! Button-driven user interface.
//!
//! Three levels:
//!
//! - `Main`: button 1 cycles banks, buttons 2-5 pick a slot. Long press on button 1 opens
//!   `Settings`, double click arms `EditBank`.
//! - `Settings`: button 1 moves the cursor, buttons 2/3 change the value, button 4 leaves,
//!   button 5 saves.
//! - `EditBank`: the first sensor hit gets selected, buttons 2/3 shift its note by a semitone
//!   (click) or an octave (long press), button 4 leaves.

use crate::bank::BankSlot;
use crate::led::{self, Color, Cycles, LedIndicator};
use crate::sensor::{SensorId, Sensors};
use crate::state::{SystemState, MAX_CHANNEL_SETTING};

/// Colors of the four slots.
pub const SLOT_COLORS: [Color; 4] = [led::RED, led::GREEN, led::BLUE, led::CYAN];
const SETTINGS_COLOR: Color = led::WHITE;
const ARMED_COLOR: Color = led::MAGENTA;
const SELECTED_COLOR: Color = led::YELLOW;
pub(crate) const SAVED_COLOR: Color = led::GREEN;

const INFO_BLINK_MS: u32 = 400;
const ARMED_BLINK_MS: u32 = 500;
pub(crate) const FAST_BLINK_MS: u32 = 100;
pub(crate) const SAVED_BLINKS: u16 = 5;

const SEMITONE: i8 = 1;
const OCTAVE: i8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceLevel {
    #[default]
    Main,
    Settings,
    EditBank,
}

/// Entries of the settings menu, in cursor order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsItem {
    Channel,
    UartEnabled,
    KickEnabled,
    CcEnabled,
    VelocityProfile,
    KickVelocityProfile,
}

impl SettingsItem {
    pub const COUNT: u8 = 6;
    const ALL: [SettingsItem; Self::COUNT as usize] = [
        SettingsItem::Channel,
        SettingsItem::UartEnabled,
        SettingsItem::KickEnabled,
        SettingsItem::CcEnabled,
        SettingsItem::VelocityProfile,
        SettingsItem::KickVelocityProfile,
    ];

    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index % Self::COUNT) as usize]
    }
}

/// Physical buttons, left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    B1,
    B2,
    B3,
    B4,
    B5,
}

impl Button {
    pub const ALL: [Button; 5] = [Button::B1, Button::B2, Button::B3, Button::B4, Button::B5];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Click,
    DoubleClick,
    LongPress,
    LongRelease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub gesture: Gesture,
}

impl ButtonEvent {
    pub fn new(button: Button, gesture: Gesture) -> Self {
        ButtonEvent { button, gesture }
    }
}

/// Work the UI asks its owner to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    None,
    /// Write the configuration to the persistent store.
    Persist,
}

/// Where the interface is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UiState {
    level: InterfaceLevel,
    active: BankSlot,
    settings_index: u8,
    selected_sensor: Option<SensorId>,
}

impl UiState {
    pub fn level(&self) -> InterfaceLevel {
        self.level
    }

    pub fn active(&self) -> BankSlot {
        self.active
    }

    pub fn settings_item(&self) -> SettingsItem {
        SettingsItem::from_index(self.settings_index)
    }

    pub fn settings_index(&self) -> u8 {
        self.settings_index
    }

    pub fn selected_sensor(&self) -> Option<SensorId> {
        self.selected_sensor
    }
}

/// Show the active bank/slot: slot color, blinking once per bank number.
pub fn show_bank_slot(at: BankSlot, led: &mut LedIndicator, now_ms: u64) {
    let color = SLOT_COLORS[at.slot() as usize];
    led.on(color);
    led.blink(
        color,
        Cycles::Count(at.bank() as u16 + 1),
        INFO_BLINK_MS,
        true,
        now_ms,
    );
}

fn show_settings_cursor(index: u8, led: &mut LedIndicator, now_ms: u64) {
    led.on(SETTINGS_COLOR);
    led.blink(
        SETTINGS_COLOR,
        Cycles::Count(index as u16 + 1),
        INFO_BLINK_MS,
        true,
        now_ms,
    );
}

/// Interpret one button event against the current interface level.
pub fn handle_button(
    state: &mut SystemState,
    sensors: &mut Sensors,
    led: &mut LedIndicator,
    event: ButtonEvent,
    now_ms: u64,
) -> UiAction {
    log::debug!("ui: {:?} in {:?}", event, state.ui.level);
    match state.ui.level {
        InterfaceLevel::Main => main_level(state, sensors, led, event, now_ms),
        InterfaceLevel::Settings => settings_level(state, sensors, led, event, now_ms),
        InterfaceLevel::EditBank => edit_level(state, sensors, led, event, now_ms),
    }
}

/// Report sensor activity; selects the sensor while editing with nothing selected yet.
pub fn handle_sensor_activity(state: &mut SystemState, led: &mut LedIndicator, sensor: SensorId) {
    if state.ui.level != InterfaceLevel::EditBank || state.ui.selected_sensor.is_some() {
        return;
    }
    log::info!("ui: selected sensor {}", sensor);
    state.ui.selected_sensor = Some(sensor);
    led.on(SELECTED_COLOR);
}

fn select(state: &mut SystemState, sensors: &mut Sensors, at: BankSlot) {
    state.ui.active = at;
    state.config.registry.activate(at, sensors);
}

fn main_level(
    state: &mut SystemState,
    sensors: &mut Sensors,
    led: &mut LedIndicator,
    event: ButtonEvent,
    now_ms: u64,
) -> UiAction {
    let at = state.ui.active;
    match (event.button, event.gesture) {
        (Button::B1, Gesture::Click) => {
            select(state, sensors, at.next_bank());
            show_bank_slot(state.ui.active, led, now_ms);
        }
        (Button::B1, Gesture::LongPress) => {
            log::info!("ui: settings");
            state.ui.level = InterfaceLevel::Settings;
            show_settings_cursor(state.ui.settings_index, led, now_ms);
        }
        (Button::B1, Gesture::DoubleClick) => {
            log::info!("ui: edit bank {} slot {}", at.bank(), at.slot());
            state.ui.level = InterfaceLevel::EditBank;
            state.ui.selected_sensor = None;
            led.blink(ARMED_COLOR, Cycles::Forever, ARMED_BLINK_MS, false, now_ms);
        }
        (b @ (Button::B2 | Button::B3 | Button::B4 | Button::B5), Gesture::Click) => {
            let slot = b as u8 - Button::B2 as u8;
            select(state, sensors, at.with_slot(slot));
            show_bank_slot(state.ui.active, led, now_ms);
        }
        _ => {}
    }
    UiAction::None
}

fn settings_level(
    state: &mut SystemState,
    sensors: &mut Sensors,
    led: &mut LedIndicator,
    event: ButtonEvent,
    now_ms: u64,
) -> UiAction {
    if event.gesture != Gesture::Click {
        return UiAction::None;
    }
    match event.button {
        Button::B1 => {
            state.ui.settings_index = (state.ui.settings_index + 1) % SettingsItem::COUNT;
            show_settings_cursor(state.ui.settings_index, led, now_ms);
        }
        Button::B2 | Button::B3 => {
            let delta = if event.button == Button::B2 { 1 } else { -1 };
            let item = state.ui.settings_item();
            adjust(state, item, delta);
            led.blink(SETTINGS_COLOR, Cycles::Count(1), FAST_BLINK_MS, true, now_ms);
        }
        Button::B4 => {
            log::info!("ui: main");
            state.ui.level = InterfaceLevel::Main;
            let at = state.ui.active;
            select(state, sensors, at);
            show_bank_slot(at, led, now_ms);
        }
        Button::B5 => return UiAction::Persist,
    }
    UiAction::None
}

/// Change one setting by `delta`, wrapping within its own range.
fn adjust(state: &mut SystemState, item: SettingsItem, delta: i8) {
    let flags = &mut state.config.flags;
    match item {
        SettingsItem::Channel => {
            let modulus = MAX_CHANNEL_SETTING as i16 + 1;
            flags.midi_channel = (flags.midi_channel as i16 + delta as i16).rem_euclid(modulus) as u8;
        }
        SettingsItem::UartEnabled => flags.uart_enabled = !flags.uart_enabled,
        SettingsItem::KickEnabled => flags.kick_enabled = !flags.kick_enabled,
        SettingsItem::CcEnabled => flags.cc_enabled = !flags.cc_enabled,
        SettingsItem::VelocityProfile => flags.velocity_profile = flags.velocity_profile.step(delta),
        SettingsItem::KickVelocityProfile => {
            flags.kick_velocity_profile = flags.kick_velocity_profile.step(delta)
        }
    }
    log::debug!("ui: {:?} -> {:?}", item, flags);
}

fn edit_level(
    state: &mut SystemState,
    sensors: &mut Sensors,
    led: &mut LedIndicator,
    event: ButtonEvent,
    now_ms: u64,
) -> UiAction {
    let delta = match (event.button, event.gesture) {
        (Button::B2, Gesture::Click) => SEMITONE,
        (Button::B3, Gesture::Click) => -SEMITONE,
        (Button::B2, Gesture::LongPress) => OCTAVE,
        (Button::B3, Gesture::LongPress) => -OCTAVE,
        (Button::B4, Gesture::Click) => {
            log::info!("ui: main");
            state.ui.level = InterfaceLevel::Main;
            state.ui.selected_sensor = None;
            show_bank_slot(state.ui.active, led, now_ms);
            return UiAction::None;
        }
        _ => return UiAction::None,
    };
    if let Some(sensor) = state.ui.selected_sensor {
        let at = state.ui.active;
        state.config.registry.edit(at, sensor, delta, sensors);
        led.blink(SETTINGS_COLOR, Cycles::Count(1), FAST_BLINK_MS, true, now_ms);
    }
    UiAction::None
}
