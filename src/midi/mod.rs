/*
    minipad
    Copyright (C) 2024 dogeystamp <dogeystamp@disroot.org>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! MIDI utilities
//!
//! Sensor events become [`MidiMsg`]s here and are fanned out to the enabled transports
//! according to the global flags.

use crate::sensor::{Sensor, SensorClass, TriggerHandler};
use crate::state::{Flags, SystemState};
use crate::ui;
use crate::led::LedIndicator;
use crate::velocity::{self, Curve};

#[cfg(feature = "rp2040")]
pub mod uart;
#[cfg(feature = "rp2040")]
pub mod usb;

/// Number of wire channels.
pub const N_CHANNELS: u8 = 16;

/// General MIDI percussion notes.
pub mod gm {
    pub const BASS_DRUM: u8 = 36;
    pub const SNARE: u8 = 38;
    pub const HIHAT_CLOSED: u8 = 42;
    pub const PEDAL_HIHAT: u8 = 44;
    pub const HIHAT_OPEN: u8 = 46;
}

////////////////////////////////
////////////////////////////////
// MIDI message types
////////////////////////////////
////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    Controller { controller: u8, value: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMsg {
    pub msg: MsgType,
    /// Wire channel, `0..16`.
    pub channel: u8,
}

impl MidiMsg {
    pub fn new(msg: MsgType, channel: u8) -> Self {
        MidiMsg {
            msg,
            channel: channel & 0xf,
        }
    }

    /// Status byte plus two data bytes.
    pub fn to_bytes(&self) -> [u8; 3] {
        match self.msg {
            MsgType::NoteOn { note, velocity } => {
                [0b1001_0000 | self.channel, note & 0x7f, velocity & 0x7f]
            }
            MsgType::NoteOff { note, velocity } => {
                [0b1000_0000 | self.channel, note & 0x7f, velocity & 0x7f]
            }
            MsgType::Controller { controller, value } => {
                [0b1011_0000 | self.channel, controller & 0x7f, value & 0x7f]
            }
        }
    }
}

/// Wire channels an event goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    All,
    One(u8),
}

impl Channels {
    /// Channel setting 0 broadcasts on all 16 wire channels, 1..=16 selects wire channel n-1.
    pub fn from_setting(setting: u8) -> Self {
        match setting {
            0 => Channels::All,
            n => Channels::One((n - 1) & 0xf),
        }
    }
}

/// One message before channel expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub msg: MsgType,
    pub channels: Channels,
}

impl MidiEvent {
    /// The wire messages this event stands for.
    pub fn messages(self) -> impl Iterator<Item = MidiMsg> {
        let channels = match self.channels {
            Channels::All => 0..N_CHANNELS,
            Channels::One(c) => c..c + 1,
        };
        channels.map(move |channel| MidiMsg::new(self.msg, channel))
    }
}

/// A MIDI transport.
///
/// Takes whole events so a broadcast costs one queue slot; the transport expands it.
pub trait MidiSink {
    fn send(&mut self, event: MidiEvent);
}

/// Sink that drops everything. Stands in for a disabled transport.
pub struct NullSink;

impl MidiSink for NullSink {
    fn send(&mut self, _event: MidiEvent) {}
}

/// Where a message goes: wire channels, and whether DIN gets a copy as well as USB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub channels: Channels,
    pub uart: bool,
}

impl Default for Route {
    fn default() -> Self {
        Route {
            channels: Channels::All,
            uart: false,
        }
    }
}

impl From<&Flags> for Route {
    fn from(flags: &Flags) -> Self {
        Route {
            channels: Channels::from_setting(flags.midi_channel),
            uart: flags.uart_enabled,
        }
    }
}

/// Send `msg` along `route`: always over USB, over UART when the route includes it.
pub fn fan_out<U: MidiSink, R: MidiSink>(route: Route, msg: MsgType, usb: &mut U, uart: &mut R) {
    let event = MidiEvent {
        msg,
        channels: route.channels,
    };
    usb.send(event);
    if route.uart {
        uart.send(event);
    }
}

/// Turns sensor activity into MIDI and tells the UI which sensor was hit.
///
/// Borrows the whole tick context for the duration of one sensor poll.
pub struct Dispatcher<'a, U: MidiSink, R: MidiSink> {
    pub state: &'a mut SystemState,
    pub led: &'a mut LedIndicator,
    pub usb: &'a mut U,
    pub uart: &'a mut R,
}

impl<U: MidiSink, R: MidiSink> Dispatcher<'_, U, R> {
    /// Route for a new message from `class` under the current flags, `None` when muted.
    fn route(&self, class: SensorClass) -> Option<Route> {
        let flags = self.state.flags();
        let muted = match class {
            SensorClass::Kick => !flags.kick_enabled,
            SensorClass::Controller => !flags.cc_enabled,
            _ => false,
        };
        if muted {
            log::trace!("dispatch: {:?} muted", class);
            return None;
        }
        Some(Route::from(flags))
    }

    fn curve(&self, class: SensorClass) -> Curve {
        let flags = self.state.flags();
        let profile = match class {
            SensorClass::Kick => flags.kick_velocity_profile,
            _ => flags.velocity_profile,
        };
        velocity::curve_for(class, profile)
    }
}

impl<U: MidiSink, R: MidiSink> TriggerHandler for Dispatcher<'_, U, R> {
    fn on_trigger(&mut self, sensor: &Sensor, note: u8, peak: u16) -> Option<Route> {
        let velocity = self.curve(sensor.class()).map(peak);
        log::debug!("dispatch: sensor {} note {} peak {} vel {}", sensor.id(), note, peak, velocity);
        ui::handle_sensor_activity(self.state, self.led, sensor.id());
        let route = self.route(sensor.class())?;
        fan_out(route, MsgType::NoteOn { note, velocity }, self.usb, self.uart);
        Some(route)
    }

    fn on_release(&mut self, _sensor: &Sensor, note: u8, route: Route) {
        fan_out(route, MsgType::NoteOff { note, velocity: 0 }, self.usb, self.uart);
    }

    fn on_change(&mut self, sensor: &Sensor, cc: u8, value: u16) {
        let value = self.curve(sensor.class()).map(value);
        ui::handle_sensor_activity(self.state, self.led, sensor.id());
        if let Some(route) = self.route(sensor.class()) {
            fan_out(route, MsgType::Controller { controller: cc, value }, self.usb, self.uart);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sensor::{Sensors, AVERAGE_LEN, KICK_ID, PEDAL_ID};

    #[derive(Default)]
    pub(crate) struct Capture {
        pub msgs: heapless::Vec<MidiMsg, 64>,
    }

    impl MidiSink for Capture {
        fn send(&mut self, event: MidiEvent) {
            for msg in event.messages() {
                self.msgs.push(msg).ok();
            }
        }
    }

    /// Counts events as queued, before channel expansion.
    #[derive(Default)]
    struct Events(usize);

    impl MidiSink for Events {
        fn send(&mut self, _event: MidiEvent) {
            self.0 += 1;
        }
    }

    #[test]
    fn status_bytes() {
        let m = MidiMsg::new(MsgType::NoteOn { note: 38, velocity: 100 }, 9);
        assert_eq!(m.to_bytes(), [0x99, 38, 100]);
        let m = MidiMsg::new(MsgType::Controller { controller: 4, value: 200 }, 17);
        assert_eq!(m.to_bytes(), [0xB1, 4, 200 & 0x7f]);
    }

    #[test]
    fn single_channel_is_one_based() {
        let flags = Flags {
            midi_channel: 10,
            ..Flags::default()
        };
        let (mut usb, mut uart) = (Capture::default(), Capture::default());
        fan_out(Route::from(&flags), MsgType::NoteOff { note: 1, velocity: 0 }, &mut usb, &mut uart);
        assert_eq!(usb.msgs.len(), 1);
        assert_eq!(usb.msgs[0].channel, 9);
        assert!(uart.msgs.is_empty());
    }

    #[test]
    fn channel_zero_broadcasts_to_both_transports() {
        let flags = Flags {
            midi_channel: 0,
            uart_enabled: true,
            ..Flags::default()
        };
        let (mut usb, mut uart) = (Capture::default(), Capture::default());
        fan_out(Route::from(&flags), MsgType::NoteOff { note: 1, velocity: 0 }, &mut usb, &mut uart);
        assert_eq!(usb.msgs.len(), 16);
        assert_eq!(uart.msgs.len(), 16);
        assert!(usb.msgs.iter().enumerate().all(|(i, m)| m.channel == i as u8));
    }

    #[test]
    fn broadcast_is_one_event_per_transport() {
        let flags = Flags {
            midi_channel: 0,
            uart_enabled: true,
            ..Flags::default()
        };
        let (mut usb, mut uart) = (Events::default(), Events::default());
        fan_out(Route::from(&flags), MsgType::NoteOn { note: 1, velocity: 1 }, &mut usb, &mut uart);
        assert_eq!((usb.0, uart.0), (1, 1));
    }

    fn strike(sensors: &mut Sensors, id: u8, dispatcher: &mut impl TriggerHandler) {
        for _ in 0..AVERAGE_LEN {
            sensors.get_mut(id).poll(3000, dispatcher);
        }
        for _ in 0..AVERAGE_LEN + 40 {
            sensors.get_mut(id).poll(0, dispatcher);
        }
    }

    #[test]
    fn strike_sends_note_on_and_off() {
        let mut state = SystemState::default();
        let mut led = LedIndicator::new();
        let mut sensors = Sensors::new(|_| 0);
        state.reactivate(&mut sensors);
        let (mut usb, mut uart) = (Capture::default(), NullSink);
        let mut d = Dispatcher {
            state: &mut state,
            led: &mut led,
            usb: &mut usb,
            uart: &mut uart,
        };
        strike(&mut sensors, 0, &mut d);
        assert_eq!(usb.msgs.len(), 2);
        match usb.msgs[0].msg {
            MsgType::NoteOn { note, velocity } => {
                assert_eq!(note, gm::SNARE);
                assert!(velocity > 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(usb.msgs[1].msg, MsgType::NoteOff { note: gm::SNARE, velocity: 0 });
    }

    #[test]
    fn disabled_kick_and_pedal_are_silent() {
        let mut state = SystemState::default();
        state.config.flags.kick_enabled = false;
        state.config.flags.cc_enabled = false;
        let mut led = LedIndicator::new();
        let mut sensors = Sensors::new(|_| 0);
        state.reactivate(&mut sensors);
        let (mut usb, mut uart) = (Capture::default(), NullSink);
        let mut d = Dispatcher {
            state: &mut state,
            led: &mut led,
            usb: &mut usb,
            uart: &mut uart,
        };
        strike(&mut sensors, KICK_ID, &mut d);
        sensors.get_mut(PEDAL_ID).poll(4000, &mut d);
        assert!(usb.msgs.is_empty());
    }

    #[test]
    fn pedal_sends_scaled_cc() {
        let mut state = SystemState::default();
        let mut led = LedIndicator::new();
        let mut sensors = Sensors::new(|_| 0);
        state.reactivate(&mut sensors);
        let (mut usb, mut uart) = (Capture::default(), NullSink);
        let mut d = Dispatcher {
            state: &mut state,
            led: &mut led,
            usb: &mut usb,
            uart: &mut uart,
        };
        sensors.get_mut(PEDAL_ID).poll(2048, &mut d);
        assert_eq!(
            usb.msgs[0].msg,
            MsgType::Controller { controller: 4, value: 64 }
        );
    }

    /// Hold the kick down, apply `change` to the flags, then let it ring out.
    fn kick_held_across(change: fn(&mut Flags), initial: Flags) -> (Capture, Capture) {
        let mut state = SystemState::default();
        state.config.flags = initial;
        let mut led = LedIndicator::new();
        let mut sensors = Sensors::new(|_| 0);
        state.reactivate(&mut sensors);
        let (mut usb, mut uart) = (Capture::default(), Capture::default());
        let mut poll = |state: &mut SystemState, raw: u16| {
            let mut d = Dispatcher {
                state,
                led: &mut led,
                usb: &mut usb,
                uart: &mut uart,
            };
            sensors.get_mut(KICK_ID).poll(raw, &mut d);
        };
        for _ in 0..AVERAGE_LEN {
            poll(&mut state, 3000);
        }
        change(&mut state.config.flags);
        for _ in 0..200 {
            poll(&mut state, 0);
        }
        (usb, uart)
    }

    fn notes(capture: &Capture, on: bool) -> heapless::Vec<(u8, u8), 32> {
        capture
            .msgs
            .iter()
            .filter_map(|m| match (m.msg, on) {
                (MsgType::NoteOn { note, .. }, true) | (MsgType::NoteOff { note, .. }, false) => {
                    Some((note, m.channel))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn note_off_follows_note_on_when_settings_change() {
        let initial = Flags {
            midi_channel: 10,
            uart_enabled: true,
            kick_enabled: true,
            ..Flags::default()
        };
        let changes: [fn(&mut Flags); 5] = [
            |f| f.kick_enabled = false,
            |f| f.cc_enabled = false,
            |f| f.midi_channel = 3,
            |f| f.midi_channel = 0,
            |f| f.uart_enabled = false,
        ];
        for change in changes {
            let (usb, uart) = kick_held_across(change, initial);
            assert_eq!(notes(&usb, true).as_slice(), &[(gm::BASS_DRUM, 9)]);
            assert_eq!(notes(&usb, false), notes(&usb, true));
            assert_eq!(notes(&uart, false), notes(&uart, true));
            assert_eq!(notes(&uart, true).len(), 1);
        }
    }

    #[test]
    fn broadcast_note_is_released_on_every_channel() {
        let initial = Flags {
            midi_channel: 0,
            ..Flags::default()
        };
        let (usb, uart) = kick_held_across(|f| f.midi_channel = 5, initial);
        assert_eq!(notes(&usb, true).len(), 16);
        assert_eq!(notes(&usb, false), notes(&usb, true));
        assert!(uart.msgs.is_empty());
    }

    #[test]
    fn muted_strike_sends_no_note_off() {
        let initial = Flags {
            kick_enabled: false,
            ..Flags::default()
        };
        let (usb, _) = kick_held_across(|f| f.kick_enabled = true, initial);
        assert!(usb.msgs.is_empty());
    }
}
