//! The drum kit: owner of all live state, driven one tick at a time.
//!
//! Each tick runs, in order, [`Kit::poll_sensors`], [`Kit::handle_buttons`],
//! [`Kit::poll_led`] and [`Kit::handle_commands`]. Everything they touch is owned here and
//! only reached through `&mut self`.

use heapless::Vec;

use crate::button::Buttons;
use crate::command::{CommandReader, Request, REPLY_ERR, REPLY_OK};
use crate::led::{Color, Cycles, LedIndicator};
use crate::midi::{Dispatcher, MidiSink};
use crate::sensor::{Address, SensorId, Sensors, N_SENSORS};
use crate::state::{Config, SystemState};
use crate::store::json::{self, MAX_JSON_LEN};
use crate::store::{CellStorage, Store};
use crate::ui::{self, Button, UiAction};

/// Bytes queued for the command port during one tick.
pub type Reply = Vec<u8, { MAX_JSON_LEN + 8 }>;

pub struct Kit<S: CellStorage> {
    pub state: SystemState,
    pub sensors: Sensors,
    pub led: LedIndicator,
    buttons: Buttons,
    commands: CommandReader,
    store: Store<S>,
}

impl<S: CellStorage> Kit<S> {
    /// Load the configuration, build the sensors from live samples and show bank 0, slot 0.
    pub fn boot<F: FnMut(Address) -> u16>(cells: S, mut sample: F, now_ms: u64) -> Self {
        let mut store = Store::new(cells);
        let config = match store.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("boot: store unreadable ({:?}), using defaults", e);
                Config::default()
            }
        };
        let state = SystemState::new(config);
        let mut sensors = Sensors::new(&mut sample);
        state.reactivate(&mut sensors);

        let mut led = LedIndicator::new();
        ui::show_bank_slot(state.active(), &mut led, now_ms);
        log::info!("boot: ready");

        Kit {
            state,
            sensors,
            led,
            buttons: Buttons::new(),
            commands: CommandReader::new(),
            store,
        }
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    /// Sample every sensor that is due and dispatch its events.
    pub fn poll_sensors<F, U, R>(&mut self, mut sample: F, usb: &mut U, uart: &mut R, now_ms: u64)
    where
        F: FnMut(Address) -> u16,
        U: MidiSink,
        R: MidiSink,
    {
        for id in 0..N_SENSORS as SensorId {
            let sensor = self.sensors.get_mut(id);
            if !sensor.due(now_ms) {
                continue;
            }
            let raw = sample(sensor.address());
            log::trace!("poll: sensor {} raw {}", id, raw);
            let mut dispatcher = Dispatcher {
                state: &mut self.state,
                led: &mut self.led,
                usb: &mut *usb,
                uart: &mut *uart,
            };
            sensor.poll(raw, &mut dispatcher);
        }
    }

    /// Feed raw button levels (in [`Button::ALL`] order) and act on the resulting gestures.
    pub fn handle_buttons(&mut self, levels: [bool; Button::ALL.len()], now_ms: u64) {
        for event in self.buttons.update(levels, now_ms) {
            let action = ui::handle_button(
                &mut self.state,
                &mut self.sensors,
                &mut self.led,
                event,
                now_ms,
            );
            if action == UiAction::Persist {
                self.persist(now_ms);
            }
        }
    }

    fn persist(&mut self, now_ms: u64) {
        let failed = self.store.save(&self.state.config);
        if failed > 0 {
            log::warn!("persist: {} cells not written", failed);
        }
        self.led.blink(
            ui::SAVED_COLOR,
            Cycles::Count(ui::SAVED_BLINKS),
            ui::FAST_BLINK_MS,
            true,
            now_ms,
        );
    }

    /// Advance LED sequencing. Returns what the LED should show.
    pub fn poll_led(&mut self, now_ms: u64) -> Option<Color> {
        self.led.poll(now_ms);
        self.led.output()
    }

    /// Process received command bytes and the import timeout, queueing replies.
    pub fn handle_commands(&mut self, rx: &[u8], now_ms: u64, reply: &mut Reply) {
        for &byte in rx {
            for request in self.commands.push(byte, now_ms) {
                self.handle_request(request, reply);
            }
        }
        if let Some(request) = self.commands.poll_timeout(now_ms) {
            self.handle_request(request, reply);
        }
    }

    fn handle_request(&mut self, request: Request, reply: &mut Reply) {
        log::debug!("command: {:?}", request);
        let ok = match request {
            Request::Export => {
                let mut buf = [0u8; MAX_JSON_LEN];
                match json::to_json(&self.state.config, &mut buf) {
                    Ok(n) => {
                        if reply.extend_from_slice(&buf[..n]).is_err() {
                            log::warn!("command: reply buffer full, export dropped");
                        }
                        return;
                    }
                    Err(e) => {
                        log::warn!("command: export failed: {:?}", e);
                        false
                    }
                }
            }
            Request::Import => match json::from_json(self.commands.payload()) {
                Ok(config) => {
                    log::info!("command: configuration imported");
                    self.state.config = config;
                    self.state.reactivate(&mut self.sensors);
                    let failed = self.store.save(&self.state.config);
                    if failed > 0 {
                        log::warn!("command: {} cells not written", failed);
                    }
                    true
                }
                Err(e) => {
                    log::warn!("command: import rejected: {:?}", e);
                    false
                }
            },
            Request::ImportAborted(abort) => {
                log::warn!("command: import aborted: {:?}", abort);
                false
            }
            Request::Erase => {
                if let Err(e) = self.store.erase() {
                    log::warn!("command: erase failed: {:?}", e);
                }
                return;
            }
        };
        let code = if ok { REPLY_OK } else { REPLY_ERR };
        if reply.push(code).is_err() {
            log::warn!("command: reply buffer full, {} dropped", code as char);
        }
    }
}
