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

//! Sensors and their trigger detectors.
//!
//! Every logical input of the controller is a [`Sensor`]. Pads (including the kick) run a
//! hysteresis comparator with a retriggerable cooldown timer ([`PadDetector`]), the expression
//! pedal runs a plain delta detector ([`ControllerDetector`]). Detectors only see smoothed
//! readings; what a trigger *means* is decided by the [`TriggerHandler`] passed into
//! [`Sensor::poll`].

use crate::bank::MappingEntry;
use crate::midi::Route;

/// Number of pads behind the analog multiplexer.
pub const N_MUX_PADS: usize = 12;
/// Total number of logical sensors (12 mux pads, kick, pedal).
pub const N_SENSORS: usize = N_MUX_PADS + 2;
/// Sensor id of the directly wired kick pad.
pub const KICK_ID: SensorId = 12;
/// Sensor id of the expression pedal.
pub const PEDAL_ID: SensorId = 13;

/// Ticks a pad must stay below its low threshold after a strike before it releases.
pub const COOLDOWN_TICKS: u8 = 32;
/// Length of the running-average buffer of pads.
pub const AVERAGE_LEN: usize = 10;
/// Full scale of the 12-bit ADC.
pub const ADC_FULL_SCALE: u16 = 4096;
/// Pedal change threshold in percent of full scale.
pub const PEDAL_DELTA_PERCENT: u16 = 2;
/// Minimum time between two pedal samples.
pub const PEDAL_PERIOD_MS: u64 = 2;

const PAD_THRESHOLD_HIGH: u16 = 100;
const PAD_THRESHOLD_LOW: u16 = 70;

/// Logical sensor identity, `0..N_SENSORS`.
pub type SensorId = u8;

/// Kind of sensor; selects the velocity curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorClass {
    Big,
    Small,
    Snare,
    Kick,
    Controller,
}

/// Where the raw sample of a sensor comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// Index on the analog multiplexer (`0..16`).
    Mux(u8),
    /// ADC input wired straight to the board.
    Direct(u8),
}

/// Static description of one sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorDef {
    pub address: Address,
    pub class: SensorClass,
    pub threshold_high: u16,
    pub threshold_low: u16,
}

const fn pad(mux: u8, class: SensorClass) -> SensorDef {
    SensorDef {
        address: Address::Mux(mux),
        class,
        threshold_high: PAD_THRESHOLD_HIGH,
        threshold_low: PAD_THRESHOLD_LOW,
    }
}

/// Physical layout of the controller, indexed by sensor id.
pub const LAYOUT: [SensorDef; N_SENSORS] = [
    pad(0, SensorClass::Snare),
    pad(1, SensorClass::Snare),
    pad(2, SensorClass::Big),
    pad(3, SensorClass::Big),
    pad(4, SensorClass::Big),
    pad(5, SensorClass::Big),
    pad(6, SensorClass::Small),
    pad(7, SensorClass::Small),
    pad(8, SensorClass::Small),
    pad(9, SensorClass::Small),
    pad(10, SensorClass::Small),
    pad(11, SensorClass::Small),
    SensorDef {
        address: Address::Direct(0),
        class: SensorClass::Kick,
        threshold_high: PAD_THRESHOLD_HIGH,
        threshold_low: PAD_THRESHOLD_LOW,
    },
    SensorDef {
        address: Address::Direct(1),
        class: SensorClass::Controller,
        threshold_high: 0,
        threshold_low: 0,
    },
];

/// Fixed-size running average over the last `N` raw samples.
#[derive(Debug, Clone)]
pub struct RunningAverage<const N: usize> {
    samples: [u16; N],
    next: usize,
    len: usize,
    sum: u32,
}

impl<const N: usize> RunningAverage<N> {
    pub fn new() -> Self {
        RunningAverage {
            samples: [0; N],
            next: 0,
            len: 0,
            sum: 0,
        }
    }

    pub fn add(&mut self, sample: u16) {
        if self.len == N {
            self.sum -= self.samples[self.next] as u32;
        } else {
            self.len += 1;
        }
        self.samples[self.next] = sample;
        self.sum += sample as u32;
        self.next = (self.next + 1) % N;
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn average(&self) -> u16 {
        if self.len == 0 {
            return 0;
        }
        (self.sum / self.len as u32) as u16
    }

    /// Peak level of the samples currently in the buffer.
    pub fn max(&self) -> u16 {
        self.samples[..self.len].iter().copied().max().unwrap_or(0)
    }
}

impl<const N: usize> Default for RunningAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger state of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadState {
    Idle,
    /// Struck, reading still at or above the low threshold.
    Triggered,
    /// Reading fell below the low threshold; waiting for the cooldown to run out.
    CoolingDown,
}

/// Event reported by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorEvent {
    /// Pad was struck. Carries the peak of the average buffer.
    Trigger(u16),
    /// Pad rang down completely.
    Release,
    /// Continuous controller moved. Carries the raw reading.
    Change(u16),
}

/// Hysteresis comparator with a retriggerable cooldown timer.
///
/// The cooldown counter is separate from the trigger state: it is armed on trigger, held at
/// [`COOLDOWN_TICKS`] while the reading stays at or above `threshold_low` and counted down while
/// it stays below. The release fires on the tick the counter reaches zero, and only an idle
/// pad accepts a new trigger, so a re-strike during ring-down is absorbed.
#[derive(Debug, Clone)]
pub struct PadDetector<const N: usize = AVERAGE_LEN> {
    threshold_high: u16,
    threshold_low: u16,
    buffer: RunningAverage<N>,
    cooldown_counter: u8,
    state: PadState,
}

impl<const N: usize> PadDetector<N> {
    pub fn new(threshold_high: u16, threshold_low: u16) -> Self {
        debug_assert!(threshold_high >= threshold_low);
        PadDetector {
            threshold_high,
            threshold_low,
            buffer: RunningAverage::new(),
            cooldown_counter: 0,
            state: PadState::Idle,
        }
    }

    /// Feed one raw sample without evaluating it. Used to pre-fill the buffer at startup.
    pub fn prime(&mut self, raw: u16) {
        self.buffer.add(raw);
    }

    pub fn is_primed(&self) -> bool {
        self.buffer.is_full()
    }

    pub fn state(&self) -> PadState {
        self.state
    }

    pub fn cooldown_counter(&self) -> u8 {
        self.cooldown_counter
    }

    pub fn smoothed(&self) -> u16 {
        self.buffer.average()
    }

    pub fn poll(&mut self, raw: u16) -> Option<DetectorEvent> {
        self.buffer.add(raw);
        let reading = self.buffer.average();
        let below_low = reading < self.threshold_low;

        match self.state {
            PadState::Idle => {
                if reading > self.threshold_high {
                    self.state = PadState::Triggered;
                    self.cooldown_counter = COOLDOWN_TICKS;
                    let peak = self.buffer.max();
                    log::trace!("pad: trigger at {} (peak {})", reading, peak);
                    return Some(DetectorEvent::Trigger(peak));
                }
                None
            }
            PadState::Triggered | PadState::CoolingDown => {
                if !below_low {
                    // bounce or ring-down re-arms the window
                    self.cooldown_counter = COOLDOWN_TICKS;
                    return None;
                }
                self.state = PadState::CoolingDown;
                self.cooldown_counter -= 1;
                if self.cooldown_counter == 0 {
                    self.state = PadState::Idle;
                    log::trace!("pad: released");
                    return Some(DetectorEvent::Release);
                }
                None
            }
        }
    }
}

/// Delta detector for continuous controllers (expression pedal).
#[derive(Debug, Clone)]
pub struct ControllerDetector {
    last_reading: u16,
    delta_threshold: u16,
    sample_period_ms: u64,
    last_sample_ms: Option<u64>,
}

impl ControllerDetector {
    /// `initial` is a live reading taken at startup; `percent` is the change threshold in
    /// percent of the ADC full scale.
    pub fn new(initial: u16, percent: u16) -> Self {
        ControllerDetector {
            last_reading: initial,
            delta_threshold: Self::delta_for(percent),
            sample_period_ms: PEDAL_PERIOD_MS,
            last_sample_ms: None,
        }
    }

    /// `round(4096 * percent / 100)`
    pub fn delta_for(percent: u16) -> u16 {
        ((ADC_FULL_SCALE as u32 * percent as u32 + 50) / 100) as u16
    }

    pub fn delta_threshold(&self) -> u16 {
        self.delta_threshold
    }

    pub fn last_reading(&self) -> u16 {
        self.last_reading
    }

    /// Whether enough time passed since the last sample; records `now_ms` when it did.
    pub fn due(&mut self, now_ms: u64) -> bool {
        match self.last_sample_ms {
            Some(last) if now_ms.wrapping_sub(last) < self.sample_period_ms => false,
            _ => {
                self.last_sample_ms = Some(now_ms);
                true
            }
        }
    }

    pub fn poll(&mut self, raw: u16) -> Option<DetectorEvent> {
        if raw.abs_diff(self.last_reading) > self.delta_threshold {
            self.last_reading = raw;
            return Some(DetectorEvent::Change(raw));
        }
        None
    }
}

/// Detector variant run by a sensor.
#[derive(Debug, Clone)]
pub enum Detector {
    Pad(PadDetector),
    Controller(ControllerDetector),
}

/// Callbacks run when a sensor reports activity.
///
/// Passed into [`Sensor::poll`] so detectors stay free of MIDI, flags and UI concerns.
pub trait TriggerHandler {
    /// Pad struck. `note` is the destination at the time of the strike.
    ///
    /// Returns where the note-on was sent, or `None` if it was not.
    fn on_trigger(&mut self, sensor: &Sensor, note: u8, peak: u16) -> Option<Route>;
    /// Pad rang down. Only runs for strikes that returned a route; `note` and `route` are the
    /// ones latched at the strike.
    fn on_release(&mut self, sensor: &Sensor, note: u8, route: Route);
    /// Controller moved to `value` (raw reading).
    fn on_change(&mut self, sensor: &Sensor, cc: u8, value: u16);
}

/// One logical sensor: identity, detector and current MIDI destination.
#[derive(Debug, Clone)]
pub struct Sensor {
    id: SensorId,
    def: SensorDef,
    detector: Detector,
    /// Note number for pads, CC number for the controller.
    destination: u8,
    /// Note currently sounding and where it went.
    latched: Option<(u8, Route)>,
}

impl Sensor {
    /// Create a sensor, pre-filling its buffer from `sample`.
    pub fn new<F: FnMut() -> u16>(id: SensorId, def: SensorDef, mut sample: F) -> Self {
        let detector = match def.class {
            SensorClass::Controller => {
                Detector::Controller(ControllerDetector::new(sample(), PEDAL_DELTA_PERCENT))
            }
            _ => {
                let mut pad = PadDetector::new(def.threshold_high, def.threshold_low);
                while !pad.is_primed() {
                    pad.prime(sample());
                }
                Detector::Pad(pad)
            }
        };
        Sensor {
            id,
            def,
            detector,
            destination: 0,
            latched: None,
        }
    }

    pub fn id(&self) -> SensorId {
        self.id
    }

    pub fn class(&self) -> SensorClass {
        self.def.class
    }

    pub fn address(&self) -> Address {
        self.def.address
    }

    pub fn destination(&self) -> u8 {
        self.destination
    }

    pub fn set_destination(&mut self, destination: u8) {
        self.destination = destination & 0x7f;
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Smoothed reading for pads, last reported reading for the controller.
    pub fn reading(&self) -> u16 {
        match &self.detector {
            Detector::Pad(pad) => pad.smoothed(),
            Detector::Controller(ctrl) => ctrl.last_reading(),
        }
    }

    /// Whether to sample this sensor on the tick at `now_ms`. Controllers are rate limited.
    pub fn due(&mut self, now_ms: u64) -> bool {
        match &mut self.detector {
            Detector::Pad(_) => true,
            Detector::Controller(ctrl) => ctrl.due(now_ms),
        }
    }

    /// Evaluate one raw sample and run the handler on activity.
    ///
    /// Returns the event for callers that track activity themselves.
    pub fn poll<H: TriggerHandler>(&mut self, raw: u16, handler: &mut H) -> Option<DetectorEvent> {
        let event = match &mut self.detector {
            Detector::Pad(pad) => pad.poll(raw),
            Detector::Controller(ctrl) => ctrl.poll(raw),
        }?;
        match event {
            DetectorEvent::Trigger(peak) => {
                let note = self.destination;
                self.latched = handler.on_trigger(self, note, peak).map(|route| (note, route));
            }
            DetectorEvent::Release => {
                if let Some((note, route)) = self.latched.take() {
                    handler.on_release(self, note, route);
                }
            }
            DetectorEvent::Change(value) => handler.on_change(self, self.destination, value),
        }
        Some(event)
    }
}

/// The static sensor table, indexed by [`SensorId`].
#[derive(Debug, Clone)]
pub struct Sensors {
    sensors: [Sensor; N_SENSORS],
}

impl Sensors {
    /// Build all sensors from [`LAYOUT`]; `sample` reads a raw value for a sensor address.
    pub fn new<F: FnMut(Address) -> u16>(mut sample: F) -> Self {
        let sensors = core::array::from_fn(|i| {
            let def = LAYOUT[i];
            Sensor::new(i as SensorId, def, || sample(def.address))
        });
        Sensors { sensors }
    }

    pub fn get(&self, id: SensorId) -> &Sensor {
        &self.sensors[id as usize]
    }

    pub fn get_mut(&mut self, id: SensorId) -> &mut Sensor {
        &mut self.sensors[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.iter()
    }

    /// Copy a mapping entry into the live destinations. Trigger state is left alone.
    pub fn apply(&mut self, entry: &MappingEntry) {
        for (sensor, note) in self.sensors[..N_MUX_PADS].iter_mut().zip(entry.pad_notes) {
            sensor.set_destination(note);
        }
        self.sensors[KICK_ID as usize].set_destination(entry.kick_note);
        self.sensors[PEDAL_ID as usize].set_destination(entry.cc_number);
    }

    /// Destinations of all sensors, indexed by id.
    pub fn destinations(&self) -> [u8; N_SENSORS] {
        core::array::from_fn(|i| self.sensors[i].destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(pad: &mut PadDetector<1>, readings: &[u16]) -> (usize, usize) {
        let mut triggers = 0;
        let mut releases = 0;
        for &r in readings {
            match pad.poll(r) {
                Some(DetectorEvent::Trigger(_)) => triggers += 1,
                Some(DetectorEvent::Release) => releases += 1,
                _ => {}
            }
        }
        (triggers, releases)
    }

    #[test]
    fn strike_releases_after_cooldown() {
        let mut pad = PadDetector::<1>::new(100, 70);
        assert_eq!(pad.poll(150), Some(DetectorEvent::Trigger(150)));
        assert_eq!(pad.state(), PadState::Triggered);
        for _ in 0..COOLDOWN_TICKS - 1 {
            assert_eq!(pad.poll(10), None);
        }
        assert_eq!(pad.state(), PadState::CoolingDown);
        assert_eq!(pad.poll(10), Some(DetectorEvent::Release));
        assert_eq!(pad.state(), PadState::Idle);
        assert_eq!(feed(&mut pad, &[10; 100]), (0, 0));
    }

    #[test]
    fn mid_band_dip_delays_but_keeps_release() {
        let mut pad = PadDetector::<1>::new(100, 70);
        let mut readings = [10u16; 80];
        readings[0] = 150;
        readings[10] = 80;
        assert_eq!(feed(&mut pad, &readings), (1, 1));
        assert_eq!(pad.state(), PadState::Idle);
    }

    #[test]
    fn mid_band_dip_rearms_counter() {
        let mut pad = PadDetector::<1>::new(100, 70);
        pad.poll(150);
        for _ in 0..10 {
            pad.poll(10);
        }
        assert_eq!(pad.cooldown_counter(), COOLDOWN_TICKS - 10);
        pad.poll(80);
        assert_eq!(pad.cooldown_counter(), COOLDOWN_TICKS);
        assert_eq!(pad.state(), PadState::CoolingDown);
    }

    #[test]
    fn restrike_during_cooldown_is_absorbed() {
        let mut pad = PadDetector::<1>::new(100, 70);
        let mut readings = [10u16; 40];
        readings[0] = 200;
        readings[5] = 300;
        readings[6] = 300;
        assert_eq!(feed(&mut pad, &readings), (1, 1));
        assert_eq!(pad.poll(200), Some(DetectorEvent::Trigger(200)));
    }

    #[test]
    fn sustained_pressure_never_releases() {
        let mut pad = PadDetector::<1>::new(100, 70);
        assert_eq!(feed(&mut pad, &[120; 200]), (1, 0));
        assert_eq!(pad.cooldown_counter(), COOLDOWN_TICKS);
    }

    #[test]
    fn trigger_reports_buffer_peak() {
        let mut pad = PadDetector::<4>::new(100, 70);
        for _ in 0..4 {
            pad.prime(0);
        }
        assert_eq!(pad.poll(300), None);
        assert_eq!(pad.poll(500), Some(DetectorEvent::Trigger(500)));
    }

    #[test]
    fn running_average_wraps() {
        let mut avg = RunningAverage::<3>::new();
        assert_eq!(avg.average(), 0);
        avg.add(3);
        avg.add(6);
        assert!(!avg.is_full());
        assert_eq!(avg.average(), 4);
        avg.add(9);
        avg.add(12);
        assert!(avg.is_full());
        assert_eq!(avg.average(), 9);
        assert_eq!(avg.max(), 12);
    }

    #[test]
    fn controller_fires_on_large_delta_only() {
        let mut cc = ControllerDetector::new(1000, 2);
        assert_eq!(cc.delta_threshold(), 82);
        assert_eq!(cc.poll(1082), None);
        assert_eq!(cc.poll(1083), Some(DetectorEvent::Change(1083)));
        assert_eq!(cc.poll(1000), Some(DetectorEvent::Change(1000)));
        assert_eq!(cc.last_reading(), 1000);
    }

    #[test]
    fn controller_sample_period() {
        let mut cc = ControllerDetector::new(0, 2);
        assert!(cc.due(100));
        assert!(!cc.due(101));
        assert!(cc.due(102));
    }

    #[derive(Default)]
    struct Recorder {
        triggers: heapless::Vec<(SensorId, u8), 8>,
        releases: heapless::Vec<(SensorId, u8), 8>,
    }

    impl TriggerHandler for Recorder {
        fn on_trigger(&mut self, sensor: &Sensor, note: u8, _peak: u16) -> Option<Route> {
            self.triggers.push((sensor.id(), note)).ok();
            Some(Route::default())
        }
        fn on_release(&mut self, sensor: &Sensor, note: u8, _route: Route) {
            self.releases.push((sensor.id(), note)).ok();
        }
        fn on_change(&mut self, _sensor: &Sensor, _cc: u8, _value: u16) {}
    }

    #[test]
    fn release_uses_latched_note_after_remap() {
        let mut sensors = Sensors::new(|_| 0);
        let mut rec = Recorder::default();
        let mut entry = MappingEntry::default();
        entry.pad_notes[3] = 40;
        sensors.apply(&entry);

        for _ in 0..AVERAGE_LEN {
            sensors.get_mut(3).poll(2000, &mut rec);
        }
        entry.pad_notes[3] = 52;
        sensors.apply(&entry);
        for _ in 0..200 {
            sensors.get_mut(3).poll(0, &mut rec);
        }
        assert_eq!(&rec.triggers[..], &[(3, 40)]);
        assert_eq!(&rec.releases[..], &[(3, 40)]);
        assert_eq!(sensors.get(3).destination(), 52);
    }

    #[test]
    fn sensors_prefilled_from_live_samples() {
        let sensors = Sensors::new(|addr| match addr {
            Address::Mux(i) => 10 * i as u16,
            Address::Direct(_) => 7,
        });
        assert_eq!(sensors.get(5).reading(), 50);
        assert_eq!(sensors.get(KICK_ID).reading(), 7);
        assert_eq!(sensors.get(PEDAL_ID).reading(), 7);
        assert_eq!(sensors.get(PEDAL_ID).class(), SensorClass::Controller);
    }
}
