//! Bank/slot registry: which MIDI destination every sensor currently maps to.

use crate::midi::gm;
use crate::sensor::{SensorId, Sensors, KICK_ID, N_MUX_PADS, N_SENSORS, PEDAL_ID};

/// Number of banks.
pub const BANKS: usize = 4;
/// Number of slots per bank.
pub const SLOTS: usize = 4;

/// General MIDI percussion defaults for the 12 mux pads.
const GM_PADS: [u8; N_MUX_PADS] = [
    gm::SNARE,
    40,
    gm::HIHAT_CLOSED,
    gm::HIHAT_OPEN,
    gm::PEDAL_HIHAT,
    48,
    45,
    43,
    49,
    51,
    53,
    39,
];
/// Foot controller.
const DEFAULT_CC: u8 = 4;

/// Destinations of all sensors for one bank/slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    pub pad_notes: [u8; N_MUX_PADS],
    pub kick_note: u8,
    pub cc_number: u8,
}

impl Default for MappingEntry {
    fn default() -> Self {
        MappingEntry {
            pad_notes: GM_PADS,
            kick_note: gm::BASS_DRUM,
            cc_number: DEFAULT_CC,
        }
    }
}

impl MappingEntry {
    /// Destination of a sensor in this entry.
    pub fn get(&self, sensor: SensorId) -> u8 {
        match sensor {
            KICK_ID => self.kick_note,
            PEDAL_ID => self.cc_number,
            pad => self.pad_notes[pad as usize],
        }
    }

    pub fn set(&mut self, sensor: SensorId, value: u8) {
        debug_assert!((sensor as usize) < N_SENSORS);
        match sensor {
            KICK_ID => self.kick_note = value,
            PEDAL_ID => self.cc_number = value,
            pad => self.pad_notes[pad as usize] = value,
        }
    }
}

/// A validated `(bank, slot)` pair.
///
/// Only constructible in range; all arithmetic on it wraps modulo 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankSlot {
    bank: u8,
    slot: u8,
}

impl BankSlot {
    pub fn new(bank: u8, slot: u8) -> Option<Self> {
        if (bank as usize) < BANKS && (slot as usize) < SLOTS {
            Some(BankSlot { bank, slot })
        } else {
            None
        }
    }

    pub fn bank(&self) -> u8 {
        self.bank
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn next_bank(self) -> Self {
        BankSlot {
            bank: (self.bank + 1) % BANKS as u8,
            slot: self.slot,
        }
    }

    pub fn with_slot(self, slot: u8) -> Self {
        BankSlot {
            bank: self.bank,
            slot: slot % SLOTS as u8,
        }
    }
}

/// The 4×4 table of mapping entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    entries: [[MappingEntry; SLOTS]; BANKS],
}

impl Default for Registry {
    fn default() -> Self {
        Registry {
            entries: [[MappingEntry::default(); SLOTS]; BANKS],
        }
    }
}

impl Registry {
    pub fn from_entries(entries: [[MappingEntry; SLOTS]; BANKS]) -> Self {
        Registry { entries }
    }

    pub fn entries(&self) -> &[[MappingEntry; SLOTS]; BANKS] {
        &self.entries
    }

    pub fn entry(&self, at: BankSlot) -> &MappingEntry {
        debug_assert!((at.bank as usize) < BANKS && (at.slot as usize) < SLOTS);
        &self.entries[at.bank as usize][at.slot as usize]
    }

    fn entry_mut(&mut self, at: BankSlot) -> &mut MappingEntry {
        debug_assert!((at.bank as usize) < BANKS && (at.slot as usize) < SLOTS);
        &mut self.entries[at.bank as usize][at.slot as usize]
    }

    /// Make `at` the live mapping: copy its entry into every sensor's destination.
    pub fn activate(&self, at: BankSlot, sensors: &mut Sensors) {
        log::debug!("activate: bank {} slot {}", at.bank, at.slot);
        sensors.apply(self.entry(at));
    }

    /// Shift the destination of `sensor` in entry `at` by `delta` modulo 128, writing through
    /// to the live sensor. Returns the new destination.
    pub fn edit(&mut self, at: BankSlot, sensor: SensorId, delta: i8, sensors: &mut Sensors) -> u8 {
        let entry = self.entry_mut(at);
        let value = (entry.get(sensor) as i16 + delta as i16).rem_euclid(128) as u8;
        entry.set(sensor, value);
        sensors.get_mut(sensor).set_destination(value);
        log::debug!("edit: sensor {} -> {}", sensor, value);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensors() -> Sensors {
        Sensors::new(|_| 0)
    }

    fn registry() -> Registry {
        let mut entries = [[MappingEntry::default(); SLOTS]; BANKS];
        for (b, bank) in entries.iter_mut().enumerate() {
            for (s, entry) in bank.iter_mut().enumerate() {
                for (i, note) in entry.pad_notes.iter_mut().enumerate() {
                    *note = (b * 28 + s * 7 + i) as u8;
                }
                entry.kick_note = (b * 4 + s) as u8;
                entry.cc_number = 100 + (b * 4 + s) as u8;
            }
        }
        Registry::from_entries(entries)
    }

    #[test]
    fn bank_slot_bounds() {
        assert!(BankSlot::new(3, 3).is_some());
        assert!(BankSlot::new(4, 0).is_none());
        assert!(BankSlot::new(0, 4).is_none());
        let at = BankSlot::new(3, 2).unwrap();
        assert_eq!(at.next_bank(), BankSlot::new(0, 2).unwrap());
        assert_eq!(at.with_slot(1), BankSlot::new(3, 1).unwrap());
    }

    #[test]
    fn activate_copies_entry() {
        let reg = registry();
        let mut live = sensors();
        reg.activate(BankSlot::new(2, 1).unwrap(), &mut live);
        let d = live.destinations();
        assert_eq!(d[0], 63);
        assert_eq!(d[11], 74);
        assert_eq!(d[KICK_ID as usize], 9);
        assert_eq!(d[PEDAL_ID as usize], 109);
    }

    #[test]
    fn activate_is_idempotent() {
        let reg = registry();
        let mut live = sensors();
        let at = BankSlot::new(1, 3).unwrap();
        reg.activate(at, &mut live);
        let first = live.destinations();
        reg.activate(at, &mut live);
        assert_eq!(first, live.destinations());
    }

    #[test]
    fn edit_octave_round_trip() {
        let mut reg = Registry::default();
        let mut live = sensors();
        let at = BankSlot::default();
        reg.activate(at, &mut live);
        let original = live.get(0).destination();
        reg.edit(at, 0, 12, &mut live);
        assert_eq!(live.get(0).destination(), original + 12);
        reg.edit(at, 0, -12, &mut live);
        assert_eq!(live.get(0).destination(), original);
        assert_eq!(reg.entry(at).pad_notes[0], original);
    }

    #[test]
    fn edit_wraps_modulo_128() {
        let mut reg = Registry::default();
        let mut live = sensors();
        let at = BankSlot::new(0, 1).unwrap();
        assert_eq!(reg.edit(at, KICK_ID, -37, &mut live), 127);
        assert_eq!(reg.edit(at, KICK_ID, 12, &mut live), 11);
        assert_eq!(reg.entry(at).kick_note, 11);
        // other entries untouched
        assert_eq!(reg.entry(BankSlot::default()).kick_note, 36);
    }

    #[test]
    fn edit_pedal_changes_cc() {
        let mut reg = Registry::default();
        let mut live = sensors();
        let at = BankSlot::default();
        reg.edit(at, PEDAL_ID, 1, &mut live);
        assert_eq!(reg.entry(at).cc_number, 5);
        assert_eq!(live.get(PEDAL_ID).destination(), 5);
    }
}
