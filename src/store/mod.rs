//! Persistent configuration store.
//!
//! The configuration lives in a run of 16-bit cells: a two-cell signature followed by a
//! versioned byte record packed two bytes per cell (little-endian). The record is encoded field
//! by field so the layout can change with the version byte.
//!
//! | byte    | contents                                               |
//! |---------|--------------------------------------------------------|
//! | 0       | record version                                         |
//! | 1       | UART MIDI enabled                                      |
//! | 2       | MIDI channel setting (0 = all)                         |
//! | 3, 4    | pad / kick velocity profile                            |
//! | 5, 6    | CC enabled, kick enabled                               |
//! | 7..231  | 16 mapping entries, bank-major: 12 pads, kick, CC      |

pub mod flash;
pub mod json;

use crate::bank::{MappingEntry, Registry, BANKS, SLOTS};
use crate::sensor::N_MUX_PADS;
use crate::state::{Config, Flags, Profile, MAX_CHANNEL_SETTING};

/// `"DAPM"` read as a little-endian word.
pub const SIGNATURE: u32 = 0x4D50_4144;
pub const VERSION: u8 = 1;

const FLAGS_LEN: usize = 7;
const ENTRY_LEN: usize = N_MUX_PADS + 2;
/// Encoded record length in bytes.
pub const RECORD_LEN: usize = FLAGS_LEN + BANKS * SLOTS * ENTRY_LEN;
const RECORD_BYTES: usize = RECORD_LEN + RECORD_LEN % 2;
const SIGNATURE_CELLS: usize = 2;
/// Cells holding the record.
pub const RECORD_CELLS: usize = RECORD_BYTES / 2;
/// Cells the store occupies, signature included.
pub const TOTAL_CELLS: usize = SIGNATURE_CELLS + RECORD_CELLS;

/// Value of a cell after [`CellStorage::erase`].
pub const ERASED_CELL: u16 = 0xffff;

/// Non-volatile memory addressed in 16-bit cells.
pub trait CellStorage {
    type Error: core::fmt::Debug;

    fn read_cell(&mut self, index: usize) -> Result<u16, Self::Error>;

    /// Write a cell, skipping the write when it already holds `value`.
    fn update_cell(&mut self, index: usize, value: u16) -> Result<(), Self::Error>;

    /// Set every cell to [`ERASED_CELL`].
    fn erase(&mut self) -> Result<(), Self::Error>;

    /// Commit buffered writes, for backends that buffer.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<T: CellStorage + ?Sized> CellStorage for &mut T {
    type Error = T::Error;

    fn read_cell(&mut self, index: usize) -> Result<u16, Self::Error> {
        T::read_cell(self, index)
    }

    fn update_cell(&mut self, index: usize, value: u16) -> Result<(), Self::Error> {
        T::update_cell(self, index, value)
    }

    fn erase(&mut self) -> Result<(), Self::Error> {
        T::erase(self)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        T::flush(self)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error<E> {
    Storage(E),
    BadSignature,
    UnsupportedVersion(u8),
    /// A field holds a value outside its range.
    Corrupt,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Storage(e)
    }
}

pub struct Store<S: CellStorage> {
    cells: S,
}

impl<S: CellStorage> Store<S> {
    pub fn new(cells: S) -> Self {
        Store { cells }
    }

    pub fn cells(&self) -> &S {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut S {
        &mut self.cells
    }

    /// Load the stored configuration.
    ///
    /// On a first run (no signature) or an unreadable record, factory defaults are written and
    /// returned. Only a failure to read the cells at all is an error.
    pub fn load(&mut self) -> Result<Config, Error<S::Error>> {
        match self.read() {
            Ok(config) => {
                log::info!("store: loaded configuration");
                Ok(config)
            }
            Err(Error::Storage(e)) => Err(Error::Storage(e)),
            Err(e) => {
                log::info!("store: {:?}, writing factory defaults", e);
                let config = Config::default();
                let failed = self.save(&config);
                if failed > 0 {
                    log::warn!("store: {} cells failed while writing defaults", failed);
                }
                Ok(config)
            }
        }
    }

    fn read(&mut self) -> Result<Config, Error<S::Error>> {
        let lo = self.cells.read_cell(0)? as u32;
        let hi = self.cells.read_cell(1)? as u32;
        if lo | hi << 16 != SIGNATURE {
            return Err(Error::BadSignature);
        }
        let mut bytes = [0u8; RECORD_BYTES];
        for (i, pair) in bytes.chunks_exact_mut(2).enumerate() {
            let cell = self.cells.read_cell(SIGNATURE_CELLS + i)?;
            pair.copy_from_slice(&cell.to_le_bytes());
        }
        decode(&bytes)
    }

    /// Write `config` over the whole store.
    ///
    /// Individual cell failures are logged and skipped; the next save rewrites everything.
    /// Returns the number of cells that failed.
    pub fn save(&mut self, config: &Config) -> usize {
        let record = encode(config);
        let signature = [SIGNATURE as u16, (SIGNATURE >> 16) as u16];
        let cells = signature.into_iter().chain(
            record
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
        );

        let mut failed = 0;
        for (i, value) in cells.enumerate() {
            if let Err(e) = self.cells.update_cell(i, value) {
                log::warn!("store: write cell {} failed: {:?}", i, e);
                failed += 1;
            }
        }
        if let Err(e) = self.cells.flush() {
            log::warn!("store: flush failed: {:?}", e);
            failed = TOTAL_CELLS;
        }
        log::info!("store: saved ({} failed)", failed);
        failed
    }

    /// Wipe the store so the next [`load`](Self::load) is a first run.
    pub fn erase(&mut self) -> Result<(), Error<S::Error>> {
        log::info!("store: erase");
        self.cells.erase()?;
        Ok(())
    }
}

fn encode(config: &Config) -> [u8; RECORD_BYTES] {
    let mut out = [0u8; RECORD_BYTES];
    let flags = &config.flags;
    out[..FLAGS_LEN].copy_from_slice(&[
        VERSION,
        flags.uart_enabled as u8,
        flags.midi_channel,
        flags.velocity_profile as u8,
        flags.kick_velocity_profile as u8,
        flags.cc_enabled as u8,
        flags.kick_enabled as u8,
    ]);
    let entries = config.registry.entries().iter().flatten();
    for (chunk, entry) in out[FLAGS_LEN..RECORD_LEN]
        .chunks_exact_mut(ENTRY_LEN)
        .zip(entries)
    {
        chunk[..N_MUX_PADS].copy_from_slice(&entry.pad_notes);
        chunk[N_MUX_PADS] = entry.kick_note;
        chunk[N_MUX_PADS + 1] = entry.cc_number;
    }
    out
}

fn decode_bool<E>(byte: u8) -> Result<bool, Error<E>> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::Corrupt),
    }
}

fn decode_midi<E>(byte: u8) -> Result<u8, Error<E>> {
    if byte > 127 {
        return Err(Error::Corrupt);
    }
    Ok(byte)
}

fn decode<E>(bytes: &[u8; RECORD_BYTES]) -> Result<Config, Error<E>> {
    if bytes[0] != VERSION {
        return Err(Error::UnsupportedVersion(bytes[0]));
    }
    if bytes[2] > MAX_CHANNEL_SETTING {
        return Err(Error::Corrupt);
    }
    let flags = Flags {
        uart_enabled: decode_bool(bytes[1])?,
        midi_channel: bytes[2],
        velocity_profile: Profile::from_u8(bytes[3]).ok_or(Error::Corrupt)?,
        kick_velocity_profile: Profile::from_u8(bytes[4]).ok_or(Error::Corrupt)?,
        cc_enabled: decode_bool(bytes[5])?,
        kick_enabled: decode_bool(bytes[6])?,
    };

    let mut entries = [[MappingEntry::default(); SLOTS]; BANKS];
    let mut chunks = bytes[FLAGS_LEN..RECORD_LEN].chunks_exact(ENTRY_LEN);
    for entry in entries.iter_mut().flatten() {
        let chunk = chunks.next().ok_or(Error::Corrupt)?;
        for (note, &byte) in entry.pad_notes.iter_mut().zip(chunk) {
            *note = decode_midi(byte)?;
        }
        entry.kick_note = decode_midi(chunk[N_MUX_PADS])?;
        entry.cc_number = decode_midi(chunk[N_MUX_PADS + 1])?;
    }

    Ok(Config {
        flags,
        registry: Registry::from_entries(entries),
    })
}
