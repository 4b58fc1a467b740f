//! JSON wire format of the configuration, exchanged over the command channel.

use serde::{Deserialize, Serialize};

use crate::bank::{MappingEntry, Registry, BANKS, SLOTS};
use crate::sensor::N_MUX_PADS;
use crate::state::{Config, Flags, Profile, MAX_CHANNEL_SETTING};

/// Upper bound on the size of an exported configuration.
pub const MAX_JSON_LEN: usize = 1536;

#[derive(Debug)]
pub enum Error {
    Parse(serde_json_core::de::Error),
    Serialize(serde_json_core::ser::Error),
    /// Well-formed, but a value is out of range for its field.
    OutOfRange,
}

impl From<serde_json_core::de::Error> for Error {
    fn from(e: serde_json_core::de::Error) -> Self {
        Error::Parse(e)
    }
}

impl From<serde_json_core::ser::Error> for Error {
    fn from(e: serde_json_core::ser::Error) -> Self {
        Error::Serialize(e)
    }
}

/// The configuration as it appears on the wire. Field names are part of the format.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct ConfigWire {
    uart_midi_enabled: bool,
    midi_channel_num: u8,
    vel_map_profile: u8,
    kick_vel_map_profile: u8,
    cc_ped_enabled: bool,
    kick_ped_enabled: bool,
    mapping_bank: [[[u8; N_MUX_PADS]; SLOTS]; BANKS],
    mapping_bank_kick: [[u8; SLOTS]; BANKS],
    mapping_bank_cc: [[u8; SLOTS]; BANKS],
}

impl From<&Config> for ConfigWire {
    fn from(config: &Config) -> Self {
        let flags = &config.flags;
        let entries = *config.registry.entries();
        ConfigWire {
            uart_midi_enabled: flags.uart_enabled,
            midi_channel_num: flags.midi_channel,
            vel_map_profile: flags.velocity_profile as u8,
            kick_vel_map_profile: flags.kick_velocity_profile as u8,
            cc_ped_enabled: flags.cc_enabled,
            kick_ped_enabled: flags.kick_enabled,
            mapping_bank: entries.map(|bank| bank.map(|e| e.pad_notes)),
            mapping_bank_kick: entries.map(|bank| bank.map(|e| e.kick_note)),
            mapping_bank_cc: entries.map(|bank| bank.map(|e| e.cc_number)),
        }
    }
}

impl TryFrom<ConfigWire> for Config {
    type Error = Error;

    fn try_from(wire: ConfigWire) -> Result<Self, Error> {
        if wire.midi_channel_num > MAX_CHANNEL_SETTING {
            return Err(Error::OutOfRange);
        }
        let flags = Flags {
            uart_enabled: wire.uart_midi_enabled,
            midi_channel: wire.midi_channel_num,
            velocity_profile: Profile::from_u8(wire.vel_map_profile).ok_or(Error::OutOfRange)?,
            kick_velocity_profile: Profile::from_u8(wire.kick_vel_map_profile)
                .ok_or(Error::OutOfRange)?,
            cc_enabled: wire.cc_ped_enabled,
            kick_enabled: wire.kick_ped_enabled,
        };

        let mut entries = [[MappingEntry::default(); SLOTS]; BANKS];
        for (b, bank) in entries.iter_mut().enumerate() {
            for (s, entry) in bank.iter_mut().enumerate() {
                *entry = MappingEntry {
                    pad_notes: wire.mapping_bank[b][s],
                    kick_note: wire.mapping_bank_kick[b][s],
                    cc_number: wire.mapping_bank_cc[b][s],
                };
                let notes = entry.pad_notes.iter();
                if notes.chain([&entry.kick_note, &entry.cc_number]).any(|&n| n > 127) {
                    return Err(Error::OutOfRange);
                }
            }
        }

        Ok(Config {
            flags,
            registry: Registry::from_entries(entries),
        })
    }
}

/// Serialize `config` into `buf`, returning the number of bytes written.
pub fn to_json(config: &Config, buf: &mut [u8]) -> Result<usize, Error> {
    Ok(serde_json_core::to_slice(&ConfigWire::from(config), buf)?)
}

/// Parse and validate a configuration. Nothing is applied on failure.
pub fn from_json(json: &[u8]) -> Result<Config, Error> {
    let (wire, _) = serde_json_core::from_slice::<ConfigWire>(json)?;
    Config::try_from(wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::custom_config;

    fn export(config: &Config) -> heapless::Vec<u8, MAX_JSON_LEN> {
        let mut buf = [0u8; MAX_JSON_LEN];
        let n = to_json(config, &mut buf).unwrap();
        heapless::Vec::from_slice(&buf[..n]).unwrap()
    }

    fn replace<'a>(json: &[u8], from: &str, to: &str, out: &'a mut [u8]) -> &'a [u8] {
        let text = core::str::from_utf8(json).unwrap();
        let at = text.find(from).unwrap();
        let mut n = 0;
        for part in [&text[..at], to, &text[at + from.len()..]] {
            out[n..n + part.len()].copy_from_slice(part.as_bytes());
            n += part.len();
        }
        &out[..n]
    }

    #[test]
    fn export_clear_import() {
        let config = custom_config();
        let json = export(&config);
        assert_ne!(Config::default(), config);
        assert_eq!(from_json(&json).unwrap(), config);
    }

    #[test]
    fn field_names() {
        let json = export(&Config::default());
        let text = core::str::from_utf8(&json).unwrap();
        assert!(text.starts_with("{\"uart_midi_enabled\":false,\"midi_channel_num\":10,"));
        for key in [
            "vel_map_profile",
            "kick_vel_map_profile",
            "cc_ped_enabled",
            "kick_ped_enabled",
            "mapping_bank",
            "mapping_bank_kick",
            "mapping_bank_cc",
        ] {
            assert!(text.contains(key), "{key}");
        }
        assert!(json.len() < MAX_JSON_LEN);
    }

    #[test]
    fn rejects_out_of_range() {
        let json = export(&Config::default());
        let mut buf = [0u8; MAX_JSON_LEN];

        let bad = replace(&json, "\"midi_channel_num\":10", "\"midi_channel_num\":17", &mut buf);
        assert!(matches!(from_json(bad), Err(Error::OutOfRange)));

        let bad = replace(&json, "\"vel_map_profile\":1", "\"vel_map_profile\":3", &mut buf);
        assert!(matches!(from_json(bad), Err(Error::OutOfRange)));

        let bad = replace(&json, "\"mapping_bank\":[[[38", "\"mapping_bank\":[[[200", &mut buf);
        assert!(matches!(from_json(bad), Err(Error::OutOfRange)));
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(from_json(b"{\"uart_midi_enabled\":tru"), Err(Error::Parse(_))));
        assert!(matches!(from_json(b"{}"), Err(Error::Parse(_))));
        let json = export(&Config::default());
        assert!(from_json(&json[..json.len() - 1]).is_err());
    }

    #[test]
    fn small_buffer() {
        let mut buf = [0u8; 64];
        assert!(matches!(
            to_json(&Config::default(), &mut buf),
            Err(Error::Serialize(_))
        ));
    }
}
