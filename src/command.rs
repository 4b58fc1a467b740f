//! Single-byte command channel.
//!
//! `g` exports the configuration, `s` imports one JSON object, `f` erases the store. Imports
//! are framed by brace depth and bounded in both time and size so a lost byte can never stall
//! the poll loop: [`CommandReader::poll_timeout`] runs every tick whether or not bytes arrive.

use heapless::Vec;

use crate::store::json::MAX_JSON_LEN;

/// Time allowed between `s` and the closing brace.
pub const IMPORT_TIMEOUT_MS: u64 = 2000;

pub const EXPORT: u8 = b'g';
pub const IMPORT: u8 = b's';
pub const ERASE: u8 = b'f';
pub const REPLY_OK: u8 = b'S';
pub const REPLY_ERR: u8 = b'E';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    Timeout,
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Export,
    /// A complete object is in [`CommandReader::payload`].
    Import,
    Erase,
    ImportAborted(Abort),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Importing {
        started_ms: u64,
        depth: u16,
        in_string: bool,
        escaped: bool,
    },
}

/// Requests produced by one byte: a timed-out import, then whatever the byte itself starts.
pub type Requests = Vec<Request, 2>;

pub struct CommandReader {
    mode: Mode,
    payload: Vec<u8, MAX_JSON_LEN>,
}

impl Default for CommandReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandReader {
    pub fn new() -> Self {
        CommandReader {
            mode: Mode::Idle,
            payload: Vec::new(),
        }
    }

    pub fn is_importing(&self) -> bool {
        matches!(self.mode, Mode::Importing { .. })
    }

    /// The last completed import.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Feed one received byte.
    ///
    /// A byte arriving after the import deadline reports the abort and is then read as a
    /// command.
    pub fn push(&mut self, byte: u8, now_ms: u64) -> Requests {
        let mut requests = Requests::new();
        if let Some(abort) = self.expired(now_ms) {
            requests.push(abort).ok();
        }
        if let Some(request) = self.accept(byte, now_ms) {
            requests.push(request).ok();
        }
        requests
    }

    fn accept(&mut self, byte: u8, now_ms: u64) -> Option<Request> {
        match &mut self.mode {
            Mode::Idle => match byte {
                EXPORT => Some(Request::Export),
                ERASE => Some(Request::Erase),
                IMPORT => {
                    log::debug!("command: import started");
                    self.payload.clear();
                    self.mode = Mode::Importing {
                        started_ms: now_ms,
                        depth: 0,
                        in_string: false,
                        escaped: false,
                    };
                    None
                }
                b if b.is_ascii_whitespace() => None,
                b => {
                    log::debug!("command: ignoring byte {:#04x}", b);
                    None
                }
            },
            Mode::Importing {
                depth,
                in_string,
                escaped,
                ..
            } => {
                if *depth == 0 && byte != b'{' {
                    // nothing framed yet
                    return None;
                }
                if self.payload.push(byte).is_err() {
                    log::warn!("command: import overflow");
                    self.mode = Mode::Idle;
                    return Some(Request::ImportAborted(Abort::Overflow));
                }
                match (byte, *in_string, *escaped) {
                    (_, true, true) => *escaped = false,
                    (b'\\', true, false) => *escaped = true,
                    (b'"', _, false) => *in_string = !*in_string,
                    (b'{', false, _) => *depth += 1,
                    (b'}', false, _) => *depth -= 1,
                    _ => {}
                }
                if *depth == 0 {
                    log::debug!("command: import of {} bytes", self.payload.len());
                    self.mode = Mode::Idle;
                    return Some(Request::Import);
                }
                None
            }
        }
    }

    /// Abort an import that has run past [`IMPORT_TIMEOUT_MS`].
    pub fn poll_timeout(&mut self, now_ms: u64) -> Option<Request> {
        self.expired(now_ms)
    }

    fn expired(&mut self, now_ms: u64) -> Option<Request> {
        if let Mode::Importing { started_ms, .. } = self.mode {
            if now_ms.saturating_sub(started_ms) > IMPORT_TIMEOUT_MS {
                log::warn!("command: import timed out");
                self.mode = Mode::Idle;
                self.payload.clear();
                return Some(Request::ImportAborted(Abort::Timeout));
            }
        }
        None
    }
}
