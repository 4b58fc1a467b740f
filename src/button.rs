//! Button gesture decoder
//!
//! Turns the raw level of each button into clicks, double clicks and long presses. A click is
//! only reported once the double-click window has passed without a second press.

use heapless::Vec;

use crate::ui::{Button, ButtonEvent, Gesture};

/// A level must hold this long before it counts.
pub const DEBOUNCE_MS: u64 = 20;
/// Longest gap between the release of a click and the second press of a double click.
pub const DOUBLE_CLICK_MS: u64 = 300;
/// Hold time for a long press.
pub const LONG_PRESS_MS: u64 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// First press, not yet long.
    Down { since: u64 },
    /// Held past the long-press threshold.
    Held,
    /// Released after a short press, waiting for a second one.
    Released { at: u64 },
    /// Second press of a double click.
    SecondDown,
}

/// Gesture state of one button.
#[derive(Debug, Clone, Copy)]
pub struct GestureDecoder {
    phase: Phase,
    /// Debounced level.
    pressed: bool,
    /// Last raw level and when it changed.
    raw: bool,
    raw_since: u64,
}

impl Default for GestureDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureDecoder {
    pub fn new() -> Self {
        GestureDecoder {
            phase: Phase::Idle,
            pressed: false,
            raw: false,
            raw_since: 0,
        }
    }

    /// Feed the current raw level (`true` = pressed).
    pub fn update(&mut self, raw: bool, now_ms: u64) -> Option<Gesture> {
        if raw != self.raw {
            self.raw = raw;
            self.raw_since = now_ms;
        }
        let settled = now_ms.saturating_sub(self.raw_since) >= DEBOUNCE_MS;
        if settled && self.raw != self.pressed {
            self.pressed = self.raw;
            return self.edge(self.pressed, now_ms);
        }
        self.elapse(now_ms)
    }

    fn edge(&mut self, pressed: bool, now_ms: u64) -> Option<Gesture> {
        let (phase, gesture) = match (self.phase, pressed) {
            (Phase::Idle, true) => (Phase::Down { since: now_ms }, None),
            (Phase::Released { .. }, true) => (Phase::SecondDown, None),
            (Phase::Down { .. }, false) => (Phase::Released { at: now_ms }, None),
            (Phase::Held, false) => (Phase::Idle, Some(Gesture::LongRelease)),
            (Phase::SecondDown, false) => (Phase::Idle, Some(Gesture::DoubleClick)),
            (phase, _) => (phase, None),
        };
        self.phase = phase;
        gesture
    }

    fn elapse(&mut self, now_ms: u64) -> Option<Gesture> {
        match self.phase {
            Phase::Down { since } if now_ms.saturating_sub(since) >= LONG_PRESS_MS => {
                self.phase = Phase::Held;
                Some(Gesture::LongPress)
            }
            Phase::Released { at } if now_ms.saturating_sub(at) > DOUBLE_CLICK_MS => {
                self.phase = Phase::Idle;
                Some(Gesture::Click)
            }
            _ => None,
        }
    }
}

/// Decoders for all five buttons.
#[derive(Debug, Clone, Default)]
pub struct Buttons {
    decoders: [GestureDecoder; Button::ALL.len()],
}

impl Buttons {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the raw levels of all buttons, in [`Button::ALL`] order.
    pub fn update(
        &mut self,
        levels: [bool; Button::ALL.len()],
        now_ms: u64,
    ) -> Vec<ButtonEvent, { Button::ALL.len() }> {
        let mut events = Vec::new();
        for ((decoder, button), level) in self.decoders.iter_mut().zip(Button::ALL).zip(levels) {
            if let Some(gesture) = decoder.update(level, now_ms) {
                // one event per button at most
                let _ = events.push(ButtonEvent::new(button, gesture));
            }
        }
        events
    }
}
