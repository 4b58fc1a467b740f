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

//! Analog multiplexer addressing and sampling.
//!
//! The 12 mux pads share one ADC input behind a 16-channel analog multiplexer. Before each
//! read the logical index goes out on four select lines (bit 0 on `S0`), the mux is given
//! time to settle, then the shared input is sampled. [`Sampler::read`] does all of that under
//! one `&mut self`, so nothing else can move the select lines between addressing and sampling.

use embedded_hal_1::delay::DelayNs;
use embedded_hal_1::digital::OutputPin;

use crate::sensor::Address;

/// Number of select lines.
pub const SELECT_LINES: usize = 4;
/// Time for the mux output to settle after switching.
pub const SETTLE_US: u32 = 10;

/// ADC channel the multiplexer output is wired to.
pub const MUX_INPUT: u8 = 0;

#[derive(Debug)]
pub enum Error<P, A> {
    /// Index does not fit on the select lines.
    InvalidIndex(u8),
    Select(P),
    Sample(A),
}

/// Raw ADC access by channel number.
///
/// Channel [`MUX_INPUT`] is the multiplexer output; direct sensor inputs use
/// `Address::Direct(n)` mapped to channel `n + 1`.
pub trait AnalogSource {
    type Error: core::fmt::Debug;

    fn read_channel(&mut self, channel: u8) -> Result<u16, Self::Error>;
}

/// Four binary select lines of the multiplexer.
pub struct MuxAddress<P: OutputPin> {
    lines: [P; SELECT_LINES],
    current: Option<u8>,
}

impl<P: OutputPin> MuxAddress<P> {
    /// `lines[0]` is the least significant bit.
    pub fn new(lines: [P; SELECT_LINES]) -> Self {
        MuxAddress {
            lines,
            current: None,
        }
    }

    /// Put `index` on the select lines. Returns whether the address changed.
    pub fn select(&mut self, index: u8) -> Result<bool, P::Error> {
        if self.current == Some(index) {
            return Ok(false);
        }
        for (bit, line) in self.lines.iter_mut().enumerate() {
            line.set_state(((index >> bit) & 1 == 1).into())?;
        }
        self.current = Some(index);
        Ok(true)
    }

    pub fn current(&self) -> Option<u8> {
        self.current
    }
}

/// Reads the raw sample of any sensor address.
pub struct Sampler<P: OutputPin, A: AnalogSource, D: DelayNs> {
    mux: MuxAddress<P>,
    adc: A,
    delay: D,
}

impl<P: OutputPin, A: AnalogSource, D: DelayNs> Sampler<P, A, D> {
    pub fn new(mux: MuxAddress<P>, adc: A, delay: D) -> Self {
        Sampler { mux, adc, delay }
    }

    /// Address (if multiplexed), settle and sample one sensor.
    pub fn read(&mut self, address: Address) -> Result<u16, Error<P::Error, A::Error>> {
        match address {
            Address::Mux(index) => {
                if index as usize >= 1 << SELECT_LINES {
                    return Err(Error::InvalidIndex(index));
                }
                if self.mux.select(index).map_err(Error::Select)? {
                    self.delay.delay_us(SETTLE_US);
                }
                self.adc.read_channel(MUX_INPUT).map_err(Error::Sample)
            }
            Address::Direct(n) => self.adc.read_channel(n + 1).map_err(Error::Sample),
        }
    }

    /// Read a sensor, falling back to 0 and logging on failure.
    ///
    /// Sampling errors are transient on this hardware; a zero reading keeps detectors idle.
    pub fn read_or_zero(&mut self, address: Address) -> u16 {
        match self.read(address) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("sampler: read {:?} failed: {:?}", address, e);
                0
            }
        }
    }
}
