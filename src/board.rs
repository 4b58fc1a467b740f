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

//! Board wiring: ADC inputs, multiplexer select lines, buttons, LED and the config sector.

use embassy_rp::adc::{self, Adc, Blocking};
use embassy_rp::flash::{self, Flash};
use embassy_rp::gpio::{AnyPin, Input, Level, Output, Pull};
use embassy_rp::peripherals::{ADC, FLASH, PIN_26, PIN_27, PIN_28};
use embassy_time::Delay;

use crate::led::RgbLed;
use crate::mux::{AnalogSource, MuxAddress, Sampler};
use crate::store::flash::FlashCells;
use crate::ui::Button;

/// Size of the on-board QSPI flash.
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;
/// The configuration sector is the last one on the flash.
pub const STORE_OFFSET: u32 = (FLASH_SIZE - flash::ERASE_SIZE) as u32;

/// Number of ADC inputs in use: the mux output plus two direct sensors.
pub const N_ADC_INPUTS: usize = 3;

pub type BoardFlash = Flash<'static, FLASH, flash::Blocking, FLASH_SIZE>;
pub type BoardSampler = Sampler<Output<'static, AnyPin>, AdcInputs, Delay>;
pub type BoardLed = RgbLed<Output<'static, AnyPin>>;

#[derive(Debug)]
pub enum Error {
    /// Channel number with no ADC input behind it.
    InvalidChannel(u8),
    Adc(adc::Error),
    Store(crate::store::flash::Error<flash::Error>),
}

impl From<adc::Error> for Error {
    fn from(err: adc::Error) -> Error {
        Error::Adc(err)
    }
}

impl From<crate::store::flash::Error<flash::Error>> for Error {
    fn from(err: crate::store::flash::Error<flash::Error>) -> Error {
        Error::Store(err)
    }
}

/// The ADC with its channels: the mux output at [`MUX_INPUT`](crate::mux::MUX_INPUT), then
/// the direct inputs.
pub struct AdcInputs {
    adc: Adc<'static, Blocking>,
    channels: [adc::Channel<'static>; N_ADC_INPUTS],
}

impl AdcInputs {
    pub fn new(adc: Adc<'static, Blocking>, channels: [adc::Channel<'static>; N_ADC_INPUTS]) -> Self {
        AdcInputs { adc, channels }
    }
}

impl AnalogSource for AdcInputs {
    type Error = Error;

    fn read_channel(&mut self, channel: u8) -> Result<u16, Error> {
        let input = self
            .channels
            .get_mut(channel as usize)
            .ok_or(Error::InvalidChannel(channel))?;
        Ok(self.adc.blocking_read(input)?)
    }
}

/// ADC on GPIO26 (mux output), GPIO27 (kick) and GPIO28 (pedal).
pub fn adc_inputs(adc: ADC, mux: PIN_26, kick: PIN_27, pedal: PIN_28) -> AdcInputs {
    AdcInputs::new(
        Adc::new_blocking(adc, adc::Config::default()),
        [
            adc::Channel::new_pin(mux, Pull::None),
            adc::Channel::new_pin(kick, Pull::None),
            adc::Channel::new_pin(pedal, Pull::None),
        ],
    )
}

/// Sampler over the mux select lines (`S0` first) and the ADC inputs.
pub fn sampler(select: [AnyPin; 4], adc: AdcInputs) -> BoardSampler {
    let lines = select.map(|pin| Output::new(pin, Level::Low));
    Sampler::new(MuxAddress::new(lines), adc, Delay)
}

/// Active-low push buttons in [`Button::ALL`] order.
pub struct ButtonPins {
    pins: [Input<'static, AnyPin>; Button::ALL.len()],
}

impl ButtonPins {
    pub fn new(pins: [AnyPin; Button::ALL.len()]) -> Self {
        ButtonPins {
            pins: pins.map(|pin| Input::new(pin, Pull::Up)),
        }
    }

    /// Raw pressed state of every button.
    pub fn levels(&self) -> [bool; Button::ALL.len()] {
        core::array::from_fn(|i| self.pins[i].is_low())
    }
}

pub fn rgb_led(red: AnyPin, green: AnyPin, blue: AnyPin) -> BoardLed {
    RgbLed::new(
        Output::new(red, Level::Low),
        Output::new(green, Level::Low),
        Output::new(blue, Level::Low),
    )
}

/// Cell storage on the last flash sector.
pub fn store_cells(flash: FLASH) -> Result<FlashCells<BoardFlash>, Error> {
    Ok(FlashCells::new(Flash::new_blocking(flash), STORE_OFFSET)?)
}
