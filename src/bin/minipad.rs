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

//! Main firmware for minipad. Reads the pads and sends MIDI output.

#![no_std]
#![no_main]
#![deny(rust_2018_idioms)]

use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::USB;
use embassy_rp::uart::UartTx;
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_time::{Duration, Instant, Ticker};
use minipad::board;
use minipad::kit::{Kit, Reply};
use minipad::midi::uart::{self as midi_uart, UartMidi};
use minipad::midi::usb::UsbMidi;
use minipad::unwrap;
use minipad::usb::{self, usb_task};

/// Poll period of the whole controller.
const TICK: Duration = Duration::from_millis(1);

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let driver = Driver::new(p.USB, Irqs);
    unwrap(_spawner.spawn(usb_task(driver, log::LevelFilter::Info))).await;

    defmt::debug!("main: init sensors");
    let adc = board::adc_inputs(p.ADC, p.PIN_26, p.PIN_27, p.PIN_28);
    let mut sampler = board::sampler(
        [p.PIN_2.into(), p.PIN_3.into(), p.PIN_4.into(), p.PIN_5.into()],
        adc,
    );

    defmt::debug!("main: init buttons and led");
    let buttons = board::ButtonPins::new([
        p.PIN_10.into(),
        p.PIN_11.into(),
        p.PIN_12.into(),
        p.PIN_13.into(),
        p.PIN_14.into(),
    ]);
    let mut rgb = board::rgb_led(p.PIN_18.into(), p.PIN_19.into(), p.PIN_20.into());

    defmt::debug!("main: init midi");
    let mut usb_midi = UsbMidi;
    let uart_tx = UartTx::new(p.UART0, p.PIN_0, p.DMA_CH0, midi_uart::config());
    unwrap(_spawner.spawn(midi_uart::uart_task(uart_tx))).await;
    let mut uart_midi = UartMidi;

    let cells = unwrap(board::store_cells(p.FLASH)).await;
    let mut kit = Kit::boot(
        cells,
        |address| sampler.read_or_zero(address),
        Instant::now().as_millis(),
    );

    defmt::info!("main: starting tick loop");
    let mut rx = [0u8; 64];
    let mut reply = Reply::new();
    let mut ticker = Ticker::every(TICK);
    loop {
        let now = Instant::now().as_millis();

        kit.poll_sensors(
            |address| sampler.read_or_zero(address),
            &mut usb_midi,
            &mut uart_midi,
            now,
        );
        kit.handle_buttons(buttons.levels(), now);
        unwrap(rgb.show(kit.poll_led(now))).await;

        let n = usb::read_commands(&mut rx);
        kit.handle_commands(&rx[..n], now, &mut reply);
        if !reply.is_empty() {
            usb::write_reply(&reply);
            reply.clear();
        }

        ticker.next().await;
    }
}
