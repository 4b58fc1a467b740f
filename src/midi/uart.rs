//! DIN MIDI over UART at 31250 baud.
//!
//! Each byte takes 320us on the wire and a broadcast is 48 bytes, so writes happen in
//! [`uart_task`], fed by a queue like the USB transport.

use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{self, Async, UartTx};
use embassy_sync::{blocking_mutex::raw::ThreadModeRawMutex, channel::Channel};
use heapless::Vec;

use super::{MidiEvent, MidiSink, N_CHANNELS};

pub const MIDI_BAUDRATE: u32 = 31_250;

static UART_QUEUE: Channel<ThreadModeRawMutex, MidiEvent, 32> = Channel::new();

/// UART config for MIDI: 31250 baud, 8N1.
pub fn config() -> uart::Config {
    let mut config = uart::Config::default();
    config.baudrate = MIDI_BAUDRATE;
    config
}

/// Write queued events to the DIN port.
#[embassy_executor::task]
pub async fn uart_task(mut tx: UartTx<'static, UART0, Async>) {
    loop {
        let event = UART_QUEUE.receive().await;
        let mut bytes = Vec::<u8, { 3 * N_CHANNELS as usize }>::new();
        for msg in event.messages() {
            // at most 16 messages of 3 bytes
            bytes.extend_from_slice(&msg.to_bytes()).ok();
        }
        if let Err(e) = tx.write(&bytes).await {
            log::warn!("uart midi: write failed: {:?}", e);
        }
    }
}

/// Sink feeding [`uart_task`]. Drops events when the wire falls behind.
pub struct UartMidi;

impl MidiSink for UartMidi {
    fn send(&mut self, event: MidiEvent) {
        if UART_QUEUE.try_send(event).is_err() {
            log::warn!("uart midi: queue full, dropped {:?}", event.msg);
        }
    }
}
