//! USB MIDI transport.
//!
//! The tick loop never waits on USB: messages go into a small queue that the USB task drains.

use embassy_rp::usb::{Driver, Instance};
use embassy_sync::{blocking_mutex::raw::ThreadModeRawMutex, channel::Channel};
use embassy_usb::{class::midi::MidiClass, driver::EndpointError};

use super::{MidiEvent, MidiSink};

pub struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => panic!("Buffer overflow"),
            EndpointError::Disabled => Disconnected {},
        }
    }
}

/// Events, not wire messages: a broadcast takes one slot and is expanded when drained.
static MIDI_QUEUE: Channel<ThreadModeRawMutex, MidiEvent, 32> = Channel::new();

/// Handle sending MIDI until connection breaks
pub async fn midi_session<'d, T: Instance + 'd>(
    midi: &mut MidiClass<'d, Driver<'d, T>>,
) -> Result<(), Disconnected> {
    loop {
        let event = MIDI_QUEUE.receive().await;
        for msg in event.messages() {
            let [status, data1, data2] = msg.to_bytes();
            // cable 0, code index number is the status nibble
            let packet = [status >> 4, status, data1, data2];
            log::trace!("midi_session: {:?}", packet);
            midi.write_packet(&packet).await?
        }
    }
}

/// Sink feeding the USB MIDI queue. Drops messages when the host stops reading.
pub struct UsbMidi;

impl MidiSink for UsbMidi {
    fn send(&mut self, event: MidiEvent) {
        if MIDI_QUEUE.try_send(event).is_err() {
            log::warn!("usb midi: queue full, dropped {:?}", event.msg);
        }
    }
}
