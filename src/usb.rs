//! Handle all USB communication in this task.
//!
//! One composite device carries three interfaces: USB MIDI, a CDC-ACM port with the `log`
//! output and a CDC-ACM port for the configuration commands. The tick loop talks to the
//! command port through two pipes and never waits on USB.

use embassy_futures::join::join;
use embassy_rp::{peripherals::USB, usb::Driver};
use embassy_sync::{blocking_mutex::raw::ThreadModeRawMutex, pipe::Pipe};
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::class::midi::MidiClass;
use embassy_usb::{Builder, Config};

use crate::midi::usb::{midi_session, Disconnected};

const MAX_PACKET: u16 = 64;

/// Bytes received on the command port, drained by the tick loop.
static COMMAND_RX: Pipe<ThreadModeRawMutex, 256> = Pipe::new();
/// Replies queued by the tick loop.
static COMMAND_TX: Pipe<ThreadModeRawMutex, 2048> = Pipe::new();

/// Take whatever command bytes arrived since the last call.
pub fn read_commands(buf: &mut [u8]) -> usize {
    COMMAND_RX.try_read(buf).unwrap_or(0)
}

/// Queue a reply for the command port. Drops what does not fit.
pub fn write_reply(mut bytes: &[u8]) {
    while !bytes.is_empty() {
        match COMMAND_TX.try_write(bytes) {
            Ok(n) => bytes = &bytes[n..],
            Err(_) => {
                log::warn!("usb: command reply dropped ({} bytes)", bytes.len());
                return;
            }
        }
    }
}

async fn command_rx<'d>(rx: &mut Receiver<'d, Driver<'d, USB>>) -> Result<(), Disconnected> {
    let mut buf = [0; MAX_PACKET as usize];
    loop {
        let n = rx.read_packet(&mut buf).await?;
        COMMAND_RX.write_all(&buf[..n]).await;
    }
}

async fn command_tx<'d>(tx: &mut Sender<'d, Driver<'d, USB>>) -> Result<(), Disconnected> {
    // one byte short of a full packet so no zero-length packet is needed
    let mut buf = [0; MAX_PACKET as usize - 1];
    loop {
        let n = COMMAND_TX.read(&mut buf).await;
        tx.write_packet(&buf[..n]).await?;
    }
}

#[embassy_executor::task]
pub async fn usb_task(
    // remember this is the Driver struct not the trait
    driver: Driver<'static, USB>,
    level: log::LevelFilter,
) {
    // Create embassy-usb Config
    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("dogeystamp");
    config.product = Some("minipad MIDI percussion controller");
    config.serial_number = Some("alpha-12345");
    config.max_power = 100;
    config.max_packet_size_0 = 64;

    // Required for windows compatibility.
    // https://developer.nordicsemi.com/nRF_Connect_SDK/doc/1.9.1/kconfig/CONFIG_CDC_ACM_IAD.html#help
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;

    // Create embassy-usb DeviceBuilder using the driver and config.
    // It needs some buffers for building the descriptors.
    let mut config_descriptor = [0; 256];
    let mut bos_descriptor = [0; 256];
    let mut control_buf = [0; 64];

    let mut logger_state = State::new();
    let mut command_state = State::new();

    let mut builder = Builder::new(
        driver,
        config,
        &mut config_descriptor,
        &mut bos_descriptor,
        &mut [], // no msos descriptors
        &mut control_buf,
    );

    // Create classes on the builder.
    let mut midi_class = MidiClass::new(&mut builder, 1, 1, MAX_PACKET);
    let logger_class = CdcAcmClass::new(&mut builder, &mut logger_state, MAX_PACKET);
    let command_class = CdcAcmClass::new(&mut builder, &mut command_state, MAX_PACKET);
    let log_fut = embassy_usb_logger::with_class!(1024, level, logger_class);
    let (mut command_tx_ep, mut command_rx_ep) = command_class.split();

    // Build the builder.
    let mut usb = builder.build();

    // Run the USB device.
    let usb_fut = usb.run();

    let midi_fut = async {
        loop {
            midi_class.wait_connection().await;
            log::info!("usb: midi connected");
            let _ = midi_session(&mut midi_class).await;
            log::info!("usb: midi disconnected");
        }
    };

    let command_fut = async {
        loop {
            command_rx_ep.wait_connection().await;
            log::info!("usb: command port connected");
            let _ = command_rx(&mut command_rx_ep).await;
        }
    };

    let reply_fut = async {
        loop {
            command_tx_ep.wait_connection().await;
            let _ = command_tx(&mut command_tx_ep).await;
        }
    };

    join(
        usb_fut,
        join(log_fut, join(midi_fut, join(command_fut, reply_fut))),
    )
    .await;
}
