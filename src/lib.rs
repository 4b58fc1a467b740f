#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), no_std)]
#![deny(rust_2018_idioms)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bank;
pub mod button;
pub mod command;
pub mod kit;
pub mod led;
pub mod midi;
pub mod mux;
pub mod sensor;
pub mod state;
pub mod store;
pub mod ui;
pub mod velocity;

#[cfg(feature = "rp2040")]
pub mod board;
#[cfg(feature = "rp2040")]
pub mod usb;

#[cfg(feature = "rp2040")]
use {defmt_rtt as _, panic_probe as _};

/// Wrapper over unwrap.
///
/// Logs over usb instead of instantly panicking, then halts.
#[cfg(feature = "rp2040")]
pub async fn unwrap<T, E: core::fmt::Debug>(res: Result<T, E>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            log::error!("[FATAL] {:?}", e);
            log::error!("HALTING DUE TO PANIC.");
            embassy_time::Timer::after_secs(1).await;
            panic!();
        }
    }
}
