//! Sensor monitor. Streams the smoothed reading of every sensor over the log port, and logs
//! triggers as they happen. Useful to tune thresholds.

#![no_std]
#![no_main]
#![deny(rust_2018_idioms)]

use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_time::{Duration, Instant, Ticker, Timer};
use minipad::board;
use minipad::midi::Route;
use minipad::sensor::{Sensor, SensorId, Sensors, TriggerHandler, N_SENSORS};
use minipad::unwrap;
use minipad::usb::usb_task;

/// Ticks between two printed lines.
const REPORT_EVERY: u32 = 200;

struct Monitor;

impl TriggerHandler for Monitor {
    fn on_trigger(&mut self, sensor: &Sensor, _note: u8, peak: u16) -> Option<Route> {
        log::info!("trigger: sensor {} peak {}", sensor.id(), peak);
        Some(Route::default())
    }

    fn on_release(&mut self, sensor: &Sensor, _note: u8, _route: Route) {
        log::info!("release: sensor {}", sensor.id());
    }

    fn on_change(&mut self, sensor: &Sensor, _cc: u8, value: u16) {
        log::info!("change: sensor {} value {}", sensor.id(), value);
    }
}

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let driver = Driver::new(p.USB, Irqs);
    unwrap(_spawner.spawn(usb_task(driver, log::LevelFilter::Debug))).await;

    // give the host time to open the log port
    Timer::after_secs(2).await;

    log::info!("main: init sensors");
    let adc = board::adc_inputs(p.ADC, p.PIN_26, p.PIN_27, p.PIN_28);
    let mut sampler = board::sampler(
        [p.PIN_2.into(), p.PIN_3.into(), p.PIN_4.into(), p.PIN_5.into()],
        adc,
    );
    let mut sensors = Sensors::new(|address| sampler.read_or_zero(address));

    let mut ticker = Ticker::every(Duration::from_millis(1));
    let mut ticks: u32 = 0;
    loop {
        let now = Instant::now().as_millis();
        for id in 0..N_SENSORS as SensorId {
            let sensor = sensors.get_mut(id);
            if sensor.due(now) {
                let raw = sampler.read_or_zero(sensor.address());
                sensor.poll(raw, &mut Monitor);
            }
        }

        ticks = ticks.wrapping_add(1);
        if ticks % REPORT_EVERY == 0 {
            let mut readings = [0u16; N_SENSORS];
            for (reading, sensor) in readings.iter_mut().zip(sensors.iter()) {
                *reading = sensor.reading();
            }
            log::info!("{:?}", readings);
        }
        ticker.next().await;
    }
}
