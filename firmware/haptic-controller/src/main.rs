mod intake;
mod ledc;
mod network;
mod pca;
mod settings;
mod softpwm;

use intake::{route_packet, IntakeEvent};
use ledc::LedcChannels;
use network::{UdpIntake, WifiConfig, WifiLink};
use pca::PcaBank;
use settings::SettingsStore;
use softpwm::{DirectPort, TimerPwm};

use haptic_core::waveform::AnalogPwm;
use haptic_core::{DutyScheduler, DutyStore, MotorConfig, PinTable, WaveformGenerator, RECEIVE_PORT};

use esp_idf_hal::i2c::I2C0;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_sys::EspError;
use log::{debug, error, info, warn};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Written by the intake and the scheduler, read by the PWM interrupt.
static DUTY_STORE: DutyStore = DutyStore::new();
static PIN_TABLE: PinTable = PinTable::new();

const I2C_FLUSH_PERIOD: Duration = Duration::from_millis(20);
const STATS_PERIOD: Duration = Duration::from_secs(1);
const IDLE_SLEEP: Duration = Duration::from_millis(1);

type Generator = Box<dyn WaveformGenerator<Error = EspError>>;

/// What the PCA9685 side does for a new configuration.
#[derive(Debug, PartialEq, Eq)]
enum BankAction {
    Idle,
    Configure,
    Open,
    /// I2C motors are configured but the bus was lost to an earlier failure.
    Unavailable,
}

fn bank_action(i2c_motors: u16, bank_open: bool, bus_free: bool) -> BankAction {
    match (i2c_motors, bank_open, bus_free) {
        (0, _, _) => BankAction::Idle,
        (_, true, _) => BankAction::Configure,
        (_, false, true) => BankAction::Open,
        (_, false, false) => BankAction::Unavailable,
    }
}

/// The PCA9685 bank and the bus it is opened on.
struct PcaSide {
    pca: Option<PcaBank<'static>>,
    i2c: Option<I2C0>,
    /// Bus pins the PCA bank was opened with.
    bus: Option<(u8, u8, u32)>,
}

impl PcaSide {
    fn reinit(&mut self, config: &MotorConfig) -> Result<(), EspError> {
        if let Some(pca) = self.pca.as_mut() {
            pca.all_off()?;
        }
        match bank_action(config.i2c_motors, self.pca.is_some(), self.i2c.is_some()) {
            BankAction::Idle => {}
            BankAction::Configure => {
                if self.bus != Some((config.i2c_sda, config.i2c_scl, config.i2c_speed_hz)) {
                    warn!("I2C bus settings change after reboot");
                }
                if let Some(pca) = self.pca.as_mut() {
                    pca.configure(config)?;
                }
            }
            BankAction::Open => {
                if let Some(i2c) = self.i2c.take() {
                    self.pca = Some(PcaBank::new(i2c, config)?);
                    self.bus = Some((config.i2c_sda, config.i2c_scl, config.i2c_speed_hz));
                }
            }
            BankAction::Unavailable => {
                warn!(
                    "{} I2C motors not driven: PCA9685 bus failed to open earlier, reboot to retry",
                    config.i2c_motors
                );
            }
        }
        Ok(())
    }
}

/// Drivers touched by a reinitialization.
struct Outputs {
    generator: Generator,
    pcas: PcaSide,
}

impl Outputs {
    /// Rebuild every driver for `config`. Fails only when the generator
    /// could not switch; a PCA9685 failure is logged and the new
    /// configuration stays in effect.
    fn reinit(
        &mut self,
        config: &MotorConfig,
        scheduler: &mut DutyScheduler,
    ) -> Result<(), EspError> {
        let pcas = &mut self.pcas;
        let outcome = scheduler.reinit(config, &DUTY_STORE, self.generator.as_mut(), |config| {
            pcas.reinit(config)
        })?;
        if outcome.driven < config.ledc_motor_count() {
            warn!(
                "{} of {} LEDC motors driven by the {} generator",
                outcome.driven,
                config.ledc_motor_count(),
                self.generator.name()
            );
        }
        info!(
            "Reinitialized: {} motors ({} LEDC, {} I2C)",
            scheduler.layout().total(),
            scheduler.layout().ledc(),
            scheduler.layout().i2c()
        );
        if let Err(e) = outcome.i2c {
            error!("PCA9685 bring-up failed: {:?}", e);
        }
        Ok(())
    }
}

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init().expect("Failed to init logger");

    info!("Haptic Controller v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take().expect("Failed to take peripherals");
    let sysloop = EspSystemEventLoop::take().expect("Failed to take event loop");
    let nvs_partition = EspDefaultNvsPartition::take().expect("Failed to init NVS");

    let mut settings =
        SettingsStore::new(nvs_partition.clone()).expect("Failed to open settings");
    let config = settings.load();

    let mut wifi = WifiLink::new(
        peripherals.modem,
        sysloop,
        nvs_partition,
        WifiConfig::default(),
    )
    .expect("Failed to init Wi-Fi");
    if let Err(e) = wifi.connect() {
        error!("Wi-Fi connect failed: {:?}", e);
    }
    let mut intake = UdpIntake::bind(RECEIVE_PORT).expect("Failed to bind UDP intake");

    let generator: Generator = match DirectPort::for_target() {
        Some(port) => Box::new(
            TimerPwm::new(
                peripherals.timer00,
                port,
                &PIN_TABLE,
                DUTY_STORE.ledc_duties(),
            )
            .expect("Failed to init PWM timer"),
        ),
        None => Box::new(AnalogPwm::new(LedcChannels::new(peripherals.ledc))),
    };
    info!("Waveform generator: {}", generator.name());

    let mut outputs = Outputs {
        generator,
        pcas: PcaSide {
            pca: None,
            i2c: Some(peripherals.i2c0),
            bus: None,
        },
    };
    let mut scheduler = DutyScheduler::new(&config);
    if let Err(e) = outputs.reinit(&config, &mut scheduler) {
        error!("Failed to bring up motor drivers: {:?}", e);
    }

    info!("Haptic controller running. Waiting for OSC on port {}...", RECEIVE_PORT);

    let start = Instant::now();
    let mut pending: Option<MotorConfig> = None;
    let mut last_flush = Instant::now();
    let mut last_stats = Instant::now();
    let mut passes: u32 = 0;

    loop {
        let mut busy = false;

        if let Some(next) = pending.take() {
            match outputs.reinit(&next, &mut scheduler) {
                Ok(()) => {
                    if let Err(e) = settings.save(&next) {
                        error!("Failed to persist motor config: {:?}", e);
                    }
                }
                Err(e) => error!("Reinitialization failed: {:?}", e),
            }
            busy = true;
        }

        let received = intake.drain(|packet| match route_packet(&DUTY_STORE, packet) {
            IntakeEvent::Config(config) => pending = Some(config),
            IntakeEvent::Duties(count) => debug!("Stored {} duties", count),
            IntakeEvent::Rejected | IntakeEvent::Ignored => {}
        });
        busy |= received > 0;

        // Open bump windows are re-evaluated here but never keep the loop awake.
        let now_us = start.elapsed().as_micros() as u64;
        scheduler.poll(&DUTY_STORE, now_us);

        if let Err(e) = outputs.generator.service(DUTY_STORE.ledc_duties()) {
            error!("Waveform service failed: {:?}", e);
        }

        if last_flush.elapsed() >= I2C_FLUSH_PERIOD {
            if let Some(pca) = outputs.pcas.pca.as_mut() {
                match scheduler.flush_i2c(&DUTY_STORE, pca) {
                    Ok(wrote) => busy |= wrote,
                    Err(e) => error!("I2C flush failed: {:?}", e),
                }
            }
            last_flush = Instant::now();
        }

        passes += 1;
        if last_stats.elapsed() >= STATS_PERIOD {
            debug!("Loop/sec: {}", passes);
            DUTY_STORE.log_duties(scheduler.layout());
            // rewrite boards that may have reset since the last frame
            scheduler.invalidate_i2c();
            if !wifi.is_connected() {
                warn!("Wi-Fi down, reconnecting");
                if let Err(e) = wifi.connect() {
                    error!("Wi-Fi reconnect failed: {:?}", e);
                }
            }
            passes = 0;
            last_stats = Instant::now();
        }

        if !busy {
            sleep(IDLE_SLEEP);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_action() {
        assert_eq!(bank_action(0, false, true), BankAction::Idle);
        assert_eq!(bank_action(0, true, false), BankAction::Idle);
        assert_eq!(bank_action(16, false, true), BankAction::Open);
        assert_eq!(bank_action(16, true, false), BankAction::Configure);
    }

    #[test]
    fn test_lost_bus_is_unavailable() {
        // the bus was moved into a bank that then failed to come up
        assert_eq!(bank_action(8, false, false), BankAction::Unavailable);
    }
}
