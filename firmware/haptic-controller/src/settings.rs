use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::{EspError, ESP_ERR_INVALID_SIZE};
use haptic_core::config::CONFIG_VERSION;
use haptic_core::MotorConfig;
use log::{info, warn};

const NVS_NAMESPACE: &str = "haptics";
const KEY_MOTOR_CONFIG: &str = "motor_cfg";

/// Upper bound for the encoded motor configuration.
const CONFIG_BUF_LEN: usize = 512;

/// Motor configuration persisted in NVS as CBOR.
pub struct SettingsStore {
    nvs: EspNvs<NvsDefault>,
}

impl SettingsStore {
    pub fn new(nvs_partition: EspNvsPartition<NvsDefault>) -> Result<Self, EspError> {
        let nvs = EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }

    /// The stored configuration, or the defaults when nothing usable is
    /// stored. Never fails: a device with broken settings still boots.
    pub fn load(&mut self) -> MotorConfig {
        match self.read() {
            Ok(Some(config)) => {
                info!(
                    "Loaded motor config: {} LEDC, {} I2C",
                    config.ledc_motor_count(),
                    config.i2c_motors
                );
                config
            }
            Ok(None) => {
                info!("No usable motor config, storing defaults");
                let config = MotorConfig::default();
                if let Err(e) = self.save(&config) {
                    warn!("Failed to store default motor config: {:?}", e);
                }
                config
            }
            Err(e) => {
                warn!("Failed to read motor config: {:?}", e);
                MotorConfig::default()
            }
        }
    }

    /// Stored configuration if present, decodable, current and valid.
    pub fn read(&self) -> Result<Option<MotorConfig>, EspError> {
        let mut buf = [0u8; CONFIG_BUF_LEN];
        let Some(bytes) = self.nvs.get_raw(KEY_MOTOR_CONFIG, &mut buf)? else {
            return Ok(None);
        };

        let config: MotorConfig = match minicbor::decode(bytes) {
            Ok(c) => c,
            Err(e) => {
                warn!("Stored motor config is corrupt: {}", e);
                return Ok(None);
            }
        };
        if config.config_version != CONFIG_VERSION {
            warn!(
                "Stored motor config has version {}, expected {}",
                config.config_version, CONFIG_VERSION
            );
            return Ok(None);
        }
        if let Err(e) = config.validate() {
            warn!("Stored motor config rejected: {}", e);
            return Ok(None);
        }
        Ok(Some(config))
    }

    pub fn save(&mut self, config: &MotorConfig) -> Result<(), EspError> {
        let bytes = minicbor::to_vec(config)
            .map_err(|_| EspError::from_infallible::<ESP_ERR_INVALID_SIZE>())?;
        if bytes.len() > CONFIG_BUF_LEN {
            return Err(EspError::from_infallible::<ESP_ERR_INVALID_SIZE>());
        }
        self.nvs.set_raw(KEY_MOTOR_CONFIG, &bytes)?;
        info!("Saved motor config ({} bytes)", bytes.len());
        Ok(())
    }
}
