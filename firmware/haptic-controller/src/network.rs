use std::io::ErrorKind;
use std::net::{Ipv4Addr, UdpSocket};

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::{esp, esp_wifi_set_ps, wifi_ps_type_t_WIFI_PS_NONE, EspError, ESP_ERR_INVALID_ARG};
use log::{info, warn};

/// Largest datagram the intake accepts. Longer ones are truncated and fail
/// to parse.
const DATAGRAM_LEN: usize = 1536;

/// Station credentials.
///
/// Defaults match the shared haptics access point. Builds for other sites
/// set `HAPTICS_WIFI_SSID` and `HAPTICS_WIFI_PASS` at compile time.
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: option_env!("HAPTICS_WIFI_SSID")
                .unwrap_or("HapticsDevices")
                .into(),
            password: option_env!("HAPTICS_WIFI_PASS")
                .unwrap_or("95815480")
                .into(),
        }
    }
}

/// Wi-Fi station link.
pub struct WifiLink<'d> {
    wifi: BlockingWifi<EspWifi<'d>>,
    config: WifiConfig,
}

impl<'d> WifiLink<'d> {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: WifiConfig,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;
        let wifi = BlockingWifi::wrap(wifi, sysloop)?;
        Ok(Self { wifi, config })
    }

    /// Join the configured network and wait for an address.
    pub fn connect(&mut self) -> Result<(), EspError> {
        let bad_arg = || EspError::from_infallible::<ESP_ERR_INVALID_ARG>();
        let auth_method = if self.config.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: self.config.ssid.as_str().try_into().map_err(|_| bad_arg())?,
            password: self.config.password.as_str().try_into().map_err(|_| bad_arg())?,
            auth_method,
            ..Default::default()
        };

        if !self.wifi.is_started()? {
            self.wifi.set_configuration(&Configuration::Client(client))?;
            self.wifi.start()?;
            // Modem sleep adds tens of ms to every packet.
            esp!(unsafe { esp_wifi_set_ps(wifi_ps_type_t_WIFI_PS_NONE) })?;
        }

        info!("Connecting to '{}'...", self.config.ssid);
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;

        match self.ip_address() {
            Some(ip) => info!("Wi-Fi up, address {}", ip),
            None => warn!("Wi-Fi up without an address"),
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    pub fn ip_address(&self) -> Option<Ipv4Addr> {
        self.wifi.wifi().sta_netif().get_ip_info().ok().map(|info| info.ip)
    }
}

/// Non-blocking UDP receiver for motor and config messages.
pub struct UdpIntake {
    socket: UdpSocket,
    buf: Box<[u8; DATAGRAM_LEN]>,
}

impl UdpIntake {
    pub fn bind(port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;
        info!("Listening for OSC on UDP {}", port);
        Ok(Self {
            socket,
            buf: Box::new([0; DATAGRAM_LEN]),
        })
    }

    /// Hand every queued datagram to `handle`. Returns how many were read.
    pub fn drain<F: FnMut(&[u8])>(&mut self, mut handle: F) -> usize {
        let mut count = 0;
        loop {
            match self.socket.recv_from(&mut self.buf[..]) {
                Ok((len, _)) => {
                    count += 1;
                    handle(&self.buf[..len]);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("UDP receive failed: {}", e);
                    break;
                }
            }
        }
        count
    }
}
