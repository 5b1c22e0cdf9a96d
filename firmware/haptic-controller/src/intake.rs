use haptic_core::decode::store_payload;
use haptic_core::osc::OscMessage;
use haptic_core::{DutyStore, MotorConfig, CONFIG_ADDRESS, MOTOR_ADDRESS};
use log::{debug, info, warn};

/// What one datagram asked for.
#[derive(Debug)]
pub enum IntakeEvent {
    /// Duty string stored; number of motors written.
    Duties(usize),
    /// A valid configuration to apply and persist.
    Config(MotorConfig),
    Rejected,
    Ignored,
}

/// Handle `/h`: store the hex duty string.
pub fn handle_motor(store: &DutyStore, msg: &OscMessage<'_>) -> IntakeEvent {
    match msg.first_str() {
        Some(payload) => IntakeEvent::Duties(store_payload(store, payload)),
        None => {
            warn!("{} without a string argument", MOTOR_ADDRESS);
            IntakeEvent::Rejected
        }
    }
}

/// Handle `/config`: a CBOR motor configuration in a blob argument.
pub fn handle_config(msg: &OscMessage<'_>) -> IntakeEvent {
    let Some(blob) = msg.first_blob() else {
        warn!("{} without a blob argument", CONFIG_ADDRESS);
        return IntakeEvent::Rejected;
    };
    let config: MotorConfig = match minicbor::decode(blob) {
        Ok(c) => c,
        Err(e) => {
            warn!("Undecodable motor config: {}", e);
            return IntakeEvent::Rejected;
        }
    };
    if let Err(e) = config.validate() {
        warn!("Motor config rejected: {}", e);
        return IntakeEvent::Rejected;
    }
    info!(
        "Motor config received: {} LEDC, {} I2C",
        config.ledc_motor_count(),
        config.i2c_motors
    );
    IntakeEvent::Config(config)
}

/// Route one UDP datagram by OSC address.
pub fn route_packet(store: &DutyStore, packet: &[u8]) -> IntakeEvent {
    let msg = match OscMessage::parse(packet) {
        Ok(m) => m,
        Err(e) => {
            debug!("Dropping datagram: {}", e);
            return IntakeEvent::Rejected;
        }
    };
    match msg.address {
        MOTOR_ADDRESS => handle_motor(store, &msg),
        CONFIG_ADDRESS => handle_config(&msg),
        other => {
            debug!("Ignoring OSC address {}", other);
            IntakeEvent::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_str(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    fn string_message(address: &str, arg: &str) -> Vec<u8> {
        let mut packet = Vec::new();
        push_str(&mut packet, address);
        push_str(&mut packet, ",s");
        push_str(&mut packet, arg);
        packet
    }

    fn blob_message(address: &str, blob: &[u8]) -> Vec<u8> {
        let mut packet = Vec::new();
        push_str(&mut packet, address);
        push_str(&mut packet, ",b");
        packet.extend_from_slice(&(blob.len() as i32).to_be_bytes());
        packet.extend_from_slice(blob);
        while packet.len() % 4 != 0 {
            packet.push(0);
        }
        packet
    }

    #[test]
    fn test_motor_message_stores_duties() {
        let store = DutyStore::new();
        let packet = string_message("/h", "ffff0010");
        assert!(matches!(route_packet(&store, &packet), IntakeEvent::Duties(2)));
        assert_eq!(store.global(0), 0xffff);
        assert_eq!(store.global(1), 0x0010);
        assert!(store.take_updated());
    }

    #[test]
    fn test_motor_message_without_string() {
        let store = DutyStore::new();
        let packet = blob_message("/h", &[1, 2, 3]);
        assert!(matches!(route_packet(&store, &packet), IntakeEvent::Rejected));
        assert!(!store.take_updated());
    }

    #[test]
    fn test_config_message() {
        let store = DutyStore::new();
        let config = MotorConfig {
            ledc_pins: vec![4, 3, 2],
            i2c_motors: 16,
            ..MotorConfig::default()
        };
        let blob = minicbor::to_vec(&config).unwrap();
        match route_packet(&store, &blob_message("/config", &blob)) {
            IntakeEvent::Config(received) => assert_eq!(received, config),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = DutyStore::new();
        let config = MotorConfig {
            ledc_pins: vec![4, 4],
            ..MotorConfig::default()
        };
        let blob = minicbor::to_vec(&config).unwrap();
        assert!(matches!(
            route_packet(&store, &blob_message("/config", &blob)),
            IntakeEvent::Rejected
        ));
        assert!(matches!(
            route_packet(&store, &blob_message("/config", &[0xff, 0x00])),
            IntakeEvent::Rejected
        ));
    }

    #[test]
    fn test_unknown_and_malformed() {
        let store = DutyStore::new();
        assert!(matches!(
            route_packet(&store, &string_message("/ping", "x")),
            IntakeEvent::Ignored
        ));
        assert!(matches!(route_packet(&store, b"garbage"), IntakeEvent::Rejected));
    }
}
