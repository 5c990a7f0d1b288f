//! BLE Service and Characteristic UUIDs.
//!
//! Contains the UUID map of the meter and the registry that assigns each
//! service and characteristic a semantic role. The discovery orchestrator is
//! driven entirely by [`service_actions`]; supporting a new service only
//! needs new rows here.

use uuid::Uuid;

// Status Service
/// Status service UUID.
pub const STATUS_SERVICE_UUID: Uuid = Uuid::from_u128(0x57d3a771_267c_4394_8872_78223e92aec5);
/// Device information characteristic UUID (Read).
pub const DEVICE_INFO_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6974f5e5_0e54_45c3_97dd_29e4b5fb0849);
/// Device status characteristic UUID (Read, Notify).
pub const STATUS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x3dba36e1_6120_4706_8dfd_ed9c16e569b6);
/// Flash LED characteristic UUID (Write).
pub const FLASH_LED_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xec9bb1f3_05a9_4277_8dd0_60a7896f0d6e);
/// Torch characteristic UUID (Read, Write, Notify).
pub const TORCH_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xaaf3f6d5_43d4_4a83_9510_dff3d858d4cc);
/// Button characteristic UUID (Notify).
pub const BUTTON_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x8fe5b5a9_b5b4_4a7b_8ff2_87224b970f89);

// Multimeter Service
/// Multimeter service UUID.
pub const MULTIMETER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0xe7481d2f_5781_442e_bb9a_fd4e3441dadc);
/// Multimeter settings characteristic UUID (Write).
pub const MULTIMETER_SETTINGS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x53dc9a7a_bc19_4280_b76b_002d0e23b078);
/// Multimeter reading characteristic UUID (Read, Notify).
pub const MULTIMETER_READING_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x047d3559_8bee_423a_b229_4417fa603b90);

// Oscilloscope (DSO) Service
/// Oscilloscope service UUID.
pub const DSO_SERVICE_UUID: Uuid = Uuid::from_u128(0x1569801e_1425_4a7a_b617_a4f4ed719de6);
/// Oscilloscope settings characteristic UUID (Write).
pub const DSO_SETTINGS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xa81af1b6_b8b3_4244_8859_3da368d2be39);
/// Oscilloscope metadata characteristic UUID (Read, Notify).
pub const DSO_METADATA_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x970f00ba_f46f_4825_96a8_153a5cd0cda9);
/// Oscilloscope reading characteristic UUID (Notify).
pub const DSO_READING_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x98e14f8e_536e_4f24_b4f4_1debfed0a99e);

/// Semantic role of a GATT service on the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceRole {
    /// Device status and information.
    Status,
    /// Multimeter.
    Multimeter,
    /// Oscilloscope.
    Oscilloscope,
}

/// Semantic role of a GATT characteristic on the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicRole {
    /// Static device information.
    DeviceInfo,
    /// Device status.
    Status,
    /// Torch on/off.
    Torch,
    /// Button events.
    Button,
    /// Flash the identification LED.
    FlashLed,
    /// Multimeter settings.
    MultimeterSettings,
    /// Multimeter readings.
    MultimeterReading,
    /// Oscilloscope settings.
    DsoSettings,
    /// Oscilloscope metadata.
    DsoMetadata,
    /// Oscilloscope sample blocks.
    DsoReading,
}

/// What to do with a characteristic once it has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryAction {
    /// Read the value once.
    ReadOnce,
    /// Subscribe to notifications.
    Subscribe,
    /// Subscribe to notifications and read the current value.
    SubscribeAndRead,
}

impl DiscoveryAction {
    /// Check if this action subscribes.
    pub fn subscribes(&self) -> bool {
        matches!(self, Self::Subscribe | Self::SubscribeAndRead)
    }

    /// Check if this action reads.
    pub fn reads(&self) -> bool {
        matches!(self, Self::ReadOnce | Self::SubscribeAndRead)
    }
}

const STATUS_ACTIONS: &[(CharacteristicRole, DiscoveryAction)] = &[
    (CharacteristicRole::DeviceInfo, DiscoveryAction::ReadOnce),
    (CharacteristicRole::Status, DiscoveryAction::SubscribeAndRead),
    (CharacteristicRole::Button, DiscoveryAction::Subscribe),
    (CharacteristicRole::Torch, DiscoveryAction::Subscribe),
];

const MULTIMETER_ACTIONS: &[(CharacteristicRole, DiscoveryAction)] = &[(
    CharacteristicRole::MultimeterReading,
    DiscoveryAction::Subscribe,
)];

const DSO_ACTIONS: &[(CharacteristicRole, DiscoveryAction)] = &[
    (CharacteristicRole::DsoMetadata, DiscoveryAction::Subscribe),
    (CharacteristicRole::DsoReading, DiscoveryAction::Subscribe),
];

/// Look up the role of a service.
pub fn service_role(uuid: &Uuid) -> Option<ServiceRole> {
    match *uuid {
        STATUS_SERVICE_UUID => Some(ServiceRole::Status),
        MULTIMETER_SERVICE_UUID => Some(ServiceRole::Multimeter),
        DSO_SERVICE_UUID => Some(ServiceRole::Oscilloscope),
        _ => None,
    }
}

/// Get the UUID of a service role.
pub fn service_uuid(role: ServiceRole) -> Uuid {
    match role {
        ServiceRole::Status => STATUS_SERVICE_UUID,
        ServiceRole::Multimeter => MULTIMETER_SERVICE_UUID,
        ServiceRole::Oscilloscope => DSO_SERVICE_UUID,
    }
}

/// Ordered actions to perform once a service's characteristics are known.
pub fn service_actions(role: ServiceRole) -> &'static [(CharacteristicRole, DiscoveryAction)] {
    match role {
        ServiceRole::Status => STATUS_ACTIONS,
        ServiceRole::Multimeter => MULTIMETER_ACTIONS,
        ServiceRole::Oscilloscope => DSO_ACTIONS,
    }
}

/// Look up the role of a characteristic.
pub fn characteristic_role(uuid: &Uuid) -> Option<CharacteristicRole> {
    match *uuid {
        DEVICE_INFO_CHARACTERISTIC_UUID => Some(CharacteristicRole::DeviceInfo),
        STATUS_CHARACTERISTIC_UUID => Some(CharacteristicRole::Status),
        TORCH_CHARACTERISTIC_UUID => Some(CharacteristicRole::Torch),
        BUTTON_CHARACTERISTIC_UUID => Some(CharacteristicRole::Button),
        FLASH_LED_CHARACTERISTIC_UUID => Some(CharacteristicRole::FlashLed),
        MULTIMETER_SETTINGS_CHARACTERISTIC_UUID => Some(CharacteristicRole::MultimeterSettings),
        MULTIMETER_READING_CHARACTERISTIC_UUID => Some(CharacteristicRole::MultimeterReading),
        DSO_SETTINGS_CHARACTERISTIC_UUID => Some(CharacteristicRole::DsoSettings),
        DSO_METADATA_CHARACTERISTIC_UUID => Some(CharacteristicRole::DsoMetadata),
        DSO_READING_CHARACTERISTIC_UUID => Some(CharacteristicRole::DsoReading),
        _ => None,
    }
}

/// Get the UUID of a characteristic role.
pub fn characteristic_uuid(role: CharacteristicRole) -> Uuid {
    match role {
        CharacteristicRole::DeviceInfo => DEVICE_INFO_CHARACTERISTIC_UUID,
        CharacteristicRole::Status => STATUS_CHARACTERISTIC_UUID,
        CharacteristicRole::Torch => TORCH_CHARACTERISTIC_UUID,
        CharacteristicRole::Button => BUTTON_CHARACTERISTIC_UUID,
        CharacteristicRole::FlashLed => FLASH_LED_CHARACTERISTIC_UUID,
        CharacteristicRole::MultimeterSettings => MULTIMETER_SETTINGS_CHARACTERISTIC_UUID,
        CharacteristicRole::MultimeterReading => MULTIMETER_READING_CHARACTERISTIC_UUID,
        CharacteristicRole::DsoSettings => DSO_SETTINGS_CHARACTERISTIC_UUID,
        CharacteristicRole::DsoMetadata => DSO_METADATA_CHARACTERISTIC_UUID,
        CharacteristicRole::DsoReading => DSO_READING_CHARACTERISTIC_UUID,
    }
}

/// Check if a service UUID belongs to the meter.
pub fn is_pokit_service(uuid: &Uuid) -> bool {
    service_role(uuid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CHARACTERISTICS: [CharacteristicRole; 10] = [
        CharacteristicRole::DeviceInfo,
        CharacteristicRole::Status,
        CharacteristicRole::Torch,
        CharacteristicRole::Button,
        CharacteristicRole::FlashLed,
        CharacteristicRole::MultimeterSettings,
        CharacteristicRole::MultimeterReading,
        CharacteristicRole::DsoSettings,
        CharacteristicRole::DsoMetadata,
        CharacteristicRole::DsoReading,
    ];

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            STATUS_SERVICE_UUID.to_string(),
            "57d3a771-267c-4394-8872-78223e92aec5"
        );
        assert_eq!(
            MULTIMETER_READING_CHARACTERISTIC_UUID.to_string(),
            "047d3559-8bee-423a-b229-4417fa603b90"
        );
    }

    #[test]
    fn test_characteristic_roles_are_bijective() {
        for role in ALL_CHARACTERISTICS {
            assert_eq!(characteristic_role(&characteristic_uuid(role)), Some(role));
        }
        assert_eq!(characteristic_role(&STATUS_SERVICE_UUID), None);
    }

    #[test]
    fn test_service_roles() {
        for role in [
            ServiceRole::Status,
            ServiceRole::Multimeter,
            ServiceRole::Oscilloscope,
        ] {
            assert_eq!(service_role(&service_uuid(role)), Some(role));
        }
        assert!(!is_pokit_service(&Uuid::from_u128(0x180a)));
    }

    #[test]
    fn test_status_service_actions() {
        let actions = service_actions(ServiceRole::Status);
        assert_eq!(actions.len(), 4);
        assert_eq!(
            actions.iter().filter(|(_, a)| *a == DiscoveryAction::ReadOnce).count(),
            1
        );
        assert_eq!(
            actions
                .iter()
                .filter(|(_, a)| *a == DiscoveryAction::SubscribeAndRead)
                .count(),
            1
        );
        assert_eq!(
            actions.iter().filter(|(_, a)| *a == DiscoveryAction::Subscribe).count(),
            2
        );
    }

    #[test]
    fn test_action_flags() {
        assert!(DiscoveryAction::ReadOnce.reads());
        assert!(!DiscoveryAction::ReadOnce.subscribes());
        assert!(DiscoveryAction::SubscribeAndRead.reads());
        assert!(DiscoveryAction::SubscribeAndRead.subscribes());
        assert!(!DiscoveryAction::Subscribe.reads());
    }
}
