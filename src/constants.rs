//! Well-known GATT identifiers and display helpers.

use uuid::Uuid;

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_GENERIC_ATTRIBUTE_SERVICE: Uuid = Uuid::from_u128(0x00001801_0000_1000_8000_00805f9b34fb);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
pub const UUID_HID_SERVICE: Uuid = Uuid::from_u128(0x00001812_0000_1000_8000_00805f9b34fb);
pub const UUID_LOCATION_AND_NAVIGATION_SERVICE: Uuid = Uuid::from_u128(0x00001819_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
pub const UUID_MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);

/// Readable name for common services, for list display.
pub fn service_name(uuid: Uuid) -> Option<&'static str> {
    match uuid {
        u if u == UUID_GENERIC_ACCESS_SERVICE => Some("Generic Access"),
        u if u == UUID_GENERIC_ATTRIBUTE_SERVICE => Some("Generic Attribute"),
        u if u == UUID_DEVICE_INFORMATION_SERVICE => Some("Device Information"),
        u if u == UUID_HEART_RATE_SERVICE => Some("Heart Rate"),
        u if u == UUID_BATTERY_SERVICE => Some("Battery"),
        u if u == UUID_HID_SERVICE => Some("Human Interface Device"),
        u if u == UUID_LOCATION_AND_NAVIGATION_SERVICE => Some("Location and Navigation"),
        _ => None,
    }
}
