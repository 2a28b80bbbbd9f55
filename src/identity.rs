/// How the device presents itself to the server. The device id is part of every packet's header
///  and is the only thing that routes a packet to this device; type and version are sent once
///  per handshake.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceIdentity {
    pub device_id: u64,
    pub device_type: String,
    pub device_version: u16,
}

impl DeviceIdentity {
    pub fn new(device_id: u64, device_type: impl Into<String>, device_version: u16) -> DeviceIdentity {
        DeviceIdentity {
            device_id,
            device_type: device_type.into(),
            device_version,
        }
    }
}
