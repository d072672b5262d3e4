use std::fmt;

use serde::{Deserialize, Serialize};

/// Carrier id recorded when the capability snapshot cannot name one.
pub const UNKNOWN_CARRIER_ID: i32 = -1;

/// Transport identifies the link technology applied to a network.
/// Values match the platform transport numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Transport {
    Cellular = 0,
    Wifi = 1,
    Bluetooth = 2,
    Ethernet = 3,
    Vpn = 4,
    WifiAware = 5,
    Lowpan = 6,
    TestNetwork = 7,
    Usb = 8,
    Thread = 9,
    Satellite = 10,
}

/// Maximum Transport value, used for bitmask sizing.
pub const MAX_TRANSPORT: usize = 10;

impl Transport {
    /// Returns the canonical label name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cellular => "cellular",
            Self::Wifi => "wifi",
            Self::Bluetooth => "bluetooth",
            Self::Ethernet => "ethernet",
            Self::Vpn => "vpn",
            Self::WifiAware => "wifi_aware",
            Self::Lowpan => "lowpan",
            Self::TestNetwork => "test_network",
            Self::Usb => "usb",
            Self::Thread => "thread",
            Self::Satellite => "satellite",
        }
    }

    /// Convert from a raw u8 value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Cellular),
            1 => Some(Self::Wifi),
            2 => Some(Self::Bluetooth),
            3 => Some(Self::Ethernet),
            4 => Some(Self::Vpn),
            5 => Some(Self::WifiAware),
            6 => Some(Self::Lowpan),
            7 => Some(Self::TestNetwork),
            8 => Some(Self::Usb),
            9 => Some(Self::Thread),
            10 => Some(Self::Satellite),
            _ => None,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque network handle. Equality is by identity value, not by any heavier
/// network state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network(pub u32);

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time view of a network's capabilities, as supplied by the
/// keepalive controller when a keepalive starts.
///
/// The tracker snapshots the transport bitmask and carrier id from this value
/// at start time; later capability changes never affect a live registration.
#[derive(Debug, Clone, Default)]
pub struct NetworkCapabilities {
    transports: u32,
    carrier_id: Option<i32>,
}

impl NetworkCapabilities {
    /// Creates an empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transport to the set.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transports |= 1 << transport as u32;
        self
    }

    /// Records the carrier serving this network.
    pub fn with_carrier_id(mut self, carrier_id: i32) -> Self {
        self.carrier_id = Some(carrier_id);
        self
    }

    /// Whether the given transport applies to this network.
    pub fn has_transport(&self, transport: Transport) -> bool {
        self.transports & (1 << transport as u32) != 0
    }

    /// Bitmask with bit `i` set iff transport `i` is in the set.
    pub fn transport_bitmask(&self) -> u32 {
        self.transports
    }

    /// Carrier id to record at start time, or [`UNKNOWN_CARRIER_ID`] when the
    /// capabilities cannot determine one.
    pub fn carrier_id(&self) -> i32 {
        self.carrier_id.unwrap_or(UNKNOWN_CARRIER_ID)
    }
}
