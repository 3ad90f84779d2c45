//! Request definitions
//!
//! The RPC methods and their request messages.

/// RPC methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    Get = 0x01,
    Put = 0x02,
    Delete = 0x03,
    Scan = 0x04,
    Warmup = 0x05,
}

impl Method {
    /// Every method, in wire order
    pub const ALL: [Method; 5] = [
        Method::Get,
        Method::Put,
        Method::Delete,
        Method::Scan,
        Method::Warmup,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Method::Get),
            0x02 => Some(Method::Put),
            0x03 => Some(Method::Delete),
            0x04 => Some(Method::Scan),
            0x05 => Some(Method::Warmup),
            _ => None,
        }
    }

    /// Position in [`Method::ALL`]
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Whether responses arrive as a stream of items
    pub fn is_streaming(self) -> bool {
        matches!(self, Method::Scan)
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::Get => "Get",
            Method::Put => "Put",
            Method::Delete => "Delete",
            Method::Scan => "Scan",
            Method::Warmup => "Warmup",
        }
    }
}

/// Look up a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetReq {
    pub key: Vec<u8>,
}

/// Store a key-value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReq {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Remove a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReq {
    pub key: Vec<u8>,
}

/// Stream records in key order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReq {
    /// First key to return (inclusive); `None` starts at the beginning
    pub start: Option<Vec<u8>>,

    /// Maximum number of records; `None` is unbounded
    pub limit: Option<u64>,
}

/// Ask for a zero-filled payload of a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupReq {
    pub resp_size: u32,
}
