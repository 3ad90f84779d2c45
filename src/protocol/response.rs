//! Response definitions
//!
//! Statuses and response messages.

/// Outcome of a store operation, carried in every unary response
///
/// Deliberately two-valued: a missing key and a failing store are both
/// `ServerError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Ok = 0x00,
    ServerError = 0x01,
}

impl ErrorCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ErrorCode::Ok),
            0x01 => Some(ErrorCode::ServerError),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

/// Transport-level status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RpcCode {
    Ok = 0x00,

    /// The request payload could not be decoded or was out of range
    InvalidArgument = 0x01,

    /// Unknown method byte
    Unimplemented = 0x02,

    /// The server is shutting down
    Unavailable = 0x03,

    /// The store failed while a stream was being produced
    Internal = 0x04,
}

impl RpcCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(RpcCode::Ok),
            0x01 => Some(RpcCode::InvalidArgument),
            0x02 => Some(RpcCode::Unimplemented),
            0x03 => Some(RpcCode::Unavailable),
            0x04 => Some(RpcCode::Internal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResp {
    pub status: ErrorCode,

    /// Empty unless `status` is `Ok`
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutResp {
    pub status: ErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResp {
    pub status: ErrorCode,
}

/// One streamed scan element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResp {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupResp {
    pub data: Vec<u8>,
}
