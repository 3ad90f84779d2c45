//! Protocol codec
//!
//! Encoding and decoding functions for frames and messages.
//!
//! ## Message Payloads
//! - GetReq / DeleteReq: key_len (4) + key
//! - PutReq:             key_len (4) + key + value
//! - ScanReq:            flags (1) [+ start_len (4) + start] [+ limit (8)]
//! - WarmupReq:          resp_size (4)
//! - GetResp:            status (1) + value
//! - PutResp/DeleteResp: status (1)
//! - ScanResp:           key_len (4) + key + value
//! - WarmupResp:         data
//!
//! All integers are big-endian.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{KvError, Result};

use super::{
    DeleteReq, DeleteResp, ErrorCode, GetReq, GetResp, PutReq, PutResp, RpcCode, ScanReq,
    ScanResp, WarmupReq, WarmupResp,
};

/// Header size: 1 byte method/kind + 4 bytes stream id + 4 bytes length
pub const HEADER_SIZE: usize = 9;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

const SCAN_HAS_START: u8 = 0b01;
const SCAN_HAS_LIMIT: u8 = 0b10;

const KIND_REPLY: u8 = 0x01;
const KIND_ITEM: u8 = 0x02;
const KIND_END: u8 = 0x03;

// =============================================================================
// Frames
// =============================================================================

/// A request as it arrives on the wire
///
/// The method is kept as a raw byte so an unknown method can be answered
/// with `Unimplemented` instead of tearing down the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub method: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

/// A response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFrame {
    /// Completes a unary call
    Reply {
        stream_id: u32,
        code: RpcCode,
        message: Bytes,
    },

    /// One element of a server stream
    Item { stream_id: u32, message: Bytes },

    /// Completes a server stream
    End { stream_id: u32, code: RpcCode },
}

impl ResponseFrame {
    pub fn stream_id(&self) -> u32 {
        match self {
            ResponseFrame::Reply { stream_id, .. }
            | ResponseFrame::Item { stream_id, .. }
            | ResponseFrame::End { stream_id, .. } => *stream_id,
        }
    }
}

fn encode_frame(first: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(first);
    message.put_u32(stream_id);
    message.put_u32(payload.len() as u32);
    message.extend_from_slice(payload);
    message
}

/// Split a complete frame into (first byte, stream id, payload)
fn decode_frame(bytes: &[u8]) -> Result<(u8, u32, Bytes)> {
    if bytes.len() < HEADER_SIZE {
        return Err(KvError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let first = header.get_u8();
    let stream_id = header.get_u32();
    let payload_len = header.get_u32();

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(KvError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + payload_len as usize;
    if bytes.len() < total_len {
        return Err(KvError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    Ok((
        first,
        stream_id,
        Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]),
    ))
}

/// Read one frame's bytes from a stream
///
/// Blocks until a complete frame is received or an error occurs
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(KvError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut full_message = vec![0u8; HEADER_SIZE + payload_len as usize];
    full_message[..HEADER_SIZE].copy_from_slice(&header);
    if payload_len > 0 {
        reader.read_exact(&mut full_message[HEADER_SIZE..])?;
    }
    Ok(full_message)
}

/// Encode a request frame to bytes
pub fn encode_request_frame(frame: &RequestFrame) -> Vec<u8> {
    encode_frame(frame.method, frame.stream_id, &frame.payload)
}

/// Decode a request frame from bytes
pub fn decode_request_frame(bytes: &[u8]) -> Result<RequestFrame> {
    let (method, stream_id, payload) = decode_frame(bytes)?;
    Ok(RequestFrame {
        method,
        stream_id,
        payload,
    })
}

/// Encode a response frame to bytes
pub fn encode_response_frame(frame: &ResponseFrame) -> Vec<u8> {
    match frame {
        ResponseFrame::Reply {
            stream_id,
            code,
            message,
        } => {
            let mut payload = Vec::with_capacity(1 + message.len());
            payload.put_u8(*code as u8);
            payload.extend_from_slice(message);
            encode_frame(KIND_REPLY, *stream_id, &payload)
        }
        ResponseFrame::Item { stream_id, message } => encode_frame(KIND_ITEM, *stream_id, message),
        ResponseFrame::End { stream_id, code } => encode_frame(KIND_END, *stream_id, &[*code as u8]),
    }
}

/// Decode a response frame from bytes
pub fn decode_response_frame(bytes: &[u8]) -> Result<ResponseFrame> {
    let (kind, stream_id, mut payload) = decode_frame(bytes)?;

    match kind {
        KIND_REPLY => {
            let code = decode_rpc_code(&mut payload)?;
            Ok(ResponseFrame::Reply {
                stream_id,
                code,
                message: payload,
            })
        }
        KIND_ITEM => Ok(ResponseFrame::Item {
            stream_id,
            message: payload,
        }),
        KIND_END => {
            let code = decode_rpc_code(&mut payload)?;
            Ok(ResponseFrame::End { stream_id, code })
        }
        _ => Err(KvError::Protocol(format!(
            "Unknown response kind: 0x{:02x}",
            kind
        ))),
    }
}

fn decode_rpc_code(payload: &mut Bytes) -> Result<RpcCode> {
    if !payload.has_remaining() {
        return Err(KvError::Protocol("missing rpc code".to_string()));
    }
    let byte = payload.get_u8();
    RpcCode::from_byte(byte)
        .ok_or_else(|| KvError::Protocol(format!("Unknown rpc code: 0x{:02x}", byte)))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete request frame from a stream
pub fn read_request_frame<R: Read>(reader: &mut R) -> Result<RequestFrame> {
    decode_request_frame(&read_frame(reader)?)
}

/// Write a request frame to a stream
pub fn write_request_frame<W: Write>(writer: &mut W, frame: &RequestFrame) -> Result<()> {
    writer.write_all(&encode_request_frame(frame))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response frame from a stream
pub fn read_response_frame<R: Read>(reader: &mut R) -> Result<ResponseFrame> {
    decode_response_frame(&read_frame(reader)?)
}

/// Write a response frame to a stream
pub fn write_response_frame<W: Write>(writer: &mut W, frame: &ResponseFrame) -> Result<()> {
    writer.write_all(&encode_response_frame(frame))?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Messages
// =============================================================================

/// A request or response message body
pub trait Message: Sized {
    const NAME: &'static str;

    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self>;
}

fn put_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn get_len_prefixed(buf: &mut &[u8], what: &str) -> Result<Vec<u8>> {
    if buf.remaining() < 4 {
        return Err(KvError::Protocol(format!("{}: missing length", what)));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(KvError::Protocol(format!(
            "{}: incomplete field (expected {}, got {})",
            what,
            len,
            buf.remaining()
        )));
    }
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

fn get_status(buf: &mut &[u8], what: &str) -> Result<ErrorCode> {
    if !buf.has_remaining() {
        return Err(KvError::Protocol(format!("{}: missing status", what)));
    }
    let byte = buf.get_u8();
    ErrorCode::from_byte(byte)
        .ok_or_else(|| KvError::Protocol(format!("{}: unknown status 0x{:02x}", what, byte)))
}

fn expect_end(buf: &[u8], what: &str) -> Result<()> {
    if !buf.is_empty() {
        return Err(KvError::Protocol(format!(
            "{}: unexpected {} trailing bytes",
            what,
            buf.len()
        )));
    }
    Ok(())
}

impl Message for GetReq {
    const NAME: &'static str = "GetReq";

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.key.len());
        put_len_prefixed(&mut buf, &self.key);
        buf
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        let key = get_len_prefixed(&mut bytes, Self::NAME)?;
        expect_end(bytes, Self::NAME)?;
        Ok(GetReq { key })
    }
}

impl Message for PutReq {
    const NAME: &'static str = "PutReq";

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.key.len() + self.value.len());
        put_len_prefixed(&mut buf, &self.key);
        buf.extend_from_slice(&self.value);
        buf
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        let key = get_len_prefixed(&mut bytes, Self::NAME)?;
        Ok(PutReq {
            key,
            value: bytes.to_vec(),
        })
    }
}

impl Message for DeleteReq {
    const NAME: &'static str = "DeleteReq";

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.key.len());
        put_len_prefixed(&mut buf, &self.key);
        buf
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        let key = get_len_prefixed(&mut bytes, Self::NAME)?;
        expect_end(bytes, Self::NAME)?;
        Ok(DeleteReq { key })
    }
}

impl Message for ScanReq {
    const NAME: &'static str = "ScanReq";

    fn encode(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.start.is_some() {
            flags |= SCAN_HAS_START;
        }
        if self.limit.is_some() {
            flags |= SCAN_HAS_LIMIT;
        }

        let mut buf = BytesMut::new();
        buf.put_u8(flags);
        if let Some(start) = &self.start {
            buf.put_u32(start.len() as u32);
            buf.put_slice(start);
        }
        if let Some(limit) = self.limit {
            buf.put_u64(limit);
        }
        buf.to_vec()
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        if !bytes.has_remaining() {
            return Err(KvError::Protocol("ScanReq: missing flags".to_string()));
        }
        let flags = bytes.get_u8();
        if flags & !(SCAN_HAS_START | SCAN_HAS_LIMIT) != 0 {
            return Err(KvError::Protocol(format!(
                "ScanReq: unknown flags 0x{:02x}",
                flags
            )));
        }

        let start = if flags & SCAN_HAS_START != 0 {
            Some(get_len_prefixed(&mut bytes, Self::NAME)?)
        } else {
            None
        };

        let limit = if flags & SCAN_HAS_LIMIT != 0 {
            if bytes.remaining() < 8 {
                return Err(KvError::Protocol("ScanReq: incomplete limit".to_string()));
            }
            Some(bytes.get_u64())
        } else {
            None
        };

        expect_end(bytes, Self::NAME)?;
        Ok(ScanReq { start, limit })
    }
}

impl Message for WarmupReq {
    const NAME: &'static str = "WarmupReq";

    fn encode(&self) -> Vec<u8> {
        self.resp_size.to_be_bytes().to_vec()
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        if bytes.remaining() < 4 {
            return Err(KvError::Protocol("WarmupReq: missing resp_size".to_string()));
        }
        let resp_size = bytes.get_u32();
        expect_end(bytes, Self::NAME)?;
        Ok(WarmupReq { resp_size })
    }
}

impl Message for GetResp {
    const NAME: &'static str = "GetResp";

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.value.len());
        buf.put_u8(self.status as u8);
        buf.extend_from_slice(&self.value);
        buf
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        let status = get_status(&mut bytes, Self::NAME)?;
        Ok(GetResp {
            status,
            value: bytes.to_vec(),
        })
    }
}

impl Message for PutResp {
    const NAME: &'static str = "PutResp";

    fn encode(&self) -> Vec<u8> {
        vec![self.status as u8]
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        let status = get_status(&mut bytes, Self::NAME)?;
        expect_end(bytes, Self::NAME)?;
        Ok(PutResp { status })
    }
}

impl Message for DeleteResp {
    const NAME: &'static str = "DeleteResp";

    fn encode(&self) -> Vec<u8> {
        vec![self.status as u8]
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        let status = get_status(&mut bytes, Self::NAME)?;
        expect_end(bytes, Self::NAME)?;
        Ok(DeleteResp { status })
    }
}

impl Message for ScanResp {
    const NAME: &'static str = "ScanResp";

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.key.len() + self.value.len());
        put_len_prefixed(&mut buf, &self.key);
        buf.extend_from_slice(&self.value);
        buf
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        let key = get_len_prefixed(&mut bytes, Self::NAME)?;
        Ok(ScanResp {
            key,
            value: bytes.to_vec(),
        })
    }
}

impl Message for WarmupResp {
    const NAME: &'static str = "WarmupResp";

    fn encode(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(WarmupResp {
            data: bytes.to_vec(),
        })
    }
}
