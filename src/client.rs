//! Blocking client
//!
//! One TCP connection, one call in flight at a time.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use bytes::Bytes;

use crate::error::{KvError, Result};
use crate::protocol::{
    read_response_frame, write_request_frame, DeleteReq, DeleteResp, ErrorCode, GetReq, GetResp,
    Message, Method, PutReq, PutResp, RequestFrame, ResponseFrame, RpcCode, ScanReq, ScanResp,
    WarmupReq, WarmupResp,
};

/// Client for a kvstore server
pub struct KvClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    next_stream_id: u32,
}

impl KvClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            next_stream_id: 1,
        })
    }

    /// Fetch a key. A missing key comes back with `ErrorCode::ServerError`.
    pub fn get(&mut self, key: &[u8]) -> Result<GetResp> {
        self.unary(Method::Get, &GetReq { key: key.to_vec() })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<ErrorCode> {
        let resp: PutResp = self.unary(
            Method::Put,
            &PutReq {
                key: key.to_vec(),
                value: value.to_vec(),
            },
        )?;
        Ok(resp.status)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<ErrorCode> {
        let resp: DeleteResp = self.unary(Method::Delete, &DeleteReq { key: key.to_vec() })?;
        Ok(resp.status)
    }

    /// Fetch a key, mapping not-found to `KvError::KeyNotFound`
    pub fn get_value(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let resp = self.get(key)?;
        if resp.status.is_ok() {
            Ok(resp.value)
        } else {
            Err(KvError::KeyNotFound)
        }
    }

    /// Collect a scan. Records streamed before a non-Ok end are discarded.
    pub fn scan(&mut self, start: Option<&[u8]>, limit: Option<u64>) -> Result<Vec<ScanResp>> {
        let mut records = Vec::new();
        let code = self.scan_with(start, limit, |record| records.push(record))?;
        match code {
            RpcCode::Ok => Ok(records),
            code => Err(KvError::Rpc(code)),
        }
    }

    /// Stream a scan into `on_record`, returning the final status
    pub fn scan_with<F>(
        &mut self,
        start: Option<&[u8]>,
        limit: Option<u64>,
        mut on_record: F,
    ) -> Result<RpcCode>
    where
        F: FnMut(ScanResp),
    {
        let req = ScanReq {
            start: start.map(|s| s.to_vec()),
            limit,
        };
        let stream_id = self.send(Method::Scan, req.encode())?;

        loop {
            match self.receive(stream_id)? {
                ResponseFrame::Item { message, .. } => on_record(ScanResp::decode(&message)?),
                ResponseFrame::End { code, .. } => return Ok(code),
                ResponseFrame::Reply { code, .. } => {
                    return Err(KvError::Protocol(format!(
                        "unary reply ({:?}) on scan stream {}",
                        code, stream_id
                    )))
                }
            }
        }
    }

    /// Ask for a zero-filled payload of `size` bytes
    pub fn warmup(&mut self, size: u32) -> Result<Vec<u8>> {
        let resp: WarmupResp = self.unary(Method::Warmup, &WarmupReq { resp_size: size })?;
        Ok(resp.data)
    }

    /// Send an arbitrary method byte and payload, returning the first response frame
    pub fn call_raw(&mut self, method: u8, payload: Vec<u8>) -> Result<ResponseFrame> {
        let stream_id = self.send_byte(method, payload)?;
        self.receive(stream_id)
    }

    fn unary<Req: Message, Resp: Message>(&mut self, method: Method, req: &Req) -> Result<Resp> {
        let stream_id = self.send(method, req.encode())?;

        match self.receive(stream_id)? {
            ResponseFrame::Reply {
                code: RpcCode::Ok,
                message,
                ..
            } => Resp::decode(&message),
            ResponseFrame::Reply { code, .. } | ResponseFrame::End { code, .. } => {
                Err(KvError::Rpc(code))
            }
            ResponseFrame::Item { .. } => Err(KvError::Protocol(format!(
                "stream item in reply to {}",
                method.name()
            ))),
        }
    }

    fn send(&mut self, method: Method, payload: Vec<u8>) -> Result<u32> {
        self.send_byte(method as u8, payload)
    }

    fn send_byte(&mut self, method: u8, payload: Vec<u8>) -> Result<u32> {
        let stream_id = self.next_stream_id;
        self.next_stream_id = self.next_stream_id.wrapping_add(1);

        let frame = RequestFrame {
            method,
            stream_id,
            payload: Bytes::from(payload),
        };
        write_request_frame(&mut self.writer, &frame)?;
        Ok(stream_id)
    }

    fn receive(&mut self, stream_id: u32) -> Result<ResponseFrame> {
        let frame = read_response_frame(&mut self.reader)?;
        if frame.stream_id() != stream_id {
            return Err(KvError::Protocol(format!(
                "expected stream {}, got {}",
                stream_id,
                frame.stream_id()
            )));
        }
        Ok(frame)
    }
}
