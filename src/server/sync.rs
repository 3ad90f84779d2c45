//! Sync serving
//!
//! Each request runs to completion on the connection thread that read it.

use std::sync::Arc;

use crate::network::{Dispatch, Incoming, ReplySink};
use crate::protocol::{
    DeleteReq, DeleteResp, GetReq, GetResp, Message, Method, PutReq, PutResp, RpcCode, ScanReq,
    ScanResp, WarmupReq, WarmupResp,
};
use crate::store::Store;

use super::handlers;

/// Blocking key-value service
pub struct KvStoreService {
    store: Arc<dyn Store>,
}

impl KvStoreService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn get(&self, req: &GetReq) -> GetResp {
        handlers::get(self.store.as_ref(), req)
    }

    pub fn put(&self, req: &PutReq) -> PutResp {
        handlers::put(self.store.as_ref(), req)
    }

    pub fn delete(&self, req: &DeleteReq) -> DeleteResp {
        handlers::delete(self.store.as_ref(), req)
    }

    pub fn warmup(&self, req: &WarmupReq) -> std::result::Result<WarmupResp, RpcCode> {
        handlers::warmup(req)
    }

    /// Stream records in key order starting at `req.start`
    ///
    /// `emit` is called once per record; returning `false` stops the scan.
    /// The iterator is dropped before this returns.
    pub fn scan<F>(&self, req: &ScanReq, mut emit: F) -> RpcCode
    where
        F: FnMut(ScanResp) -> bool,
    {
        let mut iter = match self.store.iter(req.start.as_deref()) {
            Ok(iter) => iter,
            Err(e) => {
                tracing::warn!("Scan could not open an iterator: {}", e);
                return RpcCode::Internal;
            }
        };

        let mut remaining = req.limit.unwrap_or(u64::MAX);
        while remaining > 0 {
            let record = match iter.get() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Scan iterator failed: {}", e);
                    return RpcCode::Internal;
                }
            };

            if !emit(ScanResp {
                key: record.key,
                value: record.value,
            }) {
                return RpcCode::Ok;
            }
            remaining -= 1;

            if let Err(e) = iter.next() {
                tracing::warn!("Scan iterator failed to advance: {}", e);
                return RpcCode::Internal;
            }
        }

        RpcCode::Ok
    }
}

impl Dispatch for KvStoreService {
    fn dispatch(&self, incoming: Incoming) {
        let Incoming {
            method,
            payload,
            reply,
            peer,
        } = incoming;

        match method {
            Method::Get => answer(&reply, &peer, &payload, |req: GetReq| Ok(self.get(&req))),
            Method::Put => answer(&reply, &peer, &payload, |req: PutReq| Ok(self.put(&req))),
            Method::Delete => {
                answer(&reply, &peer, &payload, |req: DeleteReq| Ok(self.delete(&req)))
            }
            Method::Warmup => answer(&reply, &peer, &payload, |req: WarmupReq| self.warmup(&req)),
            Method::Scan => {
                let code = match ScanReq::decode(&payload) {
                    Ok(req) => self.scan(&req, |resp| {
                        let queued = reply.item(resp.encode(), None);
                        if !queued {
                            tracing::debug!("Scan for {} stopped: connection gone", peer);
                        }
                        queued
                    }),
                    Err(e) => {
                        tracing::debug!("Bad ScanReq from {}: {}", peer, e);
                        RpcCode::InvalidArgument
                    }
                };
                reply.end(code, None);
            }
        }
    }
}

fn answer<Req, Resp, F>(reply: &ReplySink, peer: &str, payload: &[u8], handle: F)
where
    Req: Message,
    Resp: Message,
    F: FnOnce(Req) -> std::result::Result<Resp, RpcCode>,
{
    let result = Req::decode(payload)
        .map_err(|e| {
            tracing::debug!("Bad {} from {}: {}", Req::NAME, peer, e);
            RpcCode::InvalidArgument
        })
        .and_then(handle);

    match result {
        Ok(resp) => reply.reply(RpcCode::Ok, resp.encode(), None),
        Err(code) => reply.reply(code, Vec::new(), None),
    };
}
