//! Store operations shared by both serving modes
//!
//! Store failures never escape as errors: they become `ServerError` in the
//! response and the call completes normally.

use crate::protocol::{
    DeleteReq, DeleteResp, ErrorCode, GetReq, GetResp, PutReq, PutResp, RpcCode, WarmupReq,
    WarmupResp, MAX_PAYLOAD_SIZE,
};
use crate::store::Store;

/// Largest warmup payload that fits in a reply frame
pub const MAX_WARMUP_SIZE: u32 = MAX_PAYLOAD_SIZE - 1;

pub fn get(store: &dyn Store, req: &GetReq) -> GetResp {
    match store.get(&req.key) {
        Ok(Some(value)) => GetResp {
            status: ErrorCode::Ok,
            value,
        },
        Ok(None) => GetResp {
            status: ErrorCode::ServerError,
            value: Vec::new(),
        },
        Err(e) => {
            tracing::warn!("Get failed: {}", e);
            GetResp {
                status: ErrorCode::ServerError,
                value: Vec::new(),
            }
        }
    }
}

pub fn put(store: &dyn Store, req: &PutReq) -> PutResp {
    let status = match store.set(&req.key, &req.value) {
        Ok(()) => ErrorCode::Ok,
        Err(e) => {
            tracing::warn!("Put failed: {}", e);
            ErrorCode::ServerError
        }
    };
    PutResp { status }
}

pub fn delete(store: &dyn Store, req: &DeleteReq) -> DeleteResp {
    let status = match store.delete(&req.key) {
        Ok(()) => ErrorCode::Ok,
        Err(e) => {
            tracing::warn!("Delete failed: {}", e);
            ErrorCode::ServerError
        }
    };
    DeleteResp { status }
}

/// Zero-filled payload of the requested size; touches no store state
pub fn warmup(req: &WarmupReq) -> std::result::Result<WarmupResp, RpcCode> {
    if req.resp_size > MAX_WARMUP_SIZE {
        return Err(RpcCode::InvalidArgument);
    }
    Ok(WarmupResp {
        data: vec![0u8; req.resp_size as usize],
    })
}
