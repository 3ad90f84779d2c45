//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Request Frame
//! ```text
//! ┌──────────┬──────────────┬──────────┬─────────────────────┐
//! │Method (1)│ Stream ID (4)│ Len (4)  │      Payload        │
//! └──────────┴──────────────┴──────────┴─────────────────────┘
//! ```
//!
//! ### Methods
//! - 0x01: GET     - Payload: GetReq
//! - 0x02: PUT     - Payload: PutReq
//! - 0x03: DELETE  - Payload: DeleteReq
//! - 0x04: SCAN    - Payload: ScanReq (server streaming)
//! - 0x05: WARMUP  - Payload: WarmupReq
//!
//! ## Response Frame
//! ```text
//! ┌──────────┬──────────────┬──────────┬─────────────────────┐
//! │ Kind (1) │ Stream ID (4)│ Len (4)  │      Payload        │
//! └──────────┴──────────────┴──────────┴─────────────────────┘
//! ```
//!
//! ### Kinds
//! - 0x01: REPLY - Payload: rpc code (1) + response message
//! - 0x02: ITEM  - Payload: one streamed response message
//! - 0x03: END   - Payload: rpc code (1), closes a stream
//!
//! Stream IDs are chosen by the client and echoed on every response frame
//! for that call.

mod request;
mod response;
mod codec;

pub use request::{DeleteReq, GetReq, Method, PutReq, ScanReq, WarmupReq};
pub use response::{DeleteResp, ErrorCode, GetResp, PutResp, RpcCode, ScanResp, WarmupResp};
pub use codec::{
    decode_request_frame, decode_response_frame, encode_request_frame, encode_response_frame,
    read_request_frame, read_response_frame, write_request_frame, write_response_frame,
    Message, RequestFrame, ResponseFrame, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
