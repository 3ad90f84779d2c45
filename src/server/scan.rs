//! Streaming scan session
//!
//! A scan owns one store iterator from the moment it starts writing until it
//! finishes. Each write cycle emits at most one record and advances the
//! iterator once; the next cycle only runs after the previous record's write
//! has completed, so the producer never runs ahead of the connection.

use crate::error::Result;
use crate::network::Notify;
use crate::protocol::{RpcCode, ScanReq, ScanResp};
use crate::rpc::ServerWriter;
use crate::store::{Store, StoreIterator};

/// Outcome of one write cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// A record was written; stay in WRITING
    Wrote,

    /// The stream's final status was written; move to FINISH
    Finished(RpcCode),
}

/// Iterator and pacing state of one Scan call
#[derive(Default)]
pub struct ScanSession {
    iter: Option<Box<dyn StoreIterator>>,
    writer: Option<ServerWriter<ScanResp>>,

    /// Records still allowed by the request's limit
    remaining: u64,

    /// Set when advancing the iterator failed after a record was sent
    failed: bool,
}

impl ScanSession {
    /// Acquire the iterator for `req`
    pub fn start(
        &mut self,
        store: &dyn Store,
        req: &ScanReq,
        writer: ServerWriter<ScanResp>,
    ) -> Result<()> {
        self.writer = Some(writer);
        self.remaining = req.limit.unwrap_or(u64::MAX);
        self.iter = Some(store.iter(req.start.as_deref())?);
        Ok(())
    }

    /// Run one write cycle; `notify` is attached to whatever gets written
    pub fn write_step(&mut self, notify: Notify) -> WriteStep {
        let Some(writer) = self.writer.as_ref() else {
            // Never started: nothing to attach the completion to
            notify(true);
            return WriteStep::Finished(RpcCode::Internal);
        };

        let code = match self.iter.as_mut() {
            None => RpcCode::Internal,
            Some(_) if self.failed => RpcCode::Internal,
            Some(_) if self.remaining == 0 => RpcCode::Ok,
            Some(iter) => match iter.get() {
                Ok(Some(record)) => {
                    writer.write(
                        &ScanResp {
                            key: record.key,
                            value: record.value,
                        },
                        notify,
                    );
                    self.remaining -= 1;

                    if let Err(e) = iter.next() {
                        tracing::warn!("Scan iterator failed to advance: {}", e);
                        self.failed = true;
                    }
                    return WriteStep::Wrote;
                }
                Ok(None) => RpcCode::Ok,
                Err(e) => {
                    tracing::warn!("Scan iterator failed: {}", e);
                    RpcCode::Internal
                }
            },
        };

        writer.finish(code, notify);
        WriteStep::Finished(code)
    }

    /// Drop the iterator. Returns `true` only the first time.
    pub fn release(&mut self) -> bool {
        match self.iter.take() {
            Some(iter) => {
                drop(iter);
                tracing::trace!("Scan iterator released");
                true
            }
            None => false,
        }
    }

    pub fn holds_iterator(&self) -> bool {
        self.iter.is_some()
    }
}
