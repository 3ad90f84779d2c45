//! Async Server Tests
//!
//! These tests verify, over real sockets:
//! - Every method is served by the completion-queue workers
//! - One acceptor per (method, worker) stays registered under load
//! - Streams end cleanly, including when the client goes away mid-scan
//! - Stop closes the store exactly once and is idempotent

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use crossbeam::channel;
use kvstore::protocol::{
    encode_request_frame, read_response_frame, ErrorCode, Message, Method, RequestFrame,
    ResponseFrame, RpcCode, ScanReq,
};
use kvstore::server::MAX_WARMUP_SIZE;
use kvstore::{Config, Engine, KvClient, KvError, KvServer, ServeMode, Store, WalSyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn start_async(workers: usize) -> (TempDir, Arc<Engine>, KvServer) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 64 })
        .listen_addr("127.0.0.1:0")
        .serve_mode(ServeMode::Async)
        .worker_threads(workers)
        .build();

    let engine = Arc::new(Engine::open(config.clone()).unwrap());
    let store: Arc<dyn Store> = engine.clone();
    let server = KvServer::start(config, store).unwrap();
    (temp_dir, engine, server)
}

fn assert_fully_armed(server: &KvServer, workers: usize) {
    let service = server.async_service().unwrap();
    for method in Method::ALL {
        assert_eq!(
            service.waiting_acceptors(method),
            workers,
            "{} acceptors",
            method.name()
        );
        assert_eq!(service.backlog_len(method), 0);
    }
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_end_to_end_scenario_two_workers() {
    let (_temp, _engine, mut server) = start_async(2);
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    assert_eq!(client.put(b"a", b"1").unwrap(), ErrorCode::Ok);
    assert_eq!(client.put(b"b", b"2").unwrap(), ErrorCode::Ok);

    let records = client.scan(None, Some(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!((records[0].key.as_slice(), records[0].value.as_slice()), (&b"a"[..], &b"1"[..]));

    assert_eq!(client.delete(b"a").unwrap(), ErrorCode::Ok);

    let missing = client.get(b"a").unwrap();
    assert_eq!(missing.status, ErrorCode::ServerError);
    assert!(missing.value.is_empty());

    let found = client.get(b"b").unwrap();
    assert_eq!(found.status, ErrorCode::Ok);
    assert_eq!(found.value, b"2");

    drop(client);
    server.stop().unwrap();
}

#[test]
fn test_seeded_before_first_request() {
    let (_temp, _engine, server) = start_async(3);
    assert_fully_armed(&server, 3);
    assert_eq!(server.mode(), ServeMode::Async);
}

#[test]
fn test_warmup_sizes() {
    let (_temp, _engine, server) = start_async(2);
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    for size in [0u32, 1, 1024, 1 << 20] {
        let data = client.warmup(size).unwrap();
        assert_eq!(data.len(), size as usize);
        assert!(data.iter().all(|b| *b == 0));
    }

    assert!(matches!(
        client.warmup(MAX_WARMUP_SIZE + 1),
        Err(KvError::Rpc(RpcCode::InvalidArgument))
    ));

    // The connection is still usable
    assert_eq!(client.warmup(8).unwrap().len(), 8);
}

#[test]
fn test_unknown_method_is_unimplemented() {
    let (_temp, _engine, server) = start_async(1);
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    match client.call_raw(0x7E, Vec::new()).unwrap() {
        ResponseFrame::Reply { code, .. } => assert_eq!(code, RpcCode::Unimplemented),
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn test_undecodable_request_is_invalid_argument() {
    let (_temp, _engine, server) = start_async(1);
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    match client.call_raw(Method::Get as u8, vec![0, 0]).unwrap() {
        ResponseFrame::Reply { code, .. } => assert_eq!(code, RpcCode::InvalidArgument),
        other => panic!("unexpected frame {:?}", other),
    }
    match client.call_raw(Method::Scan as u8, vec![0xFF]).unwrap() {
        ResponseFrame::End { code, .. } => assert_eq!(code, RpcCode::InvalidArgument),
        other => panic!("unexpected frame {:?}", other),
    }
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_bound_and_resume() {
    let (_temp, engine, server) = start_async(2);
    for i in 0..20 {
        engine.set(format!("k{:02}", i).as_bytes(), &[i as u8]).unwrap();
    }
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    for limit in [0u64, 1, 7, 20, 100] {
        let records = client.scan(None, Some(limit)).unwrap();
        assert_eq!(records.len(), limit.min(20) as usize);
    }

    let all = client.scan(None, None).unwrap();
    let resumed = client.scan(Some(b"k13".as_slice()), None).unwrap();
    assert_eq!(resumed.as_slice(), &all[13..]);

    let between = client.scan(Some(b"k05x".as_slice()), Some(2)).unwrap();
    let keys: Vec<_> = between.iter().map(|r| r.key.clone()).collect();
    assert_eq!(keys, vec![b"k06".to_vec(), b"k07".to_vec()]);
}

#[test]
fn test_client_disconnect_mid_scan() {
    let (_temp, engine, mut server) = start_async(2);
    let value = vec![b'v'; 4096];
    for i in 0..2000 {
        engine.set(format!("key{:05}", i).as_bytes(), &value).unwrap();
    }

    {
        let mut stream = TcpStream::connect(server.local_addr()).unwrap();
        let frame = RequestFrame {
            method: Method::Scan as u8,
            stream_id: 1,
            payload: Bytes::from(ScanReq::default().encode()),
        };
        stream.write_all(&encode_request_frame(&frame)).unwrap();

        let first = read_response_frame(&mut stream).unwrap();
        assert!(matches!(first, ResponseFrame::Item { stream_id: 1, .. }));
        // Dropped with most of the stream unread
    }

    // The server keeps serving other clients
    let mut client = KvClient::connect(server.local_addr()).unwrap();
    assert_eq!(client.get(b"key00001").unwrap().value, value);
    drop(client);

    server.stop().unwrap();
}

// =============================================================================
// Load Tests
// =============================================================================

#[test]
fn test_acceptors_restored_after_concurrent_load() {
    let workers = 4;
    let (_temp, _engine, mut server) = start_async(workers);
    let addr = server.local_addr();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            thread::spawn(move || {
                let mut client = KvClient::connect(addr).unwrap();
                for i in 0..50 {
                    let key = format!("t{}-{:03}", t, i);
                    assert_eq!(client.put(key.as_bytes(), b"v").unwrap(), ErrorCode::Ok);
                    assert_eq!(client.get(key.as_bytes()).unwrap().status, ErrorCode::Ok);
                    if i % 10 == 0 {
                        client.scan(Some(format!("t{}-", t).as_bytes()), Some(5)).unwrap();
                        client.warmup(128).unwrap();
                        client.delete(key.as_bytes()).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_fully_armed(&server, workers);
    server.stop().unwrap();
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_stop_closes_store_once() {
    let (_temp, engine, mut server) = start_async(2);
    let mut client = KvClient::connect(server.local_addr()).unwrap();
    client.put(b"k", b"v").unwrap();

    server.stop().unwrap();
    server.stop().unwrap();

    assert!(matches!(engine.get(b"k"), Err(KvError::StoreClosed)));
    assert!(client.get(b"k").is_err());
}

#[test]
fn test_stop_with_idle_connection_open() {
    let (_temp, _engine, mut server) = start_async(2);
    let _idle = TcpStream::connect(server.local_addr()).unwrap();
    let mut client = KvClient::connect(server.local_addr()).unwrap();
    client.warmup(16).unwrap();

    server.stop().unwrap();
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_run_until_returns_when_shutdown_channel_closes() {
    let (_temp, engine, mut server) = start_async(2);
    let mut client = KvClient::connect(server.local_addr()).unwrap();
    client.put(b"k", b"v").unwrap();

    let (tx, rx) = channel::bounded::<()>(1);
    drop(tx);
    server.run_until(&rx).unwrap();

    assert!(server.async_service().is_none());
    assert!(matches!(engine.get(b"k"), Err(KvError::StoreClosed)));
    assert!(client.get(b"k").is_err());
}
