//! Sync Server Tests
//!
//! These tests verify:
//! - Requests answered on the connection thread over real sockets
//! - Scan limits, start keys and deleted keys
//! - Several clients sharing one store
//! - Shutdown with connections still open

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use kvstore::protocol::{ErrorCode, Method, ResponseFrame, RpcCode};
use kvstore::{Config, Engine, KvClient, KvError, KvServer, ServeMode, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn start_sync() -> (TempDir, Arc<Engine>, KvServer) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .listen_addr("127.0.0.1:0")
        .serve_mode(ServeMode::Sync)
        .build();

    let engine = Arc::new(Engine::open(config.clone()).unwrap());
    let store: Arc<dyn Store> = engine.clone();
    let server = KvServer::start(config, store).unwrap();
    (temp_dir, engine, server)
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_sync_mode_has_no_async_service() {
    let (_temp, _engine, server) = start_sync();
    assert_eq!(server.mode(), ServeMode::Sync);
    assert!(server.async_service().is_none());
}

#[test]
fn test_put_get_delete_round() {
    let (_temp, _engine, server) = start_sync();
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    assert_eq!(client.put(b"alpha", b"1").unwrap(), ErrorCode::Ok);
    assert_eq!(client.get_value(b"alpha").unwrap(), b"1");

    assert_eq!(client.put(b"alpha", b"2").unwrap(), ErrorCode::Ok);
    assert_eq!(client.get_value(b"alpha").unwrap(), b"2");

    assert_eq!(client.delete(b"alpha").unwrap(), ErrorCode::Ok);
    assert!(matches!(client.get_value(b"alpha"), Err(KvError::KeyNotFound)));

    // Deleting again is still Ok
    assert_eq!(client.delete(b"alpha").unwrap(), ErrorCode::Ok);
}

#[test]
fn test_deleted_key_absent_from_scan() {
    let (_temp, _engine, server) = start_sync();
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    for key in ["a", "b", "c"] {
        client.put(key.as_bytes(), b"v").unwrap();
    }
    client.delete(b"b").unwrap();

    let keys: Vec<_> = client
        .scan(None, None)
        .unwrap()
        .into_iter()
        .map(|r| r.key)
        .collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_scan_limit_and_start() {
    let (_temp, engine, server) = start_sync();
    for i in 0..10 {
        engine.set(format!("k{}", i).as_bytes(), b"v").unwrap();
    }
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    assert_eq!(client.scan(None, Some(0)).unwrap().len(), 0);
    assert_eq!(client.scan(None, Some(3)).unwrap().len(), 3);
    assert_eq!(client.scan(None, None).unwrap().len(), 10);

    let tail = client.scan(Some(b"k8".as_slice()), Some(5)).unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].key, b"k8");
}

#[test]
fn test_warmup_and_errors() {
    let (_temp, _engine, server) = start_sync();
    let mut client = KvClient::connect(server.local_addr()).unwrap();

    assert_eq!(client.warmup(333).unwrap(), vec![0u8; 333]);
    assert!(matches!(
        client.warmup(u32::MAX),
        Err(KvError::Rpc(RpcCode::InvalidArgument))
    ));

    match client.call_raw(0x00, Vec::new()).unwrap() {
        ResponseFrame::Reply { code, .. } => assert_eq!(code, RpcCode::Unimplemented),
        other => panic!("unexpected frame {:?}", other),
    }
    match client.call_raw(Method::Put as u8, vec![1]).unwrap() {
        ResponseFrame::Reply { code, .. } => assert_eq!(code, RpcCode::InvalidArgument),
        other => panic!("unexpected frame {:?}", other),
    }
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_clients_share_one_store() {
    let (_temp, engine, server) = start_sync();
    let addr = server.local_addr();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            thread::spawn(move || {
                let mut client = KvClient::connect(addr).unwrap();
                for i in 0..25 {
                    let key = format!("c{}-{:02}", t, i);
                    client.put(key.as_bytes(), key.as_bytes()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.entry_count(), 100);
    let mut client = KvClient::connect(addr).unwrap();
    assert_eq!(client.get_value(b"c3-24").unwrap(), b"c3-24");
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_stop_with_open_connections() {
    let (_temp, engine, mut server) = start_sync();
    let mut a = KvClient::connect(server.local_addr()).unwrap();
    let _b = KvClient::connect(server.local_addr()).unwrap();
    a.put(b"k", b"v").unwrap();

    server.stop().unwrap();

    assert_eq!(server.connection_count(), 0);
    assert!(matches!(engine.get(b"k"), Err(KvError::StoreClosed)));
    assert!(a.get(b"k").is_err());
}

#[test]
fn test_run_until_shutdown_signal() {
    let (_temp, engine, mut server) = start_sync();
    let addr = server.local_addr();
    let mut client = KvClient::connect(addr).unwrap();
    client.put(b"k", b"v").unwrap();

    let (tx, rx) = channel::bounded(1);
    let signaller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        tx.send(()).unwrap();
    });

    server.run_until(&rx).unwrap();
    signaller.join().unwrap();

    assert_eq!(server.connection_count(), 0);
    assert!(matches!(engine.get(b"k"), Err(KvError::StoreClosed)));
    assert!(KvClient::connect(addr).is_err());
}
