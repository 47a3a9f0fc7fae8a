//! End-to-end tests: transaction manager over the real HTTP transport
//!
//! An in-process HTTP server wraps an [`InMemoryRecords`] store and speaks the
//! JSON-RPC envelope, so commits, remote errors and compensations all cross a
//! real socket.

use remtx::testing::{InMemoryRecords, RecordedCall};
use remtx::{
    Error, ErrorKind, FieldValues, HttpTransport, TransactionManager, TransactionState, Transport,
    TransportConfig,
};
use remtx_wire::{ErrorEnvelope, RequestId, Response};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ============================================================================
// Test Helpers
// ============================================================================

const MODEL: &str = "res.partner";

fn values(v: Value) -> FieldValues {
    v.as_object().cloned().unwrap()
}

/// Record service reachable over HTTP
struct RecordServer {
    addr: SocketAddr,
    records: Arc<InMemoryRecords>,
    calls: Arc<AtomicUsize>,
}

impl RecordServer {
    /// Start serving; `fail_on` names a call number answered with an access error
    async fn start(fail_on: Option<usize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let records = Arc::new(InMemoryRecords::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let (store, counter) = (Arc::clone(&records), Arc::clone(&calls));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (store, counter) = (Arc::clone(&store), Arc::clone(&counter));
                tokio::spawn(async move {
                    let _ = serve_one(stream, &store, &counter, fail_on).await;
                });
            }
        });

        RecordServer { addr, records, calls }
    }

    fn config(&self) -> TransportConfig {
        let toml = format!(
            "url = \"http://{}\"\nrpc_path = \"/jsonrpc\"\ntimeout_ms = 5000\n",
            self.addr
        );
        TransportConfig::from_toml_str(&toml).unwrap()
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn serve_one(
    mut stream: TcpStream,
    store: &InMemoryRecords,
    counter: &AtomicUsize,
    fail_on: Option<usize>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request: Value = serde_json::from_slice(&buf[header_end..]).unwrap_or(Value::Null);
    let id: RequestId = serde_json::from_value(request["id"].clone()).unwrap_or(RequestId::Number(0));
    let number = counter.fetch_add(1, Ordering::SeqCst) + 1;
    let call = RecordedCall {
        number,
        service: request["params"]["service"].as_str().unwrap_or_default().to_string(),
        method: request["params"]["method"].as_str().unwrap_or_default().to_string(),
        args: request["params"]["args"].as_array().cloned().unwrap_or_default(),
        id: Some(id.clone()),
    };

    let response = if fail_on == Some(number) {
        Response::failure(
            id,
            ErrorEnvelope {
                code: -32000,
                message: Some("Not allowed to modify this record".to_string()),
                data: Some(json!({"name": "exceptions.AccessError", "debug": "Traceback: access"})),
            },
        )
    } else {
        match store.handle(&call) {
            Ok(result) => Response::success(id, result),
            Err(e) => {
                let fault = e.remote_fault().cloned().unwrap();
                Response::failure(
                    id,
                    ErrorEnvelope {
                        code: fault.code().unwrap_or(-32603),
                        message: Some(fault.message),
                        data: fault.context.get("data").cloned(),
                    },
                )
            }
        }
    };

    let body = serde_json::to_string(&response).unwrap();
    let reply = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_commit_over_http() {
    let server = RecordServer::start(None).await;
    let existing = server.records.insert(MODEL, values(json!({"name": "Old", "city": "Oslo"})));
    let manager = TransactionManager::from_config(server.config()).unwrap();

    let mut txn = manager.begin(true);
    txn.create(MODEL, values(json!({"name": "Acme"}))).unwrap();
    txn.write(MODEL, [existing], values(json!({"name": "Renamed"}))).unwrap();
    manager.commit(&mut txn).await.unwrap();

    assert_eq!(txn.state(), TransactionState::Committed);
    assert_eq!(server.call_count(), 3);
    assert_eq!(server.records.count(MODEL), 2);
    assert_eq!(
        server.records.get(MODEL, existing).unwrap(),
        values(json!({"name": "Renamed", "city": "Oslo"}))
    );
    assert_eq!(manager.stats().successful, 1);

    manager.close().await;
    assert!(manager.transport().is_closed());
}

#[tokio::test]
async fn test_access_error_compensates_over_http() {
    // Calls: create, read, write, then the failing unlink
    let server = RecordServer::start(Some(4)).await;
    let id = server.records.insert(MODEL, values(json!({"name": "Before"})));
    let manager = TransactionManager::from_config(server.config()).unwrap();

    let mut txn = manager.begin(true);
    txn.create(MODEL, values(json!({"name": "Temp"}))).unwrap();
    txn.write(MODEL, [id], values(json!({"name": "After"}))).unwrap();
    txn.unlink(MODEL, [id]).unwrap();

    let failure = match manager.commit(&mut txn).await.unwrap_err() {
        Error::TransactionCommit(failure) => failure,
        other => panic!("expected commit failure, got {:?}", other),
    };

    assert_eq!(failure.failed_operation, 2);
    assert_eq!(failure.cause.kind(), ErrorKind::Access);
    assert_eq!(failure.cause.server_traceback(), Some("Traceback: access"));
    assert_eq!(failure.report.compensated(), vec![1, 0]);
    assert_eq!(failure.report.never_executed, vec![2]);

    assert_eq!(server.records.count(MODEL), 1);
    assert_eq!(server.records.get(MODEL, id).unwrap()["name"], json!("Before"));
    assert_eq!(manager.stats().failed, 1);
}

#[tokio::test]
async fn test_missing_record_error_over_http() {
    let server = RecordServer::start(None).await;
    let transport = HttpTransport::new(server.config()).unwrap();

    let err = transport
        .call("object", "execute_kw", vec![json!(MODEL), json!("unlink"), json!([[41]])], None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("Record not found"));
    assert!(transport.health_check().await);
}

#[tokio::test]
async fn test_scoped_transaction_over_http() {
    let server = RecordServer::start(None).await;
    let manager = TransactionManager::from_config(server.config()).unwrap();

    let created = manager
        .transaction(true, |txn| -> remtx::Result<usize> {
            txn.create(MODEL, values(json!({"name": "A"})))?;
            txn.create(MODEL, values(json!({"name": "B"})))
        })
        .await
        .unwrap();

    assert_eq!(created, 1);
    assert_eq!(server.records.count(MODEL), 2);
    let stats = manager.stats();
    assert_eq!((stats.successful, stats.failed, stats.active), (1, 0, 0));
}
