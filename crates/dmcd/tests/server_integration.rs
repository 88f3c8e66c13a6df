//! Integration tests for the Unix socket control server.
//!
//! These tests run a real ControlServer on a temporary socket and speak
//! the line protocol over actual connections: built-in commands, error
//! replies, runtime registration, binary framing, stale socket
//! recovery, and graceful shutdown.
//!
//! Tests are free to use `.unwrap()` and `.expect()`; the assertions
//! here are how the panic-free behavior of production code gets
//! checked.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dmc_client::{ClientError, ControlClient};
use dmc_core::MirrorSession;
use dmc_protocol::Reply;
use dmcd::{ControlServer, ServerError};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for the server to start accepting connections
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between readiness probes
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle and cleanup.
struct TestServer {
    server: Arc<ControlServer>,
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    _temp_dir: TempDir, // Keep alive for RAII cleanup
}

impl TestServer {
    /// Spawns a new test server on a fresh temporary socket.
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("test.sock");
        Self::spawn_at(temp_dir, socket_path).await
    }

    /// Spawns a server on a caller-prepared path, which may already
    /// hold a stale socket file.
    async fn spawn_at(temp_dir: TempDir, socket_path: PathBuf) -> Self {
        let cancel_token = CancellationToken::new();
        let server = Arc::new(ControlServer::new(
            socket_path.clone(),
            Arc::new(MirrorSession::new()),
            cancel_token.clone(),
        ));

        let run_server = server.clone();
        tokio::spawn(async move {
            let _ = run_server.run().await;
        });

        // A leftover stale file would satisfy an exists() check before
        // the server has bound, so readiness is probed with real
        // connection attempts.
        let start = tokio::time::Instant::now();
        let mut ready = false;
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if UnixStream::connect(&socket_path).await.is_ok() {
                ready = true;
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }

        assert!(
            ready,
            "Server did not accept connections within {SOCKET_WAIT_TIMEOUT:?}"
        );

        TestServer {
            server,
            socket_path,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }

    /// Creates a raw client connection to the server.
    async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Creates a typed client pointed at this server's socket.
    fn client(&self) -> ControlClient {
        ControlClient::new(&self.socket_path)
    }

    /// One full one-shot exchange: connect, send the line, read the
    /// reply with its trailing newline intact.
    async fn exchange(&self, line: &str) -> String {
        let mut client = self.connect().await;
        client.send_line(line).await;
        client.recv_raw().await
    }

    /// Shuts down the server gracefully.
    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Raw wire-level client connection.
struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Sends a command line with its newline terminator.
    async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Receives one reply line exactly as the server wrote it,
    /// trailing newline included. Returns an empty string on EOF.
    async fn recv_raw(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line
    }

    /// Closes the write half, signalling EOF to the server.
    async fn finish_writing(&mut self) {
        self.writer.shutdown().await.unwrap();
    }
}

// ============================================================================
// Built-in Command Tests
// ============================================================================

#[tokio::test]
async fn test_server_accepts_connection() {
    let server = TestServer::spawn().await;

    // Should be able to connect
    let _client = server.connect().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_status_reports_idle_session() {
    let server = TestServer::spawn().await;

    let reply = server.exchange("status").await;
    assert_eq!(reply, "{\"connected\":false,\"device\":null}\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_connect_status_disconnect_round_trip() {
    let server = TestServer::spawn().await;

    assert_eq!(server.exchange("connect emulator-5554").await, "OK\n");
    assert_eq!(
        server.exchange("status").await,
        "{\"connected\":true,\"device\":\"emulator-5554\"}\n"
    );

    assert_eq!(server.exchange("disconnect").await, "OK\n");
    assert_eq!(
        server.exchange("status").await,
        "{\"connected\":false,\"device\":null}\n"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_connect_without_device_claims_default() {
    let server = TestServer::spawn().await;

    assert_eq!(server.exchange("connect").await, "OK\n");
    assert_eq!(
        server.exchange("status").await,
        "{\"connected\":true,\"device\":null}\n"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_command_name_case_insensitive() {
    let server = TestServer::spawn().await;

    let reply = server.exchange("STATUS").await;
    assert!(reply.starts_with("{\"connected\""), "got: {reply}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_device_argument_case_preserved() {
    let server = TestServer::spawn().await;

    // Only the command name is lowercased; arguments pass through.
    assert_eq!(server.exchange("CONNECT Pixel-7A").await, "OK\n");
    assert_eq!(
        server.exchange("status").await,
        "{\"connected\":true,\"device\":\"Pixel-7A\"}\n"
    );

    server.shutdown().await;
}

// ============================================================================
// Error Reply Tests
// ============================================================================

#[tokio::test]
async fn test_empty_command_reply() {
    let server = TestServer::spawn().await;

    assert_eq!(server.exchange("").await, "ERROR: empty command\n");
    assert_eq!(server.exchange("   ").await, "ERROR: empty command\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_command_reply() {
    let server = TestServer::spawn().await;

    let reply = server.exchange("frobnicate").await;
    assert_eq!(reply, "ERROR: unknown command 'frobnicate'\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_command_reported_lowercased() {
    let server = TestServer::spawn().await;

    let reply = server.exchange("FooBar baz").await;
    assert_eq!(reply, "ERROR: unknown command 'foobar'\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_replies_end_with_single_newline() {
    let server = TestServer::spawn().await;

    for command in ["status", "connect dev-1", "disconnect", "", "bogus"] {
        let reply = server.exchange(command).await;
        assert!(reply.ends_with('\n'), "reply for {command:?}: {reply:?}");
        assert!(
            !reply.ends_with("\n\n"),
            "reply for {command:?} has extra newline: {reply:?}"
        );
    }

    server.shutdown().await;
}

// ============================================================================
// One-shot Connection Semantics
// ============================================================================

#[tokio::test]
async fn test_connection_closes_after_reply() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send_line("status").await;
    let reply = client.recv_raw().await;
    assert!(reply.starts_with("{\"connected\""));

    // Server closes after the single exchange
    let after = client.recv_raw().await;
    assert!(after.is_empty(), "expected EOF, got: {after:?}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_only_first_line_is_served() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    // Two commands in one write: the second never dispatches.
    client.send_line("status\nconnect ghost-device").await;
    let reply = client.recv_raw().await;
    assert!(reply.starts_with("{\"connected\":false"));

    assert_eq!(
        server.exchange("status").await,
        "{\"connected\":false,\"device\":null}\n"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_silent_close_without_data() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    // EOF before any bytes: the server closes without replying.
    client.finish_writing().await;
    let reply = client.recv_raw().await;
    assert!(reply.is_empty(), "expected no reply, got: {reply:?}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_unterminated_command_dispatched_at_eof() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    // No trailing newline; EOF flushes the buffered command.
    client.writer.write_all(b"status").await.unwrap();
    client.finish_writing().await;

    let reply = client.recv_raw().await;
    assert_eq!(reply, "{\"connected\":false,\"device\":null}\n");

    server.shutdown().await;
}

// ============================================================================
// Runtime Registration Tests
// ============================================================================

#[tokio::test]
async fn test_runtime_command_registration() {
    let server = TestServer::spawn().await;

    server
        .server
        .register("ping", |_args| Ok(Reply::line("pong")));

    assert_eq!(server.exchange("ping").await, "pong\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_registration_replaces_builtin() {
    let server = TestServer::spawn().await;

    server
        .server
        .register("status", |_args| Ok(Reply::line("maintenance")));

    assert_eq!(server.exchange("status").await, "maintenance\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_handler_sees_arguments() {
    let server = TestServer::spawn().await;

    server
        .server
        .register("echo", |args| Ok(Reply::line(args.join(" "))));

    assert_eq!(server.exchange("echo one Two THREE").await, "one Two THREE\n");

    server.shutdown().await;
}

// ============================================================================
// Binary Framing Tests
// ============================================================================

#[tokio::test]
async fn test_binary_reply_uses_length_prefix() {
    let server = TestServer::spawn().await;

    server
        .server
        .register("blob", |_args| Ok(Reply::binary(vec![1, 2, 3])));

    let mut client = server.connect().await;
    client.send_line("blob").await;

    let mut prefix = [0u8; 4];
    client.reader.read_exact(&mut prefix).await.unwrap();
    assert_eq!(prefix, [0, 0, 0, 3]);

    let mut payload = [0u8; 3];
    client.reader.read_exact(&mut payload).await.unwrap();
    assert_eq!(payload, [1, 2, 3]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_binary_round_trip() {
    let server = TestServer::spawn().await;

    server
        .server
        .register("frame", |_args| Ok(Reply::binary(b"raw bytes".to_vec())));

    let payload = server.client().request_binary("frame").await.unwrap();
    assert_eq!(payload, b"raw bytes");

    server.shutdown().await;
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_graceful_shutdown_removes_socket() {
    let server = TestServer::spawn().await;
    let socket_path = server.socket_path.clone();

    server.cancel_token.cancel();
    sleep(SHUTDOWN_GRACE_PERIOD).await;

    assert!(
        !socket_path.exists(),
        "Socket file should be removed after shutdown"
    );
}

#[tokio::test]
async fn test_quit_replies_before_shutting_down() {
    let server = TestServer::spawn().await;
    let socket_path = server.socket_path.clone();

    assert_eq!(server.exchange("quit").await, "OK\n");

    sleep(SHUTDOWN_GRACE_PERIOD).await;
    assert!(
        !socket_path.exists(),
        "Socket file should be removed after quit"
    );
    assert!(
        UnixStream::connect(&socket_path).await.is_err(),
        "Server should no longer accept connections"
    );
}

#[tokio::test]
async fn test_stale_socket_file_is_reclaimed() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let socket_path = temp_dir.path().join("stale.sock");

    // Bind and drop a listener: the fd closes but the file remains,
    // which is exactly the crashed-daemon leftovers case.
    let stale = tokio::net::UnixListener::bind(&socket_path).expect("bind stale listener");
    drop(stale);
    assert!(socket_path.exists(), "stale socket file should remain");

    let server = TestServer::spawn_at(temp_dir, socket_path).await;

    let reply = server.exchange("status").await;
    assert_eq!(reply, "{\"connected\":false,\"device\":null}\n");

    server.shutdown().await;
}

#[tokio::test]
async fn test_second_server_fails_fast() {
    let server = TestServer::spawn().await;

    let second = ControlServer::new(
        server.socket_path.clone(),
        Arc::new(MirrorSession::new()),
        CancellationToken::new(),
    );

    match second.run().await {
        Err(ServerError::AlreadyRunning { path }) => {
            assert_eq!(path, server.socket_path);
        }
        other => panic!("Expected AlreadyRunning, got {other:?}"),
    }

    // The losing server must not have disturbed the running one.
    assert!(server.socket_path.exists());
    let reply = server.exchange("status").await;
    assert!(reply.starts_with("{\"connected\""));

    server.shutdown().await;
}

// ============================================================================
// Typed Client Tests
// ============================================================================

#[tokio::test]
async fn test_typed_client_round_trip() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let status = client.status().await.unwrap();
    assert!(!status.connected);
    assert!(status.device.is_none());

    client.connect(Some("emulator-5554")).await.unwrap();
    let status = client.status().await.unwrap();
    assert!(status.connected);
    assert_eq!(status.device.unwrap().as_str(), "emulator-5554");

    client.disconnect().await.unwrap();
    let status = client.status().await.unwrap();
    assert!(!status.connected);

    server.shutdown().await;
}

#[tokio::test]
async fn test_typed_client_quit() {
    let server = TestServer::spawn().await;
    let client = server.client();
    let socket_path = server.socket_path.clone();

    client.quit().await.unwrap();

    sleep(SHUTDOWN_GRACE_PERIOD).await;
    assert!(!socket_path.exists());
}

#[tokio::test]
async fn test_client_reports_daemon_not_running() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let missing = temp_dir.path().join("nobody-home.sock");

    let client = ControlClient::new(&missing);
    match client.status().await {
        Err(ClientError::NotRunning { path }) => assert_eq!(path, missing),
        other => panic!("Expected NotRunning, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_surfaces_error_replies() {
    let server = TestServer::spawn().await;

    match server.client().request("frobnicate").await {
        Err(ClientError::ErrorReply { message }) => {
            assert_eq!(message, "unknown command 'frobnicate'");
        }
        other => panic!("Expected ErrorReply, got {other:?}"),
    }

    server.shutdown().await;
}

// ============================================================================
// Concurrent Clients Tests
// ============================================================================

#[tokio::test]
async fn test_multiple_clients_concurrent() {
    let server = TestServer::spawn().await;

    // 5 clients each run a full one-shot cycle concurrently
    let mut handles = Vec::new();
    for i in 0..5 {
        let client = server.client();
        let handle = tokio::spawn(async move {
            client.connect(Some(&format!("dev-{i}"))).await.unwrap();
            let status = client.status().await.unwrap();
            assert!(status.connected);
            client.disconnect().await.unwrap();
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.expect("concurrent client task should succeed");
    }

    server.shutdown().await;
}
