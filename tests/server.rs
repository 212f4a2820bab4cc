//! End-to-end tests driving real servers over TCP sockets.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use emberdb::server::ServerConfig;

fn server_args(parts: &[&str]) -> Vec<String> {
    let mut args = vec!["emberdb".to_string()];
    args.extend(parts.iter().map(|part| part.to_string()));
    args
}

/// Spawns a server with the given flags and waits until its port accepts
/// connections.
async fn start_server(parts: &[&str], port: u16) {
    let server = ServerConfig::new(server_args(parts)).unwrap();

    tokio::spawn(async move {
        if let Err(error) = server.run().await {
            panic!("server failed: {}", error);
        }
    });

    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }

    panic!("server on port {} did not come up", port);
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap_or_else(|error| panic!("failed to connect to port {}: {}", port, error))
}

fn encode_command(parts: &[&str]) -> String {
    let mut encoded = format!("*{}\r\n", parts.len());
    for part in parts {
        encoded.push_str(&format!("${}\r\n{}\r\n", part.len(), part));
    }
    encoded
}

async fn send_command(stream: &mut TcpStream, parts: &[&str]) {
    stream
        .write_all(encode_command(parts).as_bytes())
        .await
        .unwrap();
    stream.flush().await.unwrap();
}

async fn read_reply(stream: &mut TcpStream) -> String {
    let mut buffer = [0u8; 4096];
    let bytes_read = timeout(Duration::from_secs(2), stream.read(&mut buffer))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();

    String::from_utf8_lossy(&buffer[..bytes_read]).to_string()
}

async fn roundtrip(stream: &mut TcpStream, parts: &[&str]) -> String {
    send_command(stream, parts).await;
    read_reply(stream).await
}

#[tokio::test]
async fn test_ping_and_echo() {
    start_server(&["--port", "7380"], 7380).await;
    let mut client = connect(7380).await;

    assert_eq!(roundtrip(&mut client, &["PING"]).await, "+PONG\r\n");
    assert_eq!(roundtrip(&mut client, &["ECHO", "hey"]).await, "$3\r\nhey\r\n");
}

#[tokio::test]
async fn test_unknown_command_keeps_connection_open() {
    start_server(&["--port", "7381"], 7381).await;
    let mut client = connect(7381).await;

    let reply = roundtrip(&mut client, &["FLUSHALL"]).await;
    assert_eq!(reply, "-ERR unknown command 'FLUSHALL'\r\n");

    // The connection survives a command error.
    assert_eq!(roundtrip(&mut client, &["PING"]).await, "+PONG\r\n");
}

#[tokio::test]
async fn test_set_get_with_expiry() {
    start_server(&["--port", "7382"], 7382).await;
    let mut client = connect(7382).await;

    assert_eq!(
        roundtrip(&mut client, &["SET", "k", "v", "PX", "100"]).await,
        "+OK\r\n"
    );
    assert_eq!(roundtrip(&mut client, &["GET", "k"]).await, "$1\r\nv\r\n");
    assert_eq!(roundtrip(&mut client, &["TYPE", "k"]).await, "+string\r\n");

    sleep(Duration::from_millis(150)).await;

    assert_eq!(roundtrip(&mut client, &["GET", "k"]).await, "$-1\r\n");
    assert_eq!(roundtrip(&mut client, &["TYPE", "k"]).await, "+none\r\n");

    // A stored empty string is distinct from a missing key.
    assert_eq!(roundtrip(&mut client, &["SET", "empty", ""]).await, "+OK\r\n");
    assert_eq!(roundtrip(&mut client, &["GET", "empty"]).await, "$0\r\n\r\n");

    // PX 0 stores a value that is already stale on its next read.
    assert_eq!(
        roundtrip(&mut client, &["SET", "gone", "v", "PX", "0"]).await,
        "+OK\r\n"
    );
    assert_eq!(roundtrip(&mut client, &["GET", "gone"]).await, "$-1\r\n");
}

#[tokio::test]
async fn test_stream_add_and_range() {
    start_server(&["--port", "7383"], 7383).await;
    let mut client = connect(7383).await;

    assert_eq!(
        roundtrip(&mut client, &["XADD", "s", "1-1", "a", "b"]).await,
        "$3\r\n1-1\r\n"
    );
    assert_eq!(
        roundtrip(&mut client, &["XADD", "s", "1-2", "c", "d"]).await,
        "$3\r\n1-2\r\n"
    );
    assert_eq!(
        roundtrip(&mut client, &["XADD", "s", "2-0", "e", "f"]).await,
        "$3\r\n2-0\r\n"
    );

    assert_eq!(roundtrip(&mut client, &["TYPE", "s"]).await, "+stream\r\n");

    let reply = roundtrip(&mut client, &["XRANGE", "s", "1", "2"]).await;
    assert!(reply.starts_with("*3\r\n"), "{}", reply);
    let first = reply.find("1-1").unwrap();
    let second = reply.find("1-2").unwrap();
    let third = reply.find("2-0").unwrap();
    assert!(first < second && second < third, "{}", reply);

    // Stale and 0-0 IDs are rejected with their specific errors.
    let reply = roundtrip(&mut client, &["XADD", "s", "2-0", "x", "y"]).await;
    assert_eq!(
        reply,
        "-ERR The ID specified in XADD is equal or smaller than the target stream top item\r\n"
    );
    let reply = roundtrip(&mut client, &["XADD", "other", "0-0", "x", "y"]).await;
    assert_eq!(
        reply,
        "-ERR The ID specified in XADD must be greater than 0-0\r\n"
    );
}

#[tokio::test]
async fn test_blocking_xread_woken_by_xadd() {
    start_server(&["--port", "7384"], 7384).await;

    let mut blocked_client = connect(7384).await;
    let mut writer_client = connect(7384).await;

    // Seed the stream so `$` resolves against an existing last entry.
    assert_eq!(
        roundtrip(&mut writer_client, &["XADD", "s", "1-1", "seed", "1"]).await,
        "$3\r\n1-1\r\n"
    );

    send_command(
        &mut blocked_client,
        &["XREAD", "BLOCK", "0", "STREAMS", "s", "$"],
    )
    .await;

    // Let the reader register its subscriber before appending.
    sleep(Duration::from_millis(100)).await;

    let added = roundtrip(&mut writer_client, &["XADD", "s", "5-1", "x", "y"]).await;
    assert_eq!(added, "$3\r\n5-1\r\n");

    let reply = read_reply(&mut blocked_client).await;
    assert!(reply.contains("5-1"), "{}", reply);
    assert!(!reply.contains("1-1"), "only entries after $: {}", reply);
}

#[tokio::test]
async fn test_blocking_xread_timeout_returns_null() {
    start_server(&["--port", "7385"], 7385).await;
    let mut client = connect(7385).await;

    let reply = roundtrip(&mut client, &["XREAD", "BLOCK", "50", "STREAMS", "s", "$"]).await;
    assert_eq!(reply, "$-1\r\n");
}

#[tokio::test]
async fn test_config_get_and_info() {
    start_server(
        &[
            "--port",
            "7386",
            "--dir",
            "/tmp/emberdb",
            "--dbfilename",
            "dump.rdb",
        ],
        7386,
    )
    .await;
    let mut client = connect(7386).await;

    assert_eq!(
        roundtrip(&mut client, &["CONFIG", "GET", "dir"]).await,
        "*2\r\n$3\r\ndir\r\n$12\r\n/tmp/emberdb\r\n"
    );
    assert_eq!(
        roundtrip(&mut client, &["CONFIG", "GET", "dbfilename"]).await,
        "*2\r\n$10\r\ndbfilename\r\n$8\r\ndump.rdb\r\n"
    );

    let reply = roundtrip(&mut client, &["INFO", "replication"]).await;
    assert!(reply.contains("# Replication"), "{}", reply);
    assert!(reply.contains("role:master"), "{}", reply);
    assert!(reply.contains("master_repl_offset:0"), "{}", reply);
}

#[tokio::test]
async fn test_replication_quorum() {
    start_server(&["--port", "7390"], 7390).await;
    start_server(
        &["--port", "7391", "--replicaof", "127.0.0.1 7390"],
        7391,
    )
    .await;
    start_server(
        &["--port", "7392", "--replicaof", "127.0.0.1 7390"],
        7392,
    )
    .await;

    // Give both replicas time to finish the handshake.
    sleep(Duration::from_millis(300)).await;

    let mut client = connect(7390).await;
    assert_eq!(roundtrip(&mut client, &["SET", "k", "v"]).await, "+OK\r\n");

    // Let the fan-out reach the replicas before asking for the quorum.
    sleep(Duration::from_millis(200)).await;

    let reply = roundtrip(&mut client, &["WAIT", "2", "500"]).await;
    assert_eq!(reply, ":2\r\n");

    // The propagated write is readable on a replica.
    let mut replica_client = connect(7391).await;
    assert_eq!(
        roundtrip(&mut replica_client, &["GET", "k"]).await,
        "$1\r\nv\r\n"
    );

    let reply = roundtrip(&mut replica_client, &["INFO", "replication"]).await;
    assert!(reply.contains("role:slave"), "{}", reply);

    // Replicas refuse writes from ordinary clients.
    let reply = roundtrip(&mut replica_client, &["SET", "other", "nope"]).await;
    assert!(reply.starts_with("-ERR"), "{}", reply);
}

#[tokio::test]
async fn test_stream_replication_to_replica() {
    start_server(&["--port", "7393"], 7393).await;
    start_server(
        &["--port", "7394", "--replicaof", "127.0.0.1 7393"],
        7394,
    )
    .await;

    sleep(Duration::from_millis(300)).await;

    let mut client = connect(7393).await;
    assert_eq!(
        roundtrip(&mut client, &["XADD", "s", "1-1", "a", "b"]).await,
        "$3\r\n1-1\r\n"
    );

    sleep(Duration::from_millis(200)).await;

    let mut replica_client = connect(7394).await;
    let reply = roundtrip(&mut replica_client, &["XRANGE", "s", "-", "+"]).await;
    assert!(reply.contains("1-1"), "XADD propagates to replicas: {}", reply);
}

#[tokio::test]
async fn test_rdb_load_at_startup() {
    let directory = std::env::temp_dir().join("emberdb-rdb-test");
    std::fs::create_dir_all(&directory).unwrap();

    let mut bytes = b"REDIS0011".to_vec();
    bytes.push(0xFE);
    bytes.push(0x00);
    // foo -> bar without expiry.
    bytes.extend_from_slice(&[0x00, 0x03]);
    bytes.extend_from_slice(b"foo");
    bytes.push(0x03);
    bytes.extend_from_slice(b"bar");
    // fresh -> kept with a far-future expiry.
    bytes.push(0xFC);
    bytes.extend_from_slice(&4_100_000_000_000u64.to_le_bytes());
    bytes.extend_from_slice(&[0x00, 0x05]);
    bytes.extend_from_slice(b"fresh");
    bytes.push(0x04);
    bytes.extend_from_slice(b"kept");
    // stale -> gone, expired long ago.
    bytes.push(0xFC);
    bytes.extend_from_slice(&1_000u64.to_le_bytes());
    bytes.extend_from_slice(&[0x00, 0x05]);
    bytes.extend_from_slice(b"stale");
    bytes.push(0x04);
    bytes.extend_from_slice(b"gone");
    bytes.push(0xFF);
    bytes.extend_from_slice(&[0u8; 8]);

    std::fs::write(directory.join("seed.rdb"), &bytes).unwrap();

    start_server(
        &[
            "--port",
            "7395",
            "--dir",
            directory.to_str().unwrap(),
            "--dbfilename",
            "seed.rdb",
        ],
        7395,
    )
    .await;

    let mut client = connect(7395).await;

    assert_eq!(roundtrip(&mut client, &["GET", "foo"]).await, "$3\r\nbar\r\n");
    assert_eq!(
        roundtrip(&mut client, &["GET", "fresh"]).await,
        "$4\r\nkept\r\n"
    );
    assert_eq!(roundtrip(&mut client, &["GET", "stale"]).await, "$-1\r\n");

    let reply = roundtrip(&mut client, &["KEYS", "*"]).await;
    assert!(reply.starts_with("*2\r\n"), "{}", reply);
    assert!(reply.contains("$3\r\nfoo\r\n"), "{}", reply);
    assert!(reply.contains("$5\r\nfresh\r\n"), "{}", reply);
}
