//! Replication: master-side write fan-out and the replica-side handshake
//! and apply loop.

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::{
    commands::{CommandHandler, CommandResult},
    connection::write_to_stream,
    frame::{FrameError, FrameReader},
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::ServerConfig,
};

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("unexpected reply from master: {0}")]
    UnexpectedReply(String),
}

/// Drains the master's write fan-out queue.
///
/// One event at a time: the command tuple is serialized back to a RESP
/// array, written to every registered replica (concurrently, but awaited
/// before the next event so each replica sees writes in commit order),
/// and the serialized byte count advances every replica's expected
/// offset plus the master's own replication offset. Replicas whose
/// connection fails are dropped from the map.
pub async fn run_write_dispatcher(
    server: Arc<RwLock<ServerConfig>>,
    mut queue: mpsc::UnboundedReceiver<Vec<String>>,
) {
    while let Some(command) = queue.recv().await {
        let payload = RespValue::command_array(&command).encode();
        let payload_length = payload.len() as u64;

        let replicas: Vec<(String, Arc<RwLock<OwnedWriteHalf>>)> = {
            let server_guard = server.read().await;
            server_guard
                .replicas
                .iter()
                .map(|(address, replica)| (address.clone(), Arc::clone(&replica.writer)))
                .collect()
        };

        let mut writes = Vec::with_capacity(replicas.len());

        for (address, writer) in replicas {
            let payload = payload.clone();

            writes.push(tokio::spawn(async move {
                let result = write_to_stream(writer, payload.as_bytes()).await;
                (address, result)
            }));
        }

        let mut failed_addresses = Vec::new();

        for write in writes {
            if let Ok((address, result)) = write.await {
                if let Err(error) = result {
                    warn!("dropping replica {}: {}", address, error);
                    failed_addresses.push(address);
                }
            }
        }

        let mut server_guard = server.write().await;

        for address in failed_addresses {
            server_guard.replicas.remove(&address);
        }

        for replica in server_guard.replicas.values_mut() {
            replica.expected_offset += payload_length;
        }

        server_guard.repl_offset += payload_length;
    }
}

/// Connects out to the master, runs the handshake, and leaves a
/// background task applying the propagation stream. Returns an error
/// when the connection or any handshake step fails; that error is fatal
/// for replica startup.
pub async fn connect_to_master(
    host: String,
    port: u16,
    server: Arc<RwLock<ServerConfig>>,
    store: Arc<RwLock<KeyValueStore>>,
) -> Result<(), HandshakeError> {
    let master_address = format!("{}:{}", host, port);
    let stream = TcpStream::connect(&master_address).await?;

    let (reader_half, writer_half) = stream.into_split();
    let mut reader = FrameReader::new(reader_half);
    let writer = Arc::new(RwLock::new(writer_half));

    handshake(&mut reader, &writer, &server).await?;
    info!("completed handshake with master {}", master_address);

    tokio::spawn(handle_master_connection(
        reader,
        writer,
        master_address,
        server,
        store,
    ));

    Ok(())
}

/// The four-step replication handshake, then the inline RDB snapshot:
///
/// 1. `PING` → `+PONG`
/// 2. `REPLCONF listening-port <port>` → `+OK`
/// 3. `REPLCONF capa psync2` → `+OK`
/// 4. `PSYNC ? -1` → `+FULLRESYNC <replid> <offset>`
///
/// The snapshot bytes that follow are read through the frame reader's RDB
/// mode and discarded; this server starts replicas against an empty
/// keyspace.
async fn handshake(
    reader: &mut FrameReader<OwnedReadHalf>,
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    server: &Arc<RwLock<ServerConfig>>,
) -> Result<(), HandshakeError> {
    let listening_port = {
        let server_guard = server.read().await;
        server_guard.port
    };

    send_and_expect(reader, writer, &["PING"], "PONG").await?;
    send_and_expect(
        reader,
        writer,
        &["REPLCONF", "listening-port", &listening_port.to_string()],
        "OK",
    )
    .await?;
    send_and_expect(reader, writer, &["REPLCONF", "capa", "psync2"], "OK").await?;

    let reply = send_command(reader, writer, &["PSYNC", "?", "-1"]).await?;

    if reply.first().map(String::as_str) != Some("FULLRESYNC") {
        return Err(HandshakeError::UnexpectedReply(reply.join(" ")));
    }

    if reply.len() != 3 || !is_valid_replid(&reply[1]) {
        return Err(HandshakeError::UnexpectedReply(reply.join(" ")));
    }

    let snapshot = reader.read_rdb_payload().await?;
    debug!("discarded {}-byte RDB snapshot from master", snapshot.len());

    let mut server_guard = server.write().await;
    server_guard.handshake_complete = true;

    Ok(())
}

/// Applies the propagation stream from the master.
///
/// Each frame dispatches like a client command, but replies are
/// suppressed with one exception: `REPLCONF GETACK *` is answered with
/// `REPLCONF ACK <offset>`, carrying the offset before this frame is
/// counted. After every frame the replica's replication offset advances
/// by the frame's exact byte count.
async fn handle_master_connection(
    mut reader: FrameReader<OwnedReadHalf>,
    writer: Arc<RwLock<OwnedWriteHalf>>,
    master_address: String,
    server: Arc<RwLock<ServerConfig>>,
    store: Arc<RwLock<KeyValueStore>>,
) {
    loop {
        let message = match reader.read_message().await {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!("connection to master closed");
                break;
            }
            Err(error) => {
                warn!("error on master connection: {}", error);
                break;
            }
        };

        let bytes_consumed = message.bytes_consumed;

        let command_handler = match CommandHandler::new(&message) {
            Ok(handler) => handler,
            Err(_) => continue,
        };

        let is_getack = command_handler.name == "REPLCONF"
            && command_handler
                .arguments
                .first()
                .is_some_and(|argument| argument.eq_ignore_ascii_case("GETACK"));

        match command_handler
            .handle_command(Arc::clone(&server), &master_address, Arc::clone(&store))
            .await
        {
            Ok(CommandResult::Response(response)) if is_getack => {
                if let Err(error) =
                    write_to_stream(Arc::clone(&writer), response.as_bytes()).await
                {
                    warn!("failed to send ACK to master: {}", error);
                    break;
                }
            }
            Ok(_) => (),
            Err(error) => {
                debug!("failed to apply command from master: {:?}", error);
            }
        }

        let mut server_guard = server.write().await;
        if server_guard.handshake_complete {
            server_guard.repl_offset += bytes_consumed;
        }
    }
}

async fn send_command(
    reader: &mut FrameReader<OwnedReadHalf>,
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    command: &[&str],
) -> Result<Vec<String>, HandshakeError> {
    let arguments: Vec<String> = command.iter().map(|part| part.to_string()).collect();
    let payload = RespValue::command_array(&arguments).encode();

    write_to_stream(Arc::clone(writer), payload.as_bytes()).await?;

    match reader.read_message().await? {
        Some(message) => Ok(message.commands),
        None => Err(HandshakeError::UnexpectedReply(
            "connection closed".to_string(),
        )),
    }
}

async fn send_and_expect(
    reader: &mut FrameReader<OwnedReadHalf>,
    writer: &Arc<RwLock<OwnedWriteHalf>>,
    command: &[&str],
    expected: &str,
) -> Result<(), HandshakeError> {
    let reply = send_command(reader, writer, command).await?;

    if reply.first().map(String::as_str) != Some(expected) {
        return Err(HandshakeError::UnexpectedReply(reply.join(" ")));
    }

    Ok(())
}

fn is_valid_replid(replid: &str) -> bool {
    let pattern = Regex::new(r"^[a-zA-Z0-9]{40}$").expect("static pattern");
    pattern.is_match(replid)
}
