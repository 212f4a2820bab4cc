use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    commands::{CommandError, CommandHandler, CommandResult},
    frame::FrameReader,
    key_value_store::KeyValueStore,
    rdb::empty_rdb_bytes,
    resp::RespValue,
    server::{Replica, Role, ServerConfig},
};

/// Serves one accepted client connection until it closes.
///
/// Command errors are replied on the same connection and the loop keeps
/// going; protocol errors close the connection. When the connection had
/// been promoted to a replica via PSYNC, closing it removes the replica
/// record.
pub async fn handle_client_connection(
    stream: TcpStream,
    server: Arc<RwLock<ServerConfig>>,
    client_address: String,
    store: Arc<RwLock<KeyValueStore>>,
) {
    let (reader_half, writer_half) = stream.into_split();
    let mut reader = FrameReader::new(reader_half);
    let writer = Arc::new(RwLock::new(writer_half));

    loop {
        let message = match reader.read_message().await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(error) => {
                debug!("closing connection {}: {}", client_address, error);
                break;
            }
        };

        let command_handler = match CommandHandler::new(&message) {
            Ok(handler) => handler,
            Err(error) => {
                if write_to_stream(Arc::clone(&writer), error.as_string().as_bytes())
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        if is_write_refused_on_replica(&server, &command_handler).await {
            let reply = CommandError::WriteOnReplica.as_string();
            if write_to_stream(Arc::clone(&writer), reply.as_bytes())
                .await
                .is_err()
            {
                break;
            }
            continue;
        }

        let dispatch_result = command_handler
            .handle_command(Arc::clone(&server), &client_address, Arc::clone(&store))
            .await;

        match dispatch_result {
            Ok(CommandResult::Response(response)) => {
                if write_to_stream(Arc::clone(&writer), response.as_bytes())
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(CommandResult::NoResponse) => (),
            Ok(CommandResult::FullResync(header)) => {
                match register_replica(
                    header,
                    Arc::clone(&writer),
                    Arc::clone(&server),
                    &client_address,
                )
                .await
                {
                    Ok(()) => debug!("registered replica {}", client_address),
                    Err(error) => {
                        warn!("failed to register replica {}: {}", client_address, error);
                        break;
                    }
                }
            }
            Err(error) => {
                if write_to_stream(Arc::clone(&writer), error.as_string().as_bytes())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    let mut server_guard = server.write().await;
    if server_guard.replicas.remove(&client_address).is_some() {
        debug!("removed replica {}", client_address);
    }
}

/// Sends the `+FULLRESYNC` header followed by the empty RDB blob
/// (`$<len>\r\n<bytes>`, no trailing CRLF), then moves the connection
/// into the replica map with both offset counters at zero. Everything
/// written to this connection afterwards is the propagation stream.
async fn register_replica(
    header: String,
    writer: Arc<RwLock<OwnedWriteHalf>>,
    server: Arc<RwLock<ServerConfig>>,
    client_address: &str,
) -> tokio::io::Result<()> {
    let blob = empty_rdb_bytes();

    let mut payload = Vec::with_capacity(header.len() + blob.len() + 16);
    payload.extend_from_slice(RespValue::SimpleString(header).encode().as_bytes());
    payload.extend_from_slice(format!("${}\r\n", blob.len()).as_bytes());
    payload.extend_from_slice(&blob);

    write_to_stream(Arc::clone(&writer), &payload).await?;

    let mut server_guard = server.write().await;
    server_guard.replicas.insert(
        client_address.to_string(),
        Replica {
            writer,
            offset: 0,
            expected_offset: 0,
        },
    );

    Ok(())
}

/// Writes and flushes under the shared writer lock, keeping concurrent
/// writers (command replies, fan-out, GETACK probes) from interleaving
/// partial frames.
pub async fn write_to_stream(
    writer: Arc<RwLock<OwnedWriteHalf>>,
    response: &[u8],
) -> tokio::io::Result<()> {
    let mut writer_guard = writer.write().await;
    writer_guard.write_all(response).await?;
    writer_guard.flush().await?;

    Ok(())
}

/// Replicas refuse write commands from ordinary clients; only the master
/// connection may mutate their keyspace.
async fn is_write_refused_on_replica(
    server: &Arc<RwLock<ServerConfig>>,
    command_handler: &CommandHandler,
) -> bool {
    if !command_handler.is_write_command() {
        return false;
    }

    let server_guard = server.read().await;
    matches!(server_guard.role, Role::Replica { .. })
}
