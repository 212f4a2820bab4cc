use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    resp::RespValue,
    server::{Role, ServerConfig},
};

/// `REPLCONF` carries several replication sub-commands:
///
/// - `listening-port` and `capa` arrive during the handshake and are
///   acknowledged with `+OK`.
/// - `ACK <offset>` is replica-to-master only: the master records the
///   offset on the replica matching the sender's address and sends no
///   reply.
/// - `GETACK *` is master-to-replica only: the replica answers with
///   `REPLCONF ACK <master_repl_offset>`, reporting the offset before
///   this frame is counted.
pub async fn replconf(
    server: Arc<RwLock<ServerConfig>>,
    client_address: &str,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.is_empty() {
        return Err(CommandError::WrongNumberOfArguments("replconf"));
    }

    match arguments[0].to_uppercase().as_str() {
        "ACK" => {
            let mut server_guard = server.write().await;

            if server_guard.role != Role::Master {
                return Err(CommandError::AckOnReplica);
            }

            if arguments.len() != 2 {
                return Err(CommandError::WrongNumberOfArguments("replconf"));
            }

            let offset = arguments[1]
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidAckOffset)?;

            if let Some(replica) = server_guard.replicas.get_mut(client_address) {
                replica.offset = offset;
            }

            Ok(CommandResult::NoResponse)
        }
        "GETACK" => {
            let server_guard = server.read().await;

            if server_guard.role == Role::Master {
                return Err(CommandError::GetAckOnMaster);
            }

            let reply = RespValue::command_array(&[
                "REPLCONF".to_string(),
                "ACK".to_string(),
                server_guard.repl_offset.to_string(),
            ]);

            Ok(CommandResult::Response(reply.encode()))
        }
        _ => Ok(CommandResult::Response(
            RespValue::SimpleString("OK".to_string()).encode(),
        )),
    }
}
