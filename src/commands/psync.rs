use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    server::{Role, ServerConfig},
};

pub struct PsyncArguments {
    replication_id: String,
    offset: i64,
}

impl PsyncArguments {
    /// `PSYNC ? -1`: a replica that knows nothing asks for a full resync.
    /// A concrete replication ID is only accepted when it matches ours.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::WrongNumberOfArguments("psync"));
        }

        let offset = arguments[1]
            .parse::<i64>()
            .map_err(|_| CommandError::InvalidPsyncOffset)?;

        Ok(Self {
            replication_id: arguments[0].clone(),
            offset,
        })
    }
}

/// Masters answer `PSYNC` with the full-resync header; the connection
/// loop follows up with the empty RDB blob and moves the connection into
/// the replica map.
pub async fn psync(
    server: Arc<RwLock<ServerConfig>>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let psync_arguments = PsyncArguments::parse(arguments)?;

    let server_guard = server.read().await;

    if server_guard.role != Role::Master {
        return Err(CommandError::PsyncOnReplica);
    }

    if psync_arguments.replication_id != "?"
        && psync_arguments.replication_id != server_guard.replid
    {
        return Err(CommandError::InvalidPsyncReplicationId);
    }

    if psync_arguments.offset != -1 {
        return Err(CommandError::InvalidPsyncOffset);
    }

    Ok(CommandResult::FullResync(format!(
        "FULLRESYNC {} {}",
        server_guard.replid, server_guard.repl_offset
    )))
}
