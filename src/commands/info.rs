use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{commands::command_error::CommandError, resp::RespValue, server::ServerConfig};

/// `INFO [replication]`: replies with the replication section as a bulk
/// string. Only the replication section exists.
pub async fn info(
    server: Arc<RwLock<ServerConfig>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    if arguments.len() > 1 {
        return Err(CommandError::WrongNumberOfArguments("info"));
    }

    if let Some(section) = arguments.first() {
        if section.to_lowercase() != "replication" {
            return Err(CommandError::UnsupportedInfoSection);
        }
    }

    let server_guard = server.read().await;

    let body = format!(
        "# Replication\nrole:{}\nmaster_replid:{}\nmaster_repl_offset:{}\n",
        server_guard.role.as_str(),
        server_guard.replid,
        server_guard.repl_offset,
    );

    Ok(RespValue::BulkString(body).encode())
}
