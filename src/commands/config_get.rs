use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{commands::command_error::CommandError, resp::RespValue, server::ServerConfig};

/// `CONFIG GET dir|dbfilename`: replies with a `[name, value]` array.
pub async fn config_get(
    server: Arc<RwLock<ServerConfig>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    if arguments.len() != 2 {
        return Err(CommandError::WrongNumberOfArguments("config"));
    }

    if arguments[0].to_uppercase() != "GET" {
        return Err(CommandError::UnsupportedConfigSubcommand);
    }

    let server_guard = server.read().await;

    let (name, value) = match arguments[1].to_lowercase().as_str() {
        "dir" => ("dir", server_guard.rdb_dir.clone()),
        "dbfilename" => ("dbfilename", server_guard.rdb_filename.clone()),
        _ => return Err(CommandError::UnsupportedConfigParameter),
    };

    Ok(RespValue::Array(vec![
        RespValue::BulkString(name.to_string()),
        RespValue::BulkString(value),
    ])
    .encode())
}
