use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{
        command_error::CommandError,
        config_get::config_get,
        echo::echo,
        get::get,
        info::info,
        keys::keys,
        ping::ping,
        psync::psync,
        replconf::replconf,
        set::set,
        type_command::type_command,
        wait::wait,
        xadd::xadd,
        xrange::xrange,
        xread::xread,
    },
    key_value_store::KeyValueStore,
    resp::Message,
    server::{Role, ServerConfig},
};

/// What the connection loop should do with a finished command.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Write this RESP-encoded reply back.
    Response(String),
    /// Write nothing (e.g. `REPLCONF ACK` on a master).
    NoResponse,
    /// Write the `+FULLRESYNC` header plus the empty RDB blob, then move
    /// the connection into the replica map.
    FullResync(String),
}

/// A parsed command: uppercased name plus its raw string arguments.
#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
}

impl CommandHandler {
    pub fn new(message: &Message) -> Result<Self, CommandError> {
        let Some((name, arguments)) = message.commands.split_first() else {
            return Err(CommandError::EmptyCommand);
        };

        Ok(Self {
            name: name.to_uppercase(),
            arguments: arguments.to_vec(),
        })
    }

    /// Commands that mutate the keyspace and therefore propagate to
    /// replicas.
    pub fn is_write_command(&self) -> bool {
        matches!(self.name.as_str(), "SET" | "XADD")
    }

    /// Routes the command to its handler and, for accepted write commands
    /// on a master, enqueues the original argument tuple for replica
    /// fan-out.
    pub async fn handle_command(
        &self,
        server: Arc<RwLock<ServerConfig>>,
        client_address: &str,
        store: Arc<RwLock<KeyValueStore>>,
    ) -> Result<CommandResult, CommandError> {
        let result = match self.name.as_str() {
            "PING" => ping(self.arguments.clone()).map(CommandResult::Response),
            "ECHO" => echo(self.arguments.clone()).map(CommandResult::Response),
            "SET" => set(store, self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "GET" => get(store, self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "TYPE" => type_command(store, self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "KEYS" => keys(store, self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "CONFIG" => config_get(Arc::clone(&server), self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "INFO" => info(Arc::clone(&server), self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "REPLCONF" => {
                replconf(Arc::clone(&server), client_address, self.arguments.clone()).await
            }
            "PSYNC" => psync(Arc::clone(&server), self.arguments.clone()).await,
            "WAIT" => wait(Arc::clone(&server), self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "XADD" => xadd(store, self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "XRANGE" => xrange(store, self.arguments.clone())
                .await
                .map(CommandResult::Response),
            "XREAD" => xread(client_address, store, self.arguments.clone())
                .await
                .map(CommandResult::Response),
            _ => Err(CommandError::UnknownCommand(self.name.clone())),
        }?;

        if self.is_write_command() {
            self.enqueue_for_replication(&server).await;
        }

        Ok(result)
    }

    /// Hands the accepted write to the fan-out dispatcher. Only masters
    /// propagate; a replica applying the replication stream must not echo
    /// writes anywhere.
    async fn enqueue_for_replication(&self, server: &Arc<RwLock<ServerConfig>>) {
        let server_guard = server.read().await;

        if server_guard.role != Role::Master {
            return;
        }

        let mut command = Vec::with_capacity(self.arguments.len() + 1);
        command.push(self.name.clone());
        command.extend(self.arguments.iter().cloned());

        let _ = server_guard.replica_write_tx.send(command);
    }
}
