use std::{sync::Arc, time::Duration};

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;

use crate::{
    commands::command_error::CommandError,
    connection::write_to_stream,
    resp::RespValue,
    server::{Role, ServerConfig},
};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct WaitArguments {
    minimum_replicas: usize,
    timeout: Option<Duration>,
}

impl WaitArguments {
    /// `WAIT numreplicas timeout_ms`; a timeout of 0 waits forever.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::WrongNumberOfArguments("wait"));
        }

        let minimum_replicas = arguments[0]
            .parse::<usize>()
            .map_err(|_| CommandError::ReplicaCountNotANumber)?;

        let timeout_milliseconds = arguments[1]
            .parse::<u64>()
            .map_err(|_| CommandError::TimeoutNotANumber)?;

        let timeout = match timeout_milliseconds {
            0 => None,
            milliseconds => Some(Duration::from_millis(milliseconds)),
        };

        Ok(Self {
            minimum_replicas,
            timeout,
        })
    }
}

/// Quorum acknowledgement: probes every replica with `REPLCONF GETACK *`,
/// then polls until enough replicas have acknowledged at least the bytes
/// queued for them, or the deadline fires. The reply is the number of
/// caught-up replicas at that moment.
///
/// A replica counts as caught up when its acknowledged offset has reached
/// its expected offset; counting it settles the expected-offset watermark
/// forward to the acknowledged value, never backwards.
pub async fn wait(
    server: Arc<RwLock<ServerConfig>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    let wait_arguments = WaitArguments::parse(arguments)?;

    let writers: Vec<Arc<RwLock<OwnedWriteHalf>>> = {
        let server_guard = server.read().await;

        if server_guard.role != Role::Master {
            return Err(CommandError::WaitOnReplica);
        }

        server_guard
            .replicas
            .values()
            .map(|replica| Arc::clone(&replica.writer))
            .collect()
    };

    let getack = RespValue::command_array(&[
        "REPLCONF".to_string(),
        "GETACK".to_string(),
        "*".to_string(),
    ])
    .encode();

    for writer in writers {
        let payload = getack.clone();

        tokio::spawn(async move {
            if let Err(error) = write_to_stream(writer, payload.as_bytes()).await {
                warn!("failed to probe replica for ACK: {}", error);
            }
        });
    }

    let deadline = wait_arguments.timeout.map(|timeout| Instant::now() + timeout);

    loop {
        let acknowledged = {
            let mut server_guard = server.write().await;
            let mut acknowledged = 0;

            for replica in server_guard.replicas.values_mut() {
                if replica.offset >= replica.expected_offset {
                    replica.expected_offset = replica.offset;
                    acknowledged += 1;
                }
            }

            acknowledged
        };

        if acknowledged >= wait_arguments.minimum_replicas {
            return Ok(RespValue::Integer(acknowledged as i64).encode());
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(RespValue::Integer(acknowledged as i64).encode());
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
