use std::{sync::Arc, time::Duration};

use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::Instant;

use crate::{
    commands::{command_error::CommandError, stream_utils::entries_to_resp},
    key_value_store::{DataType, KeyValueStore, Value},
    resp::RespValue,
    stream::{EntryId, Stream, StreamEntry},
};

/// Parsed arguments for XREAD.
pub struct XreadArguments {
    count: Option<usize>,
    block_milliseconds: Option<u64>,
    /// `(key, id)` pairs in request order; the reply keeps this order.
    queries: Vec<(String, String)>,
}

impl XreadArguments {
    /// `XREAD [COUNT n] [BLOCK ms] STREAMS key [key ...] id [id ...]`.
    /// Options come before the STREAMS keyword in any order; the keys and
    /// IDs after it split evenly in half.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let mut count = None;
        let mut block_milliseconds = None;
        let mut index = 0;

        loop {
            let Some(option) = arguments.get(index) else {
                return Err(CommandError::WrongNumberOfArguments("xread"));
            };

            match option.to_uppercase().as_str() {
                "COUNT" => {
                    let value = arguments
                        .get(index + 1)
                        .ok_or(CommandError::WrongNumberOfArguments("xread"))?;
                    count = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| CommandError::NotAnInteger)?,
                    );
                    index += 2;
                }
                "BLOCK" => {
                    let value = arguments
                        .get(index + 1)
                        .ok_or(CommandError::WrongNumberOfArguments("xread"))?;
                    block_milliseconds = Some(
                        value
                            .parse::<u64>()
                            .map_err(|_| CommandError::TimeoutNotANumber)?,
                    );
                    index += 2;
                }
                "STREAMS" => {
                    index += 1;
                    break;
                }
                _ => return Err(CommandError::SyntaxError),
            }
        }

        let key_id_arguments = &arguments[index..];

        if key_id_arguments.is_empty() || key_id_arguments.len() % 2 != 0 {
            return Err(CommandError::WrongNumberOfArguments("xread"));
        }

        let half = key_id_arguments.len() / 2;
        let mut queries = Vec::with_capacity(half);

        for query_index in 0..half {
            queries.push((
                key_id_arguments[query_index].clone(),
                key_id_arguments[half + query_index].clone(),
            ));
        }

        Ok(Self {
            count,
            block_milliseconds,
            queries,
        })
    }
}

/// `XREAD`: for each stream, entries with IDs strictly greater than the
/// supplied ID.
///
/// Without BLOCK the immediate result is returned as-is. With BLOCK, if
/// nothing matches right away, one task per stream registers a subscriber
/// channel on its stream and loops: re-read from the supplied ID, and if
/// still unsatisfied await a notification, the shared deadline, or
/// cancellation by a sibling that already got data. `BLOCK 0` waits
/// indefinitely. An empty overall result is a null bulk reply.
pub async fn xread(
    client_address: &str,
    store: Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    let xread_arguments = XreadArguments::parse(arguments)?;
    let count = xread_arguments.count;

    let queries = resolve_start_ids(&store, xread_arguments.queries).await?;

    let results = read_streams(&store, &queries, count).await?;
    let satisfied = results.iter().any(|entries| match count {
        Some(count) => entries.len() >= count,
        None => !entries.is_empty(),
    });

    let Some(block_milliseconds) = xread_arguments.block_milliseconds else {
        return Ok(encode_results(&queries, &results));
    };

    if satisfied {
        return Ok(encode_results(&queries, &results));
    }

    let deadline =
        (block_milliseconds > 0).then(|| Instant::now() + Duration::from_millis(block_milliseconds));

    // One leg per stream; the first leg to come back with data cancels
    // its siblings through the watch channel so no leg outlives the
    // response.
    let (cancel_sender, cancel_receiver) = watch::channel(false);
    let cancel_sender = Arc::new(cancel_sender);

    let mut legs = Vec::with_capacity(queries.len());

    for (leg_index, (key, start)) in queries.iter().enumerate() {
        legs.push(tokio::spawn(block_on_stream(
            Arc::clone(&store),
            key.clone(),
            *start,
            count,
            deadline,
            format!("{}/{}", client_address, leg_index),
            Arc::clone(&cancel_sender),
            cancel_receiver.clone(),
        )));
    }

    let mut results = Vec::with_capacity(queries.len());

    for leg in legs {
        match leg.await {
            Ok(Ok(entries)) => results.push(entries),
            Ok(Err(error)) => {
                let _ = cancel_sender.send(true);
                return Err(error);
            }
            Err(_) => results.push(Vec::new()),
        }
    }

    Ok(encode_results(&queries, &results))
}

/// Resolves each requested ID, replacing the `$` sentinel with the
/// stream's current last entry ID (`0-0` when the stream is empty or the
/// key missing).
async fn resolve_start_ids(
    store: &Arc<RwLock<KeyValueStore>>,
    queries: Vec<(String, String)>,
) -> Result<Vec<(String, EntryId)>, CommandError> {
    let store_guard = store.read().await;

    queries
        .into_iter()
        .map(|(key, id)| {
            let start = if id == "$" {
                match store_guard.get(&key) {
                    Some(Value {
                        data: DataType::Stream(stream),
                        ..
                    }) => stream.last_id().unwrap_or(EntryId::MIN),
                    Some(_) => return Err(CommandError::WrongDataType),
                    None => EntryId::MIN,
                }
            } else {
                EntryId::parse(&id)?
            };

            Ok((key, start))
        })
        .collect()
}

async fn read_streams(
    store: &Arc<RwLock<KeyValueStore>>,
    queries: &[(String, EntryId)],
    count: Option<usize>,
) -> Result<Vec<Vec<StreamEntry>>, CommandError> {
    let store_guard = store.read().await;
    let mut results = Vec::with_capacity(queries.len());

    for (key, start) in queries {
        match store_guard.get(key) {
            Some(value) => match value.data {
                DataType::Stream(ref stream) => results.push(stream.read_after(*start, count)),
                DataType::String(_) => return Err(CommandError::WrongDataType),
            },
            None => results.push(Vec::new()),
        }
    }

    Ok(results)
}

/// One blocking leg. Registers a subscriber channel on the target stream
/// (creating an empty stream to anchor the subscription when the key does
/// not exist yet), then alternates between re-reading and waiting. The
/// subscriber is always unregistered on the way out.
#[allow(clippy::too_many_arguments)]
async fn block_on_stream(
    store: Arc<RwLock<KeyValueStore>>,
    key: String,
    start: EntryId,
    count: Option<usize>,
    deadline: Option<Instant>,
    token: String,
    cancel_sender: Arc<watch::Sender<bool>>,
    mut cancel_receiver: watch::Receiver<bool>,
) -> Result<Vec<StreamEntry>, CommandError> {
    let (notify_sender, mut notify_receiver) = mpsc::channel::<()>(8);

    {
        let mut store_guard = store.write().await;

        let value = store_guard.entry(key.clone()).or_insert_with(|| Value {
            data: DataType::Stream(Stream::new()),
            expiration: None,
        });

        let DataType::Stream(ref mut stream) = value.data else {
            return Err(CommandError::WrongDataType);
        };

        stream.subscribe(token.clone(), notify_sender);
    }

    let (entries, satisfied) = loop {
        let entries = {
            let store_guard = store.read().await;
            match store_guard.get(&key) {
                Some(Value {
                    data: DataType::Stream(stream),
                    ..
                }) => stream.read_after(start, count),
                _ => Vec::new(),
            }
        };

        let satisfied = match count {
            Some(count) => entries.len() >= count,
            None => !entries.is_empty(),
        };

        if satisfied {
            break (entries, satisfied);
        }

        let stop_waiting = match deadline {
            Some(deadline) => tokio::select! {
                _ = notify_receiver.recv() => false,
                _ = tokio::time::sleep_until(deadline) => true,
                _ = cancel_receiver.changed() => true,
            },
            None => tokio::select! {
                _ = notify_receiver.recv() => false,
                _ = cancel_receiver.changed() => true,
            },
        };

        if stop_waiting {
            break (entries, satisfied);
        }
    };

    {
        let mut store_guard = store.write().await;

        if let Some(Value {
            data: DataType::Stream(stream),
            ..
        }) = store_guard.get_mut(&key)
        {
            stream.unsubscribe(&token);
        }
    }

    if satisfied {
        let _ = cancel_sender.send(true);
    }

    Ok(entries)
}

/// Assembles the reply: non-empty per-stream result lists in request
/// order, or a null bulk string when every stream came back empty.
fn encode_results(queries: &[(String, EntryId)], results: &[Vec<StreamEntry>]) -> String {
    let mut streams = Vec::new();

    for ((key, _), entries) in queries.iter().zip(results) {
        if entries.is_empty() {
            continue;
        }

        streams.push(RespValue::Array(vec![
            RespValue::BulkString(key.clone()),
            entries_to_resp(entries),
        ]));
    }

    if streams.is_empty() {
        return RespValue::NullBulkString.encode();
    }

    RespValue::Array(streams).encode()
}
