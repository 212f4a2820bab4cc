use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::RwLock;

use crate::{
    commands::command_error::CommandError,
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

/// Reads a string value. Missing keys, expired keys and keys holding a
/// different variant all reply with a null bulk string; a stored empty
/// string replies with an empty bulk string. Noticing an expired entry
/// removes it as a side effect.
pub async fn get(
    store: Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::WrongNumberOfArguments("get"));
    }

    let key = &arguments[0];
    let now = Timestamp::now();

    {
        let store_guard = store.read().await;

        match store_guard.get(key) {
            None => return Ok(RespValue::NullBulkString.encode()),
            Some(value) if !value.is_expired(now) => {
                return Ok(match value.data {
                    DataType::String(ref content) => {
                        RespValue::BulkString(content.clone()).encode()
                    }
                    DataType::Stream(_) => RespValue::NullBulkString.encode(),
                });
            }
            // Expired: drop the read lock and delete below.
            Some(_) => (),
        }
    }

    let mut store_guard = store.write().await;

    if store_guard
        .get(key)
        .is_some_and(|value| value.is_expired(Timestamp::now()))
    {
        store_guard.remove(key);
    }

    Ok(RespValue::NullBulkString.encode())
}
