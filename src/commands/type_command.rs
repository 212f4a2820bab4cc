use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::RwLock;

use crate::{
    commands::command_error::CommandError,
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
};

/// Reports the variant stored under a key: `string`, `stream` or `none`.
/// An expired entry reads as `none` and is removed.
pub async fn type_command(
    store: Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::WrongNumberOfArguments("type"));
    }

    let key = &arguments[0];
    let now = Timestamp::now();

    {
        let store_guard = store.read().await;

        match store_guard.get(key) {
            None => return Ok(RespValue::SimpleString("none".to_string()).encode()),
            Some(value) if !value.is_expired(now) => {
                let type_name = match value.data {
                    DataType::String(_) => "string",
                    DataType::Stream(_) => "stream",
                };

                return Ok(RespValue::SimpleString(type_name.to_string()).encode());
            }
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

    Ok(RespValue::SimpleString("none".to_string()).encode())
}
