use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use tokio::sync::RwLock;

use crate::{
    commands::command_error::CommandError,
    key_value_store::{DataType, KeyValueStore, Value},
    resp::RespValue,
};

pub struct SetArguments {
    key: String,
    value: String,
    expiration: Option<Timestamp>,
}

impl SetArguments {
    /// `SET key value [PX milliseconds]`. The expiry is absolute from the
    /// moment of parsing, so `PX 0` stores a value that is already stale
    /// on its next read.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::WrongNumberOfArguments("set"));
        }

        let mut expiration: Option<Timestamp> = None;

        if arguments.len() == 4 {
            if arguments[2].to_uppercase() != "PX" {
                return Err(CommandError::SyntaxError);
            }

            let milliseconds = arguments[3]
                .parse::<i64>()
                .ok()
                .filter(|value| *value >= 0)
                .ok_or(CommandError::InvalidExpireTime)?;

            expiration = Some(
                Timestamp::now()
                    .checked_add(SignedDuration::from_millis(milliseconds))
                    .map_err(|_| CommandError::InvalidExpireTime)?,
            );
        }

        Ok(Self {
            key: arguments[0].clone(),
            value: arguments[1].clone(),
            expiration,
        })
    }
}

/// Stores a string value, overwriting any previous entry regardless of
/// its variant.
pub async fn set(
    store: Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;

    let mut store_guard = store.write().await;
    store_guard.insert(
        set_arguments.key,
        Value {
            data: DataType::String(set_arguments.value),
            expiration: set_arguments.expiration,
        },
    );

    Ok(RespValue::SimpleString("OK".to_string()).encode())
}
