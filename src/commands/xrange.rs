use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::{command_error::CommandError, stream_utils::entries_to_resp},
    key_value_store::{DataType, KeyValueStore},
    resp::RespValue,
    stream::{StreamIdError, parse_range_end, parse_range_start},
};

/// `XRANGE key start end`: entries with IDs in `[start, end]`, both
/// bounds inclusive. `-` and `+` are the minimum and maximum sentinels; a
/// bare major bound fills its minor part with the matching extreme. A
/// missing key reads as an empty stream.
pub async fn xrange(
    store: Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    if arguments.len() != 3 {
        return Err(CommandError::WrongNumberOfArguments("xrange"));
    }

    let start = parse_range_start(&arguments[1])?;
    let end = parse_range_end(&arguments[2])?;

    if start > end {
        return Err(CommandError::InvalidStreamId(StreamIdError::InvalidRange));
    }

    let store_guard = store.read().await;

    let Some(value) = store_guard.get(&arguments[0]) else {
        return Ok(RespValue::Array(Vec::new()).encode());
    };

    let DataType::Stream(ref stream) = value.data else {
        return Err(CommandError::WrongDataType);
    };

    Ok(entries_to_resp(&stream.range(start, end)).encode())
}
