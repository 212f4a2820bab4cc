use std::sync::Arc;

use globset::Glob;
use jiff::Timestamp;
use tokio::sync::RwLock;

use crate::{
    commands::command_error::CommandError,
    key_value_store::KeyValueStore,
    resp::RespValue,
};

/// Lists keys matching a glob pattern. Expired entries are filtered out
/// of the listing but left for the next direct read to reap.
pub async fn keys(
    store: Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    if arguments.len() != 1 {
        return Err(CommandError::WrongNumberOfArguments("keys"));
    }

    let matcher = Glob::new(&arguments[0])
        .map_err(|_| CommandError::InvalidGlobPattern)?
        .compile_matcher();

    let now = Timestamp::now();
    let store_guard = store.read().await;

    let mut matching_keys = Vec::new();
    for (key, value) in store_guard.iter() {
        if !value.is_expired(now) && matcher.is_match(key) {
            matching_keys.push(RespValue::BulkString(key.clone()));
        }
    }

    Ok(RespValue::Array(matching_keys).encode())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use jiff::{SignedDuration, Timestamp};
    use tokio::sync::RwLock;

    use crate::key_value_store::{DataType, KeyValueStore, Value};

    use super::keys;

    fn string_value(content: &str) -> Value {
        Value {
            data: DataType::String(content.to_string()),
            expiration: None,
        }
    }

    #[tokio::test]
    async fn test_keys() {
        let mut entries: KeyValueStore = HashMap::new();
        entries.insert("foo".to_string(), string_value("1"));
        entries.insert("foobar".to_string(), string_value("2"));
        entries.insert("baz".to_string(), string_value("3"));
        entries.insert(
            "stale".to_string(),
            Value {
                data: DataType::String("4".to_string()),
                expiration: Some(Timestamp::now() - SignedDuration::from_secs(1)),
            },
        );

        let store = Arc::new(RwLock::new(entries));

        let response = keys(Arc::clone(&store), vec!["*".to_string()])
            .await
            .unwrap();
        assert!(response.starts_with("*3\r\n"), "expired keys are hidden: {}", response);
        assert!(response.contains("$3\r\nfoo\r\n"));
        assert!(response.contains("$6\r\nfoobar\r\n"));
        assert!(response.contains("$3\r\nbaz\r\n"));

        let response = keys(Arc::clone(&store), vec!["foo*".to_string()])
            .await
            .unwrap();
        assert!(response.starts_with("*2\r\n"), "prefix glob: {}", response);

        let response = keys(store, vec!["nomatch".to_string()]).await.unwrap();
        assert_eq!(response, "*0\r\n");
    }
}
