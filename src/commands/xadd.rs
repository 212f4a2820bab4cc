use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    commands::command_error::CommandError,
    key_value_store::{DataType, KeyValueStore, Value},
    resp::RespValue,
    stream::{IdSpec, Stream},
};

/// Parsed arguments for XADD.
pub struct XaddArguments {
    key: String,
    id_spec: IdSpec,
    /// Field/value pairs in the order the client supplied them.
    fields: Vec<(String, String)>,
}

impl XaddArguments {
    /// `XADD key id field value [field value ...]`. At least one pair is
    /// required and pairs must be complete.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() < 4 {
            return Err(CommandError::WrongNumberOfArguments("xadd"));
        }

        if arguments[2..].len() % 2 != 0 {
            return Err(CommandError::WrongNumberOfArguments("xadd"));
        }

        let id_spec = IdSpec::parse(&arguments[1])?;

        let fields = arguments[2..]
            .chunks(2)
            .map(|chunk| (chunk[0].clone(), chunk[1].clone()))
            .collect();

        Ok(Self {
            key: arguments[0].clone(),
            id_spec,
            fields,
        })
    }
}

/// Appends an entry to a stream, creating the stream when the key does
/// not exist yet. The resolved ID must be strictly greater than the
/// stream's current top entry; the reply is its canonical
/// `"major-minor"` form. Appending wakes every blocked XREAD subscriber
/// on the stream.
pub async fn xadd(
    store: Arc<RwLock<KeyValueStore>>,
    arguments: Vec<String>,
) -> Result<String, CommandError> {
    let xadd_arguments = XaddArguments::parse(arguments)?;

    let mut store_guard = store.write().await;

    let id = match store_guard.get_mut(&xadd_arguments.key) {
        Some(value) => {
            let DataType::Stream(ref mut stream) = value.data else {
                return Err(CommandError::WrongDataType);
            };

            let id = stream.next_id(&xadd_arguments.id_spec)?;
            stream.append(id, xadd_arguments.fields);
            id
        }
        None => {
            let mut stream = Stream::new();
            let id = stream.next_id(&xadd_arguments.id_spec)?;
            stream.append(id, xadd_arguments.fields);

            store_guard.insert(
                xadd_arguments.key,
                Value {
                    data: DataType::Stream(stream),
                    expiration: None,
                },
            );
            id
        }
    };

    Ok(RespValue::BulkString(id.to_string()).encode())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use tokio::sync::RwLock;

    use crate::{
        commands::command_error::CommandError,
        key_value_store::{DataType, KeyValueStore, Value},
        stream::StreamIdError,
    };

    use super::{XaddArguments, xadd};

    fn arguments(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    fn empty_store() -> Arc<RwLock<KeyValueStore>> {
        Arc::new(RwLock::new(HashMap::new()))
    }

    #[test]
    fn test_parse_arguments() {
        let test_cases = vec![
            (vec!["s", "1-1", "a", "b"], Ok(()), "one pair"),
            (vec!["s", "*", "a", "b", "c", "d"], Ok(()), "two pairs"),
            (
                vec!["s", "1-1"],
                Err(CommandError::WrongNumberOfArguments("xadd")),
                "no pairs",
            ),
            (
                vec!["s", "1-1", "a"],
                Err(CommandError::WrongNumberOfArguments("xadd")),
                "dangling field",
            ),
            (
                vec!["s", "bogus", "a", "b"],
                Err(CommandError::InvalidStreamId(StreamIdError::Invalid)),
                "unparsable id",
            ),
        ];

        for (parts, expected, description) in test_cases {
            let result = XaddArguments::parse(arguments(&parts)).map(|_| ());
            assert_eq!(result, expected, "{}", description);
        }
    }

    #[tokio::test]
    async fn test_xadd_explicit_ids() {
        let store = empty_store();

        let response = xadd(Arc::clone(&store), arguments(&["s", "1-1", "a", "b"]))
            .await
            .unwrap();
        assert_eq!(response, "$3\r\n1-1\r\n");

        let response = xadd(Arc::clone(&store), arguments(&["s", "1-2", "c", "d"]))
            .await
            .unwrap();
        assert_eq!(response, "$3\r\n1-2\r\n");

        // Equal or smaller than the top entry is rejected.
        let result = xadd(Arc::clone(&store), arguments(&["s", "1-2", "e", "f"])).await;
        assert_eq!(
            result,
            Err(CommandError::InvalidStreamId(StreamIdError::SmallerThanTop))
        );

        let result = xadd(Arc::clone(&store), arguments(&["s", "0-0", "e", "f"])).await;
        assert_eq!(
            result,
            Err(CommandError::InvalidStreamId(
                StreamIdError::MustBeGreaterThanZeroZero
            ))
        );
    }

    #[tokio::test]
    async fn test_xadd_auto_minor() {
        let store = empty_store();

        let response = xadd(Arc::clone(&store), arguments(&["s", "0-*", "a", "b"]))
            .await
            .unwrap();
        assert_eq!(response, "$3\r\n0-1\r\n", "empty stream with major 0");

        let response = xadd(Arc::clone(&store), arguments(&["s", "5-*", "a", "b"]))
            .await
            .unwrap();
        assert_eq!(response, "$3\r\n5-0\r\n");

        let response = xadd(Arc::clone(&store), arguments(&["s", "5-*", "a", "b"]))
            .await
            .unwrap();
        assert_eq!(response, "$3\r\n5-1\r\n");
    }

    #[tokio::test]
    async fn test_xadd_auto_generates_increasing_ids() {
        let store = empty_store();

        let first = xadd(Arc::clone(&store), arguments(&["s", "*", "a", "b"]))
            .await
            .unwrap();
        let second = xadd(Arc::clone(&store), arguments(&["s", "*", "c", "d"]))
            .await
            .unwrap();

        assert!(first.ends_with("-0\r\n"), "first auto id: {}", first);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_xadd_on_string_key() {
        let store = empty_store();
        store.write().await.insert(
            "text".to_string(),
            Value {
                data: DataType::String("not a stream".to_string()),
                expiration: None,
            },
        );

        let result = xadd(store, arguments(&["text", "1-1", "a", "b"])).await;
        assert_eq!(result, Err(CommandError::WrongDataType));
    }

    #[tokio::test]
    async fn test_xadd_failed_id_leaves_no_residue() {
        let store = empty_store();

        let result = xadd(Arc::clone(&store), arguments(&["s", "0-0", "a", "b"])).await;
        assert!(result.is_err());

        let store_guard = store.read().await;
        assert!(
            !store_guard.contains_key("s"),
            "a rejected first XADD must not create the stream"
        );
    }
}
