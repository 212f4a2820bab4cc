use crate::{resp::RespValue, stream::StreamEntry};

/// Renders stream entries in the shape XRANGE and XREAD replies share:
/// an array of `[id, [field1, value1, field2, value2, ...]]` pairs.
pub fn entries_to_resp(entries: &[StreamEntry]) -> RespValue {
    let encoded_entries = entries
        .iter()
        .map(|entry| {
            let mut flattened_fields = Vec::with_capacity(entry.fields.len() * 2);

            for (field, value) in &entry.fields {
                flattened_fields.push(RespValue::BulkString(field.clone()));
                flattened_fields.push(RespValue::BulkString(value.clone()));
            }

            RespValue::Array(vec![
                RespValue::BulkString(entry.id.to_string()),
                RespValue::Array(flattened_fields),
            ])
        })
        .collect();

    RespValue::Array(encoded_entries)
}
