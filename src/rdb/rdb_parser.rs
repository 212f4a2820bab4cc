use std::collections::HashMap;

use jiff::Timestamp;
use tracing::debug;

use crate::{
    key_value_store::{DataType, Value},
    rdb::opcode::{Record, parse_header, parse_record},
};

/// Incremental RDB decoder.
///
/// Chunks are fed in as they arrive; a record that is split across chunk
/// boundaries is retried once more bytes are buffered. Entries whose
/// expiry has already passed at load time are discarded. Only database 0
/// is supported; SELECTDB and RESIZEDB records are read and dropped.
#[derive(Debug)]
pub struct RdbParser {
    buffer: Vec<u8>,
    cursor: usize,
    header_parsed: bool,
    finished: bool,
    pub metadata: HashMap<String, String>,
    pub database_number: Option<u64>,
    pub key_value_store: HashMap<String, Value>,
    pub crc64_checksum: Option<Vec<u8>>,
}

impl RdbParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            header_parsed: false,
            finished: false,
            metadata: HashMap::new(),
            database_number: None,
            key_value_store: HashMap::new(),
            crc64_checksum: None,
        }
    }

    /// Consumes one chunk of the snapshot. Call [`RdbParser::is_finished`]
    /// after the final chunk to check the EOF opcode was reached.
    pub fn parse(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.buffer.extend_from_slice(chunk);

        if !self.header_parsed {
            match parse_header(&self.buffer) {
                Ok(header_length) => {
                    self.cursor = header_length;
                    self.header_parsed = true;
                }
                Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(error) => return Err(error),
            }
        }

        while !self.finished && self.cursor < self.buffer.len() {
            let (record, bytes_read) = match parse_record(&self.buffer, self.cursor) {
                Ok(result) => result,
                // Record split across chunks; retry on the next call.
                Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(error) => return Err(error),
            };

            self.apply(record);
            self.cursor += bytes_read;
        }

        Ok(())
    }

    fn apply(&mut self, record: Record) {
        match record {
            Record::Aux { key, value } => {
                debug!("rdb aux field {}={}", key, value);
                self.metadata.insert(key, value);
            }
            Record::SelectDb { database_number } => {
                debug!("rdb select db {}", database_number);
                self.database_number = Some(database_number);
            }
            Record::ResizeDb { .. } => (),
            Record::Entry {
                key,
                value,
                expiration,
            } => {
                let already_expired =
                    expiration.is_some_and(|expiration| expiration <= Timestamp::now());

                if already_expired {
                    debug!("skipping expired rdb key {}", key);
                    return;
                }

                self.key_value_store.insert(
                    key,
                    Value {
                        data: DataType::String(value),
                        expiration,
                    },
                );
            }
            Record::EndOfFile { crc64_checksum } => {
                self.crc64_checksum = Some(crc64_checksum);
                self.finished = true;
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Default for RdbParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::key_value_store::DataType;
    use crate::rdb::empty::empty_rdb_bytes;

    use super::RdbParser;

    fn minimal_rdb(entries: &[(&str, &str, Option<u64>)]) -> Vec<u8> {
        let mut bytes = b"REDIS0011".to_vec();
        bytes.push(0xFE);
        bytes.push(0x00);

        for (key, value, expiry_ms) in entries {
            if let Some(expiry_ms) = expiry_ms {
                bytes.push(0xFC);
                bytes.extend_from_slice(&expiry_ms.to_le_bytes());
            }
            bytes.push(0x00);
            bytes.push(key.len() as u8);
            bytes.extend_from_slice(key.as_bytes());
            bytes.push(value.len() as u8);
            bytes.extend_from_slice(value.as_bytes());
        }

        bytes.push(0xFF);
        bytes.extend_from_slice(&[0u8; 8]);
        bytes
    }

    fn far_future_ms() -> u64 {
        4_100_000_000_000
    }

    #[test]
    fn test_parse_minimal_snapshot() {
        let bytes = minimal_rdb(&[("foo", "bar", None), ("baz", "qux", None)]);

        let mut parser = RdbParser::new();
        parser.parse(&bytes).unwrap();

        assert!(parser.is_finished());
        assert_eq!(parser.database_number, Some(0));
        assert_eq!(parser.key_value_store.len(), 2);

        let value = parser.key_value_store.get("foo").unwrap();
        let DataType::String(ref content) = value.data else {
            panic!("expected a string value");
        };
        assert_eq!(content, "bar");
        assert_eq!(value.expiration, None);
    }

    #[test]
    fn test_parse_snapshot_in_chunks() {
        let bytes = minimal_rdb(&[("foo", "bar", None)]);

        let mut parser = RdbParser::new();
        for chunk in bytes.chunks(3) {
            parser.parse(chunk).unwrap();
        }

        assert!(parser.is_finished());
        assert_eq!(parser.key_value_store.len(), 1);
    }

    #[test]
    fn test_expired_entries_discarded_at_load() {
        let bytes = minimal_rdb(&[
            ("stale", "gone", Some(1_000)),
            ("fresh", "kept", Some(far_future_ms())),
        ]);

        let mut parser = RdbParser::new();
        parser.parse(&bytes).unwrap();

        assert!(parser.is_finished());
        assert!(!parser.key_value_store.contains_key("stale"));

        let fresh = parser.key_value_store.get("fresh").unwrap();
        assert_eq!(
            fresh.expiration.unwrap().as_millisecond(),
            far_future_ms() as i64
        );
    }

    #[test]
    fn test_parse_empty_rdb_blob() {
        let mut parser = RdbParser::new();
        parser.parse(&empty_rdb_bytes()).unwrap();

        assert!(parser.is_finished());
        assert!(parser.key_value_store.is_empty());
        assert_eq!(parser.metadata.get("redis-ver").map(String::as_str), Some("7.2.0"));
    }

    #[test]
    fn test_invalid_magic_string() {
        let mut parser = RdbParser::new();
        let result = parser.parse(b"NOTANRDBFILE");

        assert!(result.is_err());
    }
}
