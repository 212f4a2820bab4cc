use jiff::Timestamp;

use crate::rdb::{
    encoding::{parse_length, parse_string},
    get_slice::get_buffer_slice,
};

const AUX_OPCODE: u8 = 0xFA;
const RESIZE_DB_OPCODE: u8 = 0xFB;
const EXPIRE_TIME_MS_OPCODE: u8 = 0xFC;
const EXPIRE_TIME_OPCODE: u8 = 0xFD;
const SELECT_DB_OPCODE: u8 = 0xFE;
const END_OF_FILE_OPCODE: u8 = 0xFF;

const STRING_VALUE_TYPE: u8 = 0x00;

#[derive(Debug, PartialEq)]
pub enum Record {
    Aux {
        key: String,
        value: String,
    },
    ResizeDb {
        hash_table_size: u64,
        expiry_hash_table_size: u64,
    },
    SelectDb {
        database_number: u64,
    },
    Entry {
        key: String,
        value: String,
        expiration: Option<Timestamp>,
    },
    EndOfFile {
        crc64_checksum: Vec<u8>,
    },
}

/// Parses one record at `cursor`. Opcodes other than the known set are
/// value-type bytes for an entry without an expiry; only the string value
/// type is supported.
pub fn parse_record(bytes: &[u8], cursor: usize) -> std::io::Result<(Record, usize)> {
    let mut temp_cursor = cursor;
    let opcode = get_buffer_slice(bytes, temp_cursor, 1)?[0];
    temp_cursor += 1;

    let record = match opcode {
        AUX_OPCODE => {
            let (key, key_read) = parse_string(bytes, temp_cursor)?;
            temp_cursor += key_read;
            let (value, value_read) = parse_string(bytes, temp_cursor)?;
            temp_cursor += value_read;

            Record::Aux { key, value }
        }
        RESIZE_DB_OPCODE => {
            let (hash_table_size, first_read) = parse_length(bytes, temp_cursor)?;
            temp_cursor += first_read;
            let (expiry_hash_table_size, second_read) = parse_length(bytes, temp_cursor)?;
            temp_cursor += second_read;

            Record::ResizeDb {
                hash_table_size,
                expiry_hash_table_size,
            }
        }
        SELECT_DB_OPCODE => {
            let (database_number, read) = parse_length(bytes, temp_cursor)?;
            temp_cursor += read;

            Record::SelectDb { database_number }
        }
        EXPIRE_TIME_OPCODE => {
            let slice = get_buffer_slice(bytes, temp_cursor, 4)?;
            temp_cursor += 4;

            let seconds = u32::from_le_bytes(slice.try_into().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "not enough bytes for expiry seconds",
                )
            })?);
            let expiration = Timestamp::from_second(seconds as i64).map_err(|error| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid expiry timestamp: {}", error),
                )
            })?;

            let (record, read) = parse_entry(bytes, temp_cursor, Some(expiration))?;
            temp_cursor += read;

            record
        }
        EXPIRE_TIME_MS_OPCODE => {
            let slice = get_buffer_slice(bytes, temp_cursor, 8)?;
            temp_cursor += 8;

            let milliseconds = u64::from_le_bytes(slice.try_into().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "not enough bytes for expiry milliseconds",
                )
            })?);
            let expiration = Timestamp::from_millisecond(milliseconds as i64).map_err(|error| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid expiry timestamp: {}", error),
                )
            })?;

            let (record, read) = parse_entry(bytes, temp_cursor, Some(expiration))?;
            temp_cursor += read;

            record
        }
        END_OF_FILE_OPCODE => {
            let crc64_checksum = get_buffer_slice(bytes, temp_cursor, 8)?.to_vec();
            temp_cursor += 8;

            Record::EndOfFile { crc64_checksum }
        }
        _ => {
            // No opcode matched: this byte is the value type of an entry
            // without an expiry.
            temp_cursor -= 1;
            let (record, read) = parse_entry(bytes, temp_cursor, None)?;
            temp_cursor += read;

            record
        }
    };

    Ok((record, temp_cursor - cursor))
}

fn parse_entry(
    bytes: &[u8],
    cursor: usize,
    expiration: Option<Timestamp>,
) -> std::io::Result<(Record, usize)> {
    let mut temp_cursor = cursor;
    let value_type = get_buffer_slice(bytes, temp_cursor, 1)?[0];
    temp_cursor += 1;

    if value_type != STRING_VALUE_TYPE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown value type: 0x{:02X}", value_type),
        ));
    }

    let (key, key_read) = parse_string(bytes, temp_cursor)?;
    temp_cursor += key_read;
    let (value, value_read) = parse_string(bytes, temp_cursor)?;
    temp_cursor += value_read;

    Ok((
        Record::Entry {
            key,
            value,
            expiration,
        },
        temp_cursor - cursor,
    ))
}

/// Validates the `REDIS` magic and skips the 4-byte ASCII version.
/// Returns the header length.
pub fn parse_header(bytes: &[u8]) -> std::io::Result<usize> {
    let magic = get_buffer_slice(bytes, 0, 5)?;

    if magic != b"REDIS" {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "invalid magic string",
        ));
    }

    get_buffer_slice(bytes, 5, 4)?;

    Ok(9)
}

#[cfg(test)]
mod tests {
    use super::{Record, parse_header, parse_record};

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"REDIS0011extra").unwrap(), 9);
        assert!(parse_header(b"NOTRD0011").is_err());
        assert_eq!(
            parse_header(b"REDIS00").unwrap_err().kind(),
            std::io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_parse_record_entry_without_expiry() {
        let bytes = [
            0x00, // string value type
            0x03, b'f', b'o', b'o', // key
            0x03, b'b', b'a', b'r', // value
        ];

        let (record, read) = parse_record(&bytes, 0).unwrap();
        assert_eq!(read, 9);
        assert_eq!(
            record,
            Record::Entry {
                key: "foo".to_string(),
                value: "bar".to_string(),
                expiration: None,
            }
        );
    }

    #[test]
    fn test_parse_record_entry_with_millisecond_expiry() {
        let mut bytes = vec![0xFC];
        bytes.extend_from_slice(&1_700_000_000_000u64.to_le_bytes());
        bytes.extend_from_slice(&[0x00, 0x01, b'k', 0x01, b'v']);

        let (record, read) = parse_record(&bytes, 0).unwrap();
        assert_eq!(read, bytes.len());

        let Record::Entry {
            key,
            value,
            expiration,
        } = record
        else {
            panic!("expected an entry record");
        };

        assert_eq!(key, "k");
        assert_eq!(value, "v");
        assert_eq!(expiration.unwrap().as_millisecond(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_record_metadata_opcodes() {
        let aux = [0xFA, 0x02, b'h', b'i', 0x02, b'y', b'o'];
        let (record, read) = parse_record(&aux, 0).unwrap();
        assert_eq!(read, 7);
        assert_eq!(
            record,
            Record::Aux {
                key: "hi".to_string(),
                value: "yo".to_string(),
            }
        );

        let select_db = [0xFE, 0x00];
        let (record, read) = parse_record(&select_db, 0).unwrap();
        assert_eq!(read, 2);
        assert_eq!(record, Record::SelectDb { database_number: 0 });

        let resize_db = [0xFB, 0x02, 0x01];
        let (record, read) = parse_record(&resize_db, 0).unwrap();
        assert_eq!(read, 3);
        assert_eq!(
            record,
            Record::ResizeDb {
                hash_table_size: 2,
                expiry_hash_table_size: 1,
            }
        );
    }

    #[test]
    fn test_parse_record_unknown_value_type() {
        let bytes = [0x09, 0x01, b'k', 0x01, b'v'];
        let error = parse_record(&bytes, 0).unwrap_err();

        assert_eq!(error.kind(), std::io::ErrorKind::InvalidData);
        assert!(error.to_string().contains("unknown value type"));
    }

    #[test]
    fn test_parse_record_truncated_is_unexpected_eof() {
        let bytes = [0x00, 0x03, b'f', b'o'];
        let error = parse_record(&bytes, 0).unwrap_err();

        assert_eq!(error.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
