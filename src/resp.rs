//! RESP (Redis Serialization Protocol) encoding and decoding.
//!
//! The decoder turns raw bytes into a [`Message`]: the flattened command
//! tokens of one frame plus the exact number of bytes that frame occupied
//! on the wire. Replication offset accounting depends on `bytes_consumed`
//! counting every byte of the frame, including the type byte, length
//! prefixes, payload and terminators.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    /// Not enough buffered bytes to finish the frame. Internal signal for
    /// the frame reader; never surfaced to a client.
    #[error("incomplete frame")]
    Incomplete,
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP type byte: 0x{0:02X}")]
    UnknownType(u8),
    #[error("invalid length prefix")]
    InvalidLength,
    #[error("bulk string length mismatch")]
    LengthMismatch,
    #[error("failed to parse integer")]
    InvalidInteger,
}

/// A RESP value ready to be rendered onto the wire.
///
/// The set of frame types is closed: simple strings, simple errors,
/// integers, bulk strings (with a distinct null form) and arrays.
/// A stored empty string and a missing key encode differently
/// (`$0\r\n\r\n` versus `$-1\r\n`), so callers pick the variant
/// explicitly instead of encoding `""` as null.
#[derive(Debug, PartialEq, Clone)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    NullBulkString,
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Renders this value in RESP wire format.
    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(content) => format!("+{}\r\n", content),
            RespValue::Error(content) => format!("-{}\r\n", content),
            RespValue::Integer(value) => format!(":{}\r\n", value),
            RespValue::BulkString(content) => {
                format!("${}\r\n{}\r\n", content.len(), content)
            }
            RespValue::NullBulkString => "$-1\r\n".to_string(),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());
                for element in elements {
                    encoded.push_str(&element.encode());
                }
                encoded
            }
        }
    }

    /// Builds the canonical client-command form: an array of bulk strings.
    ///
    /// This is also the exact serialization the master writes onto the
    /// replication stream, so its encoded length is what replicas account
    /// against their offset.
    pub fn command_array(arguments: &[String]) -> RespValue {
        RespValue::Array(
            arguments
                .iter()
                .map(|argument| RespValue::BulkString(argument.clone()))
                .collect(),
        )
    }
}

/// One decoded frame: the command tokens it carried and the exact number
/// of bytes it occupied on the wire.
#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    pub commands: Vec<String>,
    pub bytes_consumed: u64,
}

/// Decodes a single frame from the front of `buffer`.
///
/// Returns [`RespError::Incomplete`] when the buffer does not yet hold a
/// whole frame; the caller reads more bytes and retries. Any other error
/// is a protocol violation and the caller closes the connection.
///
/// Arrays may only contain bulk strings, simple strings and integers; any
/// other type byte inside an array is a parse error. Incoming simple
/// strings are split on whitespace so that replies like
/// `+FULLRESYNC <replid> <offset>` dispatch like any other command.
pub fn parse_message(buffer: &[u8]) -> Result<Message, RespError> {
    let Some(type_byte) = buffer.first() else {
        return Err(RespError::Incomplete);
    };

    let mut cursor = 0;

    let commands = match type_byte {
        b'*' => parse_array(buffer, &mut cursor)?,
        b'+' | b'-' => {
            cursor += 1;
            let line = read_line(buffer, &mut cursor)?;
            line.split_whitespace().map(str::to_string).collect()
        }
        b':' => {
            cursor += 1;
            let line = read_line(buffer, &mut cursor)?;
            line.parse::<i64>()
                .map_err(|_| RespError::InvalidInteger)?;
            vec![line.to_string()]
        }
        b'$' => {
            cursor += 1;
            match parse_bulk_string(buffer, &mut cursor)? {
                Some(content) => vec![content],
                None => Vec::new(),
            }
        }
        other => return Err(RespError::UnknownType(*other)),
    };

    Ok(Message {
        commands,
        bytes_consumed: cursor as u64,
    })
}

fn parse_array(buffer: &[u8], cursor: &mut usize) -> Result<Vec<String>, RespError> {
    *cursor += 1;
    let length_line = read_line(buffer, cursor)?;
    let number_of_elements = length_line
        .parse::<i64>()
        .map_err(|_| RespError::InvalidLength)?;

    if number_of_elements < 0 {
        return Ok(Vec::new());
    }

    let mut elements = Vec::with_capacity(number_of_elements as usize);

    for _ in 0..number_of_elements {
        let Some(type_byte) = buffer.get(*cursor) else {
            return Err(RespError::Incomplete);
        };

        match type_byte {
            b'$' => {
                *cursor += 1;
                let Some(content) = parse_bulk_string(buffer, cursor)? else {
                    return Err(RespError::InvalidLength);
                };
                elements.push(content);
            }
            b'+' => {
                *cursor += 1;
                let line = read_line(buffer, cursor)?;
                elements.push(line.to_string());
            }
            b':' => {
                *cursor += 1;
                let line = read_line(buffer, cursor)?;
                line.parse::<i64>()
                    .map_err(|_| RespError::InvalidInteger)?;
                elements.push(line.to_string());
            }
            other => return Err(RespError::UnknownType(*other)),
        }
    }

    Ok(elements)
}

/// Parses `<len>\r\n<len bytes>\r\n` at the cursor, returning `None` for
/// the null bulk form (`-1` length, no payload).
fn parse_bulk_string(buffer: &[u8], cursor: &mut usize) -> Result<Option<String>, RespError> {
    let length_line = read_line(buffer, cursor)?;
    let declared_length = length_line
        .parse::<i64>()
        .map_err(|_| RespError::InvalidLength)?;

    if declared_length == -1 {
        return Ok(None);
    }

    if declared_length < 0 {
        return Err(RespError::InvalidLength);
    }

    let length = declared_length as usize;

    if buffer.len() < *cursor + length + 2 {
        return Err(RespError::Incomplete);
    }

    let payload = &buffer[*cursor..*cursor + length];

    if &buffer[*cursor + length..*cursor + length + 2] != b"\r\n" {
        return Err(RespError::LengthMismatch);
    }

    let content = str::from_utf8(payload).map_err(|_| RespError::InvalidUtf8)?;
    *cursor += length + 2;

    Ok(Some(content.to_string()))
}

/// Reads one CRLF-terminated line starting at the cursor and advances the
/// cursor past the terminator.
fn read_line<'a>(buffer: &'a [u8], cursor: &mut usize) -> Result<&'a str, RespError> {
    let start = *cursor;
    let mut index = start;

    while index + 1 < buffer.len() {
        if buffer[index] == b'\r' && buffer[index + 1] == b'\n' {
            let line = str::from_utf8(&buffer[start..index]).map_err(|_| RespError::InvalidUtf8)?;
            *cursor = index + 2;
            return Ok(line);
        }
        index += 1;
    }

    Err(RespError::Incomplete)
}
