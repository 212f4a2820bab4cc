//! RDB length encoding.
//!
//! The first byte's top two bits select the form:
//!
//! - `00`: the low 6 bits are the length.
//! - `01`: the low 6 bits shifted left by 8 plus the next byte (14 bits).
//! - `10`: the low 6 bits select 4-byte (`0x80`) or 8-byte (`0x81`)
//!   big-endian lengths.
//! - `11`: special encoding; the low 6 bits select an integer width
//!   (8/16/32-bit little-endian) stored as the string form of that value.

use crate::rdb::get_slice::get_buffer_slice;

#[derive(Debug, PartialEq)]
enum LengthEncoding {
    Length(usize),
    Int8,
    Int16,
    Int32,
    LzfCompressedString,
}

fn parse_length_encoding(bytes: &[u8], cursor: usize) -> std::io::Result<(LengthEncoding, usize)> {
    let mut temp_cursor = cursor;
    let first_byte = get_buffer_slice(bytes, temp_cursor, 1)?[0];
    temp_cursor += 1;

    let encoding = match first_byte >> 6 {
        0b00 => LengthEncoding::Length((first_byte & 0b0011_1111) as usize),
        0b01 => {
            let second_byte = get_buffer_slice(bytes, temp_cursor, 1)?[0];
            temp_cursor += 1;

            let high_bits = ((first_byte & 0b0011_1111) as usize) << 8;
            LengthEncoding::Length(high_bits | second_byte as usize)
        }
        0b10 => match first_byte {
            0x80 => {
                let slice = get_buffer_slice(bytes, temp_cursor, 4)?;
                temp_cursor += 4;

                let length = u32::from_be_bytes(slice.try_into().map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "not enough bytes for u32 length",
                    )
                })?);
                LengthEncoding::Length(length as usize)
            }
            0x81 => {
                let slice = get_buffer_slice(bytes, temp_cursor, 8)?;
                temp_cursor += 8;

                let length = u64::from_be_bytes(slice.try_into().map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "not enough bytes for u64 length",
                    )
                })?);
                LengthEncoding::Length(length as usize)
            }
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "invalid length encoding",
                ));
            }
        },
        0b11 => match first_byte & 0b0011_1111 {
            0 => LengthEncoding::Int8,
            1 => LengthEncoding::Int16,
            2 => LengthEncoding::Int32,
            3 => LengthEncoding::LzfCompressedString,
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "invalid special length encoding",
                ));
            }
        },
        _ => unreachable!("two-bit selector"),
    };

    Ok((encoding, temp_cursor - cursor))
}

/// Reads a plain length-encoded integer (SELECTDB index, RESIZEDB sizes).
/// Special string encodings are not valid here.
pub fn parse_length(bytes: &[u8], cursor: usize) -> std::io::Result<(u64, usize)> {
    let (encoding, bytes_read) = parse_length_encoding(bytes, cursor)?;

    match encoding {
        LengthEncoding::Length(value) => Ok((value as u64, bytes_read)),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "expected a length-encoded integer",
        )),
    }
}

/// Reads a string value: either a length-prefixed run of raw bytes or an
/// integer special encoding rendered as its decimal string form.
pub fn parse_string(bytes: &[u8], cursor: usize) -> std::io::Result<(String, usize)> {
    let mut temp_cursor = cursor;
    let (encoding, bytes_read) = parse_length_encoding(bytes, temp_cursor)?;
    temp_cursor += bytes_read;

    let value = match encoding {
        LengthEncoding::Length(length) => {
            let slice = get_buffer_slice(bytes, temp_cursor, length)?;
            temp_cursor += length;

            String::from_utf8(slice.to_vec()).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid UTF-8 string")
            })?
        }
        LengthEncoding::Int8 => {
            let slice = get_buffer_slice(bytes, temp_cursor, 1)?;
            temp_cursor += 1;

            (slice[0] as i8).to_string()
        }
        LengthEncoding::Int16 => {
            let slice = get_buffer_slice(bytes, temp_cursor, 2)?;
            temp_cursor += 2;

            i16::from_le_bytes(slice.try_into().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "not enough bytes for i16",
                )
            })?)
            .to_string()
        }
        LengthEncoding::Int32 => {
            let slice = get_buffer_slice(bytes, temp_cursor, 4)?;
            temp_cursor += 4;

            i32::from_le_bytes(slice.try_into().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "not enough bytes for i32",
                )
            })?)
            .to_string()
        }
        LengthEncoding::LzfCompressedString => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "LZF compressed strings are not supported",
            ));
        }
    };

    Ok((value, temp_cursor - cursor))
}
