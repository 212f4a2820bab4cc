/// Borrows `len` bytes at `cursor`, failing with `UnexpectedEof` when the
/// buffer is too short. The incremental parser uses that error kind as
/// its "wait for more bytes" signal.
pub fn get_buffer_slice(buffer: &[u8], cursor: usize, len: usize) -> std::io::Result<&[u8]> {
    if cursor + len > buffer.len() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "not enough data in buffer",
        ));
    }

    Ok(&buffer[cursor..cursor + len])
}
