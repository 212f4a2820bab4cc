/// An empty RDB snapshot, hex encoded. Sent verbatim to a replica during
/// full resync; treated as an opaque 88-byte constant.
pub const EMPTY_RDB_HEX: &str = "524544495330303131fa0972656469732d76657205372e322e30fa0a72656469732d62697473c040fa056374696d65c26d08bc65fa08757365642d6d656dc2b0c41000fa08616f662d62617365c000fff06e3bfec0ff5aa2";

pub fn empty_rdb_bytes() -> Vec<u8> {
    hex::decode(EMPTY_RDB_HEX).expect("embedded empty RDB payload is valid hex")
}
