mod empty;
mod encoding;
mod get_slice;
mod opcode;
mod rdb_file_operations;
mod rdb_parser;

pub use empty::{EMPTY_RDB_HEX, empty_rdb_bytes};
pub use rdb_file_operations::load_rdb_file;
pub use rdb_parser::RdbParser;
