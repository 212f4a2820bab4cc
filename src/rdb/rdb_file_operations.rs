use std::path::Path;
use std::sync::Arc;

use tokio::{
    fs::File,
    io::{AsyncReadExt, BufReader},
    sync::RwLock,
};
use tracing::{debug, info};

use crate::key_value_store::KeyValueStore;
use crate::rdb::RdbParser;
use crate::server::ServerConfig;

/// Seeds the keyspace from `<dir>/<dbfilename>` when that file exists.
///
/// A missing file is not an error; the server just starts empty. A file
/// that fails to decode is fatal and aborts startup.
pub async fn load_rdb_file(
    server: Arc<RwLock<ServerConfig>>,
    store: Arc<RwLock<KeyValueStore>>,
) -> std::io::Result<()> {
    let file_path = {
        let server_guard = server.read().await;
        Path::new(&server_guard.rdb_dir).join(&server_guard.rdb_filename)
    };

    if !file_path.exists() {
        debug!("no RDB file at {}, starting empty", file_path.display());
        return Ok(());
    }

    let file = File::open(&file_path).await?;
    let mut reader = BufReader::new(file);
    let mut buffer: [u8; 4096] = [0; 4096];
    let mut parser = RdbParser::new();

    loop {
        let bytes_read = reader.read(&mut buffer).await?;

        if bytes_read == 0 {
            break;
        }

        parser.parse(&buffer[..bytes_read])?;
    }

    if !parser.is_finished() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "RDB file ended before the EOF opcode",
        ));
    }

    let loaded_keys = parser.key_value_store.len();

    let mut store_guard = store.write().await;
    store_guard.extend(parser.key_value_store);

    info!(
        "loaded {} keys from {}",
        loaded_keys,
        file_path.display()
    );

    Ok(())
}
