use tracing::error;

use emberdb::server::ServerConfig;

/// Entry point: parse flags, then run the server until terminated.
/// Startup failures (bad flags, bind failure, unreadable RDB file,
/// failed replica handshake) exit non-zero.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emberdb=info".into()),
        )
        .init();

    let server = match ServerConfig::new(std::env::args()) {
        Ok(server) => server,
        Err(error) => {
            error!("invalid command line arguments: {}", error);
            std::process::exit(1);
        }
    };

    if let Err(error) = server.run().await {
        error!("server terminated: {}", error);
        std::process::exit(1);
    }
}
