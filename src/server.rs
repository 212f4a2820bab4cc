//! Server configuration and the accept loop.
//!
//! One [`ServerConfig`] instance holds everything a running server
//! shares: its role and identity, the replica map with per-replica offset
//! counters, and the sending half of the write fan-out queue. It is
//! passed around as `Arc<RwLock<ServerConfig>>` rather than living in a
//! static so tests can run several servers in one process.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use regex::Regex;
use thiserror::Error;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, mpsc};
use tracing::{error, info};

use crate::connection::handle_client_connection;
use crate::key_value_store::KeyValueStore;
use crate::rdb::load_rdb_file;
use crate::replication::{HandshakeError, connect_to_master, run_write_dispatcher};

/// Errors that can occur during command-line argument parsing.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("Invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("Invalid port flag value")]
    InvalidPortFlagValue,
    #[error("Invalid master address")]
    InvalidMasterAddress,
    #[error("Invalid master port")]
    InvalidMasterPort,
}

/// Fatal startup failures; the process exits non-zero on any of these.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind TCP listener: {0}")]
    Bind(std::io::Error),
    #[error("failed to load RDB file: {0}")]
    Rdb(std::io::Error),
    #[error("failed to connect to master: {0}")]
    Handshake(#[from] HandshakeError),
}

/// The role a server runs in. Replicas know the master they subscribe to.
#[derive(Debug, PartialEq, Clone)]
pub enum Role {
    Master,
    Replica { host: String, port: u16 },
}

impl Role {
    /// The wire name of the role, as reported by INFO. Replicas use the
    /// historical "slave" name.
    pub fn as_str(&self) -> &str {
        match self {
            Role::Master => "master",
            Role::Replica { .. } => "slave",
        }
    }
}

/// A registered replica connection on a master.
///
/// `offset` is the number of replication-stream bytes the replica has
/// acknowledged; `expected_offset` is the number of bytes queued for it
/// by the fan-out dispatcher. Both only ever move forward.
#[derive(Debug)]
pub struct Replica {
    pub writer: Arc<RwLock<OwnedWriteHalf>>,
    pub offset: u64,
    pub expected_offset: u64,
}

/// Configuration and shared runtime state for one server instance.
#[derive(Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub role: Role,
    /// 40-hex-character replication identity, constant for the lifetime
    /// of the process.
    pub replid: String,
    /// Replication offset: masters advance it on fan-out, replicas on
    /// applying frames from the master connection.
    pub repl_offset: u64,
    /// Registered replica connections, keyed by peer address. Only ever
    /// populated on masters.
    pub replicas: HashMap<String, Replica>,
    /// Sending half of the write fan-out queue.
    pub replica_write_tx: mpsc::UnboundedSender<Vec<String>>,
    replica_write_rx: Option<mpsc::UnboundedReceiver<Vec<String>>>,
    pub rdb_dir: String,
    pub rdb_filename: String,
    /// Set on replicas once the PSYNC handshake finished and the RDB
    /// snapshot was absorbed; offset accounting starts here.
    pub handshake_complete: bool,
}

impl ServerConfig {
    /// Builds a server from command-line arguments.
    ///
    /// Supported flags:
    ///
    /// * `--port <port>` — listen port (default 6379)
    /// * `--replicaof "<host> <port>"` or `--replicaof <host> <port>` —
    ///   run as a replica of that master
    /// * `--dir <path>` — directory containing the RDB file (default `.`)
    /// * `--dbfilename <name>` — RDB file name (default `dump.rdb`)
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut port: Option<u16> = None;
        let mut role: Option<Role> = None;
        let mut rdb_dir: Option<String> = None;
        let mut rdb_filename: Option<String> = None;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let Some(port_value) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    port = Some(validate_port(&port_value, CliError::InvalidPortFlagValue)?);
                }
                "--replicaof" => {
                    let Some(address) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    // Either one quoted "<host> <port>" argument or two
                    // separate arguments.
                    let address = if address.contains(char::is_whitespace) {
                        address
                    } else {
                        let Some(port_value) = iter.next() else {
                            return Err(CliError::InvalidMasterAddress);
                        };
                        format!("{} {}", address, port_value)
                    };

                    let (host, master_port) = validate_master_address(&address)?;
                    role = Some(Role::Replica {
                        host,
                        port: master_port,
                    });
                }
                "--dir" => {
                    let Some(dir) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    rdb_dir = Some(dir);
                }
                "--dbfilename" => {
                    let Some(filename) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    rdb_filename = Some(filename);
                }
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        let (replica_write_tx, replica_write_rx) = mpsc::unbounded_channel();

        Ok(ServerConfig {
            port: port.unwrap_or(6379),
            role: role.unwrap_or(Role::Master),
            replid: generate_replid(),
            repl_offset: 0,
            replicas: HashMap::new(),
            replica_write_tx,
            replica_write_rx: Some(replica_write_rx),
            rdb_dir: rdb_dir.unwrap_or_else(|| ".".to_string()),
            rdb_filename: rdb_filename.unwrap_or_else(|| "dump.rdb".to_string()),
            handshake_complete: false,
        })
    }

    /// Takes the receiving half of the fan-out queue. The dispatcher task
    /// owns it for the lifetime of the process; calling this twice
    /// returns `None`.
    pub fn take_replica_write_queue(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<String>>> {
        self.replica_write_rx.take()
    }

    /// Runs the server until the process is terminated.
    ///
    /// The keyspace is seeded from the RDB file when one exists, the
    /// listener is bound, and then either the replica handshake runs
    /// (replica role) or the write fan-out dispatcher starts (master
    /// role). Each accepted connection is served by its own task.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let port = self.port;
        let role = self.role.clone();
        let replica_write_rx = self.take_replica_write_queue();

        let store: Arc<RwLock<KeyValueStore>> = Arc::new(RwLock::new(HashMap::new()));
        let server = Arc::new(RwLock::new(self));

        load_rdb_file(Arc::clone(&server), Arc::clone(&store))
            .await
            .map_err(ServerError::Rdb)?;

        let listener = TcpListener::bind(format!("127.0.0.1:{}", port))
            .await
            .map_err(ServerError::Bind)?;

        let role_name = role.as_str().to_string();

        match role {
            Role::Replica { host, port: master_port } => {
                connect_to_master(
                    host,
                    master_port,
                    Arc::clone(&server),
                    Arc::clone(&store),
                )
                .await?;
            }
            Role::Master => {
                if let Some(queue) = replica_write_rx {
                    tokio::spawn(run_write_dispatcher(Arc::clone(&server), queue));
                }
            }
        }

        info!("listening on 127.0.0.1:{} as {}", port, role_name);

        loop {
            match listener.accept().await {
                Ok((stream, client_address)) => {
                    let server_clone = Arc::clone(&server);
                    let store_clone = Arc::clone(&store);

                    tokio::spawn(async move {
                        handle_client_connection(
                            stream,
                            server_clone,
                            client_address.to_string(),
                            store_clone,
                        )
                        .await;
                    });
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            }
        }
    }
}

fn generate_replid() -> String {
    let mut rng = rand::rng();

    (0..40)
        .map(|_| {
            let digit = rng.random_range(0..16u32);
            char::from_digit(digit, 16).unwrap_or('0')
        })
        .collect()
}

fn validate_port(port: &str, error: CliError) -> Result<u16, CliError> {
    let port_number = port.parse::<u16>().map_err(|_| error.clone())?;

    if port_number == 0 {
        return Err(error);
    }

    Ok(port_number)
}

/// Validates and parses a master address in the format `"host port"`.
/// The host may be an IPv4 address or a hostname.
fn validate_master_address(master_address: &str) -> Result<(String, u16), CliError> {
    let ipv4_regex =
        Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("static pattern");
    let hostname_regex = Regex::new(r"^[a-zA-Z0-9\-\.]+$").expect("static pattern");

    let split_address = master_address.split_whitespace().collect::<Vec<&str>>();

    if split_address.len() != 2 {
        return Err(CliError::InvalidMasterAddress);
    }

    let address = split_address[0];

    let valid_address = if let Some(captures) = ipv4_regex.captures(address) {
        captures.iter().skip(1).all(|octet| {
            octet
                .map(|m| m.as_str().parse::<u16>().map(|v| v <= 255).unwrap_or(false))
                .unwrap_or(false)
        })
    } else {
        hostname_regex.is_match(address)
    };

    if !valid_address {
        return Err(CliError::InvalidMasterAddress);
    }

    let port_number = validate_port(split_address[1], CliError::InvalidMasterPort)?;

    Ok((address.to_string(), port_number))
}
