//! A Redis-wire-compatible in-memory key/value server.
//!
//! Supported functionality:
//!
//! - String keys with millisecond TTL expiry (SET/GET/TYPE/KEYS)
//! - Append-only streams with ordered compound IDs (XADD, XRANGE, XREAD
//!   with blocking reads and fan-out notification)
//! - Master-replica replication: PSYNC handshake, write fan-out with
//!   byte-exact offset accounting, and WAIT quorum acknowledgement
//! - RDB snapshot loading at startup
//!
//! Clients speak the Redis Serialization Protocol (RESP) over TCP;
//! concurrent connections are served with async/await on Tokio.

pub mod commands;
pub mod connection;
pub mod frame;
pub mod key_value_store;
pub mod rdb;
pub mod replication;
pub mod resp;
pub mod server;
pub mod stream;
