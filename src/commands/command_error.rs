use thiserror::Error;

use crate::{resp::RespValue, stream::StreamIdError};

/// Everything a client command can fail with. `as_string` renders the
/// RESP simple-error reply; the connection stays open afterwards.
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    EmptyCommand,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("wrong number of arguments for '{0}' command")]
    WrongNumberOfArguments(&'static str),
    #[error("syntax error")]
    SyntaxError,
    #[error("invalid expire time in set")]
    InvalidExpireTime,
    #[error("Operation against a key holding the wrong kind of value")]
    WrongDataType,
    #[error("{0}")]
    InvalidStreamId(#[from] StreamIdError),
    #[error("invalid glob pattern")]
    InvalidGlobPattern,
    #[error("unsupported subcommand for 'config' command")]
    UnsupportedConfigSubcommand,
    #[error("unsupported CONFIG parameter")]
    UnsupportedConfigParameter,
    #[error("unsupported INFO section")]
    UnsupportedInfoSection,
    #[error("number of replicas is not a number")]
    ReplicaCountNotANumber,
    #[error("timeout is not a number")]
    TimeoutNotANumber,
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error("slaves can't be issued 'wait' command")]
    WaitOnReplica,
    #[error("unknown command 'psync'")]
    PsyncOnReplica,
    #[error("invalid PSYNC replication ID")]
    InvalidPsyncReplicationId,
    #[error("invalid PSYNC offset")]
    InvalidPsyncOffset,
    #[error("only master can receive ACK")]
    AckOnReplica,
    #[error("only slave can receive GETACK")]
    GetAckOnMaster,
    #[error("invalid offset")]
    InvalidAckOffset,
    #[error("write commands are not allowed on a replica")]
    WriteOnReplica,
}

impl CommandError {
    pub fn as_string(&self) -> String {
        match self {
            CommandError::WrongDataType => {
                RespValue::Error(format!("WRONGTYPE {}", self)).encode()
            }
            other => RespValue::Error(format!("ERR {}", other)).encode(),
        }
    }
}
