mod command_error;
mod command_handler;
mod config_get;
mod echo;
mod get;
mod info;
mod keys;
mod ping;
mod psync;
mod replconf;
mod set;
mod stream_utils;
mod type_command;
mod wait;
mod xadd;
mod xrange;
mod xread;

pub use command_error::CommandError;
pub use command_handler::{CommandHandler, CommandResult};
