use crate::{commands::command_error::CommandError, resp::RespValue};

pub fn ping(_arguments: Vec<String>) -> Result<String, CommandError> {
    Ok(RespValue::SimpleString("PONG".to_string()).encode())
}
