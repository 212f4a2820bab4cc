use std::collections::HashMap;

use jiff::Timestamp;

use crate::stream::Stream;

#[derive(Debug)]
pub enum DataType {
    String(String),
    Stream(Stream),
}

#[derive(Debug)]
pub struct Value {
    pub data: DataType,
    pub expiration: Option<Timestamp>,
}

impl Value {
    /// An entry whose expiry has passed is semantically absent; the read
    /// that notices it removes the entry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiration.is_some_and(|expiration| now > expiration)
    }
}

pub type KeyValueStore = HashMap<String, Value>;
