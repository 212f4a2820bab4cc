//! The append-only stream datatype.
//!
//! Entries carry compound `major-minor` IDs that strictly increase in
//! insertion order. Blocking readers register a notification channel on
//! the stream; every append signals all registered subscribers. The
//! subscriber map is only touched while the keyspace write lock is held.

use std::collections::HashMap;
use std::fmt;

use jiff::Timestamp;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, PartialEq)]
pub enum StreamIdError {
    #[error("Invalid stream ID specified as stream command argument")]
    Invalid,
    #[error("The ID specified in XADD must be greater than 0-0")]
    MustBeGreaterThanZeroZero,
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    SmallerThanTop,
    #[error("Invalid range")]
    InvalidRange,
}

/// A stream entry ID. Ordering is lexicographic on the
/// `(major, minor)` pair, which the derived `Ord` provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntryId {
    pub major: u64,
    pub minor: u64,
}

impl EntryId {
    pub const MIN: EntryId = EntryId { major: 0, minor: 0 };
    pub const MAX: EntryId = EntryId {
        major: u64::MAX,
        minor: u64::MAX,
    };

    /// Parses `"<major>-<minor>"`; a bare `"<major>"` defaults the minor
    /// part to 0.
    pub fn parse(input: &str) -> Result<Self, StreamIdError> {
        match input.split_once('-') {
            Some((major, minor)) => Ok(EntryId {
                major: parse_id_part(major)?,
                minor: parse_id_part(minor)?,
            }),
            None => Ok(EntryId {
                major: parse_id_part(input)?,
                minor: 0,
            }),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.major, self.minor)
    }
}

fn parse_id_part(part: &str) -> Result<u64, StreamIdError> {
    part.parse::<u64>().map_err(|_| StreamIdError::Invalid)
}

/// The ID argument of an XADD: fully explicit, auto-generated, or a fixed
/// major part with an auto-generated minor part (`"<major>-*"`).
#[derive(Debug, PartialEq)]
pub enum IdSpec {
    Auto,
    AutoMinor(u64),
    Explicit(EntryId),
}

impl IdSpec {
    pub fn parse(input: &str) -> Result<Self, StreamIdError> {
        if input == "*" {
            return Ok(IdSpec::Auto);
        }

        match input.split_once('-') {
            Some((major, "*")) => Ok(IdSpec::AutoMinor(parse_id_part(major)?)),
            _ => Ok(IdSpec::Explicit(EntryId::parse(input)?)),
        }
    }
}

/// Parses an XRANGE start bound. `-` is the minimum sentinel and a bare
/// major defaults the minor part to its minimum.
pub fn parse_range_start(input: &str) -> Result<EntryId, StreamIdError> {
    if input == "-" {
        return Ok(EntryId::MIN);
    }

    match input.split_once('-') {
        Some((major, minor)) => Ok(EntryId {
            major: parse_id_part(major)?,
            minor: parse_id_part(minor)?,
        }),
        None => Ok(EntryId {
            major: parse_id_part(input)?,
            minor: 0,
        }),
    }
}

/// Parses an XRANGE end bound. `+` is the maximum sentinel and a bare
/// major defaults the minor part to its maximum.
pub fn parse_range_end(input: &str) -> Result<EntryId, StreamIdError> {
    if input == "+" {
        return Ok(EntryId::MAX);
    }

    match input.split_once('-') {
        Some((major, minor)) => Ok(EntryId {
            major: parse_id_part(major)?,
            minor: parse_id_part(minor)?,
        }),
        None => Ok(EntryId {
            major: parse_id_part(input)?,
            minor: u64::MAX,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: EntryId,
    /// Field/value pairs in the order the client supplied them.
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    subscribers: HashMap<String, mpsc::Sender<()>>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_id(&self) -> Option<EntryId> {
        self.entries.last().map(|entry| entry.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves an [`IdSpec`] against the current top entry, enforcing
    /// that stream IDs strictly increase.
    ///
    /// Auto generation uses the wall clock for the major part. A fixed
    /// major with auto minor starts at 0, except on an empty stream with
    /// major 0 where it starts at 1 so `0-0` is never produced.
    pub fn next_id(&self, spec: &IdSpec) -> Result<EntryId, StreamIdError> {
        match spec {
            IdSpec::Auto => {
                let major = unix_time_milliseconds();

                Ok(match self.last_id() {
                    Some(last) if major <= last.major => EntryId {
                        major: last.major,
                        minor: last.minor + 1,
                    },
                    _ => EntryId { major, minor: 0 },
                })
            }
            IdSpec::AutoMinor(major) => match self.last_id() {
                None => {
                    if *major == 0 {
                        Ok(EntryId { major: 0, minor: 1 })
                    } else {
                        Ok(EntryId {
                            major: *major,
                            minor: 0,
                        })
                    }
                }
                Some(last) => {
                    if *major < last.major {
                        Err(StreamIdError::SmallerThanTop)
                    } else if *major == last.major {
                        Ok(EntryId {
                            major: *major,
                            minor: last.minor + 1,
                        })
                    } else {
                        Ok(EntryId {
                            major: *major,
                            minor: 0,
                        })
                    }
                }
            },
            IdSpec::Explicit(id) => {
                if *id == EntryId::MIN {
                    return Err(StreamIdError::MustBeGreaterThanZeroZero);
                }

                if let Some(last) = self.last_id() {
                    if *id <= last {
                        return Err(StreamIdError::SmallerThanTop);
                    }
                }

                Ok(*id)
            }
        }
    }

    /// Appends an entry and signals every registered subscriber. The send
    /// is non-blocking: a subscriber wake-up is only a hint, readers
    /// re-read from their last observed ID regardless.
    pub fn append(&mut self, id: EntryId, fields: Vec<(String, String)>) {
        self.entries.push(StreamEntry { id, fields });

        for sender in self.subscribers.values() {
            let _ = sender.try_send(());
        }
    }

    /// Entries with IDs in `[start, end]`, both bounds inclusive.
    pub fn range(&self, start: EntryId, end: EntryId) -> Vec<StreamEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.id >= start && entry.id <= end)
            .cloned()
            .collect()
    }

    /// Entries with IDs strictly greater than `after`, up to `count`.
    pub fn read_after(&self, after: EntryId, count: Option<usize>) -> Vec<StreamEntry> {
        let matching = self.entries.iter().filter(|entry| entry.id > after);

        match count {
            Some(count) => matching.take(count).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }

    pub fn subscribe(&mut self, token: String, sender: mpsc::Sender<()>) {
        self.subscribers.insert(token, sender);
    }

    pub fn unsubscribe(&mut self, token: &str) {
        self.subscribers.remove(token);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

fn unix_time_milliseconds() -> u64 {
    Timestamp::now().as_millisecond().max(0) as u64
}
