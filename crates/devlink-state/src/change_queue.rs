//! Bounded log of accepted state changes.
//!
//! Every record gets a sequence number. Consumers keep a [`Cursor`] (the
//! next sequence number they expect) and drain from it. When the queue is
//! full the oldest record is evicted; a consumer whose cursor points at an
//! evicted record gets [`Error::Gap`] and must resync from a snapshot.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use devlink_core::config::defaults;
use devlink_core::{Error, Result};
use devlink_schema::PropValue;
use serde::{Deserialize, Serialize};

/// One accepted property write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Fully-qualified `package.property` name
    pub property: String,
    pub value: PropValue,
    pub timestamp: DateTime<Utc>,
}

impl StateChange {
    pub fn new(property: impl Into<String>, value: PropValue, timestamp: DateTime<Utc>) -> Self {
        Self {
            property: property.into(),
            value,
            timestamp,
        }
    }
}

/// Position of a consumer: the sequence number of the next record it
/// has not seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor(pub u64);

/// FIFO-evicting change log of fixed capacity.
#[derive(Debug, Clone)]
pub struct StateChangeQueue {
    capacity: usize,
    records: VecDeque<StateChange>,
    /// Sequence number of `records[0]`
    first_seq: u64,
    /// Sequence number the next append gets
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl StateChangeQueue {
    /// Create a queue holding at most `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            first_seq: 0,
            next_seq: 0,
            last_timestamp: None,
        }
    }

    /// Append a record, evicting the oldest if full. Returns its sequence
    /// number.
    ///
    /// A timestamp earlier than the previous record's is raised to it, so
    /// timestamps never decrease in append order.
    pub fn append(&mut self, mut change: StateChange) -> u64 {
        if let Some(last) = self.last_timestamp {
            if change.timestamp < last {
                change.timestamp = last;
            }
        }
        self.last_timestamp = Some(change.timestamp);

        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.first_seq += 1;
        }
        self.records.push_back(change);
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Records from `cursor` on; advances `cursor` past them.
    ///
    /// Fails with [`Error::Gap`] if records the cursor has not seen were
    /// evicted or reset, or if the cursor is ahead of the log. The cursor
    /// is left unchanged on error.
    pub fn drain_since(&self, cursor: &mut Cursor) -> Result<Vec<StateChange>> {
        if cursor.0 < self.first_seq || cursor.0 > self.next_seq {
            return Err(Error::Gap {
                cursor: cursor.0,
                oldest: self.first_seq,
            });
        }
        let skip = (cursor.0 - self.first_seq) as usize;
        let changes: Vec<StateChange> = self.records.iter().skip(skip).cloned().collect();
        cursor.0 = self.next_seq;
        Ok(changes)
    }

    /// Drop every record. Cursors that had not caught up get a gap.
    pub fn reset(&mut self) {
        self.records.clear();
        self.first_seq = self.next_seq;
    }

    /// Most recently appended record still retained.
    pub fn newest(&self) -> Option<&StateChange> {
        self.records.back()
    }

    /// Cursor positioned after the newest record.
    pub fn head(&self) -> Cursor {
        Cursor(self.next_seq)
    }

    /// Cursor positioned at the oldest retained record.
    pub fn oldest(&self) -> Cursor {
        Cursor(self.first_seq)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for StateChangeQueue {
    fn default() -> Self {
        Self::new(defaults::STATE_QUEUE_CAPACITY)
    }
}
