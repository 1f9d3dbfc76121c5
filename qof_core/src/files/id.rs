//! Snowflake-style file id generation.
//!
//! Layout, high to low: 41 bits of milliseconds since [`EPOCH_MILLIS`],
//! 10 bits of worker id, 12 bits of per-millisecond sequence. Ids from one
//! generator are strictly increasing.

use chrono::Utc;
use parking_lot::Mutex;

use super::models::FileId;

/// 2020-01-01T00:00:00Z
pub const EPOCH_MILLIS: i64 = 1_577_836_800_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_WORKER: u16 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug)]
struct State {
    last_millis: i64,
    sequence: i64,
}

#[derive(Debug)]
pub struct IdGenerator {
    worker_id: i64,
    state: Mutex<State>,
}

impl IdGenerator {
    /// Worker ids above 1023 are masked to 10 bits.
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: i64::from(worker_id & MAX_WORKER),
            state: Mutex::new(State {
                last_millis: 0,
                sequence: 0,
            }),
        }
    }

    pub fn next_id(&self) -> FileId {
        let mut state = self.state.lock();

        // A clock stepping backwards keeps counting from the last timestamp.
        let mut now = (Utc::now().timestamp_millis() - EPOCH_MILLIS).max(state.last_millis);

        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        (now << (WORKER_BITS + SEQUENCE_BITS)) | (self.worker_id << SEQUENCE_BITS) | state.sequence
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}
