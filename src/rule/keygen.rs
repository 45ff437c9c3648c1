use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// 2016-11-01T00:00:00Z in milliseconds.
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_477_958_400_000;

const SEQUENCE_BITS: u32 = 12;
const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;
pub const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

/// Produces values for a table's generated-key column.
pub trait KeyGenerator: Send + Sync + fmt::Debug {
    fn generator_type(&self) -> &'static str;
    fn generate_key(&self) -> Result<i64>;
}

/// Millisecond wall clock, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct SnowflakeState {
    last_millis: i64,
    sequence: i64,
}

/// 41-bit timestamp | 10-bit worker id | 12-bit sequence.
pub struct SnowflakeKeyGenerator {
    worker_id: u16,
    max_tolerate_time_difference_ms: i64,
    clock: Arc<dyn Clock>,
    state: Mutex<SnowflakeState>,
}

impl fmt::Debug for SnowflakeKeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeKeyGenerator")
            .field("worker_id", &self.worker_id)
            .field(
                "max_tolerate_time_difference_ms",
                &self.max_tolerate_time_difference_ms,
            )
            .finish()
    }
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: u16, max_tolerate_time_difference_ms: u64) -> Result<Self> {
        Self::with_clock(worker_id, max_tolerate_time_difference_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(
        worker_id: u16,
        max_tolerate_time_difference_ms: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(Error::Config(format!(
                "Snowflake worker-id {} exceeds {}",
                worker_id, MAX_WORKER_ID
            )));
        }
        Ok(Self {
            worker_id,
            max_tolerate_time_difference_ms: max_tolerate_time_difference_ms as i64,
            clock,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }

    /// Timestamp (ms since the Unix epoch) encoded in a generated key.
    pub fn timestamp_of(key: i64) -> i64 {
        (key >> TIMESTAMP_SHIFT) + SNOWFLAKE_EPOCH_MS
    }

    fn wait_until_after(&self, last_millis: i64) -> i64 {
        let mut now = self.clock.now_millis();
        while now <= last_millis {
            std::thread::yield_now();
            now = self.clock.now_millis();
        }
        now
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn generator_type(&self) -> &'static str {
        "SNOWFLAKE"
    }

    fn generate_key(&self) -> Result<i64> {
        let mut state = self.state.lock();
        let mut now = self.clock.now_millis();

        if now < state.last_millis {
            let behind = state.last_millis - now;
            if behind > self.max_tolerate_time_difference_ms {
                return Err(Error::KeyGeneration(format!(
                    "Clock moved backwards by {}ms, tolerance is {}ms",
                    behind, self.max_tolerate_time_difference_ms
                )));
            }
            warn!("Clock moved backwards by {}ms, reusing last timestamp", behind);
            now = state.last_millis;
        }

        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.wait_until_after(state.last_millis);
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        Ok(((now - SNOWFLAKE_EPOCH_MS) << TIMESTAMP_SHIFT)
            | ((self.worker_id as i64) << WORKER_ID_SHIFT)
            | state.sequence)
    }
}
