// SPDX-License-Identifier: Apache-2.0

//! Distributed key generators
//!
//! Key generation is the only stateful step of statement preparation and
//! runs before routing, so routing itself stays a pure function.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use shardline_core::{ShardingError, ShardingResult, Value};
use tracing::warn;
use uuid::Uuid;

use super::algorithm::{prop_i64, AlgorithmProps};
use crate::config::{AlgorithmConfig, RuleProps};

pub trait KeyGenerator: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    fn generate_key(&self) -> ShardingResult<Value>;
}

/// Creates a built-in generator from its configuration.
pub fn create_key_generator(
    config: &AlgorithmConfig,
    props: &RuleProps,
) -> ShardingResult<Arc<dyn KeyGenerator>> {
    match config.kind.to_ascii_uppercase().as_str() {
        "SNOWFLAKE" => {
            let worker_id = match prop_i64(&config.props, "worker-id")? {
                Some(id) => id,
                None => i64::from(props.worker_id),
            };
            Ok(Arc::new(SnowflakeKeyGenerator::new(worker_id)?))
        }
        "UUID" => Ok(Arc::new(UuidKeyGenerator)),
        "INCREMENT" => Ok(Arc::new(IncrementKeyGenerator::from_props(&config.props)?)),
        other => Err(ShardingError::config(format!(
            "unknown key generator type '{other}'"
        ))),
    }
}

// ==================== Snowflake ====================

/// 2016-11-01T00:00:00Z in milliseconds.
pub const SNOWFLAKE_EPOCH_MILLIS: i64 = 1_477_958_400_000;

const SEQUENCE_BITS: u32 = 12;
const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;
pub const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
const MAX_TOLERATE_ROLLBACK_MILLIS: i64 = 10;

/// Millisecond wall clock, replaceable in tests.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    })
}

#[derive(Debug, Default)]
struct SnowflakeState {
    last_millis: i64,
    sequence: i64,
}

/// 41-bit timestamp, 10-bit worker id, 12-bit sequence.
pub struct SnowflakeKeyGenerator {
    worker_id: i64,
    clock: Clock,
    state: Mutex<SnowflakeState>,
}

impl Debug for SnowflakeKeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeKeyGenerator")
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: i64) -> ShardingResult<Self> {
        Self::with_clock(worker_id, system_clock())
    }

    pub fn with_clock(worker_id: i64, clock: Clock) -> ShardingResult<Self> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(ShardingError::config(format!(
                "snowflake worker id must be within 0..={MAX_WORKER_ID}, got {worker_id}"
            )));
        }
        Ok(Self {
            worker_id,
            clock,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    pub fn next_id(&self) -> ShardingResult<i64> {
        let mut state = self.state.lock();
        let mut now = (self.clock)();
        if now < state.last_millis {
            let behind = state.last_millis - now;
            if behind > MAX_TOLERATE_ROLLBACK_MILLIS {
                return Err(ShardingError::key_generation(
                    "SNOWFLAKE",
                    format!("clock moved backwards by {behind}ms, refusing to generate keys"),
                ));
            }
            warn!(behind_ms = behind, "Clock moved backwards, waiting to catch up");
            now = self.wait_until(state.last_millis);
        }
        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.wait_until(state.last_millis + 1);
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;
        Ok(((now - SNOWFLAKE_EPOCH_MILLIS) << TIMESTAMP_SHIFT)
            | (self.worker_id << WORKER_ID_SHIFT)
            | state.sequence)
    }

    fn wait_until(&self, target: i64) -> i64 {
        let mut now = (self.clock)();
        while now < target {
            std::thread::yield_now();
            now = (self.clock)();
        }
        now
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn type_name(&self) -> &'static str {
        "SNOWFLAKE"
    }

    fn generate_key(&self) -> ShardingResult<Value> {
        self.next_id().map(Value::Int)
    }
}

// ==================== UUID ====================

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn type_name(&self) -> &'static str {
        "UUID"
    }

    fn generate_key(&self) -> ShardingResult<Value> {
        Ok(Value::Text(Uuid::new_v4().simple().to_string()))
    }
}

// ==================== Increment ====================

/// Process-local counter.
#[derive(Debug)]
pub struct IncrementKeyGenerator {
    next: AtomicI64,
}

impl IncrementKeyGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }

    pub fn from_props(props: &AlgorithmProps) -> ShardingResult<Self> {
        Ok(Self::new(prop_i64(props, "start")?.unwrap_or(1)))
    }
}

impl KeyGenerator for IncrementKeyGenerator {
    fn type_name(&self) -> &'static str {
        "INCREMENT"
    }

    fn generate_key(&self) -> ShardingResult<Value> {
        Ok(Value::Int(self.next.fetch_add(1, Ordering::Relaxed)))
    }
}
