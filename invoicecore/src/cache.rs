// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cache layer (C9, §4.6): an L1 in-process LRU in front of an L2 remote
//! store, with a circuit breaker around the L2 hop so a degraded Redis
//! never blocks the pipeline — cache misses just fall through to the
//! source of truth.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use invoicecore_domain::error::CoreError;
use invoicecore_domain::services::cache_port::{CircuitState, RemoteCache, SerializationFormat};

use crate::config::CacheConfig;

/// `redis`-backed L2 store (§4.6). One connection manager per process;
/// `redis`'s `ConnectionManager` reconnects transparently, so this type
/// itself carries no retry logic.
pub struct RedisRemoteCache {
    conn: Mutex<ConnectionManager>,
}

impl RedisRemoteCache {
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| CoreError::CacheError(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::CacheError(format!("redis connect failed: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

#[async_trait]
impl RemoteCache for RedisRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let mut conn = self.conn.lock().clone();
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| CoreError::CacheError(e.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CoreError> {
        let mut conn = self.conn.lock().clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CoreError::CacheError(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        let mut conn = self.conn.lock().clone();
        let _: () = conn.del(key).await.map_err(|e| CoreError::CacheError(e.to_string()))?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CoreError> {
        let mut conn = self.conn.lock().clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CoreError::CacheError(e.to_string()))
    }
}

/// Closed -> Open after `failure_threshold` consecutive failures, Open ->
/// HalfOpen once `recovery_timeout` elapses, HalfOpen -> Closed on the next
/// success or back to Open on the next failure (§4.6).
struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    consecutive_failures: AtomicU32,
    opened_at_millis: AtomicU64,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            consecutive_failures: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
            state: Mutex::new(CircuitState::Closed),
        }
    }

    /// Returns the state to act on for this call, transitioning Open ->
    /// HalfOpen in place when the recovery timeout has elapsed.
    fn poll(&self, epoch: Instant) -> CircuitState {
        let mut state = self.state.lock();
        if *state == CircuitState::Open {
            let opened_at = self.opened_at_millis.load(Ordering::Acquire);
            if epoch.elapsed().as_millis() as u64 >= opened_at + self.recovery_timeout.as_millis() as u64 {
                *state = CircuitState::HalfOpen;
            }
        }
        *state
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        *self.state.lock() = CircuitState::Closed;
    }

    fn record_failure(&self, epoch: Instant) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        let mut state = self.state.lock();
        if *state == CircuitState::HalfOpen || failures >= self.failure_threshold {
            *state = CircuitState::Open;
            self.opened_at_millis.store(epoch.elapsed().as_millis() as u64, Ordering::Release);
        }
    }
}

fn compress(bytes: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder
        .write_all(bytes)
        .map_err(|e| CoreError::CacheError(format!("compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CoreError::CacheError(format!("compression failed: {e}")))
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CoreError::CacheError(format!("decompression failed: {e}")))?;
    Ok(out)
}

/// One byte prepended to every L2-bound payload marking whether it was
/// gzip-compressed, so `get` can decompress unconditionally on the flag
/// rather than guessing from the threshold (which only applies to `set`).
const FLAG_PLAIN: u8 = 0;
const FLAG_GZIP: u8 = 1;

/// The cache layer a stage executor depends on: L1 (process-local LRU) in
/// front of L2 (remote, circuit-broken), transparent serialization and
/// size-gated compression (§4.6).
pub struct TieredCache {
    l1: Mutex<lru::LruCache<String, Vec<u8>>>,
    l2: Option<std::sync::Arc<dyn RemoteCache>>,
    breaker: CircuitBreaker,
    format: SerializationFormat,
    compression_threshold_bytes: usize,
    epoch: Instant,
}

impl TieredCache {
    pub fn new(config: &CacheConfig, l2: Option<std::sync::Arc<dyn RemoteCache>>) -> Self {
        let capacity = std::num::NonZeroUsize::new(config.l1_capacity.max(1)).unwrap();
        let format = if config.serialization_format.eq_ignore_ascii_case("binary") {
            SerializationFormat::Binary
        } else {
            SerializationFormat::Json
        };
        Self {
            l1: Mutex::new(lru::LruCache::new(capacity)),
            l2,
            breaker: CircuitBreaker::new(
                config.circuit_failure_threshold,
                Duration::from_secs(config.circuit_recovery_secs),
            ),
            format,
            compression_threshold_bytes: config.compression_threshold_bytes,
            epoch: Instant::now(),
        }
    }

    pub fn serialization_format(&self) -> SerializationFormat {
        self.format
    }

    /// Serializes `value`, checks L1, then (circuit permitting) L2,
    /// promoting an L2 hit back into L1 (§4.6).
    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(raw) = self.l1.lock().get(key).cloned() {
            return self.decode(&raw);
        }

        let l2 = self.l2.as_ref()?;
        if self.breaker.poll(self.epoch) == CircuitState::Open {
            return None;
        }

        match l2.get(key).await {
            Ok(Some(wrapped)) => {
                self.breaker.record_success();
                self.l1.lock().put(key.to_string(), wrapped.clone());
                self.decode(&wrapped)
            }
            Ok(None) => {
                self.breaker.record_success();
                None
            }
            Err(_) => {
                self.breaker.record_failure(self.epoch);
                None
            }
        }
    }

    /// Writes through L1 and (circuit permitting) L2.
    pub async fn set<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(wrapped) = self.encode(value) else { return };
        self.l1.lock().put(key.to_string(), wrapped.clone());

        let Some(l2) = self.l2.as_ref() else { return };
        if self.breaker.poll(self.epoch) == CircuitState::Open {
            return;
        }
        match l2.set(key, &wrapped, ttl).await {
            Ok(()) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(self.epoch),
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.l1.lock().pop(key);
        if let Some(l2) = self.l2.as_ref() {
            let _ = l2.delete(key).await;
        }
    }

    fn encode<T: serde::Serialize>(&self, value: &T) -> Option<Vec<u8>> {
        let payload = match self.format {
            SerializationFormat::Json => serde_json::to_vec(value).ok()?,
            SerializationFormat::Binary => serde_json::to_vec(value).ok()?,
        };
        if payload.len() >= self.compression_threshold_bytes {
            let compressed = compress(&payload).ok()?;
            let mut out = Vec::with_capacity(compressed.len() + 1);
            out.push(FLAG_GZIP);
            out.extend(compressed);
            Some(out)
        } else {
            let mut out = Vec::with_capacity(payload.len() + 1);
            out.push(FLAG_PLAIN);
            out.extend(payload);
            Some(out)
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, wrapped: &[u8]) -> Option<T> {
        let (flag, body) = wrapped.split_first()?;
        let payload = match *flag {
            FLAG_GZIP => decompress(body).ok()?,
            _ => body.to_vec(),
        };
        serde_json::from_slice(&payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            url: "redis://localhost".into(),
            topology: Default::default(),
            serialization_format: "json".into(),
            compression_threshold_bytes: 16,
            l1_capacity: 4,
            circuit_failure_threshold: 2,
            circuit_recovery_secs: 60,
        }
    }

    #[tokio::test]
    async fn l1_only_round_trips_without_an_l2() {
        let cache = TieredCache::new(&config(), None);
        cache.set("k", &"short".to_string(), Duration::from_secs(1)).await;
        let back: Option<String> = cache.get("k").await;
        assert_eq!(back.as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn large_values_round_trip_through_compression() {
        let cache = TieredCache::new(&config(), None);
        let value = "x".repeat(256);
        cache.set("big", &value, Duration::from_secs(1)).await;
        let back: Option<String> = cache.get("big").await;
        assert_eq!(back, Some(value));
    }

    #[test]
    fn circuit_opens_after_threshold_and_half_opens_after_recovery() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(10));
        let epoch = Instant::now();
        assert_eq!(breaker.poll(epoch), CircuitState::Closed);
        breaker.record_failure(epoch);
        assert_eq!(breaker.poll(epoch), CircuitState::Closed);
        breaker.record_failure(epoch);
        assert_eq!(breaker.poll(epoch), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breaker.poll(epoch), CircuitState::HalfOpen);
    }
}
