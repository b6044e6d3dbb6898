// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Cache layer (C9) ports: the L2 remote-store abstraction and the
//! serialization format / circuit-breaker-state vocabulary shared between
//! domain and infrastructure.

use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    Json,
    Binary,
}

/// Circuit breaker states (§4.6): closed -> open on N consecutive failures,
/// open -> half-open after the recovery timeout, half-open -> closed on a
/// successful probe or back to open on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// L2 remote key-value store port (single node / sentinel / cluster,
/// selected by config at construction time in the infrastructure impl).
/// `CacheError` from this trait is always absorbed by the caller — cache is
/// advisory (§7).
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CoreError>;

    async fn delete(&self, key: &str) -> Result<(), CoreError>;

    async fn ping(&self) -> Result<(), CoreError>;
}
