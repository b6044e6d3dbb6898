// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Type-safe, time-ordered entity identifiers.
//!
//! `GenericId<Marker>` wraps a ULID behind a phantom type so that a
//! `TransactionId` and a `CustomerId` can never be confused at compile time,
//! even though both are, at runtime, just a 26-character Crockford-base32
//! string. Concrete ID types below are thin aliases over the generic.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// A category tag for `GenericId`. Implemented by zero-sized marker types
/// only; never constructed.
pub trait IdCategory {
    fn category_name() -> &'static str;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdCategory> GenericId<T> {
    pub fn new() -> Self {
        Self {
            value: Ulid::new(),
            _marker: PhantomData,
        }
    }

    pub fn from_ulid(value: Ulid) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub fn from_string(s: &str) -> Result<Self, CoreError> {
        let value = Ulid::from_string(s).map_err(|e| {
            CoreError::invalid_config(format!("invalid {} id `{s}`: {e}", T::category_name()))
        })?;
        Ok(Self::from_ulid(value))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }

    pub fn datetime(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.timestamp_ms() as i64)
            .unwrap_or_else(chrono::Utc::now)
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl<T: IdCategory> From<Ulid> for GenericId<T> {
    fn from(value: Ulid) -> Self {
        Self::from_ulid(value)
    }
}

impl<T: IdCategory> Serialize for GenericId<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.to_string().serialize(serializer)
    }
}

impl<'de, T: IdCategory> Deserialize<'de> for GenericId<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ulid::from_string(&s)
            .map(Self::from_ulid)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

macro_rules! id_category {
    ($marker:ident, $alias:ident, $name:literal) => {
        #[derive(Debug, Clone, Copy, Eq, PartialEq)]
        pub struct $marker;

        impl IdCategory for $marker {
            fn category_name() -> &'static str {
                $name
            }
        }

        pub type $alias = GenericId<$marker>;
    };
}

id_category!(TransactionIdCategory, TransactionId, "transaction");
id_category!(CustomerIdCategory, CustomerId, "customer_identity");
id_category!(TenantIdCategory, TenantId, "tenant");
id_category!(OrganizationIdCategory, OrganizationId, "organization");
id_category!(MigrationIdCategory, MigrationRunId, "migration_run");
id_category!(BackupJobIdCategory, BackupJobId, "backup_job");
id_category!(UserIdCategory, UserId, "user");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id: TransactionId = TransactionId::new();
        let s = id.to_string();
        let parsed = TransactionId::from_string(&s).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_markers_are_distinct_types() {
        let tx = TransactionId::new();
        let cust = CustomerId::new();
        assert_ne!(tx.to_string(), cust.to_string());
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(TransactionId::from_string("not-a-ulid").is_err());
    }
}
