//! Cache tier drivers.
//!
//! Each tier is a closed variant of [`CacheDriver`]. Drivers hold no
//! per-execution state and are shared by every [`CacheControl`](super::CacheControl).

mod http;
mod object;
mod opcode;
mod transient;

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::cache_type::CacheType;

pub use http::HttpDriver;
pub use object::{CachedOptionStore, LAST_OBJECT_CACHE_FLUSH_OPTION, ObjectDriver, ObjectStore};
pub use opcode::OpcodeDriver;
pub use transient::TransientDriver;

/// Result of a successful flush: `true` on the wire, or a removed-row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed,
    Removed(u64),
}

impl Serialize for FlushOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FlushOutcome::Flushed => serializer.serialize_bool(true),
            FlushOutcome::Removed(count) => serializer.serialize_u64(*count),
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("The transient cache could not be flushed.")]
    Transient(#[source] RepoError),
}

impl DriverError {
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::Transient(_) => "transient_cache_flush_error",
        }
    }
}

pub enum CacheDriver {
    Http(HttpDriver),
    Object(ObjectDriver),
    Opcode(OpcodeDriver),
    Transient(TransientDriver),
}

impl CacheDriver {
    pub fn kind(&self) -> CacheType {
        match self {
            CacheDriver::Http(_) => CacheType::Http,
            CacheDriver::Object(_) => CacheType::Object,
            CacheDriver::Opcode(_) => CacheType::Opcode,
            CacheDriver::Transient(_) => CacheType::Transient,
        }
    }

    pub async fn flush(&self) -> Result<FlushOutcome, DriverError> {
        match self {
            CacheDriver::Http(driver) => Ok(driver.flush()),
            CacheDriver::Object(driver) => Ok(driver.flush().await),
            CacheDriver::Opcode(driver) => Ok(driver.flush()),
            CacheDriver::Transient(driver) => driver.flush().await,
        }
    }

    pub fn as_http(&self) -> Option<&HttpDriver> {
        match self {
            CacheDriver::Http(driver) => Some(driver),
            _ => None,
        }
    }
}

impl From<HttpDriver> for CacheDriver {
    fn from(driver: HttpDriver) -> Self {
        CacheDriver::Http(driver)
    }
}

impl From<ObjectDriver> for CacheDriver {
    fn from(driver: ObjectDriver) -> Self {
        CacheDriver::Object(driver)
    }
}

impl From<OpcodeDriver> for CacheDriver {
    fn from(driver: OpcodeDriver) -> Self {
        CacheDriver::Opcode(driver)
    }
}

impl From<TransientDriver> for CacheDriver {
    fn from(driver: TransientDriver) -> Self {
        CacheDriver::Transient(driver)
    }
}

/// The registered drivers, keyed and iterated in canonical tier order.
#[derive(Default)]
pub struct DriverSet {
    drivers: BTreeMap<CacheType, CacheDriver>,
}

impl DriverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver, replacing any previous one for the same tier.
    pub fn with(mut self, driver: impl Into<CacheDriver>) -> Self {
        let driver = driver.into();
        self.drivers.insert(driver.kind(), driver);
        self
    }

    pub fn get(&self, kind: CacheType) -> Option<&CacheDriver> {
        self.drivers.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = CacheType> + '_ {
        self.drivers.keys().copied()
    }

    pub fn http(&self) -> Option<&HttpDriver> {
        self.get(CacheType::Http).and_then(CacheDriver::as_http)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
