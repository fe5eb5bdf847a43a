//! Credential module for authorizing upstream requests
//!
//! This module handles:
//! - The `Credential` value (an ordered header set plus bookkeeping)
//! - The rotating, internally synchronized `CredentialPool`
//! - `Harvester` implementations that produce new credentials out-of-band

mod credential;
mod harvester;
mod pool;

pub use credential::Credential;
pub use harvester::{build_harvester, CommandHarvester, HarvestError, Harvester, StaticHarvester};
pub use pool::{CredentialPool, PoolInsert, PoolStats};
