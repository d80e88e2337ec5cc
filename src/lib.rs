#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod executor;
pub use executor::*;

mod bucket;
pub use bucket::*;

mod cancellation;
pub use cancellation::*;

mod error;
pub use error::*;

mod common;
pub use common::{RefillPeriodMs, TenantThrottle};

mod registry;
mod runtime;

pub use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;
