pub mod config;
pub mod error;
pub mod types;

pub mod closing;
pub mod delinquency;
pub mod loan;
pub mod news;
pub mod payments;
pub mod schedule;

#[cfg(feature = "reporting")]
pub mod receipt;

#[cfg(feature = "reporting")]
pub mod report;

#[cfg(feature = "ledger")]
pub mod ledger;

pub use error::VehicleCreditError;
pub use types::*;

/// Standard result type for all vehicle-credit operations
pub type VehicleCreditResult<T> = Result<T, VehicleCreditError>;
