//! Shared domain model, error taxonomy, monetary arithmetic, calendar math,
//! and external-collaborator ports for the Meterflow billing backend.
//!
//! Every other crate in this workspace (`meterflow-ingest`,
//! `meterflow-aggregator`, `meterflow-pricing`, `meterflow-period`,
//! `meterflow-wallet`, `meterflow-tenant`) depends on this one and on none
//! of the others' internals, so the billing-event pipeline components stay
//! independently testable.

pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod money;
pub mod period_math;
pub mod ports;

pub use error::{Error, ErrorKind, Result};
pub use money::Money;
