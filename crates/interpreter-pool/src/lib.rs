//! Deferred interpreter assignment: a booking pool, a policy-driven scoring function, and the
//! processing, recovery, and scheduling machinery around them.

pub mod assignment;
pub mod config;
pub mod error;
pub mod telemetry;
