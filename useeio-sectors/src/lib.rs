//! Sector reshaping for EEIO tables
//!
//! Aggregation merges sectors into a retained target and disaggregation splits a
//! sector into several new ones. Both mutate an [`useeio_core::tables::IOTables`]
//! snapshot in place, conserve table totals, and bump its version so matrices
//! built from the previous snapshot are recognised as stale.
//!
//! # Module Organisation
//!
//! - `aggregation`: merging sectors across every table, CPI and output series
//! - `disaggregation`: splitting sectors with uniform or user-defined allocation
//! - `balance`: RAS balancing of a disaggregated Use table

pub mod aggregation;
pub mod balance;
pub mod disaggregation;
