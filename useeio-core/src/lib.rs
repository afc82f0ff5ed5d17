//! Core tables and matrix algebra for environmentally-extended input-output models
//!
//! This crate holds the data model (sector catalogs, labelled matrices and the
//! [`tables::IOTables`] snapshot), the configuration records, and the pure
//! transforms that turn a snapshot into coefficient matrices:
//!
//! - `io_transform`: direct requirements, market shares and commodity mix
//! - `leontief`: the Leontief inverse `(I - A)⁻¹`
//! - `satellite`: environmental flow coefficients `B`
//! - `indicators`: characterization factors `C` and the derived `D`, `M` and `N`
//! - `demand`: named and user-supplied demand vectors

pub mod demand;
pub mod diagnostics;
pub mod indicators;
pub mod io_transform;
pub mod leontief;
pub mod linear_algebra;
pub mod matrix;
pub mod satellite;
pub mod sectors;
pub mod specs;
pub mod tables;

pub mod errors;
