//! Environmentally-extended input-output models.
//!
//! The data model, linear algebra and coefficient transforms live in
//! `useeio-core`, sector aggregation and disaggregation in `useeio-sectors`.
//! This crate chains them into a model build and calculates life-cycle
//! inventory and impact results from a built model.

pub mod calculation;
pub mod contribution;
pub mod model;
