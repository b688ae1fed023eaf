//! Reusable building blocks for the broker topology.
pub mod pre_start;
