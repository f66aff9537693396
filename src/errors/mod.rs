//! Error types for the voxgate gateway
//!
//! All domain errors that cross component boundaries are variants of
//! [`GatewayError`]. Infrastructure failures (network, subprocess, parse) are
//! wrapped at the adapter or protocol boundary and never escape raw.

pub mod gateway_error;

pub use gateway_error::{GatewayError, GatewayResult};
