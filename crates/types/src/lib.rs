//! Contains a common set of types used across all of the `datalith` crates.
//!
//! This module implements a single location where these types are managed,
//! making them easy to reference and maintain.
pub mod chunk;
pub mod chunked;
pub mod config;
mod merkle;
pub mod partition;
pub mod serialization;

pub use chunk::*;
pub use config::*;
pub use merkle::*;
pub use partition::*;
pub use serialization::*;

pub use alloy_primitives::Address;
