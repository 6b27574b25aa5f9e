#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so clients can build `release_date` timestamps without
// depending on `prost-types` themselves.
pub use prost_types;
