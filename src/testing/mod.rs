//! Testing utilities and mock implementations
//!
//! Mocks for exercising the router and shadow pipeline without real agent
//! backends.

pub mod mocks;

pub use mocks::*;
