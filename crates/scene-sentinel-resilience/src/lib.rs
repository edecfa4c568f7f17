//! Resilience primitives shared across the scene validator. Currently just
//! the circuit breaker the gating layer builds its breaker gate on top of.

pub mod circuit_breaker;

pub use circuit_breaker::*;
