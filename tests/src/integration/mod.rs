//! Cross-crate choreography tests.

pub mod admission_flows;
pub mod bus_flows;
pub mod invalidation_flows;
