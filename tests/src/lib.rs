//! # FreightMesh Test Suite
//!
//! Unified test crate for flows that cross crate boundaries. Behavior local
//! to one crate is tested next to the code it covers; everything here wires
//! two or more mesh crates together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── bus_flows.rs          # Delivery semantics through the broker
//!     ├── invalidation_flows.rs # Event -> cache -> fan-out choreography
//!     └── admission_flows.rs    # Shared-state rate limiting and the gateway
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p fm-tests
//!
//! # By category
//! cargo test -p fm-tests integration::
//!
//! # Benchmarks
//! cargo bench -p fm-tests
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
