//! # FreightMesh service runtime
//!
//! Wires the message bus, shared cache, invalidation coordinator, and
//! gateway into one running mesh node. The `freightmesh` binary is a thin
//! `main` over [`MeshRuntime`]; embedders can drive the same type from
//! their own process and publish through its bus connection.

pub mod config;
pub mod runtime;

pub use config::{
    BusConfig, CacheConfig, ConfigError, GatewayConfig, MeshConfig, RateLimitSettings,
};
pub use runtime::MeshRuntime;
