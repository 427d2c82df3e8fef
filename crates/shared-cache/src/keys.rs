//! Cache key naming convention.
//!
//! Every key the platform reads or invalidates is built here, so producers
//! and the invalidation coordinator can never drift apart on spelling.
//!
//! Date-ranged keys embed ISO-8601 timestamps with millisecond precision
//! (`2026-08-22T00:00:00.000Z`), the format the platform's HTTP clients send
//! and the format invalidation must reproduce byte-for-byte.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use shared_types::{CarrierId, RouteId, ShipmentId, ShipmentStatus};

/// Render a timestamp in the platform's canonical ISO-8601 form.
#[must_use]
pub fn iso(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// The inclusive bounds of the UTC day containing `at`:
/// `00:00:00.000` through `23:59:59.999`.
#[must_use]
pub fn day_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = at
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc();
    let end = start + TimeDelta::milliseconds(86_400_000 - 1);
    (start, end)
}

/// `shipment:<id>` holds one shipment's full record.
#[must_use]
pub fn shipment(id: &ShipmentId) -> String {
    format!("shipment:{id}")
}

/// `shipment:count:<status>` holds the number of shipments in a status.
#[must_use]
pub fn shipment_count(status: ShipmentStatus) -> String {
    format!("shipment:count:{status}")
}

/// `tracking:<id>` holds the latest tracking snapshot for a shipment.
#[must_use]
pub fn tracking(id: &ShipmentId) -> String {
    format!("tracking:{id}")
}

/// `metrics:<start>:<end>` holds aggregate shipment metrics for a range.
#[must_use]
pub fn metrics(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("metrics:{}:{}", iso(start), iso(end))
}

/// `revenue_trend:<start>:<end>` holds the revenue series for a range.
#[must_use]
pub fn revenue_trend(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("revenue_trend:{}:{}", iso(start), iso(end))
}

/// `carrier:<id>:<start>:<end>` holds one carrier's performance for a range.
#[must_use]
pub fn carrier_performance(
    carrier: &CarrierId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    format!("carrier:{carrier}:{}:{}", iso(start), iso(end))
}

/// `route:<id>:<start>:<end>` holds one route's efficiency for a range.
#[must_use]
pub fn route_efficiency(route: &RouteId, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("route:{route}:{}:{}", iso(start), iso(end))
}

/// `top_carriers:<limit>:<start>:<end>` holds a ranked carrier list.
#[must_use]
pub fn top_carriers(limit: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("top_carriers:{limit}:{}:{}", iso(start), iso(end))
}

/// `efficient_routes:<limit>:<start>:<end>` holds a ranked route list.
#[must_use]
pub fn efficient_routes(limit: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("efficient_routes:{limit}:{}:{}", iso(start), iso(end))
}

/// `rate-limit:<client>` holds one client's admission window state.
#[must_use]
pub fn rate_limit(client: &str) -> String {
    format!("rate-limit:{client}")
}
