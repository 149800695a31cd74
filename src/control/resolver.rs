//! Zone temperature resolver.
//!
//! A zone is only as cool as its hottest component, so the resolved
//! zone temperature is the maximum over all sensors that could be
//! read. A single failed sensor must not blind the zone: partial
//! failure is tolerated, total failure surfaces as `None`. Retry
//! policy belongs to the sensor transport, never here.

/// Resolve a zone's representative temperature.
///
/// `read` is the per-sensor lookup; returning `None` marks that
/// sensor as unreadable this tick.
pub fn resolve_zone<F>(sensors: &[String], mut read: F) -> Option<i64>
where
    F: FnMut(&str) -> Option<i64>,
{
    sensors.iter().filter_map(|name| read(name)).max()
}
