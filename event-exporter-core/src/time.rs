use std::time::Duration;

/// Parses a duration flag/env value such as `1m`, `2h`, `30s` (spec §6:
/// resync-period, storage-ttl, termination-grace-period).
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    Ok(humantime::parse_duration(s)?)
}
