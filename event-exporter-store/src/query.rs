//! Query Adapter Contract: the wire-contract types and validation semantics
//! the external, authenticated HTTP query API would build on. No network
//! code lives here; the HTTP surface itself is an external collaborator.

use chrono::{
    NaiveDate,
    NaiveDateTime,
};
use event_exporter_core::prelude::*;

use crate::errors::{
    invalid_date_format,
    invalid_option,
};

/// Resource kind a query can be scoped to (spec §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    Pod,
    Node,
    Container,
}

/// Event severity a query can be scoped to (spec §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogType {
    Normal,
    Warning,
}

/// Sort order for a list query; defaults to `Desc` (spec §6: "`order ∈
/// {ASC, default=DESC}`").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Order {
    Asc,
    Desc,
}

impl Default for Order {
    fn default() -> Self {
        Order::Desc
    }
}

/// Filter conditions for a list query over one collection (spec §6).
#[derive(Clone, Debug, Default)]
pub struct QueryFilter {
    /// The collection name resolved from a cluster identity (`eventId`).
    pub event_id: String,
    pub namespace_id: Option<String>,
    pub resource_kind: Option<ResourceKind>,
    pub log_type: Option<LogType>,
    /// `strftime`-style format string the range bounds below are parsed with.
    pub created_range_format: Option<String>,
    pub created_range_start: Option<String>,
    pub created_range_end: Option<String>,
    pub order: Order,
}

/// Pagination for a list query (spec §6: "pagination `(limit, marker)`").
/// `marker` filters by `_id > marker`; `limit` defaults to 1000.
#[derive(Clone, Debug)]
pub struct QueryPage {
    pub limit: i64,
    pub marker: Option<String>,
}

impl Default for QueryPage {
    fn default() -> Self {
        Self { limit: DEFAULT_QUERY_LIMIT, marker: None }
    }
}

/// A parsed, validated creation-time range, ready to be turned into a store
/// query's range predicate.
#[derive(Clone, Debug)]
pub struct CreatedRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Parses one bound under `format`, accepting either a full datetime format
/// or a date-only format (widened to midnight) — `createdRangeFormat` is
/// caller-supplied and `NaiveDateTime::parse_from_str` rejects any format
/// lacking a time component.
fn parse_bound(value: &str, format: &str) -> anyhow::Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(value, format)
        .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is always a valid time"))
        .map_err(|e| invalid_date_format(&format!("{value:?} does not match {format:?}: {e}")))
}

/// Parses and validates `filter.created_range_*`, if present.
///
/// Fails with [`crate::errors::StoreError::InvalidDateFormat`] if either
/// bound does not parse under `created_range_format`, and with
/// [`crate::errors::StoreError::InvalidOption`] if `start > end` (spec §6).
pub fn validate_created_range(filter: &QueryFilter) -> anyhow::Result<Option<CreatedRange>> {
    let (format, start, end) = match (&filter.created_range_format, &filter.created_range_start, &filter.created_range_end) {
        (Some(format), Some(start), Some(end)) => (format, start, end),
        (None, None, None) => return Ok(None),
        _ => return Err(invalid_option("createdRangeFormat, createdRangeStart, and createdRangeEnd must all be set together")),
    };

    let start = parse_bound(start, format)?;
    let end = parse_bound(end, format)?;

    if start > end {
        return Err(invalid_option(&format!("createdRangeStart ({start}) must not be after createdRangeEnd ({end})")));
    }

    Ok(Some(CreatedRange { start, end }))
}

/// Clamps an unset/non-positive limit to the default (spec §6: "Default
/// limit 1000").
pub fn normalize_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 => l,
        _ => DEFAULT_QUERY_LIMIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_filter() -> QueryFilter {
        QueryFilter { event_id: "abc123".into(), ..Default::default() }
    }

    #[test]
    fn no_range_is_valid_and_absent() {
        let filter = base_filter();
        assert!(validate_created_range(&filter).unwrap().is_none());
    }

    #[test]
    fn well_formed_range_parses() {
        let mut filter = base_filter();
        filter.created_range_format = Some("%Y-%m-%d".into());
        filter.created_range_start = Some("2026-01-01".into());
        filter.created_range_end = Some("2026-01-31".into());
        let range = validate_created_range(&filter).unwrap().unwrap();
        assert!(range.start < range.end);
    }

    #[test]
    fn unparseable_bound_is_invalid_date_format() {
        let mut filter = base_filter();
        filter.created_range_format = Some("%Y-%m-%d".into());
        filter.created_range_start = Some("not-a-date".into());
        filter.created_range_end = Some("2026-01-31".into());
        let err = validate_created_range(&filter).unwrap_err();
        assert!(err.to_string().contains("invalid date format"));
    }

    #[test]
    fn start_after_end_is_invalid_option() {
        let mut filter = base_filter();
        filter.created_range_format = Some("%Y-%m-%d".into());
        filter.created_range_start = Some("2026-02-01".into());
        filter.created_range_end = Some("2026-01-01".into());
        let err = validate_created_range(&filter).unwrap_err();
        assert!(err.to_string().contains("invalid option"));
    }

    #[test]
    fn limit_defaults_when_unset_or_non_positive() {
        assert_eq!(normalize_limit(None), DEFAULT_QUERY_LIMIT);
        assert_eq!(normalize_limit(Some(0)), DEFAULT_QUERY_LIMIT);
        assert_eq!(normalize_limit(Some(-5)), DEFAULT_QUERY_LIMIT);
        assert_eq!(normalize_limit(Some(50)), 50);
    }
}
