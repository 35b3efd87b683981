//! Read-side query parameters shared by listing and aggregation.
//!
//! Two scoping rules live here so listing and aggregation cannot drift apart:
//!
//! - **Drone scope**: a drone filter matches records for that drone *and*
//!   organization-level records whose `drone_id` is null.
//! - **Date bounds**: whole UTC days, inclusive. `date_from` starts at
//!   `00:00:00.000000`, `date_to` ends one microsecond before the next
//!   midnight.

use chrono::NaiveDate;
use rusqlite::types::Value;

use crate::error::{LedgerError, non_empty};
use crate::time::{day_end, day_start, parse_day};

/// Default page size for list requests arriving as query parameters.
pub const DEFAULT_LIST_LIMIT: u32 = 200;

/// Upper bound on any list page.
pub const MAX_LIST_LIMIT: u32 = 500;

/// Validates a requested page size, applying `default` when absent.
///
/// # Errors
///
/// Returns `InvalidArgument` unless `1 <= limit <= 500`.
pub fn bounded_limit(limit: Option<u32>, default: u32) -> Result<u32, LedgerError> {
    match limit {
        None => Ok(default),
        Some(n) if (1..=MAX_LIST_LIMIT).contains(&n) => Ok(n),
        Some(n) => Err(LedgerError::invalid(
            "limit",
            format!("{n} is outside 1..={MAX_LIST_LIMIT}"),
        )),
    }
}

/// Inclusive whole-day range over `created_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    /// First day included.
    pub from: Option<NaiveDate>,
    /// Last day included.
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// Builds a range, rejecting `from` after `to`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the bounds are reversed.
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self, LedgerError> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(LedgerError::invalid(
                    "date_from",
                    format!("{f} is after date_to {t}"),
                ));
            }
        }
        Ok(Self { from, to })
    }

    /// Parses `YYYY-MM-DD` bounds; empty strings mean unbounded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for malformed or reversed dates.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, LedgerError> {
        let from = non_empty(from)
            .map(|raw| parse_day(raw, "date_from"))
            .transpose()?;
        let to = non_empty(to).map(|raw| parse_day(raw, "date_to")).transpose()?;
        Self::new(from, to)
    }

    /// Storage-format lower bound, if any.
    #[must_use]
    pub fn lower(&self) -> Option<String> {
        self.from.map(day_start)
    }

    /// Storage-format inclusive upper bound, if any.
    #[must_use]
    pub fn upper(&self) -> Option<String> {
        self.to.map(day_end)
    }
}

/// Filters for listing evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceFilter {
    /// Restrict to one framework.
    pub framework_id: Option<String>,
    /// Restrict to one control.
    pub control_id: Option<String>,
    /// Drone scope (includes organization-level records).
    pub drone_id: Option<String>,
    /// Restrict to one incident.
    pub incident_id: Option<String>,
    /// Whole-day creation window.
    pub dates: DateRange,
    /// Page size; defaults to [`DEFAULT_LIST_LIMIT`].
    pub limit: Option<u32>,
}

/// Recognized list/summary parameters parsed from transport key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// `framework_id`
    pub framework_id: Option<String>,
    /// `control_id`
    pub control_id: Option<String>,
    /// `drone_id`
    pub drone_id: Option<String>,
    /// `incident_id`
    pub incident_id: Option<String>,
    /// `date_from` / `date_to`
    pub dates: DateRange,
    /// `limit`, validated and defaulted.
    pub limit: u32,
}

impl ListParams {
    /// Parses query parameters. Unknown keys are ignored, empty values are
    /// treated as absent, and later duplicates win.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a non-numeric or out-of-range `limit`
    /// and for malformed or reversed dates.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params = Self::default();
        let mut date_from = None;
        let mut date_to = None;
        let mut limit = None;

        for (key, value) in pairs {
            let value = non_empty(Some(value)).map(str::to_string);
            match key {
                "framework_id" => params.framework_id = value,
                "control_id" => params.control_id = value,
                "drone_id" => params.drone_id = value,
                "incident_id" => params.incident_id = value,
                "date_from" => date_from = value,
                "date_to" => date_to = value,
                "limit" => {
                    limit = value
                        .map(|raw| {
                            raw.parse::<u32>().map_err(|_| {
                                LedgerError::invalid("limit", format!("'{raw}' is not a number"))
                            })
                        })
                        .transpose()?;
                },
                _ => {},
            }
        }

        params.dates = DateRange::parse(date_from.as_deref(), date_to.as_deref())?;
        params.limit = bounded_limit(limit, DEFAULT_LIST_LIMIT)?;
        Ok(params)
    }

    /// Evidence filter for these parameters.
    #[must_use]
    pub fn evidence_filter(&self) -> EvidenceFilter {
        EvidenceFilter {
            framework_id: self.framework_id.clone(),
            control_id: self.control_id.clone(),
            drone_id: self.drone_id.clone(),
            incident_id: self.incident_id.clone(),
            dates: self.dates,
            limit: Some(self.limit),
        }
    }
}

/// Accumulates a parameterized `WHERE` clause from fixed fragments.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    conditions: Vec<&'static str>,
    params: Vec<Value>,
}

impl WhereClause {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, condition: &'static str, param: impl Into<Value>) {
        self.conditions.push(condition);
        self.params.push(param.into());
    }

    pub(crate) fn push_opt(&mut self, condition: &'static str, param: Option<&str>) {
        if let Some(value) = non_empty(param) {
            self.push(condition, value.to_string());
        }
    }

    /// Applies the drone-scope and date-bound rules described in the module
    /// docs.
    pub(crate) fn push_scope(&mut self, drone_id: Option<&str>, dates: &DateRange) {
        self.push_opt("(drone_id = ? OR drone_id IS NULL)", drone_id);
        if let Some(lower) = dates.lower() {
            self.push("created_at >= ?", lower);
        }
        if let Some(upper) = dates.upper() {
            self.push("created_at <= ?", upper);
        }
    }

    pub(crate) fn sql(&self) -> String {
        self.conditions.join(" AND ")
    }

    pub(crate) fn into_params(self) -> Vec<Value> {
        self.params
    }
}
