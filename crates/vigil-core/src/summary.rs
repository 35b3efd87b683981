//! Per-control evidence counts for compliance dashboards.

use std::collections::BTreeMap;

use rusqlite::params_from_iter;
use serde::Serialize;

use crate::error::{LedgerError, non_empty, require};
use crate::evidence::NORMALIZED_REVIEW_STATUS_SQL;
use crate::query::{DateRange, ListParams, WhereClause};
use crate::store::LedgerStore;

/// Review-state counts for one control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlCounts {
    /// Evidence a reviewer accepted.
    pub accepted: u64,
    /// Evidence awaiting review, including unrecognized statuses.
    pub pending: u64,
    /// Evidence a reviewer rejected.
    pub rejected: u64,
    /// Always `accepted + pending + rejected`.
    pub total: u64,
}

/// Whether a summary was drone-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryScope {
    /// Whole tenant.
    Org,
    /// One drone plus organization-level evidence.
    Drone,
}

/// Counts keyed by control id, in control id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceSummary {
    /// Framework summarized.
    pub framework_id: String,
    /// `drone` when a drone filter applied.
    pub scope: SummaryScope,
    /// The drone filter, when scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drone_id: Option<String>,
    /// Counts per control id; controls without evidence are absent.
    pub controls: BTreeMap<String, ControlCounts>,
}

/// Input for [`EvidenceAggregator::summarize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryQuery {
    /// Framework to summarize (required).
    pub framework_id: String,
    /// Drone scope; organization-level evidence is always included.
    pub drone_id: Option<String>,
    /// Inclusive bounds on evidence `created_at`.
    pub dates: DateRange,
}

impl SummaryQuery {
    /// Organization-wide summary of one framework.
    #[must_use]
    pub fn new(framework_id: impl Into<String>) -> Self {
        Self {
            framework_id: framework_id.into(),
            ..Self::default()
        }
    }

    /// Narrows to one drone.
    #[must_use]
    pub fn with_drone(mut self, drone_id: impl Into<String>) -> Self {
        self.drone_id = Some(drone_id.into());
        self
    }

    /// Bounds the evidence creation dates.
    #[must_use]
    pub const fn with_dates(mut self, dates: DateRange) -> Self {
        self.dates = dates;
        self
    }

    /// Builds a summary query from parsed list parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `framework_id` is missing.
    pub fn from_params(params: &ListParams) -> Result<Self, LedgerError> {
        let framework_id = params
            .framework_id
            .as_deref()
            .ok_or_else(|| LedgerError::invalid("framework_id", "must not be empty"))?;
        Ok(Self {
            framework_id: framework_id.to_string(),
            drone_id: params.drone_id.clone(),
            dates: params.dates,
        })
    }
}

/// Read-side aggregation over the evidence table.
#[derive(Debug, Clone)]
pub struct EvidenceAggregator {
    store: LedgerStore,
}

impl EvidenceAggregator {
    /// Creates an aggregator over the shared ledger store.
    #[must_use]
    pub const fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Counts evidence per control for one framework.
    ///
    /// Drone scope and date bounds follow the same rules as evidence
    /// listing. Rows without a recognized review status count as pending.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank framework or reversed dates, or
    /// a storage error.
    #[allow(clippy::cast_sign_loss)]
    pub fn summarize(
        &self,
        tenant_id: &str,
        query: &SummaryQuery,
    ) -> Result<EvidenceSummary, LedgerError> {
        let tenant_id = require(tenant_id, "tenant_id")?;
        let framework_id = require(&query.framework_id, "framework_id")?;
        let dates = DateRange::new(query.dates.from, query.dates.to)?;
        let drone_id = non_empty(query.drone_id.as_deref());

        let mut clause = WhereClause::new();
        clause.push("tenant_id = ?", tenant_id.to_string());
        clause.push("framework_id = ?", framework_id.to_string());
        clause.push_scope(drone_id, &dates);
        let sql = format!(
            "SELECT control_id,
                    SUM(CASE WHEN status = 'accepted' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END)
             FROM (SELECT control_id, {NORMALIZED_REVIEW_STATUS_SQL} AS status
                   FROM evidence WHERE {})
             GROUP BY control_id",
            clause.sql()
        );
        let params = clause.into_params();

        let rows: Vec<(String, i64, i64, i64)> = self.store.read(|tx| {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let controls = rows
            .into_iter()
            .map(|(control_id, accepted, pending, rejected)| {
                let (accepted, pending, rejected) =
                    (accepted as u64, pending as u64, rejected as u64);
                let counts = ControlCounts {
                    accepted,
                    pending,
                    rejected,
                    total: accepted + pending + rejected,
                };
                (control_id, counts)
            })
            .collect();

        Ok(EvidenceSummary {
            framework_id: framework_id.to_string(),
            scope: if drone_id.is_some() {
                SummaryScope::Drone
            } else {
                SummaryScope::Org
            },
            drone_id: drone_id.map(str::to_string),
            controls,
        })
    }
}
