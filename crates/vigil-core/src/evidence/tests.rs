use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};

use super::*;
use crate::error::{ErrorKind, LedgerError};
use crate::query::{DateRange, EvidenceFilter};
use crate::store::LedgerStore;
use crate::time::FixedClock;

fn registry() -> (EvidenceRegistry, Arc<FixedClock>) {
    let store = LedgerStore::in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 2, 14, 10, 0, 0).unwrap(),
    ));
    (EvidenceRegistry::new(store, clock.clone()), clock)
}

fn certificate() -> ManualEvidence {
    ManualEvidence::new("faa_107", "107.12", "pilot_certificate", "Part 107 cert #4411 on file")
}

#[test]
fn test_attach_manual_is_pending() {
    let (registry, _clock) = registry();
    let record = registry
        .attach_manual("t1", certificate().with_incident("INC-1").with_drone("UA-1"))
        .unwrap();

    assert_eq!(record.review_status, ReviewStatus::Pending);
    assert_eq!(record.source_event_id, None);
    assert_eq!(record.reference_id.as_deref(), Some("INC-1"));
    assert_eq!(record.attestation.as_deref(), Some("Part 107 cert #4411 on file"));
    assert_eq!(record.created_at, "2025-02-14T10:00:00.000000Z");
    assert!(record.reviewed_by.is_none());
}

#[test]
fn test_attach_reference_defaults() {
    let (registry, _clock) = registry();
    let by_drone = registry
        .attach_manual("t1", certificate().with_drone("UA-1"))
        .unwrap();
    assert_eq!(by_drone.reference_id.as_deref(), Some("UA-1"));

    let explicit = registry
        .attach_manual("t1", certificate().with_drone("UA-1").with_reference("DOC-9"))
        .unwrap();
    assert_eq!(explicit.reference_id.as_deref(), Some("DOC-9"));

    let org = registry.attach_manual("t1", certificate()).unwrap();
    assert_eq!(org.reference_id, None);
    assert_eq!(org.drone_id, None);
}

#[test]
fn test_attach_requires_fields() {
    let (registry, _clock) = registry();
    let mut missing = certificate();
    missing.attestation = "   ".to_string();
    let err = registry.attach_manual("t1", missing).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidArgument {
            field: "attestation",
            ..
        }
    ));

    let mut missing = certificate();
    missing.control_id = String::new();
    assert_eq!(
        registry.attach_manual("t1", missing).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_review_sets_fields() {
    let (registry, clock) = registry();
    let record = registry.attach_manual("t1", certificate()).unwrap();
    clock.advance(TimeDelta::hours(2));

    let reviewed = registry
        .review("t1", record.id, ReviewDecision::Accepted, "bob", Some("verified"))
        .unwrap();
    assert_eq!(reviewed.review_status, ReviewStatus::Accepted);
    assert_eq!(reviewed.reviewed_by.as_deref(), Some("bob"));
    assert_eq!(reviewed.reviewed_at.as_deref(), Some("2025-02-14T12:00:00.000000Z"));
    assert_eq!(reviewed.review_note.as_deref(), Some("verified"));
    assert_eq!(reviewed.created_at, record.created_at);
    assert_eq!(reviewed.attestation, record.attestation);
}

#[test]
fn test_review_overwrites_previous_decision() {
    let (registry, _clock) = registry();
    let record = registry.attach_manual("t1", certificate()).unwrap();
    registry
        .review("t1", record.id, ReviewDecision::Accepted, "bob", Some("ok"))
        .unwrap();
    let second = registry
        .review("t1", record.id, ReviewDecision::Rejected, "carol", None)
        .unwrap();

    assert_eq!(second.review_status, ReviewStatus::Rejected);
    assert_eq!(second.reviewed_by.as_deref(), Some("carol"));
    assert_eq!(second.review_note, None);
}

#[test]
fn test_review_cross_tenant_is_not_found_without_mutation() {
    let (registry, _clock) = registry();
    let record = registry.attach_manual("t1", certificate()).unwrap();

    let foreign = registry
        .review("t2", record.id, ReviewDecision::Accepted, "eve", None)
        .unwrap_err();
    let missing = registry
        .review("t1", 9_999, ReviewDecision::Accepted, "bob", None)
        .unwrap_err();
    assert_eq!(foreign.kind(), ErrorKind::NotFound);
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let unchanged = registry.get("t1", record.id).unwrap();
    assert_eq!(unchanged, record);
    assert_eq!(registry.get("t2", record.id).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_list_newest_first_with_filters() {
    let (registry, clock) = registry();
    let first = registry.attach_manual("t1", certificate()).unwrap();
    clock.advance(TimeDelta::minutes(1));
    let second = registry
        .attach_manual(
            "t1",
            ManualEvidence::new("faa_107", "107.49", "maintenance_log", "log 2025-02")
                .with_incident("INC-1"),
        )
        .unwrap();
    clock.advance(TimeDelta::minutes(1));
    let third = registry.attach_manual("t1", certificate()).unwrap();
    registry.attach_manual("t2", certificate()).unwrap();

    let ids = |filter: EvidenceFilter| -> Vec<i64> {
        registry
            .list("t1", &filter)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect()
    };

    assert_eq!(ids(EvidenceFilter::default()), [third.id, second.id, first.id]);
    assert_eq!(
        ids(EvidenceFilter {
            control_id: Some("107.12".to_string()),
            ..EvidenceFilter::default()
        }),
        [third.id, first.id]
    );
    assert_eq!(
        ids(EvidenceFilter {
            incident_id: Some("INC-1".to_string()),
            ..EvidenceFilter::default()
        }),
        [second.id]
    );
    assert_eq!(
        ids(EvidenceFilter {
            limit: Some(1),
            ..EvidenceFilter::default()
        }),
        [third.id]
    );
}

#[test]
fn test_list_drone_scope_includes_org_level() {
    let (registry, _clock) = registry();
    let org = registry.attach_manual("t1", certificate()).unwrap();
    let ua1 = registry
        .attach_manual("t1", certificate().with_drone("UA-1"))
        .unwrap();

    let scoped = |drone: &str| -> Vec<i64> {
        registry
            .list(
                "t1",
                &EvidenceFilter {
                    drone_id: Some(drone.to_string()),
                    ..EvidenceFilter::default()
                },
            )
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect()
    };
    assert_eq!(scoped("UA-2"), [org.id]);
    assert_eq!(scoped("UA-1"), [ua1.id, org.id]);
}

#[test]
fn test_list_date_bounds() {
    let (registry, clock) = registry();
    clock.set(Utc.with_ymd_and_hms(2025, 2, 13, 23, 59, 59).unwrap());
    registry.attach_manual("t1", certificate()).unwrap();
    clock.set(Utc.with_ymd_and_hms(2025, 2, 14, 0, 0, 0).unwrap());
    let inside = registry.attach_manual("t1", certificate()).unwrap();
    clock.set(Utc.with_ymd_and_hms(2025, 2, 15, 0, 0, 0).unwrap());
    registry.attach_manual("t1", certificate()).unwrap();

    let filter = EvidenceFilter {
        dates: DateRange::parse(Some("2025-02-14"), Some("2025-02-14")).unwrap(),
        ..EvidenceFilter::default()
    };
    let records = registry.list("t1", &filter).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, inside.id);

    let reversed = EvidenceFilter {
        dates: DateRange {
            from: Some(chrono::NaiveDate::from_ymd_opt(2025, 2, 15).unwrap()),
            to: Some(chrono::NaiveDate::from_ymd_opt(2025, 2, 14).unwrap()),
        },
        ..EvidenceFilter::default()
    };
    assert_eq!(
        registry.list("t1", &reversed).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}
