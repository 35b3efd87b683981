//! Concurrent writers against one ledger.

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use vigil_core::{
    EventQuery, ForensicsLedger, IdentityContext, ManualEvidence, NewEvent, ReviewDecision, Role,
    SummaryQuery,
};

const WORKERS: usize = 6;
const PER_WORKER: usize = 15;

#[test]
fn concurrent_events_and_reviews_stay_consistent() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(ForensicsLedger::open(dir.path().join("ledger.db")).unwrap());

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let admin = IdentityContext::new(format!("admin-{worker}"), Role::Admin, "t1");
                for i in 0..PER_WORKER {
                    ledger
                        .record_event(
                            &admin,
                            NewEvent::new("mitigation_action_executed")
                                .with_drone(format!("UA-{worker}"))
                                .with_actor(admin.actor_id.as_str()),
                        )
                        .unwrap();
                    let manual = ledger
                        .attach_evidence(
                            &admin,
                            ManualEvidence::new("faa_107", "107.49", "checklist", "preflight ok")
                                .with_drone(format!("UA-{worker}")),
                        )
                        .unwrap();
                    let decision = if i % 2 == 0 {
                        ReviewDecision::Accepted
                    } else {
                        ReviewDecision::Rejected
                    };
                    ledger
                        .review_evidence(&admin, manual.id, decision, None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reader = IdentityContext::new("auditor", Role::Viewer, "t1");
    let events = ledger
        .list_events(&reader, &EventQuery::default())
        .unwrap();
    assert_eq!(events.len(), WORKERS * PER_WORKER);
    assert!(
        events
            .windows(2)
            .all(|w| (&w[0].timestamp, w[0].id) < (&w[1].timestamp, w[1].id))
    );

    let counts = ledger
        .summarize_evidence(&reader, &SummaryQuery::new("faa_107"))
        .unwrap()
        .controls["107.49"];
    let total = (WORKERS * PER_WORKER * 2) as u64;
    let reviewed = (WORKERS * PER_WORKER) as u64;
    assert_eq!(counts.total, total);
    assert_eq!(counts.pending, total - reviewed);
    assert_eq!(counts.accepted + counts.rejected, reviewed);
    assert_eq!(counts.accepted + counts.pending + counts.rejected, counts.total);
}
