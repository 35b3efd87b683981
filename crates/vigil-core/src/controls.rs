//! Static mapping from event types to compliance controls.
//!
//! Only event types listed here carry compliance significance. Recording any
//! other event type derives no evidence; that is the expected outcome, not an
//! error.

use serde::Serialize;

use crate::events::event_types;

/// FAA Part 107 (small unmanned aircraft systems).
pub const FAA_PART_107: &str = "faa_107";

/// Coordinates of a regulatory control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ControlRef {
    /// Framework identifier, e.g. `faa_107`.
    pub framework_id: &'static str,
    /// Control identifier within the framework, e.g. `107.12`.
    pub control_id: &'static str,
}

const CONTROL_EVENT_MAP: &[(&str, ControlRef)] = &[
    (
        event_types::OPERATOR_ASSIGNED,
        ControlRef {
            framework_id: FAA_PART_107,
            control_id: "107.12",
        },
    ),
    (
        event_types::INCIDENT_CLOSED,
        ControlRef {
            framework_id: FAA_PART_107,
            control_id: "107.21",
        },
    ),
    (
        event_types::MITIGATION_ACTION_EXECUTED,
        ControlRef {
            framework_id: FAA_PART_107,
            control_id: "107.49",
        },
    ),
];

/// Returns the control an event type provides evidence for, if any.
#[must_use]
pub fn map_event_type(event_type: &str) -> Option<ControlRef> {
    CONTROL_EVENT_MAP
        .iter()
        .find(|(mapped, _)| *mapped == event_type)
        .map(|(_, control)| *control)
}

/// All mappings, in declaration order.
#[must_use]
pub const fn mappings() -> &'static [(&'static str, ControlRef)] {
    CONTROL_EVENT_MAP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_event_types() {
        let assigned = map_event_type("operator_assigned").unwrap();
        assert_eq!(assigned.framework_id, "faa_107");
        assert_eq!(assigned.control_id, "107.12");

        assert_eq!(map_event_type("incident_closed").unwrap().control_id, "107.21");
        assert_eq!(
            map_event_type("mitigation_action_executed").unwrap().control_id,
            "107.49"
        );
    }

    #[test]
    fn test_unmapped_event_types() {
        assert_eq!(map_event_type("simulation_started"), None);
        assert_eq!(map_event_type("incident_created"), None);
        assert_eq!(map_event_type("Operator_Assigned"), None);
        assert_eq!(map_event_type(""), None);
    }

    #[test]
    fn test_exactly_three_mappings() {
        assert_eq!(mappings().len(), 3);
        assert!(mappings().iter().all(|(_, c)| c.framework_id == FAA_PART_107));
    }
}
