use super::*;

use crate::domain::Role;

const RETURN_FLAGS: [bool; 2] = [false, true];

#[test]
fn timeline_step_completed_iff_status_rank_reaches_milestone() {
    for status in ShipmentStatus::ALL {
        for return_required in RETURN_FLAGS {
            for step in timeline(status, return_required) {
                assert_eq!(
                    step.completed,
                    status.rank() >= step.milestone.status().rank(),
                    "status={status} milestone={:?}",
                    step.milestone
                );
            }
        }
    }
}

#[test]
fn return_steps_hidden_without_return_requirement() {
    let reachable = ShipmentStatus::ALL
        .into_iter()
        .filter(|status| !status.is_return_phase());
    for status in reachable {
        let steps = timeline(status, false);
        assert_eq!(steps.len(), 3, "status={status}");
        assert!(steps
            .iter()
            .all(|step| !step.milestone.status().is_return_phase()));
        for role in [Role::Client, Role::Creator] {
            assert!(allowed_actions(role, status, false)
                .iter()
                .all(|action| !action.is_return_flow()));
        }
    }
}

#[test]
fn return_steps_shown_once_return_flow_started() {
    assert_eq!(timeline(ShipmentStatus::Delivered, true).len(), 5);
    assert_eq!(timeline(ShipmentStatus::ReturnRequested, false).len(), 5);
    let returned = timeline(ShipmentStatus::Returned, true);
    assert!(returned.iter().all(|step| step.completed));
}

#[test]
fn client_can_close_return_opened_without_return_requirement() {
    let status = ShipmentStatus::ReturnRequested;
    assert_eq!(timeline(status, false).len(), 5);
    assert_eq!(
        allowed_actions(Role::Client, status, false)
            .into_iter()
            .collect::<Vec<_>>(),
        vec![ShipmentAction::ConfirmReturnReceived]
    );
    assert_eq!(
        validate_transition(status, ShipmentStatus::Returned, false),
        Ok(())
    );
    assert!(allowed_actions(Role::Creator, ShipmentStatus::Delivered, false).is_empty());
}

#[test]
fn pending_shipment_has_no_completed_milestones() {
    assert!(timeline(ShipmentStatus::Pending, true)
        .iter()
        .all(|step| !step.completed));
}

#[test]
fn client_and_creator_capabilities_never_overlap() {
    for status in ShipmentStatus::ALL {
        for return_required in RETURN_FLAGS {
            let client = allowed_actions(Role::Client, status, return_required);
            let creator = allowed_actions(Role::Creator, status, return_required);
            assert!(client.is_disjoint(&creator));
            assert!(!client.contains(&ShipmentAction::ConfirmReceived));
            assert!(!client.contains(&ShipmentAction::StartReturn));
            assert!(!creator.contains(&ShipmentAction::ConfirmShipped));
            assert!(!creator.contains(&ShipmentAction::ConfirmReturnReceived));
        }
    }
}

#[test]
fn allowed_actions_follow_role_and_status_table() {
    let single = |role, status, return_required| {
        allowed_actions(role, status, return_required)
            .into_iter()
            .collect::<Vec<_>>()
    };

    assert_eq!(
        single(Role::Client, ShipmentStatus::LabelCreated, false),
        vec![ShipmentAction::ConfirmShipped]
    );
    assert_eq!(
        single(Role::Creator, ShipmentStatus::InTransit, false),
        vec![ShipmentAction::ConfirmReceived]
    );
    assert_eq!(
        single(Role::Creator, ShipmentStatus::Delivered, true),
        vec![ShipmentAction::StartReturn]
    );
    assert!(single(Role::Creator, ShipmentStatus::Delivered, false).is_empty());
    assert_eq!(
        single(Role::Client, ShipmentStatus::ReturnRequested, true),
        vec![ShipmentAction::ConfirmReturnReceived]
    );
    assert!(single(Role::Creator, ShipmentStatus::ReturnRequested, true).is_empty());
    assert!(single(Role::Client, ShipmentStatus::Returned, true).is_empty());
}

#[test]
fn every_allowed_action_is_a_valid_transition() {
    for status in ShipmentStatus::ALL {
        for return_required in RETURN_FLAGS {
            for role in [Role::Client, Role::Creator] {
                for action in allowed_actions(role, status, return_required) {
                    assert_eq!(
                        validate_transition(status, action.target_status(), return_required),
                        Ok(())
                    );
                }
            }
        }
    }
}

#[test]
fn validate_transition_accepts_only_forward_single_steps() {
    let mut accepted = Vec::new();
    for from in ShipmentStatus::ALL {
        for to in ShipmentStatus::ALL {
            if validate_transition(from, to, true).is_ok() {
                accepted.push((from, to));
            }
        }
    }

    assert_eq!(
        accepted,
        vec![
            (ShipmentStatus::Pending, ShipmentStatus::LabelCreated),
            (ShipmentStatus::LabelCreated, ShipmentStatus::InTransit),
            (ShipmentStatus::InTransit, ShipmentStatus::Delivered),
            (ShipmentStatus::Delivered, ShipmentStatus::ReturnRequested),
            (ShipmentStatus::ReturnRequested, ShipmentStatus::Returned),
        ]
    );
}

#[test]
fn validate_transition_reports_reason() {
    assert_eq!(
        validate_transition(ShipmentStatus::Delivered, ShipmentStatus::InTransit, true),
        Err(TransitionError::Backward {
            from: ShipmentStatus::Delivered,
            to: ShipmentStatus::InTransit,
        })
    );
    assert_eq!(
        validate_transition(ShipmentStatus::LabelCreated, ShipmentStatus::Delivered, true),
        Err(TransitionError::Skipped {
            from: ShipmentStatus::LabelCreated,
            to: ShipmentStatus::Delivered,
        })
    );
    assert_eq!(
        validate_transition(ShipmentStatus::Delivered, ShipmentStatus::ReturnRequested, false),
        Err(TransitionError::ReturnNotRequired)
    );
    assert_eq!(
        validate_transition(ShipmentStatus::InTransit, ShipmentStatus::InTransit, false),
        Err(TransitionError::Unchanged(ShipmentStatus::InTransit))
    );
}

#[test]
fn action_lookup_by_target_status() {
    assert_eq!(
        ShipmentAction::for_target(ShipmentStatus::Delivered),
        Some(ShipmentAction::ConfirmReceived)
    );
    assert_eq!(ShipmentAction::for_target(ShipmentStatus::LabelCreated), None);
}

#[test]
fn status_round_trips_through_wire_names() {
    for status in ShipmentStatus::ALL {
        let json = serde_json::to_string(&status).expect("serialize");
        assert_eq!(json, format!("\"{}\"", status.as_str()));
        assert_eq!(status.as_str().parse::<ShipmentStatus>(), Ok(status));
    }
    assert!("shipped".parse::<ShipmentStatus>().is_err());
}

#[test]
fn role_accepts_spanish_aliases() {
    assert_eq!("marca".parse::<Role>(), Ok(Role::Client));
    assert_eq!("Creador".parse::<Role>(), Ok(Role::Creator));
    let role: Role = serde_json::from_str("\"creador\"").expect("alias");
    assert_eq!(role, Role::Creator);
}
