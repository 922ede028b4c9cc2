// Invariants that must hold across interleavings: exclusion, no orphaned
// waiters, exactly-once completion routing and the fault latch.

mod common;

use common::{assert_mutual_exclusion, complete, harness, Behaviour, Reply};
use tws_goal::{
    DecisionId, GoalError, GoalId as G, GoalMask, GoalTrail, MemoryTrail, ProcedureKind,
    RuleEvent,
};
use tws_procedure::{Payload, ProcResult, ProcedureEvent, ProcedureHandle};

fn request(orch: &mut common::Orchestrator, goal: G, decision: u32) {
    orch.request_goal(goal, DecisionId(decision), Payload::empty())
        .unwrap();
}

#[test]
fn mixed_sequence_keeps_exclusion_and_drains_queue() {
    let (mut orch, _probe) = harness();

    let sequence = [
        G::ConnectableHandset,
        G::ConnectHandset,
        G::PrimaryConnectPeerProfiles,
        G::SetRole,
        G::FindRole,
        G::PrimaryDisconnectPeerProfiles,
        G::NoRoleIdle,
        G::SetRole,
        G::ConnectableHandset,
    ];
    for (n, goal) in sequence.into_iter().enumerate() {
        request(&mut orch, goal, n as u32);
        assert_mutual_exclusion(&orch);
    }
    assert_eq!(orch.queued_goals(), vec![G::SetRole, G::ConnectableHandset]);

    let mut turns = 0;
    while let Some(goal) = orch.active_goals().iter().next() {
        complete(&mut orch, goal, ProcResult::Success);
        assert_mutual_exclusion(&orch);
        turns += 1;
        assert!(turns < 100, "queue never drained");
    }

    assert!(orch.queued_goals().is_empty());
    assert!(orch.fault().is_none());
}

#[test]
fn wait_mask_only_shrinks_while_nothing_starts() {
    let (mut orch, _probe) = harness();
    request(&mut orch, G::ConnectableHandset, 1);
    request(&mut orch, G::ConnectHandset, 2);
    request(&mut orch, G::SetRole, 3);
    let initial = orch.pending_wait_mask(G::SetRole).unwrap();
    assert_eq!(
        initial,
        GoalMask::from_goals(&[G::ConnectableHandset, G::ConnectHandset])
    );

    complete(&mut orch, G::ConnectHandset, ProcResult::Success);
    let after = orch.pending_wait_mask(G::SetRole).unwrap();
    assert_eq!(after, GoalMask::of(G::ConnectableHandset));
    assert!(after.difference(initial).is_empty());

    complete(&mut orch, G::ConnectableHandset, ProcResult::Success);
    assert_eq!(orch.active_goals(), GoalMask::of(G::SetRole));
}

#[test]
fn completion_racing_cancel_raises_event_once() {
    let (mut orch, fakes) = harness();
    fakes.set(
        ProcedureKind::SecConnectPeer,
        Behaviour::manual().with_cancel(Reply::Never),
    );

    request(&mut orch, G::SecondaryConnectPeer, 1);
    let handle = orch.current_handle(G::SecondaryConnectPeer).unwrap();
    request(&mut orch, G::NoRoleIdle, 2);
    assert!(orch.is_cancelling(G::SecondaryConnectPeer));

    // The procedure finished before it saw the cancel.
    complete(&mut orch, G::SecondaryConnectPeer, ProcResult::Timeout);
    assert_eq!(orch.rules().events, vec![RuleEvent::FailedPeerConnect]);
    assert!(orch.is_goal_active(G::NoRoleIdle));

    // Its cancel confirmation arrives afterwards and changes nothing.
    orch.on_procedure_event(ProcedureEvent::cancelled(handle, ProcResult::Success))
        .unwrap();
    assert_eq!(orch.rules().events.len(), 1);
    assert_eq!(orch.active_goals().len(), 1);
    assert!(orch.fault().is_none());
}

#[test]
fn stale_cancel_does_not_clear_a_newer_run() {
    let (mut orch, fakes) = harness();
    fakes.set(
        ProcedureKind::ConnectHandset,
        Behaviour::manual().with_cancel(Reply::Never),
    );

    request(&mut orch, G::ConnectHandset, 1);
    let first = orch.current_handle(G::ConnectHandset).unwrap();
    request(&mut orch, G::DisconnectHandset, 2);
    complete(&mut orch, G::ConnectHandset, ProcResult::Success);
    assert!(orch.is_goal_active(G::DisconnectHandset));

    // Cancels the disconnect synchronously and starts again.
    request(&mut orch, G::ConnectHandset, 3);
    let second = orch.current_handle(G::ConnectHandset).unwrap();
    assert_ne!(first, second);

    orch.on_procedure_event(ProcedureEvent::cancelled(first, ProcResult::Success))
        .unwrap();
    assert!(orch.is_goal_active(G::ConnectHandset));
    assert_eq!(orch.current_handle(G::ConnectHandset), Some(second));
}

#[test]
fn requesting_an_active_goal_faults() {
    let (mut orch, _probe) = harness();
    request(&mut orch, G::FindRole, 1);

    let err = orch
        .request_goal(G::FindRole, DecisionId(2), Payload::empty())
        .unwrap_err();
    assert!(matches!(err, GoalError::GoalAlreadyActive { goal: G::FindRole }));
    assert!(orch.fault().is_some());

    let err = orch
        .request_goal(G::SetRole, DecisionId(3), Payload::empty())
        .unwrap_err();
    assert!(matches!(err, GoalError::Faulted(_)));
    assert!(orch.queued_goals().is_empty());
}

#[test]
fn unsolicited_cancel_confirmation_faults() {
    let (mut orch, _probe) = harness();
    request(&mut orch, G::FindRole, 1);
    let handle = orch.current_handle(G::FindRole).unwrap();

    let err = orch
        .on_procedure_event(ProcedureEvent::cancelled(handle, ProcResult::Success))
        .unwrap_err();
    assert!(matches!(err, GoalError::UnexpectedConfirmation { goal: G::FindRole, .. }));
    assert!(orch.fault().is_some());
}

#[test]
fn unknown_handle_is_rejected() {
    let (mut orch, _probe) = harness();
    let err = orch
        .on_procedure_event(ProcedureEvent::completed(
            ProcedureHandle::new(99),
            ProcResult::Success,
        ))
        .unwrap_err();
    assert!(matches!(err, GoalError::UnknownProcedure { .. }));
}

#[test]
fn flushed_requests_are_reported() {
    let (orch, _probe) = harness();
    let memory = MemoryTrail::new();
    let mut orch = orch.with_trail(GoalTrail::new().with_sink(memory.clone()));

    request(&mut orch, G::FindRole, 1);
    request(&mut orch, G::SetRole, 2);
    request(&mut orch, G::PairPeer, 3);
    request(&mut orch, G::NoRoleIdle, 4);

    let flushed: Vec<G> = memory
        .events()
        .iter()
        .filter(|e| e.event_type() == "goal_flushed")
        .map(|e| e.goal())
        .collect();
    assert_eq!(flushed, vec![G::SetRole, G::PairPeer]);
    assert_eq!(orch.active_goals().iter().collect::<Vec<_>>(), vec![G::NoRoleIdle]);
}

#[test]
fn deferred_completions_are_processed_in_order() {
    let (mut orch, fakes) = harness();
    fakes.set_default(Behaviour {
        complete: Reply::Later(ProcResult::Success),
        cancel: Reply::Now(ProcResult::Success),
    });

    request(&mut orch, G::FindRole, 1);
    request(&mut orch, G::BecomeActingPrimary, 2);
    assert!(orch.is_goal_active(G::FindRole));
    assert!(orch.has_pending_events());

    // find_role completes, then the queued set_role step completes.
    assert_eq!(orch.run_until_idle().unwrap(), 2);
    assert!(orch.active_goals().is_empty());
    assert_eq!(orch.rules().count(RuleEvent::RoleSwitch), 1);
}

#[test]
fn completion_queued_before_cancel_is_dropped() {
    let (mut orch, fakes) = harness();
    fakes.set(
        ProcedureKind::SecConnectPeer,
        Behaviour {
            complete: Reply::Later(ProcResult::Timeout),
            cancel: Reply::Now(ProcResult::Success),
        },
    );

    request(&mut orch, G::SecondaryConnectPeer, 1);
    request(&mut orch, G::NoRoleIdle, 2);
    assert!(!orch.is_goal_active(G::SecondaryConnectPeer));
    assert!(orch.has_pending_events());

    // The timeout was queued before the cancel and arrives after it.
    assert_eq!(orch.run_until_idle().unwrap(), 1);
    assert!(orch.rules().events.is_empty());
    assert!(orch.fault().is_none());
    assert_eq!(orch.active_goals(), GoalMask::of(G::NoRoleIdle));

    // The goal can run again once the cancel goal is done.
    while orch.is_goal_active(G::NoRoleIdle) {
        complete(&mut orch, G::NoRoleIdle, ProcResult::Success);
    }
    request(&mut orch, G::SecondaryConnectPeer, 3);
    assert!(orch.is_goal_active(G::SecondaryConnectPeer));
    assert_eq!(orch.run_until_idle().unwrap(), 1);
    assert_eq!(orch.rules().events, vec![RuleEvent::FailedPeerConnect]);
}
