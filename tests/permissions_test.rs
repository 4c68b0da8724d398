//! Permission gate contract tests: every authorization state yields its
//! documented `(granted, reason)` pair, exactly once.

use barscan::permissions::PermissionGate;
use barscan::testing::fakes::FixedAuthorization;
use barscan::types::MediaKind;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn check(backend: FixedAuthorization) -> (bool, Option<String>) {
    let gate = PermissionGate::with_backend(Arc::new(backend));
    let (tx, rx) = mpsc::channel();
    gate.check_permission(MediaKind::Video, move |granted, reason| {
        tx.send((granted, reason)).expect("receiver alive");
    });
    let result = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("completion fired");
    // Single completion: nothing else may arrive.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    result
}

#[test]
fn test_granted_completes_with_no_reason() {
    assert_eq!(check(FixedAuthorization::granted()), (true, None));
}

#[test]
fn test_denied_completes_with_reason() {
    assert_eq!(
        check(FixedAuthorization::denied()),
        (false, Some("Camera access denied.".to_string()))
    );
}

#[test]
fn test_restricted_completes_with_reason() {
    assert_eq!(
        check(FixedAuthorization::restricted()),
        (false, Some("Camera access denied.".to_string()))
    );
}

#[test]
fn test_unknown_state_fails_closed() {
    assert_eq!(
        check(FixedAuthorization::unknown()),
        (false, Some("Unknown camera authorization status.".to_string()))
    );
}

#[test]
fn test_prompt_granted() {
    assert_eq!(check(FixedAuthorization::prompting(true)), (true, None));
}

#[test]
fn test_prompt_denied() {
    assert_eq!(
        check(FixedAuthorization::prompting(false)),
        (false, Some("Camera access denied.".to_string()))
    );
}

#[test]
fn test_decided_states_complete_on_calling_thread() {
    let gate = PermissionGate::with_backend(Arc::new(FixedAuthorization::granted()));
    let caller = thread::current().id();
    let (tx, rx) = mpsc::channel();
    gate.check_permission(MediaKind::Video, move |granted, _| {
        tx.send((granted, thread::current().id()))
            .expect("receiver alive");
    });
    // Completion already happened inline by the time check_permission returned.
    let (granted, completion_thread) = rx.try_recv().expect("synchronous completion");
    assert!(granted);
    assert_eq!(completion_thread, caller);
}

#[test]
fn test_prompt_completes_off_the_calling_thread() {
    let gate = PermissionGate::with_backend(Arc::new(FixedAuthorization::prompting(true)));
    let caller = thread::current().id();
    let (tx, rx) = mpsc::channel();
    gate.check_permission(MediaKind::Video, move |granted, _| {
        tx.send((granted, thread::current().id()))
            .expect("receiver alive");
    });
    let (granted, completion_thread) = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("completion fired");
    assert!(granted);
    assert_ne!(completion_thread, caller);
}
