mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::{CountingRuntime, recording_reply};
use flutter_native_bridge::{
    BinaryMessageHandler, BridgeError, Cleaner, DropPolicy, ForeignHandle, ForeignObjectHolder,
};
use pretty_assertions::assert_eq;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_one_release_with_or_without_close() {
    let runtime = CountingRuntime::new();

    for (raw, close) in [(0x100, false), (0x101, true)] {
        for policy in [DropPolicy::Inline, DropPolicy::Deferred] {
            let holder = ForeignObjectHolder::create_with_policy(raw, runtime.clone(), policy).unwrap();
            assert_eq!(runtime.retains(raw) - runtime.releases(raw), 1);
            if close {
                holder.close().unwrap();
            }
            drop(holder);
        }
    }

    assert!(Cleaner::global().wait_idle(WAIT));
    assert_eq!((runtime.retains(0x100), runtime.releases(0x100)), (2, 2));
    assert_eq!((runtime.retains(0x101), runtime.releases(0x101)), (2, 2));
}

#[test]
fn test_close_cancels_deferred_release() {
    let runtime = CountingRuntime::new();
    let holder =
        ForeignObjectHolder::create_with_policy(0x200, runtime.clone(), DropPolicy::Deferred)
            .unwrap();

    holder.close().unwrap();
    assert_eq!(runtime.releases(0x200), 1);

    drop(holder);
    assert!(Cleaner::global().wait_idle(WAIT));
    assert_eq!(runtime.releases(0x200), 1);
}

#[test]
fn test_unclosed_holder_released_after_drop() {
    let runtime = CountingRuntime::new();
    let holder =
        ForeignObjectHolder::create_with_policy(0x300, runtime.clone(), DropPolicy::Deferred)
            .unwrap();
    assert_eq!(runtime.releases(0x300), 0);

    drop(holder);
    assert!(Cleaner::global().wait_idle(WAIT));
    assert_eq!(runtime.releases(0x300), 1);
}

#[test]
fn test_closed_handler_refuses_to_forward() {
    let runtime = CountingRuntime::new();
    let handler = BinaryMessageHandler::new(0x400, runtime.clone()).unwrap();
    handler.close().unwrap();

    assert_eq!(handler.handle(), ForeignHandle::NULL);

    let (reply, answers) = recording_reply();
    assert_eq!(
        handler.on_message(Some(&b"late"[..]), reply),
        Err(BridgeError::UseAfterClose)
    );
    assert!(runtime.delivered().is_empty());
    assert_eq!(*answers.lock(), vec![None]);
}

#[test]
fn test_racing_closes_release_once() {
    for round in 0..64 {
        let raw = 0x5000 + round;
        let runtime = CountingRuntime::new();
        let holder = Arc::new(ForeignObjectHolder::create(raw, runtime.clone()).unwrap());
        let barrier = Arc::new(Barrier::new(2));

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let holder = holder.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    holder.close()
                })
            })
            .collect();
        let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.contains(&Err(BridgeError::DoubleRelease { handle: raw })));
        assert_eq!(runtime.releases(raw), 1);

        drop(holder);
        assert_eq!(runtime.releases(raw), 1);
    }
}

#[test]
fn test_absent_and_empty_payloads_round_trip() {
    let runtime = CountingRuntime::new();
    let handler = BinaryMessageHandler::new(0x600, runtime.clone()).unwrap();

    let (absent_reply, absent_answers) = recording_reply();
    handler.on_message(None, absent_reply).unwrap();

    let (empty_reply, empty_answers) = recording_reply();
    handler.on_message(Some(&[][..]), empty_reply).unwrap();

    assert_eq!(
        runtime.delivered(),
        vec![(0x600, None), (0x600, Some(Vec::new()))]
    );
    assert_eq!(*absent_answers.lock(), vec![None]);
    assert_eq!(*empty_answers.lock(), vec![Some(Vec::new())]);
}

#[test]
fn test_zero_handle_fails_fast() {
    let runtime = CountingRuntime::new();
    assert_eq!(
        BinaryMessageHandler::new(0, runtime.clone()).unwrap_err(),
        BridgeError::InvalidHandle
    );
    assert_eq!(runtime.retains(0), 0);
}
