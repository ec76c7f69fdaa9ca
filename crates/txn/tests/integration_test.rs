//! End-to-end reconciliation scenarios against the in-memory store

mod common;

use common::*;
use ferrymq_common::{Timestamp, keys};
use ferrymq_store::StoreBridge;
use ferrymq_store_memory::MemoryStore;
use ferrymq_txn::{
    ChannelCheckListener, CheckConfig, CheckEvent, HalfScanner, QueueProgress, ScanState,
    TransactionalMessageService, driver, fill_op_remove_map,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_committed_half_advances_both_offsets_without_check() {
    let service = service();
    let listener = RecordingListener::new();

    let half = prepare_half(&service, Timestamp::now().sub_millis(10_000), &[]);
    assert!(service.delete_prepare_message(&half));
    settle();

    service.check(TT, TCM, &listener);

    assert_eq!(listener.check_count(), 0);
    assert_eq!(listener.discard_count(), 0);
    assert_eq!(service.bridge().read_consume_offset(&half_queue()), 1);
    assert_eq!(service.bridge().read_consume_offset(&op_queue()), 1);
}

#[test]
fn test_timed_out_half_triggers_single_back_check() {
    let service = service();
    let listener = RecordingListener::new();

    prepare_half(&service, Timestamp::now().sub_millis(10_000), &[]);
    settle();

    service.check(TT, TCM, &listener);

    assert_eq!(listener.check_count(), 1);
    let resent = &listener.checks.lock()[0];
    assert_eq!(resent.queue_offset, 1);
    assert_eq!(resent.property(keys::TRANSACTION_CHECK_TIMES), Some("1"));

    // The half was re-appended at a higher offset and the consume offset
    // moved past the original copy
    let pulled = service.bridge().pull_half(&half_queue(), 0, 10).unwrap();
    assert_eq!(pulled.messages.len(), 2);
    assert!(service.bridge().read_consume_offset(&half_queue()) >= 1);
}

#[test]
fn test_exhausted_half_is_discarded() {
    let service = service();
    let listener = RecordingListener::new();

    seed_half(
        &service,
        Timestamp::now().sub_millis(10_000),
        &[(keys::TRANSACTION_CHECK_TIMES, "3")],
    );
    settle();

    service.check(TT, TCM, &listener);

    assert_eq!(listener.check_count(), 0);
    assert_eq!(listener.discard_count(), 1);
    assert_eq!(service.bridge().read_consume_offset(&half_queue()), 1);
}

#[test]
fn test_retention_expired_half_is_discarded() {
    let service = service();
    let listener = RecordingListener::new();

    prepare_half(&service, Timestamp::now().sub_millis(73 * 3_600 * 1_000), &[]);
    settle();

    service.check(TT, TCM, &listener);

    assert_eq!(listener.check_count(), 0);
    assert_eq!(listener.discard_count(), 1);
    assert_eq!(service.bridge().read_consume_offset(&half_queue()), 1);
}

#[test]
fn test_immunity_window_reappends_instead_of_checking() {
    let service = service();
    let listener = RecordingListener::new();

    let original = prepare_half(
        &service,
        Timestamp::now().sub_millis(10_000),
        &[(keys::CHECK_IMMUNITY_TIME_IN_SECONDS, "30")],
    );
    settle();

    service.check(TT, TCM, &listener);

    // Still inside the producer's immunity window: no back-check, but the
    // half moved to a fresh offset carrying its previous position
    assert_eq!(listener.check_count(), 0);
    assert_eq!(listener.discard_count(), 0);
    assert_eq!(service.bridge().read_consume_offset(&half_queue()), 1);

    let pulled = service.bridge().pull_half(&half_queue(), 1, 1).unwrap();
    let copy = &pulled.messages[0];
    assert_eq!(
        copy.property(keys::TRANSACTION_PREPARED_QUEUE_OFFSET),
        Some("0")
    );

    // The producer commits the original copy between ticks
    assert!(service.delete_prepare_message(&original));
    settle();

    service.check(TT, TCM, &listener);

    // The op record named an already-consumed offset, so the op queue
    // advances past it; the live copy re-appends for another hop with the
    // stamp moved forward, still without a back-check
    assert_eq!(listener.check_count(), 0);
    assert_eq!(service.bridge().read_consume_offset(&op_queue()), 1);
    assert_eq!(service.bridge().read_consume_offset(&half_queue()), 2);

    let pulled = service.bridge().pull_half(&half_queue(), 2, 1).unwrap();
    let copy = &pulled.messages[0];
    assert_eq!(
        copy.property(keys::TRANSACTION_PREPARED_QUEUE_OFFSET),
        Some("1")
    );
}

#[test]
fn test_freshly_stored_half_defers_the_queue() {
    let store = MemoryStore::new("broker-a");
    let listener = RecordingListener::new();

    let born = Timestamp::now().sub_millis(10_000);
    store
        .append_half(
            ferrymq_common::Message::new(ferrymq_common::HALF_TOPIC, 0, b"payload".to_vec())
                .with_born_ts(born),
        )
        .unwrap();

    // Pretend the scan started before the append: the half counts as
    // written during this very tick
    let start_time = Timestamp::now().sub_millis(500);

    let mut state = ScanState::new();
    let initial = fill_op_remove_map(&store, &mut state, &op_queue(), 0, 0).unwrap();
    let scanner = HalfScanner::new(&store, &listener, TT, TCM);
    let progress = scanner
        .scan_queue(&half_queue(), &op_queue(), 0, 0, &mut state, initial, start_time)
        .unwrap();

    assert_eq!(progress, QueueProgress::Deferred);
    assert_eq!(listener.check_count(), 0);
    assert_eq!(store.read_consume_offset(&half_queue()), 0);

    // No re-append happened either
    let pulled = store.pull_half(&half_queue(), 0, 10).unwrap();
    assert_eq!(pulled.messages.len(), 1);
}

#[test]
fn test_duplicate_op_records_are_idempotent() {
    let service = service();
    let listener = RecordingListener::new();

    let half = prepare_half(&service, Timestamp::now().sub_millis(10_000), &[]);
    assert!(service.delete_prepare_message(&half));
    assert!(service.delete_prepare_message(&half));
    settle();

    service.check(TT, TCM, &listener);
    service.check(TT, TCM, &listener);

    assert_eq!(listener.check_count(), 0);
    assert_eq!(listener.discard_count(), 0);
    assert_eq!(service.bridge().read_consume_offset(&half_queue()), 1);
    // Both duplicate records end up consumed; the op offset covers them
    assert_eq!(service.bridge().read_consume_offset(&op_queue()), 2);
}

#[test]
fn test_back_checks_are_capped_then_discarded() {
    let service = service();
    let listener = RecordingListener::new();

    prepare_half(&service, Timestamp::now().sub_millis(10_000), &[]);

    for expected in 1..=TCM as usize {
        settle();
        service.check(TT, TCM, &listener);
        assert_eq!(listener.check_count(), expected);

        let last = &listener.checks.lock()[expected - 1];
        assert_eq!(
            last.property(keys::TRANSACTION_CHECK_TIMES),
            Some(expected.to_string().as_str())
        );
    }

    // The copy persisted by check number TCM carries the maximum count, so
    // the next tick abandons it
    settle();
    service.check(TT, TCM, &listener);

    assert_eq!(listener.check_count(), TCM as usize);
    assert_eq!(listener.discard_count(), 1);
    assert_eq!(
        service.bridge().read_consume_offset(&half_queue()),
        TCM as i64 + 1
    );
}

#[test]
fn test_negative_consume_offset_skips_the_queue() {
    let service = service();
    let listener = RecordingListener::new();

    prepare_half(&service, Timestamp::now().sub_millis(10_000), &[]);
    service.bridge().write_consume_offset(&half_queue(), -1);
    settle();

    service.check(TT, TCM, &listener);

    // Broken queue: logged and left alone
    assert_eq!(listener.check_count(), 0);
    assert_eq!(service.bridge().read_consume_offset(&half_queue()), -1);
}

#[tokio::test]
async fn test_driver_dispatches_back_check_events() {
    let service = Arc::new(TransactionalMessageService::new(MemoryStore::new("broker-a")));
    let (listener, mut events) = ChannelCheckListener::new();

    prepare_half(&service, Timestamp::now().sub_millis(10_000), &[]);

    let config = CheckConfig {
        transaction_timeout: TT,
        transaction_check_max: TCM,
        check_interval: Duration::from_millis(20),
    };
    let handle = driver::start(service.clone(), config, Arc::new(listener));

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("driver never dispatched a back-check")
        .expect("event channel closed");

    match event {
        CheckEvent::BackCheck(half) => {
            assert_eq!(half.property(keys::TRANSACTION_CHECK_TIMES), Some("1"));
        }
        CheckEvent::Discard(half) => panic!("unexpected discard of {}", half.msg_id),
    }

    handle.abort();
}
