//! Freshness gate and publish slot behavior of `DeviceStateStore`.

use bytes::Bytes;
use frame_relay::store::{DeviceStateStore, PublishedResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn result(device_id: u32, capture_time: f64, tag: &'static [u8]) -> PublishedResult {
    PublishedResult {
        device_id,
        capture_time,
        raw: Bytes::from_static(tag),
        annotated: Bytes::from_static(tag),
        detection_json: r#"{"count":0}"#.to_string(),
    }
}

#[test]
fn test_timestamps_must_strictly_increase() {
    let store = DeviceStateStore::new();

    assert!(store.try_begin_write(1, 100.0));
    store.finish_write(1, Some(result(1, 100.0, b"a")));

    assert!(!store.try_begin_write(1, 90.0), "older frame accepted");
    assert!(!store.try_begin_write(1, 100.0), "equal timestamp accepted");

    assert!(store.try_begin_write(1, 150.0));
    store.finish_write(1, Some(result(1, 150.0, b"b")));

    let latest = store.latest().expect("published");
    assert_eq!(latest.capture_time, 150.0);
    assert_eq!(latest.raw, Bytes::from_static(b"b"));
}

#[test]
fn test_in_flight_write_blocks_newer_frames() {
    let store = DeviceStateStore::new();

    assert!(store.try_begin_write(4, 10.0));
    assert!(!store.try_begin_write(4, 20.0));

    store.finish_write(4, None);
    assert!(store.try_begin_write(4, 20.0));
}

#[test]
fn test_failed_write_keeps_timestamp() {
    let store = DeviceStateStore::new();

    assert!(store.try_begin_write(2, 50.0));
    store.finish_write(2, None);

    assert!(store.latest().is_none());
    let record = store.device(2).expect("record exists");
    assert_eq!(record.last_accepted_time, 50.0);
    assert!(!record.write_in_progress);
    assert!(!store.try_begin_write(2, 50.0));
}

#[test]
fn test_devices_are_independent() {
    let store = DeviceStateStore::new();

    assert!(store.try_begin_write(1, 1000.0));
    assert!(store.try_begin_write(2, 1.0));
    assert_eq!(store.device_count(), 2);

    store.finish_write(2, Some(result(2, 1.0, b"two")));
    store.finish_write(1, Some(result(1, 1000.0, b"one")));

    // Last finisher wins regardless of capture time
    assert_eq!(store.latest().map(|r| r.device_id), Some(1));
}

#[test]
fn test_lease_releases_on_drop() {
    let store = Arc::new(DeviceStateStore::new());

    {
        let lease = store.begin_write(9, 5.0).expect("lease");
        assert_eq!(lease.device_id(), 9);
        assert_eq!(lease.capture_time(), 5.0);
        assert!(store.begin_write(9, 6.0).is_none());
    }

    assert!(store.latest().is_none());
    let lease = store.begin_write(9, 6.0).expect("released");
    lease.publish(Bytes::from_static(b"r"), Bytes::from_static(b"a"), "{}".to_string());

    let latest = store.latest().expect("published");
    assert_eq!(latest.device_id, 9);
    assert_eq!(latest.annotated, Bytes::from_static(b"a"));
}

#[test]
fn test_concurrent_claims_admit_one_writer() {
    const THREADS: usize = 16;

    let store = Arc::new(DeviceStateStore::new());
    let barrier = Arc::new(Barrier::new(THREADS));
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let winners = Arc::clone(&winners);
            thread::spawn(move || {
                barrier.wait();
                if store.try_begin_write(7, 100.0 + i as f64) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(store.device(7).unwrap().write_in_progress);
}

#[test]
fn test_concurrent_devices_publish_whole_results() {
    let store = Arc::new(DeviceStateStore::new());

    let handles: Vec<_> = (1..=8u32)
        .map(|device_id| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for step in 1..=50 {
                    let t = f64::from(step);
                    if let Some(lease) = store.begin_write(device_id, t) {
                        let tag = Bytes::from(format!("{}:{}", device_id, step));
                        lease.publish(tag.clone(), tag, format!("{{\"device\":{}}}", device_id));
                    }
                }
            })
        })
        .collect();

    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..500 {
                if let Some(latest) = store.latest() {
                    let raw = String::from_utf8(latest.raw.to_vec()).unwrap();
                    assert!(raw.starts_with(&format!("{}:", latest.device_id)));
                    assert_eq!(latest.raw, latest.annotated);
                    assert_eq!(
                        latest.detection_json,
                        format!("{{\"device\":{}}}", latest.device_id)
                    );
                }
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    for device_id in 1..=8 {
        assert_eq!(store.device(device_id).unwrap().last_accepted_time, 50.0);
    }
}
