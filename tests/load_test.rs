//! Concurrency tests for the session registry and breaker map.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use split_tunnel::config::SessionSettings;
use split_tunnel::{DestinationBreaker, SessionManager, StreamState, TunnelError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequence_numbers_unique_under_load() {
    let manager = Arc::new(SessionManager::default());
    let session = manager.create_session().unwrap();
    let stream = session.get_stream(1);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let stream = stream.clone();
        handles.push(tokio::spawn(async move {
            (0..1_000).map(|_| stream.next_seq_num()).collect::<Vec<_>>()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for seq in handle.await.unwrap() {
            assert!(seen.insert(seq), "duplicate sequence number {}", seq);
        }
    }
    assert_eq!(seen.len(), 8_000);
    assert_eq!(stream.seq_num(), 8_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stream_creation_yields_one_instance() {
    let manager = Arc::new(SessionManager::default());
    let session = manager.create_session().unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let session = session.clone();
        handles.push(tokio::spawn(async move { session.get_stream(42) }));
    }

    let first = session.get_stream(42);
    for handle in handles {
        assert!(Arc::ptr_eq(&first, &handle.await.unwrap()));
    }
    assert_eq!(session.stream_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_cap_holds_under_contention() {
    let settings = SessionSettings {
        max_sessions: 50,
        ..SessionSettings::default()
    };
    let manager = Arc::new(SessionManager::new(settings));

    let mut handles = Vec::new();
    for _ in 0..200 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.create_session() }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(TunnelError::MaxSessionsReached(50)) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 50);
    assert_eq!(rejected, 150);
    assert_eq!(manager.session_count(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_breaker_map_under_load() {
    let registry = Arc::new(DestinationBreaker::default());

    let start = Instant::now();
    let mut handles = Vec::new();
    for worker in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..500 {
                let dest = format!("dest-{}", i % 20);
                if (worker + i) % 3 == 0 {
                    registry.record_failure(&dest);
                } else {
                    registry.record_success(&dest);
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.count(), 20);
    println!("8 workers x 500 outcomes in {:?}", start.elapsed());
}

#[tokio::test]
async fn test_idle_sessions_swept_while_active_ones_stay() {
    let settings = SessionSettings {
        idle_timeout_ms: 40,
        ..SessionSettings::default()
    };
    let manager = SessionManager::new(settings);

    let idle = manager.create_session().unwrap();
    let active = manager.create_session().unwrap();
    active.get_stream(1).set_state(StreamState::Active);

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        active.touch();
    }

    let evicted = manager.cleanup_expired();
    assert_eq!(evicted, vec![idle.id()]);
    assert!(manager.get_session(&active.id()).is_ok());
    assert!(matches!(
        manager.get_session(&idle.id()),
        Err(TunnelError::SessionNotFound)
    ));
}
