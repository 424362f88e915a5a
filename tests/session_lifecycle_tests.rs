//! Session Lifecycle Tests
//!
//! Disconnects, faults and bounded shutdown across several concurrent
//! sessions sharing one application state.

mod mock_providers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::time::{sleep, timeout};

use dictation_gateway::ShutdownReport;
use dictation_gateway::core::{ConnectionTransport, ProviderRole};
use dictation_gateway::pipeline::Frame;
use dictation_gateway::session::SessionState;
use dictation_gateway::state::AppState;

use mock_providers::{
    MockDirectory, MockService, RecordingFactory, create_app, create_state, get_json,
    offer_body, post_json,
};

async fn offer(app: &axum::Router) -> String {
    let (status, answer) = post_json(app, "/api/offer", offer_body(None)).await;
    assert_eq!(status, 200, "offer failed: {answer}");
    answer["pc_id"].as_str().unwrap().to_string()
}

async fn wait_state(state: &Arc<AppState>, pc_id: &str, target: SessionState) -> SessionState {
    let status = state.sessions.session_status(pc_id).unwrap();
    timeout(Duration::from_secs(2), status.reached(target))
        .await
        .unwrap_or_else(|_| panic!("session {pc_id} never reached {target}"))
}

#[tokio::test]
async fn test_shutdown_is_bounded_when_a_session_hangs() {
    let llm = Arc::new(MockService::new("x", ProviderRole::Llm).hanging_first_close());
    let directory = MockDirectory::new()
        .with_service("a", ProviderRole::Stt)
        .with("X", llm.clone());
    let transports = Arc::new(RecordingFactory::default());
    let state = create_state(&directory, transports.clone());
    let app = create_app(&state);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let pc_id = offer(&app).await;
        wait_state(&state, &pc_id, SessionState::Running).await;
        statuses.push(state.sessions.session_status(&pc_id).unwrap());
    }
    assert_eq!(state.sessions.session_count(), 3);

    let coordinator = state
        .shutdown_coordinator()
        .with_timeouts(Duration::from_millis(300), Duration::from_millis(300));
    let started = Instant::now();
    let report = timeout(Duration::from_secs(3), coordinator.shutdown())
        .await
        .expect("shutdown is bounded");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        report,
        ShutdownReport {
            sessions_timed_out: true,
            connections_timed_out: false,
        }
    );

    // Every connection was disconnected even though one session never finished
    let connections = transports.created();
    assert_eq!(connections.len(), 3);
    assert!(connections.iter().all(|c| c.is_closed()));
    assert!(state.registry.is_empty());
    assert_eq!(state.sessions.session_count(), 0);

    let terminated = statuses
        .iter()
        .filter(|s| s.get() == SessionState::Terminated)
        .count();
    assert_eq!(terminated, 2);
    assert_eq!(llm.close_count(), 3);
}

#[tokio::test]
async fn test_client_disconnect_ends_only_that_session() {
    let directory = MockDirectory::new()
        .with_service("a", ProviderRole::Stt)
        .with_service("b", ProviderRole::Stt)
        .with_service("x", ProviderRole::Llm);
    let transports = Arc::new(RecordingFactory::default());
    let state = create_state(&directory, transports.clone());
    let app = create_app(&state);

    let first = offer(&app).await;
    wait_state(&state, &first, SessionState::Running).await;
    let second = offer(&app).await;
    wait_state(&state, &second, SessionState::Running).await;
    assert!(state.readiness.is_ready());

    let first_status = state.sessions.session_status(&first).unwrap();
    transports.connection(&first).unwrap().close();
    timeout(Duration::from_secs(2), first_status.reached(SessionState::Terminated))
        .await
        .expect("disconnected session terminates");
    timeout(Duration::from_secs(1), async {
        while state.registry.get(&first).is_some() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("disconnected connection is deregistered");

    assert!(state.registry.get(&second).is_some());
    assert_eq!(
        state.sessions.session_state(&second),
        Some(SessionState::Running)
    );
    // A disconnect withdraws readiness until the next pipeline starts
    assert!(!state.readiness.is_ready());

    let pending = {
        let app = app.clone();
        tokio::spawn(async move {
            post_json(&app, "/api/providers/stt", json!({"provider": "b"})).await
        })
    };
    sleep(Duration::from_millis(100)).await;
    assert!(!pending.is_finished());

    let third = offer(&app).await;
    wait_state(&state, &third, SessionState::Running).await;
    let (_, json) = timeout(Duration::from_secs(2), pending)
        .await
        .expect("switch resolves after the next session starts")
        .unwrap();
    assert_eq!(json, json!({"success": true, "provider": "b"}));
}

#[tokio::test]
async fn test_session_fault_is_isolated() {
    let directory = MockDirectory::new()
        .with(
            "A",
            Arc::new(MockService::new("a", ProviderRole::Stt).panicking_on("boom")),
        )
        .with_service("x", ProviderRole::Llm);
    let transports = Arc::new(RecordingFactory::default());
    let state = create_state(&directory, transports.clone());
    let app = create_app(&state);

    let faulty = offer(&app).await;
    wait_state(&state, &faulty, SessionState::Running).await;
    let healthy = offer(&app).await;
    wait_state(&state, &healthy, SessionState::Running).await;

    let faulty_status = state.sessions.session_status(&faulty).unwrap();
    transports
        .connection(&faulty)
        .unwrap()
        .push_input(Frame::Transcription {
            text: "boom".to_string(),
        })
        .await
        .unwrap();

    timeout(Duration::from_secs(2), faulty_status.reached(SessionState::Terminated))
        .await
        .expect("faulted session terminates");
    timeout(Duration::from_secs(1), async {
        while state.sessions.session_count() != 1 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("faulted session is no longer tracked");

    assert_eq!(
        state.sessions.session_state(&healthy),
        Some(SessionState::Running)
    );
    let (_, json) = get_json(&app, "/api/providers/available").await;
    assert_eq!(json["stt"][0]["value"], "a");
    let (_, json) = get_json(&app, "/api/config/stt-timeout").await;
    assert_eq!(json["success"], true);

    // The faulted session is gone but its connection is released only on close
    assert!(state.registry.get(&faulty).is_some());
    transports.connection(&faulty).unwrap().close();
    timeout(Duration::from_secs(1), async {
        while state.registry.get(&faulty).is_some() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("closed connection of a faulted session is deregistered");
    assert!(state.registry.get(&healthy).is_some());

    let (status, answer) = post_json(&app, "/api/offer", offer_body(Some(&faulty))).await;
    assert_eq!(status, 200);
    assert_ne!(answer["pc_id"], faulty.as_str());
}
