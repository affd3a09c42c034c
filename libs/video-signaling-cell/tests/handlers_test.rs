use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

use shared_utils::test_utils::TestConfig;
use video_signaling_cell::{signaling_routes, ConnectionHandle, SignalingRelay};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check_empty_relay() {
    let app = signaling_routes(TestConfig::default().to_arc(), SignalingRelay::new());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["participants"], 0);
    assert_eq!(json["rendezvous_groups"], 0);
    assert_eq!(json["heartbeat_enabled"], false);
}

#[tokio::test]
async fn test_health_check_reports_registrations() {
    let relay = SignalingRelay::new();
    let (doctor, _doctor_rx) = ConnectionHandle::channel();
    relay
        .handle_text(
            &doctor,
            &json!({ "type": "register", "userId": "doctor1", "role": "doctor", "appointmentId": "apt-1" }).to_string(),
        )
        .await;

    let app = signaling_routes(TestConfig::with_heartbeat(30).to_arc(), relay);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["participants"], 1);
    assert_eq!(json["rendezvous_groups"], 1);
    assert_eq!(json["connections"], 1);
    assert_eq!(json["heartbeat_enabled"], true);
}

#[tokio::test]
async fn test_group_lookup_returns_members() {
    let relay = SignalingRelay::new();
    let (doctor, _doctor_rx) = ConnectionHandle::channel();
    let (patient, _patient_rx) = ConnectionHandle::channel();
    for (connection, user_id, role) in [(&doctor, "doctor1", "doctor"), (&patient, "patient1", "patient")] {
        let frame = json!({ "type": "register", "userId": user_id, "role": role, "appointmentId": "apt-1" });
        relay.handle_text(connection, &frame.to_string()).await;
    }

    let app = signaling_routes(TestConfig::default().to_arc(), relay);
    let response = app
        .oneshot(Request::builder().uri("/groups/apt-1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["appointmentId"], "apt-1");
    assert_eq!(json["members"][0]["id"], "doctor1");
    assert_eq!(json["members"][1]["id"], "patient1");
    assert_eq!(json["members"][1]["connected"], true);
    assert_eq!(json["roleSlots"]["doctor"], "doctor1");
    assert_eq!(json["roleSlots"]["patient"], "patient1");
}

#[tokio::test]
async fn test_group_lookup_unknown_appointment() {
    let app = signaling_routes(TestConfig::default().to_arc(), SignalingRelay::new());

    let response = app
        .oneshot(Request::builder().uri("/groups/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_plain_get_on_socket_route_is_rejected() {
    let app = signaling_routes(TestConfig::default().to_arc(), SignalingRelay::new());

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
