mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use foxtale_core::run::TOTAL_SCENES;

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn write_story_returns_twenty_scenes() {
    let app = common::build_test_app();

    let response = app
        .oneshot(post("/api/v1/stories", &common::quiz_json()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["scenes"].as_array().unwrap().len(), TOTAL_SCENES);
}

#[tokio::test]
async fn invalid_quiz_is_rejected() {
    let app = common::build_test_app();

    let mut quiz = common::quiz_json();
    quiz["humiliation_type"] = serde_json::json!("");

    let response = app
        .oneshot(post("/api/v1/stories", &quiz))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn approve_rejects_wrong_scene_count() {
    let app = common::build_test_app();

    let body = serde_json::json!({ "scenes": ["only one scene"] });
    let response = app
        .oneshot(post("/api/v1/stories/approve", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn approved_run_completes_and_is_pollable() {
    let app = common::build_test_app();

    let scenes: Vec<String> = (1..=TOTAL_SCENES)
        .map(|n| format!("The fox takes step {n}"))
        .collect();
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/stories/approve",
            &serde_json::json!({ "scenes": scenes }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = json_body(response).await;
    assert_eq!(json["status"], "processing");
    assert_eq!(json["total_scenes"], 20);
    let run_id = json["run_id"].as_str().unwrap().to_string();

    // The stub generator finishes instantly; give the detached run a
    // moment, polling like a client would.
    let uri = format!("/api/v1/stories/{run_id}");
    let mut last = serde_json::Value::Null;
    for _ in 0..50 {
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = json_body(response).await;
        if last["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(last["status"], "completed");
    assert_eq!(last["completed_scenes"], 20);
    let scenes = last["scenes"].as_array().unwrap();
    assert_eq!(scenes.len(), 20);
    for scene in scenes {
        assert_eq!(scene["status"], "succeeded");
        assert!(scene["url"].as_str().unwrap().contains(&run_id));
    }
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let app = common::build_test_app();

    let uri = format!("/api/v1/stories/{}", uuid::Uuid::new_v4());
    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let events = format!("{uri}/events");
    let response = app.oneshot(get(&events)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
