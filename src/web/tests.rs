use super::router;
use super::state::AppState;
use crate::core::analysis::tests::{stored_image_count, ScriptedClassifier};
use crate::core::classifier::{Classifier, ClassifierError};
use crate::core::models::AppConfig;
use crate::core::upload::tests::png_bytes;
use crate::storage::database::Database;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const BOUNDARY: &str = "wastewise-test-boundary";

fn test_app(classifier: Arc<dyn Classifier>) -> (Router, Arc<AppState>, TempDir) {
    let dir = tempdir().unwrap();
    let config = AppConfig {
        upload_dir: dir.path().join("media"),
        database_path: dir.path().join("test.db"),
        max_upload_bytes: 4096,
        ..Default::default()
    };

    let db = Database::open_in_memory().unwrap();
    db.seed_builtin().unwrap();

    let state = Arc::new(AppState::new(config, db, classifier).unwrap());
    (router(state.clone()), state, dir)
}

fn multipart_body(state: Option<&str>, image: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(state) = state {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"state\"\r\n\r\n{state}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                 filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn analyze_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check() {
    let (app, _, _dir) = test_app(Arc::new(ScriptedClassifier::always("general", 0.9)));
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn resolve_endpoint_reports_scope() {
    let (app, _, _dir) = test_app(Arc::new(ScriptedClassifier::always("general", 0.9)));

    let response = app
        .clone()
        .oneshot(get("/api/resolve?category=e-waste&state=Maharashtra"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["guidance"]["scope"], "state_specific");
    assert_eq!(body["guidance"]["is_state_specific"], true);
    assert_eq!(body["state"], "Maharashtra");

    let response = app
        .clone()
        .oneshot(get("/api/resolve?category=E_WASTE&state=KL"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["guidance"]["scope"], "national_default");
    assert_eq!(body["category"], "e-waste");
    assert_eq!(body["category_display"], "E-Waste");

    let response = app
        .oneshot(get("/api/resolve?category=nonexistent-category&state=anystate"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn analyze_then_list_history() {
    let (app, state, dir) = test_app(Arc::new(ScriptedClassifier::always("e-waste", 0.4)));

    let body = multipart_body(Some("MH"), Some(("phone.png", &png_bytes())));
    let response = app.clone().oneshot(analyze_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = json_body(response).await;
    assert_eq!(result["waste_category"], "e-waste");
    assert_eq!(result["state_display"], "Maharashtra");
    assert_eq!(result["low_confidence"], true);
    assert_eq!(result["guidance"]["scope"], "state_specific");
    let image_url = result["image_url"].as_str().unwrap();
    assert!(image_url.starts_with("/media/waste_images/"));
    let relative = image_url.trim_start_matches("/media/");
    assert!(dir.path().join("media").join(relative).exists());

    let response = app.clone().oneshot(get("/api/history")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = json_body(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], result["id"]);
    assert!(page["items"][0].get("raw_response").is_none());

    let id = result["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(get(&format!("/api/history/{id}")))
        .await
        .unwrap();
    let detail = json_body(response).await;
    assert_eq!(detail["current_rule"]["state"], "MH");
    assert_eq!(detail["guidance"]["source"], "Maharashtra Pollution Control Board (MPCB)");

    let response = app.oneshot(get(image_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(state.db().unwrap().count_history().unwrap(), 1);
}

#[tokio::test]
async fn analyze_validates_input() {
    let (app, state, _dir) = test_app(Arc::new(ScriptedClassifier::always("e-waste", 0.9)));

    let missing_image = multipart_body(Some("MH"), None);
    let response = app.clone().oneshot(analyze_request(missing_image)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing_state = multipart_body(None, Some(("phone.png", &png_bytes())));
    let response = app.clone().oneshot(analyze_request(missing_state)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let wrong_type = multipart_body(Some("MH"), Some(("notes.txt", b"hello")));
    let response = app.clone().oneshot(analyze_request(wrong_type)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut big = png_bytes();
    big.resize(5000, 0);
    let too_large = multipart_body(Some("MH"), Some(("big.png", &big)));
    let response = app.clone().oneshot(analyze_request(too_large)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    // 超过整个请求体上限，由表单读取阶段拒绝
    let mut huge = png_bytes();
    huge.resize(4096 + 70 * 1024, 0);
    let too_large = multipart_body(Some("MH"), Some(("huge.png", &huge)));
    let response = app.oneshot(analyze_request(too_large)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["status"], 413);

    assert_eq!(state.db().unwrap().count_history().unwrap(), 0);
}

#[tokio::test]
async fn analyze_reports_unavailable_classifier() {
    let classifier = Arc::new(ScriptedClassifier::new(vec![Err(
        ClassifierError::Unavailable("quota exceeded".to_string()),
    )]));
    let (app, state, dir) = test_app(classifier.clone());

    for _ in 0..3 {
        let body = multipart_body(Some("DL"), Some(("x.png", &png_bytes())));
        let response = app.clone().oneshot(analyze_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    assert_eq!(*classifier.calls.lock().unwrap(), 6);
    assert_eq!(state.db().unwrap().count_history().unwrap(), 0);
    assert_eq!(stored_image_count(&dir.path().join("media")), 0);
}

#[tokio::test]
async fn history_keeps_guidance_after_rule_delete() {
    let (app, _, _dir) = test_app(Arc::new(ScriptedClassifier::always("e-waste", 0.9)));

    let body = multipart_body(Some("MH"), Some(("phone.png", &png_bytes())));
    let result = json_body(app.clone().oneshot(analyze_request(body)).await.unwrap()).await;
    assert_eq!(result["guidance"]["scope"], "state_specific");
    let id = result["id"].as_str().unwrap().to_string();
    let rule_id = result["guidance"]["rule_id"].as_str().unwrap().to_string();
    let disposal = result["guidance"]["disposal_method"].clone();

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/rules/{rule_id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let detail = json_body(
        app.oneshot(get(&format!("/api/history/{id}")))
            .await
            .unwrap(),
    )
    .await;
    assert!(detail["current_rule"].is_null());
    assert_eq!(detail["rule_scope"], "state_specific");
    assert_eq!(detail["guidance"]["disposal_method"], disposal);
    assert!(detail["guidance"]["state_specific_laws"]
        .as_str()
        .unwrap()
        .contains("MPCB"));
}

#[tokio::test]
async fn history_clamps_huge_offset() {
    let (app, _, _dir) = test_app(Arc::new(ScriptedClassifier::always("general", 0.9)));
    let body = multipart_body(Some("KL"), Some(("wrapper.png", &png_bytes())));
    let response = app.clone().oneshot(analyze_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let uri = format!("/api/history?offset={}", usize::MAX);
    let response = app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = json_body(response).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn rule_admin_round_trip() {
    let (app, _, _dir) = test_app(Arc::new(ScriptedClassifier::always("general", 0.9)));

    let new_rule = serde_json::json!({
        "category": "organic",
        "state": "Goa",
        "disposal_method": "Hand to the panchayat wet waste collector",
        "hazards": "Odour",
        "precautions": "Keep covered",
        "source": "Goa State Pollution Control Board"
    });
    let request = Request::builder()
        .method("PUT")
        .uri("/api/rules")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(new_rule.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stored = json_body(response).await;
    assert_eq!(stored["state"], "GA");
    let rule_id = stored["id"].as_str().unwrap().to_string();

    let body = json_body(
        app.clone()
            .oneshot(get("/api/resolve?category=organic&state=GA"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["guidance"]["rule_id"], rule_id.as_str());

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/rules/{rule_id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let body = json_body(
        app.clone()
            .oneshot(get("/api/resolve?category=organic&state=GA"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["guidance"]["scope"], "national_default");
    let national_id = body["guidance"]["rule_id"].as_str().unwrap().to_string();

    let delete_national = Request::builder()
        .method("DELETE")
        .uri(format!("/api/rules/{national_id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete_national).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let missing = Request::builder()
        .method("DELETE")
        .uri("/api/rules/does-not-exist")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(missing).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reference_data_endpoints() {
    let (app, _, _dir) = test_app(Arc::new(ScriptedClassifier::always("general", 0.9)));

    let categories = json_body(app.clone().oneshot(get("/api/categories")).await.unwrap()).await;
    assert_eq!(categories.as_array().unwrap().len(), 7);

    let states = json_body(app.clone().oneshot(get("/api/states")).await.unwrap()).await;
    assert_eq!(states.as_array().unwrap().len(), 37);

    let info = json_body(app.oneshot(get("/api/analyze")).await.unwrap()).await;
    assert_eq!(info["method"], "POST");
    assert_eq!(info["classifier"], "scripted");
}
