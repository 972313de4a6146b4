use campus::http::Request;
use campus::orm::{Db, auto_migrate};
use campus::router::{AppState, Router};
use campus::settings::Settings;
use campus::urls::build_router;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

async fn app() -> (Router, TempDir) {
    let media = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.media.root = media.path().to_str().unwrap().to_string();
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    auto_migrate(db.clone()).await.unwrap();
    (build_router(AppState::new(db, settings)), media)
}

fn post_json(path: &str, body: Value) -> Request {
    Request::new("POST", path)
        .with_header("Content-Type", "application/json")
        .with_body(serde_json::to_vec(&body).unwrap())
}

fn body(resp: &campus::http::Response) -> Value {
    serde_json::from_str(&resp.body).unwrap()
}

#[tokio::test]
async fn test_create_then_fetch_student() {
    let (router, _media) = app().await;
    let resp = router
        .dispatch(post_json(
            "/students",
            json!({"name": "Ravi", "image": "images/ravi.png", "stu_cors": "BCOM"}),
        ))
        .await;
    assert_eq!(resp.status_code, 201);
    let created = body(&resp);
    assert_eq!(created["stu_cors"], "BCOM");
    assert_eq!(created["stu_cors_display"], "S");
    assert_eq!(created["image_url"], "/media/images/ravi.png");

    let id = created["id"].as_i64().unwrap();
    let resp = router
        .dispatch(Request::new("GET", &format!("/students/{id}")))
        .await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body(&resp), created);

    let resp = router.dispatch(Request::new("GET", "/students")).await;
    assert_eq!(body(&resp), json!([created]));
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let (router, _media) = app().await;

    let resp = router
        .dispatch(post_json(
            "/students",
            json!({"name": "Ravi", "image": "images/r.png", "stu_cors": "MBA"}),
        ))
        .await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(body(&resp)["error"], "ValidationError");

    let resp = router
        .dispatch(post_json(
            "/students",
            json!({"name": "x".repeat(101), "image": "images/r.png", "stu_cors": "BCA"}),
        ))
        .await;
    assert_eq!(resp.status_code, 400);

    let resp = router
        .dispatch(Request::new("POST", "/students").with_body("{not json"))
        .await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(body(&resp)["error"], "BadRequest");

    let resp = router.dispatch(Request::new("GET", "/students")).await;
    assert_eq!(body(&resp), json!([]));
}

#[tokio::test]
async fn test_update_and_delete() {
    let (router, _media) = app().await;
    let created = body(
        &router
            .dispatch(post_json(
                "/students",
                json!({"name": "Asha", "image": "images/a.png", "stu_cors": "BCA"}),
            ))
            .await,
    );
    let path = format!("/students/{}", created["id"]);

    let resp = router
        .dispatch(
            Request::new("PUT", &path)
                .with_body(serde_json::to_vec(&json!({"name": "Asha Rao"})).unwrap()),
        )
        .await;
    assert_eq!(resp.status_code, 200);
    let updated = body(&resp);
    assert_eq!(updated["name"], "Asha Rao");
    assert_eq!(updated["date_added"], created["date_added"]);

    let resp = router
        .dispatch(
            Request::new("PUT", &path)
                .with_body(serde_json::to_vec(&json!({"stu_cors": "S"})).unwrap()),
        )
        .await;
    assert_eq!(resp.status_code, 400);

    assert_eq!(router.dispatch(Request::new("DELETE", &path)).await.status_code, 204);
    assert_eq!(router.dispatch(Request::new("DELETE", &path)).await.status_code, 404);
    assert_eq!(router.dispatch(Request::new("GET", &path)).await.status_code, 404);
}

#[tokio::test]
async fn test_non_numeric_id_is_not_found() {
    let (router, _media) = app().await;
    let resp = router.dispatch(Request::new("GET", "/students/abc")).await;
    assert_eq!(resp.status_code, 404);
    assert_eq!(body(&resp)["error"], "NotFound");
}

#[tokio::test]
async fn test_courses_lists_choices() {
    let (router, _media) = app().await;
    let resp = router.dispatch(Request::new("GET", "/courses")).await;
    assert_eq!(
        body(&resp),
        json!([{"code": "BCA", "label": "BCA"}, {"code": "BCOM", "label": "S"}])
    );
}

#[tokio::test]
async fn test_upload_image_then_reference_it() {
    let (router, media) = app().await;
    let resp = router
        .dispatch(Request::new("POST", "/media/images?filename=ravi.png").with_body(PNG))
        .await;
    assert_eq!(resp.status_code, 201);
    let uploaded = body(&resp);
    assert_eq!(uploaded["path"], "images/ravi.png");
    assert_eq!(uploaded["url"], "/media/images/ravi.png");
    assert!(media.path().join("images/ravi.png").is_file());

    let resp = router
        .dispatch(post_json(
            "/students",
            json!({"name": "Ravi", "image": uploaded["path"], "stu_cors": "BCA"}),
        ))
        .await;
    assert_eq!(resp.status_code, 201);
}

#[tokio::test]
async fn test_upload_rejects_non_images() {
    let (router, _media) = app().await;
    let resp = router
        .dispatch(Request::new("POST", "/media/images?filename=x.png").with_body("hello"))
        .await;
    assert_eq!(resp.status_code, 400);
    assert_eq!(body(&resp)["error"], "ValidationError");

    let resp = router
        .dispatch(Request::new("POST", "/media/images?filename=x.png"))
        .await;
    assert_eq!(resp.status_code, 400);
}
