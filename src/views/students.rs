//! JSON API over the student store and the image upload endpoint.

use crate::error::StoreError;
use crate::http::{Request, Response};
use crate::media::MediaError;
use crate::models::student::{self, Course, NewStudent, Student, StudentUpdate};
use crate::router::AppState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct StudentJson {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub image_url: String,
    pub date_added: DateTime<Utc>,
    pub stu_cors: Course,
    pub stu_cors_display: &'static str,
}

impl StudentJson {
    fn new(student: Student, media_url: &str) -> Self {
        StudentJson {
            image_url: student.image_url(media_url),
            stu_cors_display: student.stu_cors_display(),
            id: student.id,
            name: student.name,
            image: student.image,
            date_added: student.date_added,
            stu_cors: student.stu_cors,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

fn json<T: Serialize>(data: T, status_code: u16) -> Response {
    Response::json(data, status_code, HashMap::new())
}

fn error_json(status_code: u16, kind: &str, message: impl Into<String>) -> Response {
    json(
        ErrorBody {
            error: kind,
            message: message.into(),
        },
        status_code,
    )
}

fn store_error(err: StoreError) -> Response {
    if let StoreError::Database(e) = &err {
        log::error!("Student store failure: {}", e);
        return error_json(500, err.kind(), "internal error");
    }
    error_json(err.status_code(), err.kind(), err.to_string())
}

fn student_id(request: &Request) -> Option<i64> {
    request.param("id")?.parse().ok()
}

fn not_found(request: &Request) -> Response {
    error_json(404, "NotFound", format!("no student at {}", request.path))
}

pub async fn list(_request: Request, state: AppState) -> Response {
    match student::list(&state.db).await {
        Ok(students) => {
            let media_url = &state.settings.media.url;
            let body: Vec<StudentJson> = students
                .into_iter()
                .map(|s| StudentJson::new(s, media_url))
                .collect();
            json(body, 200)
        }
        Err(e) => store_error(e),
    }
}

pub async fn create(request: Request, state: AppState) -> Response {
    let new: NewStudent = match request.json() {
        Ok(new) => new,
        Err(e) => return error_json(400, "BadRequest", e.to_string()),
    };
    match student::create(&state.db, new).await {
        Ok(s) => json(StudentJson::new(s, &state.settings.media.url), 201),
        Err(e) => store_error(e),
    }
}

pub async fn detail(request: Request, state: AppState) -> Response {
    let Some(id) = student_id(&request) else {
        return not_found(&request);
    };
    match student::get(&state.db, id).await {
        Ok(s) => json(StudentJson::new(s, &state.settings.media.url), 200),
        Err(e) => store_error(e),
    }
}

pub async fn update(request: Request, state: AppState) -> Response {
    let Some(id) = student_id(&request) else {
        return not_found(&request);
    };
    let changes: StudentUpdate = match request.json() {
        Ok(changes) => changes,
        Err(e) => return error_json(400, "BadRequest", e.to_string()),
    };
    match student::update(&state.db, id, changes).await {
        Ok(s) => json(StudentJson::new(s, &state.settings.media.url), 200),
        Err(e) => store_error(e),
    }
}

pub async fn delete(request: Request, state: AppState) -> Response {
    let Some(id) = student_id(&request) else {
        return not_found(&request);
    };
    match student::delete(&state.db, id).await {
        Ok(()) => Response::no_content(),
        Err(e) => store_error(e),
    }
}

#[derive(Serialize)]
struct Choice {
    code: &'static str,
    label: &'static str,
}

pub async fn courses(_request: Request, _state: AppState) -> Response {
    let choices: Vec<Choice> = Course::choices()
        .iter()
        .map(|&(code, label)| Choice { code, label })
        .collect();
    json(choices, 200)
}

#[derive(Serialize)]
struct Uploaded {
    path: String,
    url: String,
}

/// `POST /media/images?filename=photo.png` with the raw image bytes as body.
pub async fn upload_image(request: Request, state: AppState) -> Response {
    let filename = request.query_param("filename").unwrap_or("upload");
    match state.media.save_image(filename, &request.body).await {
        Ok(path) => {
            let url = format!("{}/{}", state.settings.media.url.trim_end_matches('/'), path);
            json(Uploaded { path, url }, 201)
        }
        Err(MediaError::Io(e)) => {
            log::error!("Image upload failed: {}", e);
            error_json(500, "InternalError", "could not store upload")
        }
        Err(e) => error_json(400, "ValidationError", e.to_string()),
    }
}
