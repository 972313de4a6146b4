use super::render;
use crate::http::{Request, Response};
use crate::router::AppState;
use crate::template::Context;

pub async fn index(request: Request, state: AppState) -> Response {
    render(&request, &state, "index.html", Context::new())
}

pub async fn about(request: Request, state: AppState) -> Response {
    render(&request, &state, "pages/about.html", Context::new())
}

pub async fn contact(request: Request, state: AppState) -> Response {
    render(&request, &state, "pages/contact.html", Context::new())
}
