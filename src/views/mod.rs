pub mod pages;
pub mod students;

use crate::http::{Request, Response};
use crate::router::AppState;
use crate::template::{Context, TemplateValue, escape_html};
use std::collections::HashMap;

/// Render `template_name` for `request`. The request is available to the
/// template as `request.method` and `request.path`.
///
/// A template that cannot be loaded answers 500; in debug mode the body
/// carries the error.
pub fn render(
    request: &Request,
    state: &AppState,
    template_name: &str,
    mut context: Context,
) -> Response {
    let mut req = HashMap::new();
    req.insert("method".to_string(), TemplateValue::from(request.method.as_str()));
    req.insert("path".to_string(), TemplateValue::from(request.path.as_str()));
    context.insert("request".to_string(), TemplateValue::Object(req));
    context.insert("debug".to_string(), TemplateValue::Bool(state.settings.debug));

    match state.templates.render(template_name, &context) {
        Ok(html) => Response::html(200, html),
        Err(e) => {
            log::error!("Rendering {} for {} failed: {}", template_name, request.path, e);
            if state.settings.debug {
                Response::html(
                    500,
                    format!("<h1>Server Error (500)</h1><pre>{}</pre>", escape_html(&e.to_string())),
                )
            } else {
                Response::server_error()
            }
        }
    }
}
