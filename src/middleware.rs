use crate::router::{Middleware, PostMiddleware};
use std::sync::Arc;
use std::time::Instant;

/// Stamps the request start so `access_log` can report elapsed time.
pub fn request_timer() -> Middleware {
    Arc::new(|ctx| {
        ctx.start_time = Some(Instant::now());
        None
    })
}

/// Logs `METHOD path -> status (elapsed)` once the response is ready.
pub fn access_log() -> PostMiddleware {
    Arc::new(|ctx, response| {
        let elapsed = ctx
            .start_time
            .map(|t| format!("{:.1?}", t.elapsed()))
            .unwrap_or_else(|| "-".to_string());
        if response.status_code >= 500 {
            log::warn!(
                "{} {} -> {} ({})",
                ctx.method,
                ctx.path,
                response.status_code,
                elapsed
            );
        } else {
            log::info!(
                "{} {} -> {} ({})",
                ctx.method,
                ctx.path,
                response.status_code,
                elapsed
            );
        }
        response
    })
}
