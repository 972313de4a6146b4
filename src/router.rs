/// Routing and the HTTP server loop.
///
/// This module provides:
///
/// - Method + path-pattern routing (`/students/:id`)
/// - Global and route-specific pre-middleware, and post-middleware
/// - `dispatch`, which runs a request through the whole chain without a socket
/// - `run`, which serves the router over TCP, one task per connection
///
use crate::http::{ReadError, Request, Response, read_request, write_response};
use crate::media::MediaStore;
use crate::orm::Db;
use crate::settings::Settings;
use crate::template::Templates;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// Everything a handler may need, passed in explicitly.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub settings: Arc<Settings>,
    pub templates: Templates,
    pub media: MediaStore,
}

impl AppState {
    pub fn new(db: Arc<Db>, settings: Settings) -> Self {
        AppState {
            db,
            templates: Templates::new(&settings.template),
            media: MediaStore::new(&settings.media),
            settings: Arc::new(settings),
        }
    }
}

/// Per-request metadata visible to middleware.
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
    pub start_time: Option<Instant>,
}

impl RequestContext {
    pub fn for_request(request: &Request) -> Self {
        RequestContext {
            method: request.method.clone(),
            path: request.path.clone(),
            params: HashMap::new(),
            start_time: None,
        }
    }
}

/// Async handler: receives the inbound request (with route params filled in) and the app state.
pub type Handler = Arc<
    dyn Fn(Request, AppState) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync,
>;

/// Runs before the handler. Returning Some(Response) stops the chain and sends it.
pub type Middleware = Arc<dyn Fn(&mut RequestContext) -> Option<Response> + Send + Sync>;

/// Runs after the handler and may rewrite the response.
pub type PostMiddleware = Arc<dyn Fn(&RequestContext, Response) -> Response + Send + Sync>;

#[derive(Clone)]
pub struct Route {
    pub method: String,
    pub path_pattern: String,
    pub handler: Handler,
    pub middlewares: Vec<Middleware>,
}

/// Application router: routes plus global middleware.
#[derive(Clone, Default)]
pub struct Router {
    pub routes: Vec<Route>,
    pub middlewares: Vec<Middleware>,
    pub post_middlewares: Vec<PostMiddleware>,
    pub app_state: Option<AppState>,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    /// Register a route for `method` and `path_pattern` with route-specific middleware.
    pub fn add_route(
        &mut self,
        method: &str,
        path_pattern: &str,
        handler: Handler,
        middlewares: Vec<Middleware>,
    ) {
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            path_pattern: path_pattern.to_string(),
            handler,
            middlewares,
        });
    }

    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    pub fn add_post_middleware(&mut self, middleware: PostMiddleware) {
        self.post_middlewares.push(middleware);
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = Some(state);
    }

    /// Find the route for a method and path. A path match with the wrong method
    /// is reported as `Err(true)`, no match at all as `Err(false)`.
    fn find_route(
        &self,
        method: &str,
        path: &str,
    ) -> Result<(&Route, HashMap<String, String>), bool> {
        let mut path_matched = false;
        for route in &self.routes {
            if let Some(params) = match_path(&route.path_pattern, path) {
                if route.method == method || (method == "HEAD" && route.method == "GET") {
                    return Ok((route, params));
                }
                path_matched = true;
            }
        }
        Err(path_matched)
    }

    /// Run one request through middleware, the matched handler and post-middleware.
    pub async fn dispatch(&self, mut request: Request) -> Response {
        let mut ctx = RequestContext::for_request(&request);
        let response = self.dispatch_inner(&mut request, &mut ctx).await;
        self.post_middlewares
            .iter()
            .fold(response, |resp, post| (post)(&ctx, resp))
    }

    async fn dispatch_inner(&self, request: &mut Request, ctx: &mut RequestContext) -> Response {
        for middleware in &self.middlewares {
            if let Some(response) = (middleware)(ctx) {
                return response;
            }
        }

        let (route, params) = match self.find_route(&request.method, &ctx.path) {
            Ok(found) => found,
            Err(true) => return Response::method_not_allowed(),
            Err(false) => return Response::not_found(),
        };
        ctx.params = params;
        for middleware in &route.middlewares {
            if let Some(response) = (middleware)(ctx) {
                return response;
            }
        }

        let Some(state) = self.app_state.clone() else {
            log::error!("App state not set in Router");
            return Response::server_error();
        };
        request.params = ctx.params.clone();
        (route.handler)(std::mem::take(request), state).await
    }

    /// Bind to the configured address and serve until the listener fails.
    pub async fn run(
        self,
        settings: &Settings,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = settings.http_addr();
        let listener = TcpListener::bind(&addr).await?;
        log::info!("HTTP server running on http://{}", addr);

        let max_body = settings.max_body_bytes;
        let router = Arc::new(self);
        loop {
            let (mut socket, peer) = listener.accept().await?;
            let router = router.clone();
            tokio::spawn(async move {
                let (response, head_only) = match read_request(&mut socket, max_body).await {
                    Ok(request) => {
                        let head_only = request.method == "HEAD";
                        (router.dispatch(request).await, head_only)
                    }
                    Err(ReadError::TooLarge) => (Response::payload_too_large(), false),
                    Err(ReadError::LengthRequired) => (Response::length_required(), false),
                    Err(ReadError::Malformed) => (Response::bad_request("400 Bad Request"), false),
                    Err(ReadError::Closed) => return,
                    Err(ReadError::Io(e)) => {
                        log::debug!("Read from {} failed: {}", peer, e);
                        return;
                    }
                };
                if let Err(e) = write_response(&mut socket, &response, head_only).await {
                    log::debug!("Write to {} failed: {}", peer, e);
                }
            });
        }
    }
}

/// Register routes: `route!(router, GET "/" => { handler, middleware... }, ...)`.
#[macro_export]
macro_rules! route {
    ($router:expr, $( $method:ident $path:expr => { $handler:expr $(, $middleware:expr )* } ),* $(,)?) => {
        $(
            let handler: $crate::router::Handler =
                ::std::sync::Arc::new(move |request, state| Box::pin($handler(request, state)));
            $router.add_route(stringify!($method), $path, handler, vec![$($middleware),*]);
        )*
    };
}

/// Matches a path pattern (e.g. `/foo/:id`) against a real path,
/// extracting parameters into a HashMap if matched, or None if not.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (p, a) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = p.strip_prefix(':') {
            if a.is_empty() {
                return None;
            }
            params.insert(name.to_string(), a.to_string());
        } else if p != a {
            return None;
        }
    }

    Some(params)
}
