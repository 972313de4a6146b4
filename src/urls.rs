use crate::middleware::{access_log, request_timer};
use crate::route;
use crate::router::{AppState, Router};
use crate::views::{pages, students};

/// The application's URL table.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new();
    router.add_middleware(request_timer());
    router.add_post_middleware(access_log());

    route!(router,
        GET "/" => { pages::index },
        GET "/about" => { pages::about },
        GET "/contact" => { pages::contact },

        GET "/students" => { students::list },
        POST "/students" => { students::create },
        GET "/students/:id" => { students::detail },
        PUT "/students/:id" => { students::update },
        DELETE "/students/:id" => { students::delete },
        GET "/courses" => { students::courses },
        POST "/media/images" => { students::upload_image },
    );

    router.set_app_state(state);
    router
}
