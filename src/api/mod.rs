//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Account, event, card, import, analytics and job endpoints are mounted
//! under `/api/v1`. Public share links and `/health` live at the root.
//! With the `swagger-ui` feature the OpenAPI document is served at
//! `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod dto;
pub mod extract;
pub mod handlers;

use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::app_state::AppState;

/// OpenAPI document for every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Occasion Keeper",
        description = "Birthday and anniversary reminders, greeting cards and share links."
    ),
    paths(
        handlers::system::health_handler,
        handlers::auth::register,
        handlers::auth::verify,
        handlers::auth::resend,
        handlers::auth::login,
        handlers::auth::get_profile,
        handlers::auth::update_profile,
        handlers::events::list_events,
        handlers::events::create_event,
        handlers::events::get_event,
        handlers::events::update_event,
        handlers::events::delete_event,
        handlers::events::toggle_recurring,
        handlers::events::archive_event,
        handlers::events::unarchive_event,
        handlers::events::upload_media,
        handlers::events::delete_media,
        handlers::events::list_past_events,
        handlers::events::export_past_events,
        handlers::events::get_reflection,
        handlers::events::put_reflection,
        handlers::cards::get_card,
        handlers::cards::put_page,
        handlers::cards::delete_page,
        handlers::cards::check_password,
        handlers::cards::create_share,
        handlers::cards::open_share,
        handlers::cards::unlock_share,
        handlers::imports::import_events,
        handlers::imports::import_template,
        handlers::analytics::get_analytics,
        handlers::analytics::analytics_report,
        handlers::jobs::run_stage,
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "System", description = "Health"),
        (name = "Auth", description = "Accounts and login"),
        (name = "Events", description = "Events, media and reflections"),
        (name = "Cards", description = "Greeting cards and sharing"),
        (name = "Share", description = "Public share links"),
        (name = "Imports", description = "CSV import"),
        (name = "Analytics", description = "Statistics"),
        (name = "Jobs", description = "Batch stages"),
    )
)]
pub struct ApiDoc;

#[derive(Debug)]
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::cards::share_routes())
        .merge(handlers::system::routes());
    with_docs(router)
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_resource() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/auth/login",
            "/api/v1/events/{id}",
            "/api/v1/events/{id}/card/pages/{page}",
            "/share/{token}",
            "/api/v1/imports",
            "/api/v1/analytics/report",
            "/api/v1/jobs/{stage}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let has_bearer = doc
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer"));
        assert!(has_bearer);
    }
}
