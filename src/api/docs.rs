//! OpenAPI document and Swagger UI.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::dto::{PublishEventRequest, PublishEventResponse, StatsResponse};
use super::handlers::system::HealthResponse;
use crate::domain::EventKind;
use crate::error::{ErrorBody, ErrorResponse};
use crate::service::{CatalogEntry, DispatchSnapshot};

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "pulse-gateway",
        description = "Real-time event distribution gateway. Clients connect to `/ws`; producers publish on `/api/v1/events`."
    ),
    paths(
        super::handlers::system::health_handler,
        super::handlers::events::publish_event,
        super::handlers::events::event_catalog,
        super::handlers::events::gateway_stats,
    ),
    components(schemas(
        HealthResponse,
        PublishEventRequest,
        PublishEventResponse,
        StatsResponse,
        DispatchSnapshot,
        CatalogEntry,
        EventKind,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Events", description = "Event ingest and catalog"),
    )
)]
pub struct ApiDoc;

/// Swagger UI at `/swagger-ui`, spec at `/api-docs/openapi.json`.
pub fn docs_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
