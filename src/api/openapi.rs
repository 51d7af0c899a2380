//! OpenAPI documentation and schema generation
//!
//! The document is derived at compile time from the `#[utoipa::path]`
//! annotations on the route handlers.

use utoipa::OpenApi;

/// OpenAPI documentation for the build-relay HTTP surface
///
/// Served as JSON at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "build-relay",
        version = "0.1.0",
        description = "Receives cloud build notifications and relays the built artifact to a distribution service",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        // Webhook
        crate::api::routes::receive_build,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(
        schemas(
            crate::types::WebhookAck,
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "webhook", description = "Build provider notifications"),
        (name = "system", description = "Health, events and API documentation")
    )
)]
pub struct ApiDoc;
