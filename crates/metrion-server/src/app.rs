use crate::state::AppState;
use crate::{api, logging, middleware};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "metrion API",
        description = "metrion metrics ingestion and query REST API",
    ),
    tags(
        (name = "Ingest", description = "Metric ingestion"),
        (name = "Query", description = "Metric lookup")
    )
)]
struct ApiDoc;

pub fn build_http_app(state: AppState) -> Router {
    let (json_router, json_spec) = api::json_routes().split_for_parts();
    let mut spec = ApiDoc::openapi();
    spec.merge(json_spec);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // layers run outermost-last: on the request path the order is
    // logging, subnet, decrypt, decompress, MAC, handler
    json_router
        .merge(api::plain_routes())
        .layer(from_fn_with_state(state.clone(), middleware::verify_mac))
        .layer(from_fn(middleware::decompress_request))
        .layer(from_fn_with_state(state.clone(), middleware::decrypt_request))
        .layer(from_fn_with_state(state.clone(), middleware::subnet_filter))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", spec))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(logging::request_logging))
}
