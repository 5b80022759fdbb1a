use super::data::{NavigationUrl, Service, WebsiteData};
use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug)]
pub enum ApiError {
    SectionNotFound { section: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::SectionNotFound { section } => {
                warn!(%section, "no URL found for section");
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": format!("no navigation section named '{section}'") })),
                )
                    .into_response()
            }
        }
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Website Details API is running" }))
}

async fn get_services(State(data): State<Arc<WebsiteData>>) -> Json<Vec<Service>> {
    info!("GET /website/services");
    Json(data.services().to_vec())
}

async fn get_navigation_section(
    State(data): State<Arc<WebsiteData>>,
    Path(section): Path<String>,
) -> Result<Json<NavigationUrl>, ApiError> {
    info!(%section, "GET /website/navigation");
    let entry = data
        .resolve_section(&section)
        .map_err(|err| ApiError::SectionNotFound {
            section: err.section,
        })?;
    Ok(Json(NavigationUrl {
        url: entry.url.clone(),
    }))
}

pub fn build_router(data: Arc<WebsiteData>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/website/services", get(get_services))
        .route("/website/navigation/:section", get(get_navigation_section))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(data)
}

pub async fn serve(addr: SocketAddr, data: WebsiteData) -> Result<()> {
    let app = build_router(Arc::new(data));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "starting website details API server");
    axum::serve(listener, app).await?;
    Ok(())
}
