mod config;
mod dataset;
mod graphql;
mod scene;
mod session;

use std::io::Cursor;
use std::path::Path;

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::Query;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{extract::State, response::Html, routing::get, Router};
use image::{ImageFormat, RgbaImage};
use markermap_shared::cache::{AssetCache, FsImageSource, IconLayer};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing_subscriber::EnvFilter;

use config::Config;
use dataset::Dataset;
use graphql::Schema;
use session::{spawn_poller, MapSession, SharedSession};

#[derive(Clone)]
struct AppState {
    schema: Schema,
    session: SharedSession,
    icon_max_size: u32,
}

async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
    state.schema.execute(req.into_inner()).await.into()
}

async fn graphiql() -> Html<String> {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}

#[derive(Deserialize)]
struct IconQuery {
    layer: String,
    path: String,
    width: u32,
    height: u32,
}

/// Serve a cached, pre-scaled icon as PNG.
async fn icon_handler(State(state): State<AppState>, Query(q): Query<IconQuery>) -> Response {
    let layer = match q.layer.as_str() {
        "base" => IconLayer::Base,
        "overlay" => IconLayer::Overlay,
        other => {
            return (StatusCode::BAD_REQUEST, format!("Unknown icon layer: {}", other)).into_response()
        }
    };
    if q.width > state.icon_max_size || q.height > state.icon_max_size {
        return (
            StatusCode::BAD_REQUEST,
            format!("Icon size is limited to {}px", state.icon_max_size),
        )
            .into_response();
    }

    let bitmap = state
        .session
        .lock()
        .await
        .icon(layer, &q.path, q.width, q.height);
    let Some(image) = bitmap.image() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match encode_png(image) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(e) => {
            tracing::warn!(path = %q.path, error = %e, "Icon encode failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, String> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| format!("Failed to encode PNG: {}", e))?;
    Ok(out.into_inner())
}

/// Build a cache-controlled static file router.
fn cached_static_router(dir: &Path, cache_header: &'static str) -> Router {
    let layer = SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_header),
    );
    Router::new()
        .fallback_service(ServeDir::new(dir))
        .layer(layer)
}

const CACHE_TILES: &str = "public, max-age=86400, must-revalidate";

/// Build the full application router.
fn build_app(state: AppState, tiles_dir: &Path) -> Router {
    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .route("/icon", get(icon_handler))
        .with_state(state)
        .nest("/tiles", cached_static_router(tiles_dir, CACHE_TILES))
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");
    let calibration = config
        .load_calibration()
        .expect("Failed to load calibration");
    let dataset =
        Dataset::load(&config.dataset_path, &calibration.map).expect("Failed to load marker dataset");

    let icons = AssetCache::with_capacity(
        FsImageSource::new(&config.assets_dir),
        config.icon_cache_capacity,
    );
    let shared = MapSession::new(dataset, &calibration, icons).into_shared();
    let _poller = spawn_poller(shared.clone(), config.poll_interval);

    let state = AppState {
        schema: graphql::build_schema(shared.clone()),
        session: shared,
        icon_max_size: config.icon_max_size,
    };
    let app = build_app(state, &config.tiles_dir);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(port = config.port, "Server running at http://localhost:{}", config.port);
    tracing::info!("GraphiQL playground at http://localhost:{}/graphql", config.port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
