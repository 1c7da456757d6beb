use crate::config::AppConfig;
use crate::projection::ProjectedState;
use crate::render::{render_map, MapView};
use crate::scale::{format_count, format_day};
use crate::types::{MapMode, Metric};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use geo::algorithm::contains::Contains;
use geo::bounding_rect::BoundingRect;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

// Wrapper for RTree indexing; envelopes are in SVG pixel space.
struct StateIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for StateIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    pub states: Vec<ProjectedState>,
    pub tree: RTree<StateIndex>,
    pub config: AppConfig,
    pub dates: Vec<String>,
}

impl AppState {
    pub fn new(config: AppConfig, states: Vec<ProjectedState>, dates: Vec<String>) -> Self {
        let tree_items: Vec<StateIndex> = states
            .iter()
            .enumerate()
            .filter_map(|(i, state)| {
                let rect = state.outline.as_ref()?.bounding_rect()?;
                Some(StateIndex {
                    index: i,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        AppState {
            states,
            tree: RTree::bulk_load(tree_items),
            config,
            dates,
        }
    }

    // Dates are kept sorted ascending, so the default is the newest day.
    fn resolve_date(&self, requested: Option<String>) -> String {
        requested.unwrap_or_else(|| self.dates.last().cloned().unwrap_or_default())
    }

    fn locate(&self, x: f64, y: f64) -> Option<&ProjectedState> {
        let point = Point::new(x, y);
        let envelope = AABB::from_point([x, y]);

        for candidate in self.tree.locate_in_envelope_intersecting(&envelope) {
            if let Some(state) = self.states.get(candidate.index) {
                if let Some(outline) = &state.outline {
                    if outline.contains(&point) {
                        return Some(state);
                    }
                }
            }
        }
        None
    }
}

#[derive(Debug, Deserialize)]
pub struct MapQuery {
    date: Option<String>,
    field: Option<Metric>,
    mode: Option<MapMode>,
}

#[derive(Debug, Deserialize)]
pub struct TooltipQuery {
    x: f64,
    y: f64,
    date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TooltipRow {
    pub label: String,
    pub total: String,
    pub per_million: String,
}

#[derive(Debug, Serialize)]
pub struct TooltipResponse {
    pub name: String,
    pub date: String,
    pub rows: Vec<TooltipRow>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let frame_service = ServeDir::new(&state.config.output.frame_dir);

    Router::new()
        .route("/map.svg", get(map_handler))
        .route("/api/tooltip", get(tooltip_handler))
        .route("/api/dates", get(dates_handler))
        .nest_service("/frames", frame_service)
        .nest_service("/", ServeDir::new("."))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(
    config: AppConfig,
    states: Vec<ProjectedState>,
    dates: Vec<String>,
) -> Result<()> {
    println!("Building spatial index for API...");
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, states, dates));
    println!("Spatial index built.");

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let app = build_router(state);

    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MapQuery>,
) -> impl IntoResponse {
    let date = state.resolve_date(params.date);
    let view = MapView {
        date: &date,
        metric: params.field.unwrap_or(Metric::Positive),
        mode: params.mode.unwrap_or(MapMode::Choropleth),
    };
    let svg = render_map(&state.states, &view, &state.config.map);
    ([(header::CONTENT_TYPE, "image/svg+xml")], svg)
}

async fn tooltip_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TooltipQuery>,
) -> Json<Option<TooltipResponse>> {
    let hit = match state.locate(params.x, params.y) {
        Some(s) => s,
        None => return Json(None),
    };
    let date = state.resolve_date(params.date);

    let rows = [Metric::TotalTestResults, Metric::Positive, Metric::Death]
        .iter()
        .map(|&metric| TooltipRow {
            label: metric.label().to_string(),
            total: format_count(hit.value_on(&date, metric)),
            per_million: format_count(hit.value_per_million(&date, metric)),
        })
        .collect();

    Json(Some(TooltipResponse {
        name: hit.state.name.clone(),
        date: format_day(&date),
        rows,
    }))
}

async fn dates_handler(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.dates.clone())
}
