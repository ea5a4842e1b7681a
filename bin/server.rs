// Rally Ledger - Web Server
// JSON API over the race engine with Axum

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use rally_ledger::logging::init_logging;
use rally_ledger::{
    register_car, register_team, AppConfig, LedgerEntry, NewCar, NewTeam, RaceOrchestrator,
    RaceReport, RaceResult, RallyError, RallyStore, ReconciliationEngine, ReconciliationReport,
    SeededSource, SqliteStore, TeamStanding, Track, TrackChoice,
};
use rally_ledger::models::{Car, Race, Team};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    config: Arc<AppConfig>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Failure of a request, mapped to a status code
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<RallyError> for ApiError {
    fn from(err: RallyError) -> Self {
        let status = match &err {
            RallyError::Validation { .. } => StatusCode::BAD_REQUEST,
            RallyError::UnknownTeam(_) | RallyError::UnknownTrack(_) => StatusCode::NOT_FOUND,
            RallyError::EmptyTrackSet => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if !err.is_client_error() {
            error!(error = %err, "Request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn lock_store(state: &AppState) -> Result<MutexGuard<'_, SqliteStore>, ApiError> {
    state.store.lock().map_err(|_| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "store lock poisoned".to_string(),
    })
}

#[derive(Deserialize)]
struct NewTeamRequest {
    name: String,
    country: String,
    starting_balance: Option<f64>,
}

#[derive(Deserialize, Default)]
struct RunRaceRequest {
    seed: Option<u64>,
    track_id: Option<i64>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/teams - Teams with wallet balances
async fn get_teams(State(state): State<AppState>) -> ApiResult<Vec<TeamStanding>> {
    let store = lock_store(&state)?;
    Ok(Json(ApiResponse::ok(store.list_teams_with_balance()?)))
}

/// POST /api/teams - Register a team and open its wallet
async fn add_team(
    State(state): State<AppState>,
    Json(req): Json<NewTeamRequest>,
) -> ApiResult<Team> {
    let store = lock_store(&state)?;
    let team = register_team(
        &*store,
        &NewTeam {
            name: req.name,
            country: req.country,
            starting_balance: req
                .starting_balance
                .unwrap_or(state.config.teams.default_starting_balance),
        },
    )?;
    Ok(Json(ApiResponse::ok(team)))
}

/// GET /api/teams/:id/ledger - A team's ledger in append order
async fn get_team_ledger(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
) -> ApiResult<Vec<LedgerEntry>> {
    let store = lock_store(&state)?;
    if store.get_wallet(team_id)?.is_none() {
        return Err(RallyError::UnknownTeam(team_id).into());
    }
    Ok(Json(ApiResponse::ok(store.ledger_for_team(team_id)?)))
}

/// POST /api/cars - Register a car
async fn add_car(State(state): State<AppState>, Json(car): Json<NewCar>) -> ApiResult<Car> {
    let store = lock_store(&state)?;
    Ok(Json(ApiResponse::ok(register_car(&*store, &car)?)))
}

/// GET /api/tracks - Track reference data
async fn get_tracks(State(state): State<AppState>) -> ApiResult<Vec<Track>> {
    let store = lock_store(&state)?;
    Ok(Json(ApiResponse::ok(store.list_tracks()?)))
}

/// GET /api/races - Past races, newest first
async fn get_races(State(state): State<AppState>) -> ApiResult<Vec<Race>> {
    let store = lock_store(&state)?;
    Ok(Json(ApiResponse::ok(store.list_races()?)))
}

/// POST /api/races - Run a race and settle every team
async fn run_race(
    State(state): State<AppState>,
    body: Option<Json<RunRaceRequest>>,
) -> ApiResult<RaceReport> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let choice = req.track_id.map_or(TrackChoice::Random, TrackChoice::Id);
    let mut source = match req.seed {
        Some(seed) => SeededSource::new(seed),
        None => SeededSource::from_entropy(),
    };

    let store = lock_store(&state)?;
    let report = RaceOrchestrator::new(&*store, &state.config.race).run_race(choice, &mut source)?;
    Ok(Json(ApiResponse::ok(report)))
}

/// GET /api/races/:id/results - Results of one race by position
async fn get_race_results(
    State(state): State<AppState>,
    Path(race_id): Path<i64>,
) -> ApiResult<Vec<RaceResult>> {
    let store = lock_store(&state)?;
    Ok(Json(ApiResponse::ok(store.results_for_race(race_id)?)))
}

/// GET /api/reconciliation - Every wallet against its ledger
async fn get_reconciliation(State(state): State<AppState>) -> ApiResult<Vec<ReconciliationReport>> {
    let store = lock_store(&state)?;
    let reports = ReconciliationEngine::new().reconcile_all(&*store)?;
    Ok(Json(ApiResponse::ok(reports)))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("rally_ledger=info,rally_server=info,tower_http=info");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("rally.toml"));
    let config = AppConfig::load_or_default(&config_path)?;

    let store = SqliteStore::open(&config.database.path)?;
    info!(path = %config.database.path.display(), "Database opened");

    let bind = config.server.bind.clone();

    // Create shared state
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        config: Arc::new(config),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/teams", get(get_teams).post(add_team))
        .route("/teams/:id/ledger", get(get_team_ledger))
        .route("/cars", axum::routing::post(add_car))
        .route("/tracks", get(get_tracks))
        .route("/races", get(get_races).post(run_race))
        .route("/races/:id/results", get(get_race_results))
        .route("/reconciliation", get(get_reconciliation))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "Server running");

    axum::serve(listener, app).await?;
    Ok(())
}
