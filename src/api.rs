//! HTTP API endpoints.
//!
//! Public routes cast and look up votes and read results and the catalog.
//! Admin routes manage categories and nominees and export/import state; they
//! sit behind HTTP Basic auth.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::abuse::{lookup_rate_limit_middleware, vote_rate_limit_middleware};
use crate::auth::admin_auth_middleware;
use crate::error::AwardError;
use crate::identity::Voter;
use crate::state::AppState;
use crate::store::{CatalogStore, StoreSnapshot};
use crate::tabulator::CategoryResults;
use crate::types::*;

/// JSON error body shared by every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

impl IntoResponse for AwardError {
    fn into_response(self) -> Response {
        let status = match self {
            AwardError::CategoryNotFound(_) | AwardError::NomineeNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AwardError::InvalidNomineeForCategory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AwardError::CategoryLocked(_) => StatusCode::FORBIDDEN,
            AwardError::StorageConflict => StatusCode::CONFLICT,
            AwardError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AwardError::InvalidSnapshot(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        }
        (
            status,
            Json(ErrorBody {
                code: self.code().to_string(),
                msg: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, AwardError>;

/// Request body that could not be read as the expected JSON
#[derive(Debug)]
pub struct InvalidRequest(pub String);

impl IntoResponse for InvalidRequest {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                code: "INVALID_REQUEST".to_string(),
                msg: self.0,
            }),
        )
            .into_response()
    }
}

/// `Json` extractor whose rejections use [`ErrorBody`]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = InvalidRequest;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                let msg = rejection.body_text();
                tracing::debug!("Rejected request body: {}", msg);
                Err(InvalidRequest(msg))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVoteRequest {
    pub nominee_id: NomineeId,
    pub category_id: CategoryId,
}

/// Current vote of the caller in one category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VoteLookup {
    Voted { vote: Vote },
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NomineeFilter {
    pub category_id: Option<CategoryId>,
}

/// Cast or change the caller's vote.
///
/// POST /api/vote
///
/// Responds 201 when the vote is new and 200 when an existing vote was replaced.
pub async fn cast_vote(
    State(state): State<AppState>,
    Voter(voter_id): Voter,
    ApiJson(req): ApiJson<CastVoteRequest>,
) -> ApiResult<(StatusCode, Json<CastVote>)> {
    let cast = state
        .ledger
        .cast_vote(&voter_id, &req.category_id, &req.nominee_id)
        .await?;
    let status = match cast.action {
        VoteAction::Created => StatusCode::CREATED,
        VoteAction::Updated => StatusCode::OK,
    };
    Ok((status, Json(cast)))
}

/// GET /api/vote/{category_id}
pub async fn get_vote(
    State(state): State<AppState>,
    Voter(voter_id): Voter,
    Path(category_id): Path<CategoryId>,
) -> ApiResult<Json<VoteLookup>> {
    let lookup = match state.ledger.get_vote(&voter_id, &category_id).await? {
        Some(vote) => VoteLookup::Voted { vote },
        None => VoteLookup::None,
    };
    Ok(Json(lookup))
}

/// Live results for one category, locked or not.
///
/// GET /api/results/{category_id}
pub async fn category_results(
    State(state): State<AppState>,
    Path(category_id): Path<CategoryId>,
) -> ApiResult<Json<CategoryResults>> {
    Ok(Json(state.tabulator.compute_results(&category_id).await?))
}

/// Results of every locked category, in category creation order.
///
/// GET /api/results
pub async fn locked_results(State(state): State<AppState>) -> ApiResult<Json<Vec<CategoryResults>>> {
    let categories = state.store.list_categories().await?;
    let results = try_join_all(
        categories
            .iter()
            .filter(|c| c.voting_locked)
            .map(|c| state.tabulator.compute_results(&c.id)),
    )
    .await?;
    Ok(Json(results))
}

/// GET /api/categories
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.store.list_categories().await?))
}

/// GET /api/categories/{id}
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> ApiResult<Json<Category>> {
    state
        .store
        .get_category(&id)
        .await?
        .map(Json)
        .ok_or(AwardError::CategoryNotFound(id))
}

/// POST /api/categories
pub async fn create_category(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewCategory>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = state.store.insert_category(new).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/categories/{id}
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    ApiJson(update): ApiJson<CategoryUpdate>,
) -> ApiResult<Json<Category>> {
    Ok(Json(state.store.update_category(&id, update).await?))
}

/// DELETE /api/categories/{id}
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> ApiResult<Json<CategoryDeletion>> {
    Ok(Json(state.store.delete_category(&id).await?))
}

/// GET /api/nominees?category_id=..
pub async fn list_nominees(
    State(state): State<AppState>,
    Query(filter): Query<NomineeFilter>,
) -> ApiResult<Json<Vec<Nominee>>> {
    let nominees = state
        .store
        .list_nominees(filter.category_id.as_deref())
        .await?;
    Ok(Json(nominees))
}

/// GET /api/nominees/{id}
pub async fn get_nominee(
    State(state): State<AppState>,
    Path(id): Path<NomineeId>,
) -> ApiResult<Json<Nominee>> {
    state
        .store
        .get_nominee(&id)
        .await?
        .map(Json)
        .ok_or(AwardError::NomineeNotFound(id))
}

/// POST /api/nominees
pub async fn create_nominee(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewNominee>,
) -> ApiResult<(StatusCode, Json<Nominee>)> {
    let nominee = state.store.insert_nominee(new).await?;
    Ok((StatusCode::CREATED, Json(nominee)))
}

/// PUT /api/nominees/{id}
pub async fn update_nominee(
    State(state): State<AppState>,
    Path(id): Path<NomineeId>,
    ApiJson(update): ApiJson<NomineeUpdate>,
) -> ApiResult<Json<NomineeChange>> {
    Ok(Json(state.store.update_nominee(&id, update).await?))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NomineeDeletion {
    pub nominee: Nominee,
    pub deleted_votes: usize,
}

/// DELETE /api/nominees/{id}
pub async fn delete_nominee(
    State(state): State<AppState>,
    Path(id): Path<NomineeId>,
) -> ApiResult<Json<NomineeDeletion>> {
    let (nominee, deleted_votes) = state.store.delete_nominee(&id).await?;
    Ok(Json(NomineeDeletion {
        nominee,
        deleted_votes,
    }))
}

/// Unset a nominee's image.
///
/// DELETE /api/nominees/{id}/image
pub async fn remove_nominee_image(
    State(state): State<AppState>,
    Path(id): Path<NomineeId>,
) -> ApiResult<Json<Nominee>> {
    let update = NomineeUpdate {
        image_url: Some(None),
        ..Default::default()
    };
    let change = state.store.update_nominee(&id, update).await?;
    Ok(Json(change.nominee))
}

/// Export the entire stored state as JSON.
///
/// GET /api/admin/state/export
pub async fn export_state(State(state): State<AppState>) -> ApiResult<Json<StoreSnapshot>> {
    Ok(Json(state.store.export().await?))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportSummary {
    pub categories: usize,
    pub nominees: usize,
    pub votes: usize,
}

/// Import a state snapshot.
///
/// POST /api/admin/state/import
///
/// Replaces all categories, nominees and votes with the imported data.
pub async fn import_state(
    State(state): State<AppState>,
    ApiJson(snapshot): ApiJson<StoreSnapshot>,
) -> ApiResult<Json<ImportSummary>> {
    let summary = ImportSummary {
        categories: snapshot.categories.len(),
        nominees: snapshot.nominees.len(),
        votes: snapshot.votes.len(),
    };
    if let Err(e) = state.store.import(snapshot).await {
        tracing::warn!("State import failed: {}", e);
        return Err(e);
    }
    Ok(Json(summary))
}

async fn health() -> &'static str {
    "ok"
}

/// Build the application router
pub fn router(state: AppState, static_dir: impl Into<PathBuf>) -> Router {
    // Protected admin routes (with HTTP Basic Auth)
    let admin_routes = Router::new()
        .route("/api/categories", post(create_category))
        .route(
            "/api/categories/{id}",
            put(update_category).delete(delete_category),
        )
        .route("/api/nominees", post(create_nominee))
        .route(
            "/api/nominees/{id}",
            put(update_nominee).delete(delete_nominee),
        )
        .route("/api/nominees/{id}/image", delete(remove_nominee_image))
        .route("/api/admin/state/export", get(export_state))
        .route("/api/admin/state/import", post(import_state))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            admin_auth_middleware,
        ));

    // Vote casting with per-voter rate limit
    let vote_routes = Router::new()
        .route("/api/vote", post(cast_vote))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            vote_rate_limit_middleware,
        ));

    // A voter's own vote lookup, limited more loosely
    let lookup_routes = Router::new()
        .route("/api/vote/{category_id}", get(get_vote))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            lookup_rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route("/api/results", get(locked_results))
        .route("/api/results/{category_id}", get(category_results))
        .route("/api/categories", get(list_categories))
        .route("/api/categories/{id}", get(get_category))
        .route("/api/nominees", get(list_nominees))
        .route("/api/nominees/{id}", get(get_nominee))
        .route("/health", get(health));

    Router::new()
        .merge(admin_routes)
        .merge(vote_routes)
        .merge(lookup_routes)
        .merge(public_routes)
        .fallback_service(ServeDir::new(static_dir.into()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
