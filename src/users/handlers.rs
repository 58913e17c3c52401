use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{extractors::AuthUser, jwt::JwtKeys},
    state::AppState,
    users::{
        dto::{LoginRequest, SignupRequest, UserUpdate},
        error::AccountError,
        model::PublicUser,
        service,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/login", post(login))
        .route("/user", get(current_user).put(update_user))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<Json<PublicUser>, AccountError> {
    payload.email = payload.email.trim().to_lowercase();
    let keys = JwtKeys::from_ref(&state);
    let user = service::create_user(state.repo.as_ref(), &keys, payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<PublicUser>, AccountError> {
    payload.email = payload.email.trim().to_lowercase();
    let keys = JwtKeys::from_ref(&state);
    let user = service::login_user(state.repo.as_ref(), &keys, payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state, auth), fields(email = %auth.email))]
pub async fn current_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PublicUser>, AccountError> {
    let user = service::get_user_by_email(state.repo.as_ref(), &auth.email).await?;
    Ok(Json(user))
}

#[instrument(skip(state, auth, payload), fields(email = %auth.email))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<PublicUser>, AccountError> {
    let user = service::update_user_details(state.repo.as_ref(), payload, &auth.email).await?;
    Ok(Json(user))
}
