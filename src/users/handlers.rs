use axum::{extract::State, routing::get, Json, Router};
use tracing::{instrument, warn};

use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    login_logs::HISTORY_LIMIT,
    state::AppState,
    users::dto::{LoginHistoryResponse, ProfileResponse, UserProfile},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile))
        .route("/users/login-history", get(get_login_history))
}

#[instrument(skip_all)]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> AppResult<Json<ProfileResponse>> {
    let user = state.users.find_by_id(claims.id).await?.ok_or_else(|| {
        warn!(user_id = %claims.id, "token for missing user");
        AppError::NotFound("User not found".into())
    })?;
    Ok(Json(ProfileResponse {
        success: true,
        user: UserProfile::from(&user),
    }))
}

#[instrument(skip_all)]
pub async fn get_login_history(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> AppResult<Json<LoginHistoryResponse>> {
    let login_logs = state
        .login_logs
        .recent_for_user(claims.id, HISTORY_LIMIT)
        .await?;
    Ok(Json(LoginHistoryResponse {
        success: true,
        login_logs,
    }))
}
