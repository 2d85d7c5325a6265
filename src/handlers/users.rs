use crate::state::AppState;
use actix_web::{Error, HttpResponse, error::InternalError, get, http::StatusCode, post, web};
use common::{LedgerError, Role};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub role: Option<Role>,
}

fn server_error(context: &str, e: LedgerError) -> Error {
    log::error!("{}: {}", context, e);
    InternalError::new("Server error", StatusCode::INTERNAL_SERVER_ERROR).into()
}

fn user_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "message": "User not found" }))
}

#[get("/users/by-telegram/{telegram_id}")]
pub async fn get_user_by_telegram(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let telegram_id = path.into_inner();

    let maybe_user = app_state
        .db
        .user_by_telegram(telegram_id)
        .await
        .map_err(|e| server_error("Failed to fetch user by telegram id", e))?;

    match maybe_user {
        Some(user) => Ok(HttpResponse::Ok().json(user)),
        None => Ok(user_not_found()),
    }
}

#[post("/users/register")]
pub async fn register_user(
    body: web::Json<RegisterRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let RegisterRequest {
        telegram_id,
        username,
    } = body.into_inner();
    let Some(telegram_id) = telegram_id else {
        return Ok(HttpResponse::BadRequest().json(json!({ "message": "telegramId is required" })));
    };

    let registration = app_state
        .db
        .register_user(telegram_id, username.as_deref())
        .await
        .map_err(|e| server_error("Failed to register user", e))?;

    if registration.created {
        Ok(HttpResponse::Created().json(registration.user))
    } else {
        Ok(HttpResponse::Ok().json(registration.user))
    }
}

#[get("/users/pending")]
pub async fn get_pending_users(app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let users = app_state
        .db
        .pending_users()
        .await
        .map_err(|e| server_error("Failed to fetch pending users", e))?;

    Ok(HttpResponse::Ok().json(users))
}

/// Approves a pending user. Without a body role the requested role is used.
#[post("/users/{id}/approve")]
pub async fn approve_user(
    path: web::Path<i64>,
    body: Option<web::Json<ApproveRequest>>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let user_id = path.into_inner();

    let user = match app_state.db.user(user_id).await {
        Ok(user) => user,
        Err(LedgerError::NotFound { .. }) => return Ok(user_not_found()),
        Err(e) => return Err(server_error("Failed to fetch user", e)),
    };
    let role = body
        .and_then(|b| b.into_inner().role)
        .or(user.requested_role)
        .unwrap_or(Role::User);

    match app_state.db.approve_user(user_id, role).await {
        Ok(user) => Ok(HttpResponse::Ok().json(user)),
        Err(LedgerError::NotFound { .. }) => {
            log::warn!("Approve requested for non-pending user {}", user_id);
            Ok(user_not_found())
        }
        Err(e) => Err(server_error("Failed to approve user", e)),
    }
}
