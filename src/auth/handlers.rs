use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::service::parse_user_id;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub app_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub user_id: String,
    pub refresh_token: String,
    pub app_id: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IsAdminResponse {
    pub is_admin: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("/users/{user_id}/admin", web::get().to(is_admin)),
    );
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    debug!("Received registration request");
    let user_id = state.auth_service.register(&req.email, &req.password).await?;

    Ok(HttpResponse::Created().json(RegisterResponse { user_id }))
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    debug!(app_id = req.app_id, "Received login request");
    let pair = state
        .auth_service
        .login(&req.email, &req.password, req.app_id)
        .await?;

    Ok(HttpResponse::Ok().json(pair))
}

pub async fn refresh(
    req: web::Json<RefreshRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_id = parse_user_id(&req.user_id)?;
    debug!(%user_id, app_id = req.app_id, "Received refresh request");

    let pair = state
        .auth_service
        .refresh_token_pair(user_id, &req.refresh_token, req.app_id)
        .await?;

    Ok(HttpResponse::Ok().json(pair))
}

pub async fn is_admin(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_id = parse_user_id(&path.into_inner())?;
    let is_admin = state.auth_service.is_admin(user_id).await?;
    info!(%user_id, is_admin, "Admin check answered");

    Ok(HttpResponse::Ok().json(IsAdminResponse { is_admin }))
}
