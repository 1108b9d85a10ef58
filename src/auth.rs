use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpMessage, HttpRequest, HttpResponse};
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::{error, info};
use mongodb::bson::{doc, to_document};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{default_display_name, Profile};

/// Audience the identity provider stamps on user access tokens.
pub const AUDIENCE: &str = "authenticated";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

/// Caller identity, placed in request extensions by the bearer middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub access_token: String,
}

pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUDIENCE]);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &validation)?;
    let claims = data.claims;
    Ok(AuthUser {
        display_name: claims
            .user_metadata
            .get("display_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        id: claims.sub,
        email: claims.email,
        access_token: token.to_string(),
    })
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or(AppError::Unauthorized),
        )
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupInfo {
    #[validate(email(message = "a valid email address is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginInfo {
    #[validate(email(message = "a valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshInfo {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetInfo {
    #[validate(email(message = "a valid email address is required"))]
    pub email: String,
}

fn app_root(data: &AppState) -> &str {
    data.config.app_url.trim_end_matches('/')
}

/// Inserts the profile row unless one exists already.
async fn ensure_profile(data: &AppState, user_id: &str, display_name: &str) -> AppResult<()> {
    let profile = Profile::new(user_id, Some(display_name.to_string()), Utc::now());
    data.mongodb
        .profiles()
        .update_one(
            doc! { "user_id": user_id },
            doc! { "$setOnInsert": to_document(&profile)? },
        )
        .upsert(true)
        .await?;
    Ok(())
}

/// POST /auth/signup
pub async fn signup(
    data: web::Data<AppState>,
    signup_info: web::Json<SignupInfo>,
) -> AppResult<HttpResponse> {
    signup_info.validate()?;
    let display_name =
        default_display_name(signup_info.display_name.as_deref(), &signup_info.email);
    let redirect_to = format!("{}/", app_root(&data));

    let outcome = data
        .identity
        .sign_up(
            &signup_info.email,
            &signup_info.password,
            &display_name,
            &redirect_to,
        )
        .await?;

    if let Some(user) = &outcome.user {
        if let Err(e) = ensure_profile(&data, &user.id, &display_name).await {
            error!("Error creating profile for {}: {}", user.id, e);
        }
        info!("user {} signed up", user.id);
    }
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /auth/login
pub async fn login(
    data: web::Data<AppState>,
    login_info: web::Json<LoginInfo>,
) -> AppResult<HttpResponse> {
    login_info.validate()?;
    let session = data
        .identity
        .sign_in_with_password(&login_info.email, &login_info.password)
        .await?;
    Ok(HttpResponse::Ok().json(session))
}

/// POST /auth/refresh
pub async fn refresh(
    data: web::Data<AppState>,
    payload: web::Json<RefreshInfo>,
) -> AppResult<HttpResponse> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::BadRequest("refresh_token is required".into()));
    }
    let session = data.identity.refresh_session(&payload.refresh_token).await?;
    Ok(HttpResponse::Ok().json(session))
}

/// POST /auth/logout
pub async fn logout(user: AuthUser, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    data.identity.sign_out(&user.access_token).await?;
    info!("user {} signed out", user.id);
    Ok(HttpResponse::NoContent().finish())
}

/// POST /auth/reset
pub async fn reset_password(
    data: web::Data<AppState>,
    payload: web::Json<ResetInfo>,
) -> AppResult<HttpResponse> {
    payload.validate()?;
    let redirect_to = format!("{}/auth/reset", app_root(&data));
    data.identity.recover(&payload.email, &redirect_to).await?;
    Ok(HttpResponse::Ok().json(json!({
        "title": "Check your email",
        "description": "We sent you a password reset link"
    })))
}

/// GET /auth/session: the provider's current view of the caller plus the profile row.
pub async fn session(user: AuthUser, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let identity = data.identity.get_user(&user.access_token).await?;
    let profile = data
        .mongodb
        .profiles()
        .find_one(doc! { "user_id": &identity.id })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "user": {
            "id": identity.id,
            "email": identity.email,
            "display_name": identity.display_name(),
        },
        "profile": profile,
    })))
}
