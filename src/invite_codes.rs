use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt;
use log::{info, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::email::{render, EmailContext, EmailKind};
use crate::error::{is_duplicate_key, AppError, AppResult};
use crate::models::{generate_code, InviteCode, Profile};
use crate::qr::{qr_code_url, DEFAULT_SIZE};

const GENERATE_ATTEMPTS: usize = 5;

/// Profile of the caller when it administers an organization.
pub async fn require_admin(data: &AppState, user: &AuthUser) -> AppResult<(Profile, String)> {
    let profile = data
        .mongodb
        .profiles()
        .find_one(doc! { "user_id": &user.id })
        .await?
        .ok_or_else(|| AppError::Forbidden("Organization admin access required".into()))?;
    match profile.admin_of() {
        Some(org_id) => {
            let org_id = org_id.to_string();
            Ok((profile, org_id))
        }
        None => Err(AppError::Forbidden(
            "Organization admin access required".into(),
        )),
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct GenerateRequest {
    #[validate(range(min = 1, message = "max_uses must be at least 1"))]
    pub max_uses: Option<u32>,
}

/// An invite code as the admin list shows it.
#[derive(Debug, Serialize)]
pub struct InviteCodeView {
    #[serde(flatten)]
    pub code: InviteCode,
    pub usage: String,
    pub join_link: String,
    pub qr_url: String,
}

impl InviteCodeView {
    pub fn new(code: InviteCode, data: &AppState) -> AppResult<Self> {
        let join_link = data.config.join_link(&code.code);
        let qr_url = qr_code_url(&data.config.qr_endpoint, &join_link, DEFAULT_SIZE)?.to_string();
        Ok(InviteCodeView {
            usage: code.usage_label(),
            code,
            join_link,
            qr_url,
        })
    }
}

/// POST /admin/invite-codes
pub async fn generate_invite_code(
    user: AuthUser,
    data: web::Data<AppState>,
    payload: Option<web::Json<GenerateRequest>>,
) -> AppResult<HttpResponse> {
    let request = payload.map(web::Json::into_inner).unwrap_or_default();
    request.validate()?;
    let (_, org_id) = require_admin(&data, &user).await?;

    for attempt in 1..=GENERATE_ATTEMPTS {
        let code = generate_code(&mut rand::thread_rng());
        let invite = InviteCode::new(code, &org_id, &user.id, request.max_uses, Utc::now());
        match data.mongodb.invite_codes().insert_one(&invite).await {
            Ok(_) => {
                info!("invite code {} generated for {}", invite.code, org_id);
                return Ok(HttpResponse::Created().json(InviteCodeView::new(invite, &data)?));
            }
            Err(e) if is_duplicate_key(&e) => {
                warn!("invite code collision on attempt {}", attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::rejected("Error", "Failed to generate invite code"))
}

/// GET /admin/invite-codes: newest first.
pub async fn list_invite_codes(
    user: AuthUser,
    data: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let (_, org_id) = require_admin(&data, &user).await?;
    let codes: Vec<InviteCode> = data
        .mongodb
        .invite_codes()
        .find(doc! { "organization_id": &org_id })
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    let views = codes
        .into_iter()
        .map(|code| InviteCodeView::new(code, &data))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(HttpResponse::Ok().json(views))
}

/// POST /admin/invite-codes/{id}/deactivate. Idempotent.
pub async fn deactivate_invite_code(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let (_, org_id) = require_admin(&data, &user).await?;
    let id = path.into_inner();
    let result = data
        .mongodb
        .invite_codes()
        .update_one(
            doc! { "id": &id, "organization_id": &org_id },
            doc! { "$set": { "is_active": false } },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("Invite code not found".into()));
    }
    info!("invite code {} deactivated", id);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "title": "Code deactivated",
        "description": "The invite code can no longer be used",
    })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailInviteRequest {
    #[validate(email(message = "a valid email address is required"))]
    pub email: String,
}

/// POST /admin/invite-codes/{id}/email
pub async fn email_invite_code(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<EmailInviteRequest>,
) -> AppResult<HttpResponse> {
    payload.validate()?;
    let (_, org_id) = require_admin(&data, &user).await?;

    let code = data
        .mongodb
        .invite_codes()
        .find_one(doc! { "id": path.as_str(), "organization_id": &org_id })
        .await?
        .ok_or_else(|| AppError::NotFound("Invite code not found".into()))?;
    let org = data
        .mongodb
        .organizations()
        .find_one(doc! { "id": &org_id })
        .await?
        .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

    let context = EmailContext {
        confirm_url: Some(data.config.join_link(&code.code)),
        display_name: None,
        org_name: Some(org.name),
    };
    let email = render(&data.templates, EmailKind::Invite, &context)?;
    let answer = data.mailer.send(&payload.email, &email).await?;

    info!("invite {} emailed for {}", code.code, org_id);
    Ok(HttpResponse::Ok().json(answer))
}
