// organization.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{
    default_display_name, normalize_code, timestamp, InviteCode, Organization, RedeemError,
};

// ─── REQUEST PAYLOADS ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(max = 100, message = "organization name is too long"))]
    pub name: String,
    #[validate(email(message = "a valid admin email is required"))]
    pub admin_email: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub code: String,
}

// ─── STORE HELPERS ────────────────────────────────────────────────────────────

/// Matches a code that can take one more member at `now`.
pub fn claimable_filter(code: &str, now: DateTime<Utc>) -> Document {
    doc! {
        "code": code,
        "is_active": true,
        "$and": [
            { "$or": [
                { "max_uses": null },
                { "$expr": { "$lt": ["$current_uses", "$max_uses"] } },
            ] },
            { "$or": [
                { "expires_at": null },
                { "expires_at": { "$gt": timestamp::format(&now) } },
            ] },
        ],
    }
}

/// Takes one use of `code` in a single conditional update. `None` means the
/// code could not take another member.
async fn claim_use(data: &AppState, code: &str, now: DateTime<Utc>) -> AppResult<Option<InviteCode>> {
    Ok(data
        .mongodb
        .invite_codes()
        .find_one_and_update(
            claimable_filter(code, now),
            doc! { "$inc": { "current_uses": 1 } },
        )
        .return_document(ReturnDocument::After)
        .await?)
}

async fn release_use(data: &AppState, code: &str) {
    let released = data
        .mongodb
        .invite_codes()
        .update_one(
            doc! { "code": code, "current_uses": { "$gt": 0 } },
            doc! { "$inc": { "current_uses": -1 } },
        )
        .await;
    if let Err(e) = released {
        error!("Error releasing claimed use of {}: {}", code, e);
    }
}

/// Points the caller's profile at `organization_id`, creating the row if needed.
async fn attach_profile(
    data: &AppState,
    user: &AuthUser,
    organization_id: &str,
    is_admin: bool,
    joined_via_code: Option<&str>,
) -> AppResult<()> {
    let now = timestamp::format(&Utc::now());
    let display_name = default_display_name(
        user.display_name.as_deref(),
        user.email.as_deref().unwrap_or_default(),
    );
    data.mongodb
        .profiles()
        .update_one(
            doc! { "user_id": &user.id },
            doc! {
                "$set": {
                    "organization_id": organization_id,
                    "is_admin": is_admin,
                    "display_name": display_name,
                    "joined_via_code": joined_via_code,
                    "updated_at": now.as_str(),
                },
                "$setOnInsert": { "created_at": now.as_str() },
            },
        )
        .upsert(true)
        .await?;
    Ok(())
}

fn join_failed(user_id: &str, e: AppError) -> AppError {
    error!("Error joining organization for {}: {}", user_id, e);
    AppError::rejected("Error", "Failed to join organization")
}

// ─── ENDPOINTS ────────────────────────────────────────────────────────────────

// POST /organizations
// Creates the organization, makes the caller its admin and registers the
// referral code as the first invite code. No rollback between the steps.
pub async fn create_organization(
    user: AuthUser,
    data: web::Data<AppState>,
    payload: web::Json<CreateOrganizationRequest>,
) -> AppResult<HttpResponse> {
    if payload.name.trim().is_empty() || payload.admin_email.trim().is_empty() {
        return Err(AppError::rejected("Missing information", "Please fill in all fields"));
    }
    payload.validate()?;

    let now = Utc::now();
    let org = Organization::new(&payload.name, &payload.admin_email, now);

    let failed = |step: &str, e: AppError| {
        error!("Error creating organization ({}): {}", step, e);
        AppError::rejected("Error", "Failed to create organization")
    };

    data.mongodb
        .organizations()
        .insert_one(&org)
        .await
        .map_err(|e| failed("insert", e.into()))?;
    attach_profile(&data, &user, &org.id, true, None)
        .await
        .map_err(|e| failed("profile", e))?;
    let first_code = InviteCode::new(org.referral_code.clone(), &org.id, &user.id, None, now);
    data.mongodb
        .invite_codes()
        .insert_one(&first_code)
        .await
        .map_err(|e| failed("invite code", e.into()))?;

    info!("organization {} created by {}", org.id, user.id);
    Ok(HttpResponse::Created().json(json!({
        "title": "Organization created!",
        "description": format!("Your referral code is: {}", org.referral_code),
        "organization": org,
    })))
}

// POST /organizations/join
pub async fn join_organization(
    user: AuthUser,
    data: web::Data<AppState>,
    payload: web::Json<JoinRequest>,
) -> AppResult<HttpResponse> {
    if payload.code.trim().is_empty() {
        return Err(AppError::rejected("Missing code", "Please enter an invite code"));
    }
    let code = normalize_code(&payload.code).ok_or(RedeemError::Invalid)?;
    let now = Utc::now();

    let existing = data
        .mongodb
        .invite_codes()
        .find_one(doc! { "code": &code, "is_active": true })
        .await?
        .ok_or(RedeemError::Invalid)?;
    existing.check_redeemable(now)?;

    // Lost a race for the last use between the read above and this update.
    let claimed = claim_use(&data, &code, now)
        .await?
        .ok_or(RedeemError::Exhausted)?;

    if let Err(e) = attach_profile(&data, &user, &claimed.organization_id, false, Some(&code)).await {
        warn!("profile update failed after claiming {}, releasing", code);
        release_use(&data, &code).await;
        return Err(join_failed(&user.id, e));
    }

    info!("user {} joined {} via {}", user.id, claimed.organization_id, code);
    Ok(HttpResponse::Ok().json(json!({
        "title": "Joined organization!",
        "description": "Welcome to your organization",
        "organization_id": claimed.organization_id,
    })))
}

// GET /profile
pub async fn get_profile(user: AuthUser, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let profile = data
        .mongodb
        .profiles()
        .find_one(doc! { "user_id": &user.id })
        .await?;

    let organization = match profile.as_ref().and_then(|p| p.organization_id.as_deref()) {
        Some(org_id) => {
            data.mongodb
                .organizations()
                .find_one(doc! { "id": org_id })
                .await?
        }
        None => None,
    };

    Ok(HttpResponse::Ok().json(json!({
        "profile": profile,
        "organization": organization,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, ResponseError};
    use chrono::TimeZone;

    #[actix_web::test]
    async fn failed_join_keeps_the_toast_text() {
        let cause = AppError::Config("store unavailable".into());
        let err = join_failed("user-1", cause);
        assert_eq!(err.status_code().as_u16(), 400);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["title"], "Error");
        assert_eq!(json["description"], "Failed to join organization");
    }

    #[test]
    fn claim_filter_enforces_ceiling_and_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let filter = claimable_filter("ABC123", now);

        assert_eq!(filter.get_str("code").unwrap(), "ABC123");
        assert!(filter.get_bool("is_active").unwrap());

        let clauses = filter.get_array("$and").unwrap();
        assert_eq!(clauses.len(), 2);
        let ceiling = clauses[0].as_document().unwrap().get_array("$or").unwrap();
        assert!(ceiling[0].as_document().unwrap().contains_key("max_uses"));
        assert!(ceiling[1].as_document().unwrap().contains_key("$expr"));

        let expiry = clauses[1].as_document().unwrap().get_array("$or").unwrap();
        let after = expiry[1]
            .as_document()
            .unwrap()
            .get_document("expires_at")
            .unwrap()
            .get_str("$gt")
            .unwrap();
        assert_eq!(after, "2026-10-19T12:00:00.000Z");
    }
}
