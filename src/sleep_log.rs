use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use futures_util::TryStreamExt;
use log::{error, info};
use mongodb::bson::{doc, to_document, Document};
use mongodb::options::ReturnDocument;
use serde::Deserialize;
use validator::Validate;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{SleepLog, SleepLogInput, SleepLogView};

const DEFAULT_LIST_LIMIT: i64 = 30;
const MAX_LIST_LIMIT: i64 = 365;

/// Splits a row into the fields every upsert overwrites and the ones only
/// an insert sets.
fn upsert_update(log: &SleepLog) -> AppResult<Document> {
    let mut set = to_document(log)?;
    let mut on_insert = Document::new();
    for key in ["id", "created_at"] {
        if let Some(value) = set.remove(key) {
            on_insert.insert(key, value);
        }
    }
    Ok(doc! { "$set": set, "$setOnInsert": on_insert })
}

/// PUT /sleep-logs/today
pub async fn save_today(
    user: AuthUser,
    data: web::Data<AppState>,
    payload: web::Json<SleepLogInput>,
) -> AppResult<HttpResponse> {
    let input = payload.into_inner();
    input.validate()?;
    let log = input.into_log(&user.id, Utc::now())?;

    let filter = doc! { "user_id": &user.id, "log_date": log.log_date.to_string() };
    let saved = data
        .mongodb
        .sleep_logs()
        .find_one_and_update(filter, upsert_update(&log)?)
        .upsert(true)
        .return_document(ReturnDocument::After)
        .await
        .map_err(|e| {
            error!("Error saving sleep log for {}: {}", user.id, e);
            AppError::Database(e)
        })?
        .ok_or_else(|| AppError::NotFound("Sleep log not found after save".into()))?;

    info!("sleep log {} saved for {}", saved.log_date, user.id);
    Ok(HttpResponse::Ok().json(saved))
}

#[derive(Debug, Deserialize)]
pub struct TodayQuery {
    pub today: Option<NaiveDate>,
}

/// GET /sleep-logs/today
pub async fn get_today(
    user: AuthUser,
    data: web::Data<AppState>,
    query: web::Query<TodayQuery>,
) -> AppResult<HttpResponse> {
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    let log = data
        .mongodb
        .sleep_logs()
        .find_one(doc! { "user_id": &user.id, "log_date": today.to_string() })
        .await?;

    Ok(HttpResponse::Ok().json(log.as_ref().map(SleepLogView::from)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

fn list_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// GET /sleep-logs
pub async fn list_logs(
    user: AuthUser,
    data: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> AppResult<HttpResponse> {
    let logs: Vec<SleepLog> = data
        .mongodb
        .sleep_logs()
        .find(doc! { "user_id": &user.id })
        .sort(doc! { "log_date": -1 })
        .limit(list_limit(query.limit))
        .await?
        .try_collect()
        .await?;

    Ok(HttpResponse::Ok().json(logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> SleepLogInput {
        serde_json::from_value(serde_json::json!({
            "bedtime": "23:00",
            "wake_time": "07:00",
            "fatigue_level": 3,
            "log_date": "2026-10-19"
        }))
        .unwrap()
    }

    #[test]
    fn upsert_keeps_identity_fields_for_inserts_only() {
        let log = input().into_log("u1", Utc::now()).unwrap();
        let update = upsert_update(&log).unwrap();

        let set = update.get_document("$set").unwrap();
        assert!(!set.contains_key("id"));
        assert!(!set.contains_key("created_at"));
        assert_eq!(set.get_str("log_date").unwrap(), "2026-10-19");
        assert_eq!(set.get_i32("fatigue_level").unwrap(), 3);

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert_eq!(on_insert.get_str("id").unwrap(), log.id);
        assert!(on_insert.contains_key("created_at"));
    }

    #[test]
    fn list_limit_is_bounded() {
        assert_eq!(list_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(list_limit(Some(0)), 1);
        assert_eq!(list_limit(Some(10_000)), MAX_LIST_LIMIT);
    }
}
