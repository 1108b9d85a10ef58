// src/dashboard_data.rs

use std::collections::HashSet;

use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::doc;
use serde::Serialize;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::invite_codes::require_admin;
use crate::models::{timestamp, Profile, SleepLog};

/// Window of activity the dashboard summarises.
pub const ACTIVITY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct OrgStats {
    pub total_members: usize,
    pub active_this_week: usize,
    pub average_sleep_hours: f64,
    pub average_fatigue: f64,
}

impl OrgStats {
    /// `logs` are the members' rows created inside the activity window.
    /// Missing durations and fatigue levels are left out of the means.
    pub fn from_logs(total_members: usize, logs: &[SleepLog]) -> Self {
        let active: HashSet<&str> = logs.iter().map(|l| l.user_id.as_str()).collect();
        let hours: Vec<f64> = logs
            .iter()
            .map(SleepLog::sleep_hours)
            .filter(|h| *h > 0.0)
            .collect();
        let fatigue: Vec<f64> = logs
            .iter()
            .filter(|l| l.fatigue_level > 0)
            .map(|l| l.fatigue_level as f64)
            .collect();

        OrgStats {
            total_members,
            active_this_week: active.len(),
            average_sleep_hours: mean(&hours),
            average_fatigue: mean(&fatigue),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// GET /admin/stats
pub async fn get_org_stats(user: AuthUser, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let (_, org_id) = require_admin(&data, &user).await?;

    let members: Vec<Profile> = data
        .mongodb
        .profiles()
        .find(doc! { "organization_id": &org_id })
        .await?
        .try_collect()
        .await?;
    let member_ids: Vec<&str> = members.iter().map(|p| p.user_id.as_str()).collect();

    let since = Utc::now() - Duration::days(ACTIVITY_WINDOW_DAYS);
    let logs: Vec<SleepLog> = if member_ids.is_empty() {
        Vec::new()
    } else {
        data.mongodb
            .sleep_logs()
            .find(doc! {
                "user_id": { "$in": member_ids },
                "created_at": { "$gte": timestamp::format(&since) },
            })
            .await?
            .try_collect()
            .await?
    };

    Ok(HttpResponse::Ok().json(OrgStats::from_logs(members.len(), &logs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn log(user: &str, hours: Option<i64>, fatigue: u8) -> SleepLog {
        let bed = Utc.with_ymd_and_hms(2026, 10, 18, 23, 0, 0).unwrap();
        SleepLog {
            id: format!("{user}-{fatigue}"),
            user_id: user.into(),
            log_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            bedtime: hours.map(|_| bed),
            wake_time: hours.map(|h| bed + Duration::hours(h)),
            fatigue_level: fatigue,
            had_nap: false,
            nap_duration: None,
            notes: None,
            utc_offset_minutes: 0,
            created_at: bed,
            updated_at: bed,
        }
    }

    #[test]
    fn means_skip_missing_values() {
        let logs = vec![
            log("a", Some(8), 2),
            log("a", Some(6), 4),
            log("b", None, 0),
        ];
        let stats = OrgStats::from_logs(5, &logs);
        assert_eq!(stats.total_members, 5);
        assert_eq!(stats.active_this_week, 2);
        assert_eq!(stats.average_sleep_hours, 7.0);
        assert_eq!(stats.average_fatigue, 3.0);
    }

    #[test]
    fn quiet_week_is_all_zero() {
        assert_eq!(
            OrgStats::from_logs(3, &[]),
            OrgStats {
                total_members: 3,
                ..OrgStats::default()
            }
        );
    }
}
