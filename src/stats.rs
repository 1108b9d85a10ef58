//! Sleep statistics over a user's log history.
//!
//! Aggregation is a pure function of the rows and "today"; the handler only
//! fetches rows and falls back to the last good result when the fetch fails.

use std::collections::HashMap;
use std::sync::RwLock;

use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use futures_util::TryStreamExt;
use log::{debug, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::models::SleepLog;

pub const RECENT_LIMIT: usize = 7;
pub const TREND_LIMIT: usize = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepStats {
    pub average_sleep_hours: f64,
    pub average_fatigue: f64,
    pub total_logs: usize,
    pub streak_days: u32,
    pub recent_logs: Vec<DayPoint>,
    pub trend_data: Vec<DayPoint>,
}

/// One row of the recent list (relative label) or the trend chart (ISO date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPoint {
    pub date: String,
    pub sleep_hours: f64,
    pub fatigue_level: u8,
}

impl SleepStats {
    pub fn compute(logs: &[SleepLog], today: NaiveDate) -> Self {
        if logs.is_empty() {
            return SleepStats::default();
        }

        let mut sorted: Vec<&SleepLog> = logs.iter().collect();
        sorted.sort_by(|a, b| b.log_date.cmp(&a.log_date));

        let count = sorted.len() as f64;
        let total_hours: f64 = sorted.iter().map(|l| l.sleep_hours()).sum();
        let total_fatigue: f64 = sorted.iter().map(|l| l.fatigue_level as f64).sum();

        let recent_logs = sorted
            .iter()
            .take(RECENT_LIMIT)
            .map(|l| DayPoint {
                date: relative_label(l.log_date, today),
                sleep_hours: l.sleep_hours(),
                fatigue_level: l.fatigue_level,
            })
            .collect();

        let trend_data = sorted
            .iter()
            .take(TREND_LIMIT)
            .rev()
            .map(|l| DayPoint {
                date: l.log_date.format("%Y-%m-%d").to_string(),
                sleep_hours: l.sleep_hours(),
                fatigue_level: l.fatigue_level,
            })
            .collect();

        SleepStats {
            average_sleep_hours: total_hours / count,
            average_fatigue: total_fatigue / count,
            total_logs: sorted.len(),
            streak_days: streak(sorted.iter().map(|l| l.log_date), today),
            recent_logs,
            trend_data,
        }
    }
}

/// Consecutive days ending today that have a log. `dates` must be newest first.
pub fn streak(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let mut expected = today;
    let mut days = 0;
    for date in dates {
        if date != expected {
            break;
        }
        days += 1;
        match expected.pred_opt() {
            Some(prev) => expected = prev,
            None => break,
        }
    }
    days
}

/// "Today", "Yesterday" or "<n> days ago".
pub fn relative_label(date: NaiveDate, today: NaiveDate) -> String {
    match (today - date).num_days().abs() {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        n => format!("{n} days ago"),
    }
}

/// Entries kept before the cache starts evicting.
pub const STATS_CACHE_CAPACITY: usize = 1024;

/// Last successfully computed stats per user, served when a fetch fails.
/// Lives for the process and holds at most `capacity` users; storing a new
/// user into a full cache evicts an arbitrary other one.
pub struct StatsCache {
    inner: RwLock<HashMap<String, SleepStats>>,
    capacity: usize,
}

impl Default for StatsCache {
    fn default() -> Self {
        StatsCache::with_capacity(STATS_CACHE_CAPACITY)
    }
}

impl StatsCache {
    pub fn with_capacity(capacity: usize) -> Self {
        StatsCache {
            inner: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn store(&self, user_id: &str, stats: &SleepStats) {
        if let Ok(mut map) = self.inner.write() {
            if map.len() >= self.capacity && !map.contains_key(user_id) {
                if let Some(evicted) = map.keys().next().cloned() {
                    map.remove(&evicted);
                }
            }
            map.insert(user_id.to_string(), stats.clone());
        }
    }

    pub fn last(&self, user_id: &str) -> SleepStats {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(user_id).cloned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub today: Option<NaiveDate>,
}

/// GET /stats
pub async fn get_stats(
    user: AuthUser,
    data: web::Data<AppState>,
    query: web::Query<StatsQuery>,
) -> AppResult<HttpResponse> {
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());

    let fetched: mongodb::error::Result<Vec<SleepLog>> = async {
        data.mongodb
            .sleep_logs()
            .find(doc! { "user_id": &user.id })
            .sort(doc! { "log_date": -1 })
            .await?
            .try_collect()
            .await
    }
    .await;

    let stats = match fetched {
        Ok(logs) => {
            debug!("computing stats over {} logs for {}", logs.len(), user.id);
            let stats = SleepStats::compute(&logs, today);
            data.stats_cache.store(&user.id, &stats);
            stats
        }
        Err(e) => {
            warn!("Error loading sleep stats for {}: {}", user.id, e);
            data.stats_cache.last(&user.id)
        }
    };

    Ok(HttpResponse::Ok().json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::token;
    use crate::auth::AUDIENCE;
    use actix_web::{http::header, App};
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn log(date: NaiveDate, hours: i64, fatigue: u8) -> SleepLog {
        let bed = Utc.from_utc_datetime(&date.and_hms_opt(22, 0, 0).unwrap());
        SleepLog {
            id: format!("log-{date}"),
            user_id: "u1".into(),
            log_date: date,
            bedtime: Some(bed),
            wake_time: Some(bed + Duration::hours(hours)),
            fatigue_level: fatigue,
            had_nap: false,
            nap_duration: None,
            notes: None,
            utc_offset_minutes: 0,
            created_at: bed,
            updated_at: bed,
        }
    }

    const TODAY: (i32, u32, u32) = (2026, 10, 19);

    fn today() -> NaiveDate {
        day(TODAY.0, TODAY.1, TODAY.2)
    }

    #[test]
    fn averages_over_all_rows() {
        let logs = vec![log(today(), 8, 4), log(today().pred_opt().unwrap(), 6, 2)];
        let stats = SleepStats::compute(&logs, today());
        assert_eq!(stats.average_sleep_hours, 7.0);
        assert_eq!(stats.average_fatigue, 3.0);
        assert_eq!(stats.total_logs, 2);
    }

    #[test]
    fn rows_missing_a_timestamp_drag_the_average_down() {
        let mut missing = log(day(2026, 10, 18), 8, 3);
        missing.bedtime = None;
        let logs = vec![log(today(), 8, 3), missing];
        let stats = SleepStats::compute(&logs, today());
        assert_eq!(stats.average_sleep_hours, 4.0);
    }

    #[test]
    fn streak_stops_at_the_first_gap() {
        let logs = vec![
            log(today(), 8, 3),
            log(day(2026, 10, 18), 7, 3),
            log(day(2026, 10, 16), 7, 3),
        ];
        assert_eq!(SleepStats::compute(&logs, today()).streak_days, 2);
    }

    #[test]
    fn no_log_today_means_no_streak() {
        let logs = vec![log(day(2026, 10, 18), 8, 3), log(day(2026, 10, 17), 8, 3)];
        assert_eq!(SleepStats::compute(&logs, today()).streak_days, 0);
    }

    #[test]
    fn streak_is_order_independent() {
        let logs = vec![
            log(day(2026, 10, 17), 8, 3),
            log(today(), 8, 3),
            log(day(2026, 10, 18), 8, 3),
        ];
        assert_eq!(SleepStats::compute(&logs, today()).streak_days, 3);
    }

    #[rstest]
    #[case(0, "Today")]
    #[case(1, "Yesterday")]
    #[case(2, "2 days ago")]
    #[case(6, "6 days ago")]
    #[case(-1, "Yesterday")]
    fn relative_labels(#[case] days_back: i64, #[case] expected: &str) {
        let date = today() - Duration::days(days_back);
        assert_eq!(relative_label(date, today()), expected);
    }

    #[test]
    fn recent_view_and_trend_are_bounded() {
        let logs: Vec<SleepLog> = (0..40)
            .map(|i| log(today() - Duration::days(i), 7, (i % 5 + 1) as u8))
            .collect();
        let stats = SleepStats::compute(&logs, today());

        assert_eq!(stats.recent_logs.len(), RECENT_LIMIT);
        assert_eq!(stats.recent_logs[0].date, "Today");
        assert_eq!(stats.recent_logs[1].date, "Yesterday");

        assert_eq!(stats.trend_data.len(), TREND_LIMIT);
        assert_eq!(stats.trend_data.first().unwrap().date, "2026-09-20");
        assert_eq!(stats.trend_data.last().unwrap().date, "2026-10-19");
        assert_eq!(stats.streak_days, 40);
    }

    #[test]
    fn empty_history_is_all_zero() {
        assert_eq!(SleepStats::compute(&[], today()), SleepStats::default());
    }

    #[test]
    fn cache_serves_last_good_value() {
        let cache = StatsCache::default();
        assert_eq!(cache.last("u1"), SleepStats::default());

        let stats = SleepStats::compute(&[log(today(), 8, 4)], today());
        cache.store("u1", &stats);
        assert_eq!(cache.last("u1"), stats);
        assert_eq!(cache.last("u2"), SleepStats::default());
    }

    #[test]
    fn cache_never_grows_past_its_capacity() {
        let cache = StatsCache::with_capacity(2);
        let stats = SleepStats::compute(&[log(today(), 8, 4)], today());
        for user in ["u1", "u2", "u3", "u4"] {
            cache.store(user, &stats);
        }
        assert_eq!(cache.inner.read().unwrap().len(), 2);
        assert_eq!(cache.last("u4"), stats);

        cache.store("u4", &SleepStats::default());
        assert_eq!(cache.inner.read().unwrap().len(), 2);
        assert_eq!(cache.last("u4"), SleepStats::default());
    }

    async fn get_stats_for(state: AppState) -> (u16, SleepStats) {
        let app = actix_web::test::init_service(
            App::new()
                .wrap(crate::Authentication::new("test-secret"))
                .app_data(web::Data::new(state))
                .route("/stats", web::get().to(get_stats)),
        )
        .await;
        let jwt = token("test-secret", "user-1", AUDIENCE, 3600);
        let req = actix_web::test::TestRequest::get()
            .uri("/stats?today=2026-10-19")
            .insert_header((header::AUTHORIZATION, format!("Bearer {jwt}")))
            .to_request();
        let resp = actix_web::test::call_service(&app, req).await;
        let status = resp.status().as_u16();
        (status, actix_web::test::read_body_json(resp).await)
    }

    #[actix_web::test]
    async fn failed_fetch_answers_with_empty_stats() {
        let (status, stats) = get_stats_for(AppState::for_tests_with_store_down().await).await;
        assert_eq!(status, 200);
        assert_eq!(stats, SleepStats::default());
    }

    #[actix_web::test]
    async fn failed_fetch_answers_with_last_good_stats() {
        let state = AppState::for_tests_with_store_down().await;
        let cached = SleepStats::compute(&[log(today(), 8, 4)], today());
        state.stats_cache.store("user-1", &cached);

        let (status, stats) = get_stats_for(state).await;
        assert_eq!(status, 200);
        assert_eq!(stats, cached);
    }
}
