use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::timestamp;
use crate::error::AppError;

pub const CODE_LEN: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static CODE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{4,16}$").expect("valid invite code regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub admin_email: String,
    pub referral_code: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: &str, admin_email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            admin_email: admin_email.trim().to_string(),
            referral_code: generate_code(&mut rand::thread_rng()),
            created_at: now,
        }
    }
}

/// Short code gating membership of an organization.
///
/// Lifecycle is active -> inactive only. `current_uses` never passes
/// `max_uses` when a ceiling is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteCode {
    pub id: String,
    pub code: String,
    pub organization_id: String,
    pub created_by: String,
    #[serde(default)]
    pub current_uses: u32,
    pub max_uses: Option<u32>,
    pub is_active: bool,
    #[serde(with = "timestamp::option", default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RedeemError {
    #[error("invite code is invalid or expired")]
    Invalid,
    #[error("invite code has reached its maximum uses")]
    Exhausted,
}

impl From<RedeemError> for AppError {
    fn from(err: RedeemError) -> Self {
        match err {
            RedeemError::Invalid => {
                AppError::rejected("Invalid code", "The invite code is invalid or expired")
            }
            RedeemError::Exhausted => {
                AppError::rejected("Code expired", "This invite code has reached its maximum uses")
            }
        }
    }
}

impl InviteCode {
    pub fn new(
        code: String,
        organization_id: &str,
        created_by: &str,
        max_uses: Option<u32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            code,
            organization_id: organization_id.to_string(),
            created_by: created_by.to_string(),
            current_uses: 0,
            max_uses,
            is_active: true,
            expires_at: None,
            created_at: now,
        }
    }

    /// Whether one more member may join through this code at `now`.
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<(), RedeemError> {
        if !self.is_active || self.expires_at.is_some_and(|at| at <= now) {
            return Err(RedeemError::Invalid);
        }
        match self.max_uses {
            Some(max) if self.current_uses >= max => Err(RedeemError::Exhausted),
            _ => Ok(()),
        }
    }

    /// `"3"` or `"3/10"`, as shown in the admin list.
    pub fn usage_label(&self) -> String {
        match self.max_uses {
            Some(max) => format!("{}/{}", self.current_uses, max),
            None => self.current_uses.to_string(),
        }
    }
}

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Trims and upper-cases user input; `None` when it cannot be a code.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    CODE_FORMAT.is_match(&code).then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn code(max_uses: Option<u32>) -> InviteCode {
        InviteCode::new("ABC123".into(), "org", "admin", max_uses, Utc::now())
    }

    fn redeem(invite: &mut InviteCode, now: DateTime<Utc>) -> Result<(), RedeemError> {
        invite.check_redeemable(now)?;
        invite.current_uses += 1;
        Ok(())
    }

    #[test]
    fn repeated_redemption_never_passes_the_ceiling() {
        let now = Utc::now();
        let mut invite = code(Some(3));
        let accepted = (0..10).filter(|_| redeem(&mut invite, now).is_ok()).count();
        assert_eq!(accepted, 3);
        assert_eq!(invite.current_uses, 3);
        assert_eq!(redeem(&mut invite, now), Err(RedeemError::Exhausted));
    }

    #[test]
    fn unlimited_codes_keep_counting() {
        let now = Utc::now();
        let mut invite = code(None);
        for _ in 0..50 {
            redeem(&mut invite, now).unwrap();
        }
        assert_eq!(invite.usage_label(), "50");
    }

    #[test]
    fn inactive_codes_are_invalid() {
        let now = Utc::now();
        let mut invite = code(None);
        invite.is_active = false;
        assert_eq!(invite.check_redeemable(now), Err(RedeemError::Invalid));
    }

    #[test]
    fn expired_codes_are_invalid() {
        let now = Utc::now();
        let mut invite = code(Some(5));
        invite.expires_at = Some(now - Duration::minutes(1));
        assert_eq!(invite.check_redeemable(now), Err(RedeemError::Invalid));
        invite.expires_at = Some(now + Duration::days(1));
        assert_eq!(invite.check_redeemable(now), Ok(()));
    }

    #[rstest]
    #[case(" abc123 ", Some("ABC123"))]
    #[case("Xy9z", Some("XY9Z"))]
    #[case("abc", None)]
    #[case("abc-123", None)]
    #[case("", None)]
    fn codes_are_normalized(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_code(raw).as_deref(), expected);
    }

    #[test]
    fn generated_codes_are_six_upper_alphanumerics() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), CODE_LEN);
            assert_eq!(normalize_code(&code).as_deref(), Some(code.as_str()));
        }
    }

    #[test]
    fn usage_label_shows_the_ceiling() {
        let mut invite = code(Some(10));
        invite.current_uses = 3;
        assert_eq!(invite.usage_label(), "3/10");
    }
}
