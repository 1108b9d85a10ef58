use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp;

/// Per-user record linking an identity to an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub organization_id: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub joined_via_code: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(user_id: &str, display_name: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name,
            organization_id: None,
            is_admin: false,
            joined_via_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Organization the profile administers, if any.
    pub fn admin_of(&self) -> Option<&str> {
        if self.is_admin {
            self.organization_id.as_deref()
        } else {
            None
        }
    }
}

/// Name shown for a user: the chosen display name or the local part of the email.
pub fn default_display_name(display_name: Option<&str>, email: &str) -> String {
    display_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_email_local_part() {
        assert_eq!(default_display_name(None, "sam@school.edu"), "sam");
        assert_eq!(default_display_name(Some("  "), "sam@school.edu"), "sam");
        assert_eq!(default_display_name(Some("Sam K"), "sam@school.edu"), "Sam K");
    }

    #[test]
    fn only_admins_administer() {
        let mut profile = Profile::new("u1", None, Utc::now());
        profile.organization_id = Some("org".into());
        assert_eq!(profile.admin_of(), None);
        profile.is_admin = true;
        assert_eq!(profile.admin_of(), Some("org"));
    }
}
