//! Transactional email: three inline-HTML templates sent through a
//! Resend-compatible API.

use actix_web::{web, HttpResponse};
use log::{error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tera::{Context, Tera};
use validator::Validate;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailKind {
    Signup,
    Reset,
    Invite,
}

impl EmailKind {
    fn template(self) -> &'static str {
        match self {
            EmailKind::Signup => "email/signup.html",
            EmailKind::Reset => "email/reset.html",
            EmailKind::Invite => "email/invite.html",
        }
    }
}

/// Values interpolated into a template.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EmailContext {
    #[validate(url(message = "confirm_url must be a URL"))]
    pub confirm_url: Option<String>,
    pub display_name: Option<String>,
    pub org_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

pub fn render(tera: &Tera, kind: EmailKind, ctx: &EmailContext) -> AppResult<RenderedEmail> {
    let org_name = ctx.org_name.as_deref().unwrap_or("your organization");
    let subject = match kind {
        EmailKind::Signup => "Welcome to Zeno - Confirm Your Account".to_string(),
        EmailKind::Reset => "Reset Your Zeno Password".to_string(),
        EmailKind::Invite => format!("You've been invited to join {} on Zeno", org_name),
    };

    let mut context = Context::new();
    context.insert("confirm_url", ctx.confirm_url.as_deref().unwrap_or("#"));
    if let Some(name) = ctx.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
        context.insert("display_name", name);
    }
    context.insert("org_name", org_name);

    let html = tera.render(kind.template(), &context)?;
    Ok(RenderedEmail { subject, html })
}

#[derive(Clone)]
pub struct Mailer {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl Mailer {
    pub fn new(http: Client, api_url: &str, api_key: Option<String>, from: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            from: from.to_string(),
        }
    }

    /// Sends one message and returns the provider's JSON answer (its message id).
    pub async fn send(&self, to: &str, email: &RenderedEmail) -> AppResult<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("EMAIL_API_KEY not configured".into()))?;

        let resp = self
            .http
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(api_key)
            .json(&SendRequest {
                from: &self.from,
                to: [to],
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!("email API error ({}): {}", status, body);
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let answer: Value = resp.json().await?;
        info!("Email sent successfully: {}", answer);
        Ok(answer)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendEmailRequest {
    #[validate(email(message = "a valid email address is required"))]
    pub email: String,
    #[serde(rename = "type")]
    pub kind: EmailKind,
    #[serde(flatten)]
    #[validate(nested)]
    pub context: EmailContext,
}

/// POST /emails/send
pub async fn send_email(
    _user: AuthUser,
    data: web::Data<AppState>,
    payload: web::Json<SendEmailRequest>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    let rendered = render(&data.templates, payload.kind, &payload.context)?;
    let answer = data.mailer.send(&payload.email, &rendered).await?;
    Ok(HttpResponse::Ok().json(answer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn tera() -> Tera {
        crate::templates::load().unwrap()
    }

    #[test]
    fn signup_greets_by_name_or_as_friend() {
        let ctx = EmailContext {
            confirm_url: Some("https://zeno.example/confirm?t=1".into()),
            display_name: Some("Sam".into()),
            org_name: None,
        };
        let email = render(&tera(), EmailKind::Signup, &ctx).unwrap();
        assert_eq!(email.subject, "Welcome to Zeno - Confirm Your Account");
        assert!(email.html.contains("Welcome to Zeno, Sam!"));
        assert!(email.html.contains("Confirm Your Account"));

        let anonymous = render(&tera(), EmailKind::Signup, &EmailContext::default()).unwrap();
        assert!(anonymous.html.contains("Welcome to Zeno, friend!"));
    }

    #[test]
    fn invite_subject_names_the_organization() {
        let ctx = EmailContext {
            confirm_url: Some("https://zeno.example/?code=ABC123".into()),
            display_name: None,
            org_name: Some("Lincoln High".into()),
        };
        let email = render(&tera(), EmailKind::Invite, &ctx).unwrap();
        assert_eq!(email.subject, "You've been invited to join Lincoln High on Zeno");
        assert!(email.html.contains("Lincoln High has invited you"));
        assert!(email.html.contains("Join Organization"));
    }

    #[test]
    fn interpolated_values_are_escaped() {
        let ctx = EmailContext {
            confirm_url: None,
            display_name: None,
            org_name: Some("<script>alert(1)</script>".into()),
        };
        let email = render(&tera(), EmailKind::Invite, &ctx).unwrap();
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn reset_uses_its_own_tagline() {
        let email = render(&tera(), EmailKind::Reset, &EmailContext::default()).unwrap();
        assert_eq!(email.subject, "Reset Your Zeno Password");
        assert!(email.html.contains("Password Reset Request"));
    }

    #[tokio::test]
    async fn mailer_posts_to_the_provider() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test")
            .match_body(Matcher::Json(json!({
                "from": "Zeno <onboarding@resend.dev>",
                "to": ["sam@school.edu"],
                "subject": "Hi",
                "html": "<p>Hi</p>"
            })))
            .with_status(200)
            .with_body(r#"{"id":"email-1"}"#)
            .create_async()
            .await;

        let mailer = Mailer::new(
            Client::new(),
            &server.url(),
            Some("re_test".into()),
            "Zeno <onboarding@resend.dev>",
        );
        let email = RenderedEmail {
            subject: "Hi".into(),
            html: "<p>Hi</p>".into(),
        };
        let answer = mailer.send("sam@school.edu", &email).await.unwrap();
        mock.assert_async().await;
        assert_eq!(answer["id"], "email-1");
    }

    #[tokio::test]
    async fn mailer_without_key_is_a_config_error() {
        let mailer = Mailer::new(Client::new(), "http://localhost:1", None, "Zeno <a@b.c>");
        let email = RenderedEmail {
            subject: "Hi".into(),
            html: String::new(),
        };
        assert!(matches!(
            mailer.send("sam@school.edu", &email).await,
            Err(AppError::Config(_))
        ));
    }
}
