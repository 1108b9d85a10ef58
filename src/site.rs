//! Server-rendered pages: the Oneria site and the Zeno landing page.

use actix_web::{web, HttpResponse};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tera::Context;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::models::normalize_code;

pub const CONTACT_EMAIL: &str = "info.oneria@gmail.com";
pub const DONATE_URL: &str = "https://hcb.hackclub.com/donations/start/oneria";
pub const INSTAGRAM_URL: &str = "https://instagram.com/oneriaorg";
pub const ONERIA_URL: &str = "https://oneria.org";
pub const ZENO_URL: &str = "https://app.oneria.org";

#[derive(Serialize)]
struct Link {
    name: &'static str,
    href: &'static str,
    external: bool,
}

const fn anchor(name: &'static str, href: &'static str) -> Link {
    Link {
        name,
        href,
        external: false,
    }
}

#[derive(Serialize)]
struct Stat {
    number: &'static str,
    label: &'static str,
}

#[derive(Serialize)]
struct Block {
    title: &'static str,
    description: &'static str,
}

#[derive(Serialize)]
struct Service {
    title: &'static str,
    description: &'static str,
    details: &'static str,
}

const NAV: [Link; 4] = [
    anchor("Mission", "#mission"),
    anchor("Why", "#why-sleep-matters"),
    anchor("What We Do", "#what-we-do"),
    anchor("Get Involved", "#partner-with-oneria"),
];

const QUICK_LINKS: [Link; 4] = [
    anchor("Mission", "#mission"),
    anchor("Why Sleep Matters", "#why-sleep-matters"),
    anchor("What We Do", "#what-we-do"),
    anchor("Get Involved", "#partner-with-oneria"),
];

const RESOURCES: [Link; 4] = [
    anchor("Research", "#what-we-do"),
    anchor("Advocacy", "#what-we-do"),
    anchor("Educational Outreach", "#what-we-do"),
    Link {
        name: "Donate",
        href: DONATE_URL,
        external: true,
    },
];

const SLEEP_STATS: [Stat; 4] = [
    Stat { number: "1 in 3", label: "Adults suffer from insomnia symptoms" },
    Stat { number: "50-70M", label: "Americans have chronic sleep disorders" },
    Stat { number: "26%", label: "Increase in cognitive performance with proper sleep" },
    Stat { number: "35%", label: "Of children have inadequate sleep habits" },
];

const MISSION: [Block; 2] = [
    Block {
        title: "Quality Sleep, Better Life",
        description: "Quality sleep is the foundation of health and wellbeing. We're dedicated to helping everyone \
                      achieve restorative rest that leads to more productive, fulfilling, and healthy lives.",
    },
    Block {
        title: "Impact-Driven Research & Advocacy",
        description: "We're committed to creating real change through targeted advocacy and research. By working with \
                      policymakers and institutions, we drive meaningful policy changes that improve sleep health for all.",
    },
];

const SERVICES: [Service; 3] = [
    Service {
        title: "Advocacy",
        description: "Working with representatives and institutions to create policy changes that support sleep health.",
        details: "Partnering with lawmakers, school boards, and employers to implement sleep-friendly policies.",
    },
    Service {
        title: "Research",
        description: "Conducting studies to understand sleep challenges and develop evidence-based solutions.",
        details: "Collaborating with universities and health institutions on sleep health research.",
    },
    Service {
        title: "Outreach",
        description: "Bringing sleep health education directly to schools, workplaces, and communities.",
        details: "Educational presentations, workshops, and training programs for educators and employers.",
    },
];

const PARTNER_AREAS: [Block; 4] = [
    Block { title: "Research", description: "Collaborate on sleep health studies and evidence-based solutions." },
    Block { title: "Advocacy", description: "Support policy changes for better sleep health in communities." },
    Block { title: "Education", description: "Bring sleep health workshops to your school or organization." },
    Block { title: "Community", description: "Join our network of sleep health advocates and supporters." },
];

const FEATURES: [Block; 3] = [
    Block {
        title: "Quick Sleep Log",
        description: "Log your sleep in under 30 seconds. Perfect for busy students on the go.",
    },
    Block {
        title: "AI Sleep Buddy",
        description: "Chat with a friendly AI that understands your sleep patterns and offers personalized tips.",
    },
    Block {
        title: "Smart Analytics",
        description: "Visualize your sleep trends and discover patterns that impact your energy and focus.",
    },
];

const STUDENT_LIFE: [Block; 3] = [
    Block {
        title: "Organization Support",
        description: "Schools and organizations can track aggregate wellness data while keeping individual data private.",
    },
    Block {
        title: "Privacy First",
        description: "Your sleep data is yours. We use industry-standard security and never share personal information.",
    },
    Block {
        title: "Quick & Easy",
        description: "Designed for busy students. Log your sleep during your morning commute in just 30 seconds.",
    },
];

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

/// GET /
pub async fn oneria_home(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let mut ctx = Context::new();
    ctx.insert("nav", &NAV);
    ctx.insert("quick_links", &QUICK_LINKS);
    ctx.insert("resources", &RESOURCES);
    ctx.insert("stats", &SLEEP_STATS);
    ctx.insert("mission", &MISSION);
    ctx.insert("services", &SERVICES);
    ctx.insert("partner_areas", &PARTNER_AREAS);
    ctx.insert("contact_email", CONTACT_EMAIL);
    ctx.insert("donate_url", DONATE_URL);
    ctx.insert("instagram_url", INSTAGRAM_URL);
    ctx.insert("zeno_url", ZENO_URL);
    ctx.insert("year", &Utc::now().year());

    Ok(html(data.templates.render("site/oneria.html", &ctx)?))
}

#[derive(Debug, Deserialize)]
pub struct LandingQuery {
    pub code: Option<String>,
}

/// GET /zeno
pub async fn zeno_landing(
    data: web::Data<AppState>,
    query: web::Query<LandingQuery>,
) -> AppResult<HttpResponse> {
    let code = query.code.as_deref().and_then(normalize_code);

    let mut ctx = Context::new();
    ctx.insert("features", &FEATURES);
    ctx.insert("student_life", &STUDENT_LIFE);
    ctx.insert("oneria_url", ONERIA_URL);
    ctx.insert("app_url", &data.config.app_url);
    ctx.insert("join_link", &code.as_deref().map(|c| data.config.join_link(c)));
    ctx.insert("code", &code);

    Ok(html(data.templates.render("site/zeno.html", &ctx)?))
}

/// GET /health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    async fn body_of(uri: &str) -> (u16, String) {
        let state = AppState::for_tests().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/", web::get().to(oneria_home))
                .route("/zeno", web::get().to(zeno_landing))
                .route("/health", web::get().to(health)),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        let status = resp.status().as_u16();
        let body = test::read_body(resp).await;
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[actix_web::test]
    async fn oneria_home_lists_every_section() {
        let (status, body) = body_of("/").await;
        assert_eq!(status, 200);
        assert!(body.contains("Dream Better."));
        assert!(body.contains("Our Mission &amp; Vision"));
        assert!(body.contains("50-70M"));
        assert!(body.contains("Partner With Oneria"));
        assert!(body.contains("Educational Outreach"));
        assert!(body.contains(&format!(r#"href="{DONATE_URL}""#)));
        assert!(body.contains(&format!(r#"href="{ZENO_URL}""#)));
        assert!(body.contains("501(c)(3) Nonprofit Organization"));
    }

    #[actix_web::test]
    async fn landing_without_code_links_to_the_app() {
        let (status, body) = body_of("/zeno").await;
        assert_eq!(status, 200);
        assert!(body.contains("AI Sleep Buddy"));
        assert!(body.contains("Privacy First"));
        assert!(body.contains("About Oneria"));
        assert!(body.contains(r#"href="https://zeno.example">Get Started Free"#));
        assert!(body.contains(&format!(r#"href="{ONERIA_URL}""#)));
        assert!(!body.contains("?code="));
    }

    #[actix_web::test]
    async fn landing_prefills_the_join_link() {
        let (_, body) = body_of("/zeno?code=abc123").await;
        assert!(body.contains(r#"href="https://zeno.example/?code=ABC123""#));
        assert!(body.contains("Join with code ABC123"));
    }

    #[actix_web::test]
    async fn malformed_code_is_ignored() {
        let (status, body) = body_of("/zeno?code=%3Cscript%3E").await;
        assert_eq!(status, 200);
        assert!(!body.contains("<script>"));
        assert!(body.contains("Get Started Free"));
    }

    #[actix_web::test]
    async fn health_reports_ok() {
        let (status, body) = body_of("/health").await;
        assert_eq!(status, 200);
        assert_eq!(body, r#"{"status":"ok"}"#);
    }
}
