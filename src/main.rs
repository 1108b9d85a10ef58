// src/main.rs

mod ai_endpoints;
mod app_state;
mod auth;
mod config;
mod dashboard_data;
mod db;
mod email;
mod error;
mod gemini;
mod identity;
mod invite_codes;
mod models;
mod organization;
mod qr;
mod site;
mod sleep_log;
mod stats;
mod templates;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpServer, ResponseError,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use log::{error, info, warn};

use crate::app_state::AppState;
use crate::auth::verify_token;
use crate::error::AppError;

/// Verifies `Authorization: Bearer` tokens and stores the caller as an
/// [`auth::AuthUser`] extension. Requests without a header pass through;
/// handlers that need a caller reject them.
#[derive(Debug, Clone)]
pub struct Authentication {
    secret: Rc<String>,
}

impl Authentication {
    pub fn new(secret: &str) -> Self {
        Authentication {
            secret: Rc::new(secret.to_string()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Rc<String>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        if let Some(token) = bearer {
            match verify_token(&token, &self.secret) {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                }
                Err(e) => {
                    warn!("rejected bearer token: {}", e);
                    let (req_parts, _payload) = req.into_parts();
                    let resp = AppError::Unauthorized.error_response();
                    let srv_resp = ServiceResponse::new(req_parts, resp);
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(site::oneria_home))
        .route("/zeno", web::get().to(site::zeno_landing))
        .route("/health", web::get().to(site::health))
        .route("/qr", web::get().to(qr::qr_redirect))
        .route("/stats", web::get().to(stats::get_stats))
        .route("/profile", web::get().to(organization::get_profile))
        // AUTH
        .service(
            web::scope("/auth")
                .route("/signup", web::post().to(auth::signup))
                .route("/login", web::post().to(auth::login))
                .route("/refresh", web::post().to(auth::refresh))
                .route("/logout", web::post().to(auth::logout))
                .route("/reset", web::post().to(auth::reset_password))
                .route("/session", web::get().to(auth::session)),
        )
        // SLEEP LOGS
        .service(
            web::scope("/sleep-logs")
                .route("", web::get().to(sleep_log::list_logs))
                .route("/today", web::get().to(sleep_log::get_today))
                .route("/today", web::put().to(sleep_log::save_today)),
        )
        // CHAT
        .service(
            web::scope("/chat")
                .route("", web::post().to(ai_endpoints::chat))
                .route("/messages", web::get().to(ai_endpoints::get_messages)),
        )
        // ORGANIZATIONS
        .service(
            web::scope("/organizations")
                .route("", web::post().to(organization::create_organization))
                .route("/join", web::post().to(organization::join_organization)),
        )
        // ADMIN
        .service(
            web::scope("/admin")
                .route("/stats", web::get().to(dashboard_data::get_org_stats))
                .service(
                    web::scope("/invite-codes")
                        .route("", web::post().to(invite_codes::generate_invite_code))
                        .route("", web::get().to(invite_codes::list_invite_codes))
                        .route(
                            "/{id}/deactivate",
                            web::post().to(invite_codes::deactivate_invite_code),
                        )
                        .route("/{id}/email", web::post().to(invite_codes::email_invite_code)),
                ),
        )
        .route("/emails/send", web::post().to(email::send_email));
}

fn startup_error(what: &str, e: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", what, e);
    io::Error::new(io::ErrorKind::Other, format!("{what}: {e}"))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env().map_err(|e| startup_error("configuration", e))?;
    let mongodb = db::MongoDB::init(&config.mongo_uri, &config.database_name)
        .await
        .map_err(|e| startup_error("connecting to MongoDB", e))?;
    if let Err(e) = mongodb.ensure_indexes().await {
        return Err(startup_error("creating indexes", e));
    }
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| startup_error("building HTTP client", e))?;
    let templates = templates::load().map_err(|e| startup_error("loading templates", e))?;

    let bind_addr = config.bind_addr.clone();
    let frontend_origin = config.frontend_origin.clone();
    let state = AppState::new(Arc::new(mongodb), config, http_client, templates);

    info!("Server running at http://{}", bind_addr);
    info!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication::new(&state.config.jwt_secret))
            .app_data(web::Data::new(state.clone()))
            .configure(routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
