use actix_web::{http::header, web, HttpResponse};
use reqwest::Url;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};

pub const DEFAULT_SIZE: u32 = 128;
const MIN_SIZE: u32 = 64;
const MAX_SIZE: u32 = 1024;

/// Image URL of a QR code encoding `value`; rendering is left to the
/// external image service.
pub fn qr_code_url(endpoint: &str, value: &str, size: u32) -> AppResult<Url> {
    let size = size.clamp(MIN_SIZE, MAX_SIZE);
    let dims = format!("{size}x{size}");
    Url::parse_with_params(endpoint, &[("size", dims.as_str()), ("data", value)])
        .map_err(|e| AppError::Config(format!("QR_ENDPOINT is not a valid URL: {e}")))
}

#[derive(Debug, Deserialize)]
pub struct QrQuery {
    pub data: String,
    pub size: Option<u32>,
}

/// GET /qr?data=..&size=..
pub async fn qr_redirect(
    data: web::Data<AppState>,
    query: web::Query<QrQuery>,
) -> AppResult<HttpResponse> {
    if query.data.is_empty() {
        return Err(AppError::BadRequest("data must not be empty".into()));
    }
    let url = qr_code_url(
        &data.config.qr_endpoint,
        &query.data,
        query.size.unwrap_or(DEFAULT_SIZE),
    )?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, url.as_str()))
        .finish())
}
