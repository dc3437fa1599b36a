//! HTTP handlers for shortening, resolution and redirects.

use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::body::{ErrorBody, HealthResponse, ResolveResponse, ShortenRequest, ShortenResponse};
use crate::config::TinyUrlConfig;
use crate::error::{Result, TinyUrlError};
use crate::ratelimit::{ClientIdentity, RateLimiter, RateWindow};
use crate::shortener::CodeAllocator;
use crate::store::Store;

const FORWARDED_FOR: &str = "x-forwarded-for";
const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Everything a request handler needs, shared across workers.
pub struct AppState {
    pub allocator: CodeAllocator,
    pub limiter: RateLimiter,
    pub identity: ClientIdentity,
    pub store: Arc<dyn Store>,
}

impl AppState {
    /// Wire the allocator and limiter to one shared store.
    pub fn from_config(store: Arc<dyn Store>, config: &TinyUrlConfig) -> Self {
        Self {
            allocator: CodeAllocator::from_config(store.clone(), config),
            limiter: RateLimiter::from_config(store.clone(), &config.rate_limit),
            identity: ClientIdentity::from_config(&config.client_identity),
            store,
        }
    }
}

/// Register every route. Order matters: `/{code}` must come last.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/healthz", web::get().to(health))
        .route("/tinyurl", web::post().to(shorten))
        .route("/v1/url/{code}", web::get().to(resolve))
        .route("/{code}", web::get().to(redirect));
}

/// `POST /tinyurl`: rate limited, then allocate a short link.
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
async fn shorten(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let start = Instant::now();

    let client = state
        .identity
        .resolve(forwarded_for(req.headers()), req.peer_addr().map(|addr| addr.ip()));
    let admission = state.limiter.admit(&client).await;

    if !admission.is_allowed() {
        warn!(client = %client, "Too many shortening requests");
        return Ok(too_many_requests(&state.limiter.window()));
    }

    let request = ShortenRequest::parse(&body)?;
    let link = state
        .allocator
        .allocate(&request.long_url, request.short_code.as_deref())
        .await?;

    info!(client = %client, code = %link.code, "Short link created");

    let response = ShortenResponse {
        message: format!(
            "Exclusive link will be expired in {} hours",
            link.expires_in_hours()
        ),
        short_url: link.short_url,
        long_url: link.long_url,
        expires_at: link.expires_at,
        elapsed_time: format!("{:?}", start.elapsed()),
    };

    let mut builder = HttpResponse::Ok();
    if let Some(remaining) = admission.remaining() {
        builder
            .insert_header((RATE_LIMIT_LIMIT, state.limiter.window().max_requests()))
            .insert_header((RATE_LIMIT_REMAINING, remaining));
    }
    Ok(builder.json(response))
}

/// `GET /v1/url/{code}`: look up a code without redirecting.
#[instrument(skip_all, fields(request_id = %Uuid::new_v4(), code = %code))]
async fn resolve(code: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let long_url = state.allocator.resolve(&code).await?;
    Ok(HttpResponse::Ok().json(ResolveResponse { long_url }))
}

/// `GET /{code}`: redirect to the stored URL.
#[instrument(skip_all, fields(request_id = %Uuid::new_v4(), code = %code))]
async fn redirect(code: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let long_url = state.allocator.resolve(&code).await?;
    debug!(target_url = %long_url, "Redirecting");

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, long_url))
        .finish())
}

/// `GET /healthz`: report whether the store answers.
async fn health(state: web::Data<AppState>) -> HttpResponse {
    let backend = state.store.backend_name().to_string();

    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "ok".to_string(),
            store: backend,
        }),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "unavailable".to_string(),
                store: backend,
            })
        }
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
}

fn too_many_requests(window: &RateWindow) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .insert_header((RATE_LIMIT_LIMIT, window.max_requests()))
        .insert_header((RATE_LIMIT_REMAINING, 0u64))
        .json(ErrorBody {
            error: "Too many requests".to_string(),
            message: format!("Try again after {}.", window.describe()),
        })
}

impl ResponseError for TinyUrlError {
    fn status_code(&self) -> StatusCode {
        match self {
            TinyUrlError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TinyUrlError::CodeConflict(_) => StatusCode::CONFLICT,
            TinyUrlError::NotFound(_) => StatusCode::NOT_FOUND,
            TinyUrlError::AllocationExhausted { .. } | TinyUrlError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            TinyUrlError::Config(_) | TinyUrlError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }

        let message = match self {
            TinyUrlError::StoreUnavailable(_) => {
                "The service is temporarily unavailable. Please retry later.".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
        })
    }
}
