//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::FormRejection,
        DefaultBodyLimit, Form, FromRequest, Json, Multipart, Request, State,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::state::AppState;
use crate::error::NmtError;
use crate::translate::{translate_text, validate_text, TranslateError};

/// Body of `GET /`
pub const WELCOME_MESSAGE: &str = "Welcome to the translation API for Indian Languages";

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/languages", get(list_languages))
        .route("/translate/", post(translate))
        .route("/translate", post(translate))
        .layer(DefaultBodyLimit::max(state.config.max_body_size));

    if state.config.cors_enabled {
        router = router.layer(cors_layer());
    }
    if state.config.logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

/// Cross-origin policy: any origin with credentials, POST only, any header.
///
/// Origins and headers are mirrored because a literal `*` is not allowed
/// together with credentials.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::POST])
        .allow_headers(AllowHeaders::mirror_request())
}

/// Welcome response
#[derive(Serialize)]
pub struct WelcomeResponse {
    /// Fixed greeting text
    pub message: &'static str,
}

/// Welcome endpoint
async fn root() -> impl IntoResponse {
    Json(WelcomeResponse {
        message: WELCOME_MESSAGE,
    })
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the server answers
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Seconds since the state was created
    pub uptime_secs: u64,
    /// Served language codes, sorted
    pub languages: Vec<String>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime().as_secs(),
        languages: state
            .registry
            .languages()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

/// One served language
#[derive(Serialize)]
pub struct LanguageEntry {
    /// Language code accepted by `/translate/`
    pub code: String,
    /// Description of the backing model
    pub model: String,
}

/// Languages response
#[derive(Serialize)]
pub struct LanguagesResponse {
    /// One entry per served language
    pub languages: Vec<LanguageEntry>,
}

/// List served languages
async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let languages = state
        .registry
        .describe()
        .into_iter()
        .map(|(code, model)| LanguageEntry { code, model })
        .collect();
    Json(LanguagesResponse { languages })
}

/// Translate form fields
#[derive(Debug, Deserialize)]
pub struct TranslateForm {
    /// Source text
    pub text: String,
    /// Target language code
    pub language: String,
}

/// Translate fields from either a urlencoded or a `multipart/form-data` body
#[derive(Debug)]
pub struct TranslateFields(pub TranslateForm);

#[async_trait]
impl<S> FromRequest<S> for TranslateFields
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(form) = Form::<TranslateForm>::from_request(req, state).await?;
            return Ok(Self(form));
        }

        let mut multipart = Multipart::from_request(req, state).await?;
        let (mut text, mut language) = (None, None);
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            match name.as_str() {
                "text" => text = Some(field.text().await?),
                "language" => language = Some(field.text().await?),
                _ => {},
            }
        }

        match (text, language) {
            (Some(text), Some(language)) => Ok(Self(TranslateForm { text, language })),
            (None, _) => Err(ApiError::MissingField("text")),
            (_, None) => Err(ApiError::MissingField("language")),
        }
    }
}

/// Translate response
#[derive(Debug, Serialize, Deserialize)]
pub struct TranslateResponse {
    /// Best translation candidate
    pub translated_text: String,
}

/// Error body, `{"detail": "..."}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable reason
    pub detail: String,
}

/// Failures of the translate endpoint
#[derive(Debug)]
pub enum ApiError {
    /// Validation, lookup or translation failure
    Translate(TranslateError),
    /// Missing or malformed urlencoded body
    InvalidForm(FormRejection),
    /// Unreadable multipart body
    InvalidMultipart(MultipartRejection),
    /// Malformed multipart field
    MultipartField(MultipartError),
    /// Required multipart field absent
    MissingField(&'static str),
}

impl From<TranslateError> for ApiError {
    fn from(err: TranslateError) -> Self {
        ApiError::Translate(err)
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::InvalidForm(rejection)
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::InvalidMultipart(rejection)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::MultipartField(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Translate(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.to_string())
            },
            // Internal detail stays in the logs
            ApiError::Translate(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Translation failed".to_string(),
            ),
            ApiError::InvalidForm(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::InvalidMultipart(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::MultipartField(err) => (err.status(), err.body_text()),
            ApiError::MissingField(name) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Missing form field `{name}`"),
            ),
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

/// Translate text into the requested language
async fn translate(
    State(state): State<Arc<AppState>>,
    TranslateFields(TranslateForm { text, language }): TranslateFields,
) -> Result<Json<TranslateResponse>, ApiError> {
    validate_text(&text)?;

    tracing::debug!(%language, chars = text.chars().count(), "Translation request");

    let worker = Arc::clone(&state);
    let worker_language = language.clone();
    let result = tokio::task::spawn_blocking(move || {
        translate_text(&worker.registry, &text, &worker_language)
    })
    .await
    .unwrap_or_else(|e| {
        Err(TranslateError::Failed(NmtError::Inference(format!(
            "translation task aborted: {e}"
        ))))
    });

    match result {
        Ok(translated_text) => Ok(Json(TranslateResponse { translated_text })),
        Err(err) => {
            if let TranslateError::Failed(source) = &err {
                tracing::error!(%language, error = %source, details = ?source, "Translation failed");
            }
            Err(err.into())
        },
    }
}
