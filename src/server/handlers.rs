use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};
use tracing::{error, info};

use super::models::{ErrorResponse, UploadForm};
use super::state::ServerState;
use crate::languages::TargetLanguage;
use crate::{DEFAULT_OUTPUT_MIME, providers, settings, translate_image};

const DOWNLOAD_NAME: &str = "translated_image_word_by_word.png";
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
const INDEX_TEMPLATE: &str = include_str!("templates/index.html.tera");

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: settings::Settings, addr: String) -> Result<()> {
    let selection = settings.provider_selection(None)?;
    let provider = providers::build_provider(&selection, &settings.ollama_url, None)?;
    let state = Arc::new(ServerState {
        settings,
        provider,
        index_html: render_index_html()?,
    });
    let app = Router::new()
        .route("/", get(index).post(translate_upload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<Arc<ServerState>>) -> Html<String> {
    Html(state.index_html.clone())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn translate_upload(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_upload(multipart).await?;
    let (image, language) = validate_upload(form).map_err(bad_request)?;
    info!("received {} byte image for {}", image.len(), language);

    let output = translate_image(
        state.provider.clone(),
        &state.settings,
        &image,
        None,
        language,
        DEFAULT_OUTPUT_MIME,
    )
    .await
    .map_err(|err| {
        error!("translation failed: {:#}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("{:#}", err),
            }),
        )
    })?;
    for warning in &output.warnings {
        info!("degraded: {}", warning);
    }

    Ok((
        [
            (header::CONTENT_TYPE, output.mime),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_NAME),
            ),
        ],
        output.bytes,
    )
        .into_response())
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("invalid multipart body: {}", err)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| bad_request(format!("failed to read image: {}", err)))?;
                form.image = Some(bytes.to_vec());
            }
            Some("language") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| bad_request(format!("failed to read language: {}", err)))?;
                form.language = Some(text);
            }
            _ => {}
        }
    }
    Ok(form)
}

fn validate_upload(form: UploadForm) -> Result<(Vec<u8>, TargetLanguage), String> {
    let image = form
        .image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| "image is required".to_string())?;
    let language = form
        .language
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| "language is required".to_string())?;
    let language: TargetLanguage = language.parse().map_err(|err| format!("{}", err))?;

    match infer::get(&image) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {}
        Some(kind) => return Err(format!("unsupported upload type {}", kind.mime_type())),
        None => return Err("upload is not a recognizable image".to_string()),
    }
    Ok((image, language))
}

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: message }),
    )
}

fn render_index_html() -> Result<String> {
    let mut context = TeraContext::new();
    let languages: Vec<&str> = TargetLanguage::ALL.iter().map(|lang| lang.name()).collect();
    context.insert("languages", &languages);
    context.insert("default_language", TargetLanguage::English.name());
    Tera::one_off(INDEX_TEMPLATE, &context, true).with_context(|| "failed to render index template")
}
