use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Form, Json, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::categories::Category;
use crate::chat::ChatOrchestrator;
use crate::constants::SESSION_COOKIE;
use crate::conversation::{ConversationLog, Speaker};
use crate::error::Error;
use crate::prediction::{Prediction, PredictionRequest, Predictor};
use crate::sessions::SessionStore;

const DEFAULT_PLANTED_AREA: f64 = 1000.0;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    predictor: Arc<Predictor>,
    chat: ChatOrchestrator,
    sessions: SessionStore,
}

impl AppState {
    pub fn new(
        templates_dir: impl Into<PathBuf>,
        predictor: Predictor,
        chat: ChatOrchestrator,
    ) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir.into())),
            predictor: Arc::new(predictor),
            chat,
            sessions: SessionStore::new(),
        }
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        // Watch the templates directory for changes
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

#[derive(Serialize)]
struct TurnView {
    author: &'static str,
    text: String,
    is_user: bool,
}

#[derive(Serialize)]
struct PredictionView {
    product: String,
    month: String,
    state: String,
    hectares: String,
}

/// Everything `index.html` needs to render.
#[derive(Serialize)]
struct PageView {
    title: &'static str,
    products: Vec<&'static str>,
    months: Vec<&'static str>,
    states: Vec<&'static str>,
    selected_product: String,
    selected_month: String,
    selected_state: String,
    planted_area: String,
    demo_model: bool,
    model_name: String,
    prediction: Option<PredictionView>,
    prediction_error: Option<String>,
    history: Vec<TurnView>,
    chat_warning: Option<String>,
    chat_error: Option<String>,
}

impl PageView {
    fn new(state: &AppState, history: &ConversationLog) -> Self {
        let first = |category: Category| {
            category
                .labels()
                .next()
                .unwrap_or_default()
                .to_string()
        };
        Self {
            title: "iRoça Online",
            products: Category::Product.labels().collect(),
            months: Category::Month.labels().collect(),
            states: Category::State.labels().collect(),
            selected_product: first(Category::Product),
            selected_month: first(Category::Month),
            selected_state: first(Category::State),
            planted_area: DEFAULT_PLANTED_AREA.to_string(),
            demo_model: state.predictor.is_demo(),
            model_name: state.chat.model_name().to_string(),
            prediction: None,
            prediction_error: None,
            history: history
                .iter()
                .map(|turn| TurnView {
                    author: turn.speaker.display_name(),
                    text: turn.text.clone(),
                    is_user: turn.speaker == Speaker::User,
                })
                .collect(),
            chat_warning: None,
            chat_error: None,
        }
    }
}

fn render_page(state: &AppState, page: &PageView) -> Response {
    // Acquire env, get template, and render within the same block
    state
        .templates
        .acquire_env()
        .and_then(|env| env.get_template("index.html").and_then(|tmpl| tmpl.render(page)))
        .map(|body| Html(body).into_response())
        .unwrap_or_else(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
                .into_response()
        })
}

fn session_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn with_session_cookie(id: Uuid, response: Response) -> Response {
    let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
    ([(header::SET_COOKIE, cookie)], response).into_response()
}

/// `1234567.891` → `1,234,567.89`
pub fn format_hectares(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

/// Snapshot of the caller's transcript. Read-only routes never create a
/// session; an unknown visitor sees an empty one.
async fn current_history(state: &AppState, headers: &HeaderMap) -> ConversationLog {
    match state.sessions.get(session_from_headers(headers)).await {
        Some(log) => log.lock().await.clone(),
        None => ConversationLog::default(),
    }
}

async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let history = current_history(&state, &headers).await;
    render_page(&state, &PageView::new(&state, &history))
}

#[derive(Debug, Deserialize)]
struct PredictForm {
    product: String,
    month: String,
    state: String,
    planted_area: String,
}

async fn predict_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<PredictForm>,
) -> Response {
    let history = current_history(&state, &headers).await;
    let mut page = PageView::new(&state, &history);
    page.selected_product = form.product.clone();
    page.selected_month = form.month.clone();
    page.selected_state = form.state.clone();
    page.planted_area = form.planted_area.clone();

    let outcome = match form.planted_area.trim().parse::<f64>() {
        Ok(area) => state
            .predictor
            .predict(&form.product, &form.month, &form.state, area),
        Err(_) => Err(Error::InvalidPlantedArea(form.planted_area.trim().to_string())),
    };
    match outcome {
        Ok(prediction) => {
            page.prediction = Some(PredictionView {
                product: display_label(Category::Product, &form.product),
                month: display_label(Category::Month, &form.month),
                state: display_label(Category::State, &form.state),
                hectares: format_hectares(prediction.estimated_hectares),
            });
        }
        Err(e) => {
            warn!(error = %e, "prediction rejected");
            page.prediction_error = Some(e.to_string());
        }
    }
    render_page(&state, &page)
}

fn display_label(category: Category, value: &str) -> String {
    category
        .display_label(value)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[derive(Debug, Deserialize)]
struct AskForm {
    question: String,
}

async fn chat_ask_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AskForm>,
) -> Response {
    let (id, log) = state.sessions.get_or_create(session_from_headers(&headers)).await;
    // Held for the whole exchange so one session handles one action at a time.
    let mut history = log.lock().await;
    let mut chat_warning = None;
    let mut chat_error = None;

    match state.chat.ask(&form.question, &history).await {
        Ok(exchange) => *history = exchange.history,
        Err(Error::EmptyQuestion) => {
            chat_warning = Some("Por favor, digite uma pergunta antes de enviar.".to_string());
        }
        Err(e) => {
            error!(error = %e, "chat request failed");
            chat_error = Some(format!(
                "Ocorreu um erro ao tentar se comunicar com o modelo. ({e})"
            ));
        }
    }

    let mut page = PageView::new(&state, &history);
    page.chat_warning = chat_warning;
    page.chat_error = chat_error;
    with_session_cookie(id, render_page(&state, &page))
}

async fn chat_clear_handler(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    if let Some(log) = state.sessions.get(session_from_headers(&headers)).await {
        let mut history = log.lock().await;
        *history = ChatOrchestrator::clear(std::mem::take(&mut *history));
    }
    Redirect::to("/")
}

/// JSON error body for the API routes.
struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            Error::UnknownCategoryValue { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unknown_category_value")
            }
            Error::InvalidPlantedArea(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_planted_area"),
            Error::EmptyQuestion => (StatusCode::UNPROCESSABLE_ENTITY, "empty_question"),
            Error::ChatService(_) => (StatusCode::BAD_GATEWAY, "chat_service_error"),
            Error::ModelUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "model_unavailable"),
            Error::NonFiniteEstimate(_) => (StatusCode::INTERNAL_SERVER_ERROR, "non_finite_estimate"),
        };
        let body = serde_json::json!({ "kind": kind, "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct LabelsResponse {
    products: Vec<&'static str>,
    months: Vec<&'static str>,
    states: Vec<&'static str>,
}

async fn api_labels_handler() -> Json<LabelsResponse> {
    Json(LabelsResponse {
        products: Category::Product.labels().collect(),
        months: Category::Month.labels().collect(),
        states: Category::State.labels().collect(),
    })
}

async fn api_predict_handler(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<Prediction>, ApiError> {
    Ok(Json(state.predictor.predict_request(&request)?))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<Uuid>,
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub answer: String,
    pub history: ConversationLog,
}

async fn api_chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let (session_id, log) = state.sessions.get_or_create(request.session_id).await;
    let mut history = log.lock().await;
    let exchange = state.chat.ask(&request.question, &history).await?;
    *history = exchange.history.clone();
    Ok(Json(ChatResponse {
        session_id,
        answer: exchange.answer,
        history: exchange.history,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub session_id: Uuid,
    pub history: ConversationLog,
}

async fn api_chat_clear_handler(
    State(state): State<AppState>,
    Json(request): Json<ClearRequest>,
) -> Json<ClearResponse> {
    let session_id = request.session_id.unwrap_or_else(Uuid::new_v4);
    if let Some(log) = state.sessions.get(Some(session_id)).await {
        let mut history = log.lock().await;
        *history = ChatOrchestrator::clear(std::mem::take(&mut *history));
    }
    Json(ClearResponse {
        session_id,
        history: ConversationLog::default(),
    })
}

/// Build the application router.
pub fn router(state: AppState, static_dir: impl Into<PathBuf>) -> Router {
    // Serve static files from the static directory
    let static_dir: PathBuf = static_dir.into();
    let static_files_service = ServeDir::new(static_dir).not_found_service(
        tower::service_fn(|_req: Request| async {
            Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        }),
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/predict", post(predict_handler))
        .route("/chat/ask", post(chat_ask_handler))
        .route("/chat/clear", post(chat_clear_handler))
        .route("/api/labels", get(api_labels_handler))
        .route("/api/predict", post(api_predict_handler))
        .route("/api/chat", post(api_chat_handler))
        .route("/api/chat/clear", post(api_chat_clear_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(port: u16, state: AppState, static_dir: PathBuf) -> Result<()> {
    let app = router(state, static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    // Bind using tokio::net::TcpListener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
