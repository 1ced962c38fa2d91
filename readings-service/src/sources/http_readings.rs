use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{Stream, StreamExt};
use readings_core::{
    db::{DateRange, ReadingStore},
    interpolation::interpolate,
    validation::{parse_reading_date, parse_value, CandidateReading, RejectionReason},
    AnnotatedReading,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;

use crate::{
    config::HttpConfig,
    pipeline::{Envelope, PipelineError, Source, SubmitError, Submission},
};

/// Shared state behind the readings routes.
#[derive(Clone)]
pub struct ApiState {
    store: Arc<dyn ReadingStore>,
    submissions: mpsc::Sender<Envelope<Submission>>,
}

/// HTTP front of the readings log.
///
/// `GET` is served straight from the store. `POST` bodies are parsed here and
/// handed to the pipeline as submissions; the handler waits for the writer's
/// verdict before answering.
#[derive(Clone)]
pub struct HttpReadingsSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<Submission>>>>>,
}

impl HttpReadingsSource {
    /// A source and the state its routes need, without binding any listener.
    pub fn channel(store: Arc<dyn ReadingStore>, channel_capacity: usize) -> (Self, ApiState) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let source = Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        };
        let state = ApiState {
            store,
            submissions: tx,
        };
        (source, state)
    }

    pub async fn new(cfg: &HttpConfig, store: Arc<dyn ReadingStore>) -> Result<Self, PipelineError> {
        let (source, state) = Self::channel(store, cfg.channel_capacity);
        let app = router(&cfg.base_path, state);

        let addr: SocketAddr = cfg
            .bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;

        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    tracing::info!(%addr, "readings HTTP server listening");
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        tracing::error!(error = %e, "readings HTTP server error");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind readings HTTP listener");
                }
            }
        });

        Ok(source)
    }
}

#[async_trait::async_trait]
impl Source<Submission> for HttpReadingsSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<Submission>, PipelineError>> + Send>>
    {
        let mut guard = self.receiver.lock().await;
        let Some(rx) = guard.take() else {
            tracing::error!("HttpReadingsSource stream already taken; only one consumer supported");
            return Box::pin(futures::stream::empty::<Result<Envelope<Submission>, PipelineError>>());
        };

        let stream = ReceiverStream::new(rx).map(Ok);
        Box::pin(stream)
    }
}

/// Routes for `GET`/`POST {base_path}/`, with and without the trailing slash.
pub fn router(base_path: &str, state: ApiState) -> Router {
    let base = format!("/{}", base_path.trim_matches('/'));
    let base = base.trim_end_matches('/');

    let mut app = Router::new().route(&format!("{base}/"), get(get_readings).post(create_reading));
    if !base.is_empty() {
        app = app.route(base, get(get_readings).post(create_reading));
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "err": self.message }))).into_response()
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct RangeQuery {
    start: Option<String>,
    end: Option<String>,
}

impl RangeQuery {
    /// Bounds that don't parse as dates are dropped rather than rejected.
    fn into_range(self) -> DateRange {
        let bound = |raw: Option<String>| raw.and_then(|s| parse_reading_date(&s).ok());
        DateRange {
            start: bound(self.start),
            end: bound(self.end),
        }
    }
}

async fn get_readings(
    State(state): State<ApiState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<AnnotatedReading>>, ApiError> {
    metrics::counter!("readings_query_requests_total").increment(1);

    let rows = state
        .store
        .fetch_ascending(query.into_range())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to fetch readings");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e)
        })?;

    let annotated = interpolate(&rows).map_err(|e| {
        tracing::error!(error = %e, "failed to interpolate readings");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;

    Ok(Json(annotated))
}

#[derive(thiserror::Error, Debug)]
enum BodyError {
    #[error("request body is empty")]
    Empty,
    #[error("request body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Rejected(#[from] RejectionReason),
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewReadingBody {
    new_reading: Option<Value>,
    date: Option<Value>,
}

fn parse_body(body: &[u8]) -> Result<CandidateReading, BodyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BodyError::Empty);
    }

    let parsed: Option<NewReadingBody> = serde_json::from_slice(body)?;
    let parsed = parsed.ok_or(BodyError::Empty)?;

    let value = parse_value(&parsed.new_reading.unwrap_or(Value::Null))?;
    let date = match parsed.date {
        Some(Value::String(s)) => parse_reading_date(&s)?,
        other => {
            return Err(RejectionReason::InvalidDate {
                raw: other.map(|v| v.to_string()).unwrap_or_default(),
            }
            .into())
        }
    };

    Ok(CandidateReading { value, date })
}

async fn create_reading(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    metrics::counter!("readings_submit_requests_total").increment(1);

    let candidate = parse_body(&body).map_err(|e| {
        tracing::warn!(error = %e, "create reading: bad request body");
        ApiError::new(StatusCode::BAD_REQUEST, e)
    })?;

    let (tx, rx) = oneshot::channel();
    let submission = Submission {
        candidate,
        reply: Some(tx),
    };

    if state.submissions.send(Envelope::new(submission)).await.is_err() {
        // Channel closed; the writer is gone.
        metrics::counter!("readings_submit_failed_total").increment(1);
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "reading writer is not running",
        ));
    }

    match rx.await {
        Ok(Ok(_)) => Ok(Json(json!({}))),
        Ok(Err(SubmitError::Rejected(reason))) => {
            Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, reason))
        }
        Ok(Err(e @ SubmitError::Store(_))) => {
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
        Err(_) => {
            metrics::counter!("readings_submit_failed_total").increment(1);
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "reading writer dropped the submission",
            ))
        }
    }
}
