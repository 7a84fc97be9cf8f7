//! `/api/chat`: budget the history, open the completion, stream it back

use crate::server::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chatwindow_core::{ChatBody, Error, Result};
use chatwindow_llm::{CancellationToken, CompletionRequest};
use chatwindow_window::{select_window, Budget, Encoder};
use futures::Stream;
use hyper::ext::ReasonPhrase;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::DropGuard;
use tracing::{debug, error, warn};

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatBody>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(body) = payload.map_err(|e| Error::malformed(e.body_text()))?;

    let request = prepare_completion(&state, body).await?;

    let cancel = CancellationToken::new();
    let stream = state
        .provider
        .open(request, Some(cancel.clone()))
        .await
        .map_err(Error::from)?;

    let body = Body::from_stream(CancelOnDrop::new(stream, cancel));
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

/// Resolve defaults, count the prompt, and select the history window.
/// The tokenizer lease is released before returning on every path.
pub async fn prepare_completion(state: &AppState, body: ChatBody) -> Result<CompletionRequest> {
    let lease = state.encoders.acquire().await?;

    let defaults = &state.config.defaults;
    let system_prompt = body.prompt_or(&defaults.system_prompt).to_string();
    let temperature = body.temperature_or(defaults.temperature);
    let reserved = state.config.window.reserved_reply_tokens;

    let prompt_tokens = lease.count(&system_prompt);
    let budget = Budget::new(body.model.token_limit, reserved, prompt_tokens);
    debug!(
        "Budget for {}: limit={} reserved={} prompt={} remaining={}",
        body.model.id,
        budget.token_limit,
        budget.reserved_reply,
        budget.prompt_tokens,
        budget.remaining()
    );
    if budget.is_exhausted() {
        warn!(
            "System prompt leaves no history room for {} ({} tokens over)",
            body.model.id,
            -budget.remaining()
        );
    }

    let selection = select_window(body.messages, budget.remaining(), &lease, &state.selector);
    lease.release();

    Ok(CompletionRequest {
        model: body.model,
        system_prompt,
        temperature,
        key: body.key,
        messages: selection.messages,
        max_tokens: reserved,
    })
}

pin_project_lite::pin_project! {
    /// Forwards a stream unchanged and cancels the token when dropped,
    /// so a client disconnect aborts the upstream call.
    pub struct CancelOnDrop<S> {
        #[pin]
        inner: S,
        _guard: DropGuard,
    }
}

impl<S> CancelOnDrop<S> {
    pub fn new(inner: S, cancel: CancellationToken) -> Self {
        Self {
            inner,
            _guard: cancel.drop_guard(),
        }
    }
}

impl<S: Stream> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Handler boundary error. Every failure becomes a 500; only upstream
/// rejections carry their message out.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0.public_detail() {
            Some(detail) => {
                error!("Completion service rejected request: {}", detail);
                let mut response =
                    (StatusCode::INTERNAL_SERVER_ERROR, detail.to_string()).into_response();
                match ReasonPhrase::try_from(detail.as_bytes()) {
                    Ok(reason) => {
                        response.extensions_mut().insert(reason);
                    }
                    Err(_) => debug!("Upstream message not usable as reason phrase"),
                }
                response
            }
            None => {
                match &self.0 {
                    Error::MalformedRequest(reason) => warn!("Malformed chat request: {}", reason),
                    other => error!("Chat request failed: {}", other),
                }
                (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
            }
        }
    }
}
