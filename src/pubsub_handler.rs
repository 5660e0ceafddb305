use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::dispatcher::DispatchOutcome;
use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::pubsub_models::PushEnvelope;

/// Pub/Sub push endpoint.
///
/// Decodes the pushed message and hands it to the dispatcher. A 2xx
/// acknowledges the message; any error status makes Pub/Sub redeliver it
/// according to the subscription's retry policy.
pub async fn pubsub_push(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<PushEnvelope>,
) -> Result<StatusCode, AppError> {
    let message = envelope.message;
    tracing::info!(
        "📨 Received Pub/Sub message {} (subscription: {})",
        message.message_id,
        envelope.subscription.as_deref().unwrap_or("unknown")
    );

    let start = std::time::Instant::now();
    let outcome = state
        .dispatcher
        .dispatch(&message)
        .await
        .with_context(|| format!("Message {} failed", message.message_id))?;

    match outcome {
        DispatchOutcome::Handled => tracing::info!(
            "✅ Message {} handled ({}ms)",
            message.message_id,
            start.elapsed().as_millis()
        ),
        DispatchOutcome::Unsupported => tracing::info!(
            "Message {} acknowledged without processing",
            message.message_id
        ),
    }

    Ok(StatusCode::NO_CONTENT)
}
