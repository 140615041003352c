use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::watch;

use crate::{handlers::sessions::error_status, models::timer::TimerEvent, services::AppState};

/// SSE endpoint for timer events
/// GET /api/v1/sessions/{id}/stream
pub async fn session_stream(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .sessions
        .get(&session_id)
        .map_err(|e| (error_status(&e), e.to_string()))?;

    let total = session.policy().time_budget_seconds;
    let countdown = session.countdown();
    let (Some(total), Some(countdown)) = (total, countdown) else {
        return Err((
            StatusCode::CONFLICT,
            format!(
                "Session {} has no running countdown (state: {})",
                session_id,
                session.state()
            ),
        ));
    };

    tracing::info!(
        "Client connected to SSE stream: session={}, budget={}s",
        session_id,
        total
    );

    let stream = countdown_stream(session_id, total, countdown);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct StreamState {
    session_id: String,
    total: u64,
    countdown: watch::Receiver<u64>,
    last_sent: Option<u64>,
}

/// One event per countdown change. Ends after `time-expired`, or silently
/// when the countdown stops early because the session was submitted.
pub fn countdown_stream(
    session_id: String,
    total: u64,
    countdown: watch::Receiver<u64>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = StreamState {
        session_id,
        total,
        countdown,
        last_sent: None,
    };

    stream::unfold(initial, |mut st| async move {
        if st.last_sent == Some(0) {
            return None;
        }

        loop {
            let remaining = *st.countdown.borrow_and_update();
            if st.last_sent != Some(remaining) {
                let event = TimerEvent::countdown(&st.session_id, remaining, st.total);
                let sse = Event::default()
                    .event(event.event_name())
                    .data(event.to_sse_data());
                if remaining == 0 {
                    tracing::info!("Timer expired: session={}", st.session_id);
                }
                st.last_sent = Some(remaining);
                return Some((Ok(sse), st));
            }

            if st.countdown.changed().await.is_err() {
                tracing::debug!("Countdown closed: session={}", st.session_id);
                return None;
            }
        }
    })
}
