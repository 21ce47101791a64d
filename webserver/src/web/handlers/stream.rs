//! Server-sent event stream
//!
//! Each request attaches one consumer to the broadcaster. The first event
//! after `connected` is a full status snapshot; the stream ends when the
//! broadcaster drops the connection, and closing the response detaches it.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use shared::SweepEvent;
use supervisor::{HostProbe, ProcessControl};

use crate::services::ConnectionHandle;
use crate::state::AppState;

/// Event stream - /api/sweep/stream
pub async fn sweep_stream<P, H>(
    State(state): State<AppState<P, H>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    let connection = state.broadcaster.attach();
    state
        .broadcaster
        .send_to(connection.id(), SweepEvent::Status(state.supervisor.status()));

    Sse::new(event_stream(connection)).keep_alive(KeepAlive::default())
}

/// Render a connection's queue as SSE frames named after the event kind
pub fn event_stream(connection: ConnectionHandle) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold(connection, |mut connection| async move {
        let event = connection.recv().await?;
        Some((to_sse(&event), connection))
    })
}

fn to_sse(event: &SweepEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.kind()).json_data(event)
}
