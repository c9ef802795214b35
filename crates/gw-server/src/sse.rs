//! SSE framing (spec §6): `data: <json>\n\n` per chunk, terminated by a
//! literal `data: [DONE]\n\n`. Built on axum's `Sse`/`Event`, mirroring the
//! same per-chunk streamed-delta shape a WebSocket `handle_stream` handler
//! would forward, adapted to HTTP's unidirectional SSE instead.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use gw_core::ChunkEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::wire::chunk_to_wire;

/// Turn a live chunk receiver into an SSE response, OpenAI-chunk-shaping
/// each [`ChunkEvent`] and appending the `[DONE]` sentinel once the
/// channel closes.
pub fn chunk_stream_to_sse(request_id: String, model: String, chunks: mpsc::Receiver<ChunkEvent>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = ReceiverStream::new(chunks).map(move |chunk| {
        let value = chunk_to_wire(&request_id, &model, &chunk);
        Ok(Event::default().data(value.to_string()))
    });
    let done = futures::stream::once(async { Ok(Event::default().data("[DONE]")) });
    Sse::new(events.chain(done)).keep_alive(KeepAlive::default())
}
