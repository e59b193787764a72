//! Response duplication through a single-slot relay.
//!
//! [`tee`] splits one upstream body into a client-facing stream and a cache
//! stream. Each chunk is handed to the cache side before it is yielded to
//! the client, through a channel with room for one chunk, so:
//!
//! - the cache observes chunks in exactly the order the client receives them
//! - nothing is buffered beyond one chunk; a slow cache consumer slows the
//!   client instead of growing memory
//! - once the cache side is dropped, the client stream continues alone
//!
//! When the client stream is dropped (client disconnect, upstream end), the
//! cache stream ends too.

use std::fmt::Display;
use std::io;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use tokio::sync::mpsc;

use liteproxy_core::codec::ByteStream;

type Relay = mpsc::Sender<Result<Bytes, io::Error>>;

/// Split `upstream` into (client stream, cache stream).
pub fn tee<S, E>(upstream: S) -> (impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static, ByteStream)
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send,
{
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(1);

    let client = stream::unfold((Box::pin(upstream), Some(tx)), |(mut upstream, mut relay)| async move {
        let item = match upstream.next().await? {
            Ok(chunk) => {
                hand_off(&mut relay, Ok(chunk.clone())).await;
                Ok(chunk)
            }
            Err(e) => {
                let message = e.to_string();
                hand_off(&mut relay, Err(io::Error::other(message.clone()))).await;
                relay = None;
                Err(io::Error::other(message))
            }
        };
        Some((item, (upstream, relay)))
    });

    let cache: ByteStream = Box::pin(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }));

    (client, cache)
}

/// Waits for the cache side to take the previous chunk. A closed relay is
/// dropped so later chunks skip it.
async fn hand_off(relay: &mut Option<Relay>, item: Result<Bytes, io::Error>) {
    if let Some(sender) = relay
        && sender.send(item).await.is_err()
    {
        tracing::debug!("cache relay closed, continuing client delivery only");
        *relay = None;
    }
}
