use async_stream::stream;
use futures::Stream;
use multicast_lite::StreamFailure;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_TICK_MS: u64 = 200;

/// Read an environment variable, falling back to `default` when it is unset or
/// does not parse.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Install the fmt subscriber with lifecycle (debug) events visible.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .init();
}

/// A cold ticking upstream: emits 0, 1, 2, ... every `period`, and completes
/// after `limit` ticks if one is given.
pub fn ticks(
    period: Duration,
    limit: Option<u64>,
) -> impl Stream<Item = Result<u64, StreamFailure>> + Send + 'static {
    stream! {
        let mut ticker = tokio::time::interval(period);
        let mut sequence = 0u64;
        while limit.is_none_or(|limit| sequence < limit) {
            ticker.tick().await;
            yield Ok::<u64, StreamFailure>(sequence);
            sequence += 1;
        }
    }
}
