use anyhow::Result;
use multicast_lite::{
    ConnectableExt, IterPublisher, Publisher, PublisherExt, RefCountConfig, StreamFailure,
    Subscriber, Subscription,
};
use multicast_prototype::{env_or, init_tracing};
use std::sync::Arc;
use tracing::{info, warn};

/// Logs every signal it receives.
struct LoggingConsumer {
    id: usize,
}

impl Subscriber<u32> for LoggingConsumer {
    fn on_subscribe(&self, _subscription: Arc<dyn Subscription>) {}

    fn on_item(&self, item: u32) {
        info!(consumer = self.id, item, "Received item");
    }

    fn on_failure(&self, failure: StreamFailure) {
        warn!(consumer = self.id, error = %failure, "Upstream failed");
    }

    fn on_complete(&self) {
        info!(consumer = self.id, "Upstream completed");
    }
}

fn main() -> Result<()> {
    init_tracing();

    let minimum: usize = env_or("MIN_SUBSCRIBERS", 3);
    let items: u32 = env_or("ITEMS", 5);

    let shared = IterPublisher::new(1..=items)
        .publish()
        .ref_count_with(RefCountConfig::new().with_minimum_subscribers(minimum))?;

    info!(minimum, items, "Attaching consumers to a synchronous upstream");

    for id in 0..minimum {
        shared.subscribe(Arc::new(LoggingConsumer { id }));
        info!(
            consumer = id,
            connected = shared.is_connected(),
            live_generation = shared.current_generation().is_some(),
            "Consumer attached"
        );
    }

    // The upstream completed inside connect, so the next consumer starts a new generation.
    shared.subscribe(Arc::new(LoggingConsumer { id: minimum }));
    info!(
        subscribers = shared.current_subscribers(),
        "Late consumer waiting for the threshold"
    );

    Ok(())
}
