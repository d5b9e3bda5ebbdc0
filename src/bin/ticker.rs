use anyhow::Result;
use futures::StreamExt;
use multicast_lite::{ConnectableExt, PublisherExt, RefCountConfig, StreamPublisher};
use multicast_prototype::{DEFAULT_TICK_MS, env_or, init_tracing, ticks};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let tick = Duration::from_millis(env_or("TICK_MS", DEFAULT_TICK_MS));
    let grace = Duration::from_millis(env_or("GRACE_MS", 500));
    let consumers: usize = env_or("CONSUMERS", 3);

    let upstream = StreamPublisher::current(move || ticks(tick, None))?;
    let shared = upstream
        .publish()
        .ref_count_with(RefCountConfig::new().with_grace_period(grace))?;

    info!(consumers, ?tick, ?grace, "Starting shared ticker");

    let mut tasks = Vec::with_capacity(consumers);
    for consumer in 0..consumers {
        let stream = shared.subscribe_stream();
        // Each consumer stays a little longer than the previous one.
        let wanted = 3 * (consumer + 1);

        tasks.push(tokio::spawn(async move {
            let mut stream = stream.take(wanted);
            while let Some(tick) = stream.next().await {
                match tick {
                    Ok(sequence) => info!(consumer, sequence, "Received tick"),
                    Err(e) => {
                        warn!(consumer, error = %e, "Upstream failed");
                        break;
                    }
                }
            }
            info!(consumer, "Consumer leaving");
        }));

        tokio::time::sleep(tick).await;
    }

    for task in tasks {
        task.await?;
    }
    info!(
        pending_disconnect = shared.has_pending_disconnect(),
        "All consumers left"
    );

    // Rejoining inside the grace window reuses the running upstream.
    tokio::time::sleep(grace / 2).await;
    let generation = shared.current_generation();
    let mut late = shared.subscribe_stream();
    if let Some(Ok(sequence)) = late.next().await {
        info!(
            sequence,
            reused = generation.is_some() && generation == shared.current_generation(),
            "Late consumer rejoined"
        );
    }
    drop(late);

    tokio::time::sleep(grace * 2).await;
    info!(connected = shared.is_connected(), "Grace period elapsed");

    Ok(())
}
