//! Dispatch loop between a channel and the router.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;

use crate::channels::Channel;
use crate::error::Result;
use crate::router::IntentRouter;

/// Consume the channel until its stream ends.
///
/// Toggles and the site filter are applied in arrival order on the loop
/// itself. Only admitted intents run on their own task, so a slow handler
/// never delays other intents. In-flight tasks are awaited before returning.
pub async fn run(router: Arc<IntentRouter>, channel: Arc<dyn Channel>) -> Result<()> {
    let mut messages = channel.start().await?;
    let mut tasks = JoinSet::new();

    tracing::info!(channel = channel.name(), "Listening for intents");

    while let Some(message) = messages.next().await {
        let Some(intent) = router.admit(message) else {
            continue;
        };

        let router = Arc::clone(&router);
        let channel = Arc::clone(&channel);
        tasks.spawn(async move {
            let Some(speech) = router.dispatch(&intent).await else {
                return;
            };
            if let Err(e) = channel.publish(speech).await {
                tracing::warn!(channel = channel.name(), "Failed to publish speech: {}", e);
            }
        });

        // Reap finished tasks without blocking.
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                tracing::error!("Dispatch task failed: {}", e);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Dispatch task failed: {}", e);
        }
    }

    channel.shutdown().await?;
    tracing::info!(channel = channel.name(), "Channel closed");
    Ok(())
}
