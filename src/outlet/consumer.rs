//! Consumer side of an outlet

use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;

use super::buffered::{Head, Outlet};
use crate::types::Sample;

/// An independent reader attached to one [`Outlet`].
///
/// Each consumer keeps its own cursor, so a slow consumer never holds back a
/// fast one; it only loses samples the outlet has already evicted.
pub struct OutletConsumer {
    outlet: Arc<Outlet>,
    cursor: u64,
    head: watch::Receiver<Head>,
    lagged: u64,
}

impl OutletConsumer {
    pub(crate) fn new(outlet: Arc<Outlet>, cursor: u64, head: watch::Receiver<Head>) -> Self {
        Self { outlet, cursor, head, lagged: 0 }
    }

    /// Key of the outlet this consumer reads.
    pub fn outlet_name(&self) -> &str {
        self.outlet.key()
    }

    /// Samples this consumer missed because they were evicted before it read them.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// Take every flushed sample not yet seen, oldest first. Never waits.
    pub fn try_pull(&mut self) -> Vec<Sample> {
        let backlog = self.outlet.lock();
        let (start, batch) = backlog.visible_from(self.cursor);
        self.lagged += start - self.cursor;
        self.cursor = start + batch.len() as u64;
        batch
    }

    /// Wait for the next non-empty batch.
    ///
    /// Returns `None` once the outlet is closed and everything has been drained.
    pub async fn pull(&mut self) -> Option<Vec<Sample>> {
        loop {
            // Mark the current head as seen before reading, so a flush that lands
            // after the read still wakes `changed()`.
            let closed = self.head.borrow_and_update().closed;

            let batch = self.try_pull();
            if !batch.is_empty() {
                return Some(batch);
            }
            if closed {
                return None;
            }
            if self.head.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Turn this consumer into a stream of batches.
    pub fn into_stream(self) -> impl Stream<Item = Vec<Sample>> + Send + 'static {
        futures::stream::unfold(self, |mut consumer| async move {
            consumer.pull().await.map(|batch| (batch, consumer))
        })
    }
}

impl std::fmt::Debug for OutletConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutletConsumer")
            .field("outlet", &self.outlet.key())
            .field("cursor", &self.cursor)
            .field("lagged", &self.lagged)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{OutletConfig, OutletInfo};
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn outlet() -> Arc<Outlet> {
        Arc::new(Outlet::new(
            "event_stream",
            OutletInfo::irregular("Event_stream", "Event_Stream", "HL_Events"),
            OutletConfig::default(),
        ))
    }

    #[tokio::test]
    async fn pull_waits_for_publish() {
        let outlet = outlet();
        let mut consumer = outlet.subscribe();

        let publisher = Arc::clone(&outlet);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(Sample::new("event_stream", 1.0, "Release; cube_2"));
        });

        let batch = tokio::time::timeout(Duration::from_secs(1), consumer.pull())
            .await
            .expect("pull should wake on publish")
            .expect("outlet is still open");
        assert_eq!(batch[0].value, "Release; cube_2");
    }

    #[tokio::test]
    async fn stream_ends_after_close_and_drain() {
        let outlet = outlet();
        let consumer = outlet.subscribe();

        outlet.publish(Sample::new("event_stream", 1.0, "Connected To Server"));
        outlet.publish(Sample::new("event_stream", 2.0, "Disconnected From Server"));
        outlet.close();

        let batches: Vec<Vec<Sample>> = tokio::time::timeout(
            Duration::from_secs(1),
            consumer.into_stream().collect(),
        )
        .await
        .expect("stream should end once closed");

        let values: Vec<_> = batches.concat().into_iter().map(|s| s.value).collect();
        assert_eq!(values, vec!["Connected To Server", "Disconnected From Server"]);
    }
}
