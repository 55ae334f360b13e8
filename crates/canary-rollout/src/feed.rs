//! Desired-state change feed.
//!
//! A bounded channel of typed [`DesiredStateEvent`]s. Producers (the REST
//! API, resyncs) hold a cloneable [`ChangeFeed`]; the controller owns the
//! single [`FeedReceiver`], so events for one object are handled in the
//! order they were published.

use tokio::sync::mpsc;
use tracing::debug;

use canary_core::DesiredStateEvent;
use canary_state::DesiredStateRepository;

use crate::error::{RolloutError, RolloutResult};

/// Default channel capacity used by the daemon.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

pub type FeedReceiver = mpsc::Receiver<DesiredStateEvent>;

/// Publishing half of the change feed.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: mpsc::Sender<DesiredStateEvent>,
}

/// Create a connected feed/receiver pair.
pub fn channel(capacity: usize) -> (ChangeFeed, FeedReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChangeFeed { tx }, rx)
}

impl ChangeFeed {
    /// Publish an event, waiting for room in the channel.
    pub async fn publish(&self, event: DesiredStateEvent) -> RolloutResult<()> {
        debug!(desired = %event.object().key(), kind = event.kind(), "publishing event");
        self.tx
            .send(event)
            .await
            .map_err(|_| RolloutError::FeedClosed)
    }

    /// Publish an `Added` event for every stored desired state.
    pub async fn resync(&self, source: &dyn DesiredStateRepository) -> RolloutResult<usize> {
        let all = source.list_desired_states()?;
        let count = all.len();
        for desired in all {
            self.publish(DesiredStateEvent::Added(desired)).await?;
        }
        Ok(count)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
