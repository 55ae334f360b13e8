//! Controller loop — consumes the change feed one event at a time.
//!
//! Each event's reconcile pass runs to completion before the next event is
//! taken, which keeps per-object ordering without any locking. An optional
//! periodic resync re-reconciles every stored desired state so a pass that
//! failed is retried even when no new event arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use canary_core::{DesiredState, DesiredStateEvent};
use canary_state::DesiredStateRepository;

use crate::feed::FeedReceiver;
use crate::reconciler::{EventOutcome, Reconciler};

pub struct Controller {
    reconciler: Reconciler,
    /// Only reconcile desired states in this namespace when set.
    namespace: Option<String>,
    source: Option<Arc<dyn DesiredStateRepository>>,
    resync_interval: Option<Duration>,
}

impl Controller {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            namespace: None,
            source: None,
            resync_interval: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Reconcile everything in `source` on start, and again every
    /// `interval` when one is given.
    pub fn with_resync(
        mut self,
        source: Arc<dyn DesiredStateRepository>,
        interval: Option<Duration>,
    ) -> Self {
        self.source = Some(source);
        self.resync_interval = interval;
        self
    }

    fn in_scope(&self, desired: &DesiredState) -> bool {
        match &self.namespace {
            Some(ns) => desired.metadata.namespace == *ns,
            None => true,
        }
    }

    /// Handle a single event. Returns `None` for events outside the
    /// controller's namespace.
    pub async fn handle(&self, event: &DesiredStateEvent) -> Option<EventOutcome> {
        if !self.in_scope(event.object()) {
            debug!(desired = %event.object().key(), "event outside watched namespace, skipping");
            return None;
        }
        Some(self.reconciler.handle_event(event).await)
    }

    /// Reconcile every stored desired state. Returns how many were handled.
    pub async fn resync(&self) -> usize {
        let Some(source) = &self.source else {
            return 0;
        };
        let all = match source.list_desired_states() {
            Ok(all) => all,
            Err(e) => {
                warn!(error = %e, "resync listing failed");
                return 0;
            }
        };
        let mut handled = 0;
        for desired in all {
            if self.handle(&DesiredStateEvent::Added(desired)).await.is_some() {
                handled += 1;
            }
        }
        debug!(handled, "resync complete");
        handled
    }

    /// Run until the feed closes or `shutdown` flips.
    pub async fn run(self, mut feed: FeedReceiver, mut shutdown: watch::Receiver<bool>) {
        info!(
            namespace = self.namespace.as_deref().unwrap_or("*"),
            resync_secs = self.resync_interval.map(|d| d.as_secs()),
            "canary controller started"
        );
        if *shutdown.borrow() {
            return;
        }

        self.resync().await;

        let period = self.resync_interval.unwrap_or(Duration::from_secs(3600));
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("canary controller shutting down");
                    break;
                }
                event = feed.recv() => match event {
                    Some(event) => {
                        self.handle(&event).await;
                    }
                    None => {
                        info!("change feed closed, stopping controller");
                        break;
                    }
                },
                _ = ticker.tick(), if self.resync_interval.is_some() => {
                    self.resync().await;
                }
            }
        }
    }
}
