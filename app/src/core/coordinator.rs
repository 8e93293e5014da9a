#![allow(async_fn_in_trait)]

use std::fmt::Debug;
use std::sync::Arc;

use infrastructure::{EventBus, EventListener, meter};
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::time::{DateTime, Duration};
use crate::intuis::IntuisError;
use crate::topology::Topology;

/// Fetch half and merge half of one polled data set.
pub trait Source {
    type Raw;
    type Output: Clone + Debug + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Self::Raw, IntuisError>;

    /// Builds the published value from freshly fetched data. Must not depend on any
    /// previously published value.
    fn merge(&self, raw: Self::Raw, topology: &Topology) -> Self::Output;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CoordinatorState {
    Idle,
    Fetching,
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub state: CoordinatorState,
    pub data: Option<T>,
    pub last_success: Option<DateTime>,
    pub last_failure: Option<(DateTime, IntuisError)>,
}

pub type Listener<T> = Box<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

pub struct PollingCoordinator<S: Source> {
    source: S,
    topology: Arc<Topology>,
    interval: Duration,
    snapshot: watch::Sender<Snapshot<S::Output>>,
    listeners: Vec<Listener<S::Output>>,
    bus: EventBus<S::Output>,
    refresh_lock: Mutex<()>,
    refresh_requested: Notify,
}

impl<S: Source> PollingCoordinator<S> {
    pub fn new(source: S, topology: Arc<Topology>, interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(Snapshot {
            state: CoordinatorState::Idle,
            data: None,
            last_success: None,
            last_failure: None,
        });

        Self {
            source,
            topology,
            interval,
            snapshot,
            listeners: vec![],
            bus: EventBus::new(8),
            refresh_lock: Mutex::new(()),
            refresh_requested: Notify::new(),
        }
    }

    /// Called after every successful refresh, in registration order. A failing listener is
    /// logged and does not keep the others from running.
    pub fn add_listener(&mut self, listener: impl Fn(&S::Output) -> anyhow::Result<()> + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn subscribe(&self) -> EventListener<S::Output> {
        self.bus.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot<S::Output> {
        self.snapshot.borrow().clone()
    }

    /// Last successfully published value, kept across failed refreshes.
    pub fn data(&self) -> Option<S::Output> {
        self.snapshot.borrow().data.clone()
    }

    /// Wakes the run loop for an out-of-band refresh.
    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    pub async fn first_refresh(&self) -> Result<S::Output, IntuisError> {
        tracing::info!("Initial {} refresh", self.source.name());
        self.refresh().await
    }

    /// Runs one refresh. If another refresh is already in flight, waits for it and returns
    /// its outcome instead of fetching again.
    pub async fn refresh(&self) -> Result<S::Output, IntuisError> {
        let _guard = match self.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("{} refresh in flight, waiting for it", self.source.name());
                let _done = self.refresh_lock.lock().await;
                return self.last_outcome();
            }
        };

        self.snapshot.send_modify(|s| s.state = CoordinatorState::Fetching);

        match self.source.fetch().await {
            Ok(raw) => {
                let merged = self.source.merge(raw, &self.topology);
                self.publish(&merged);
                Ok(merged)
            }
            Err(e) => {
                tracing::warn!("{} refresh failed, keeping last published data: {}", self.source.name(), e);
                meter::increment(
                    "intuis_coordinator_refreshes",
                    &[("source", self.source.name()), ("result", e.kind())],
                );
                self.snapshot.send_modify(|s| {
                    s.state = CoordinatorState::Failed;
                    s.last_failure = Some((DateTime::now(), e.clone()));
                });
                Err(e)
            }
        }
    }

    fn publish(&self, merged: &S::Output) {
        let now = DateTime::now();
        self.snapshot.send_modify(|s| {
            s.state = CoordinatorState::Success;
            s.data = Some(merged.clone());
            s.last_success = Some(now);
        });
        meter::increment(
            "intuis_coordinator_refreshes",
            &[("source", self.source.name()), ("result", "ok")],
        );

        for (index, listener) in self.listeners.iter().enumerate() {
            if let Err(e) = listener(merged) {
                tracing::error!("Listener {} of {} failed: {:?}", index, self.source.name(), e);
            }
        }

        self.bus.publish(merged.clone());
    }

    fn last_outcome(&self) -> Result<S::Output, IntuisError> {
        let snapshot = self.snapshot.borrow();

        match (&snapshot.state, &snapshot.data, &snapshot.last_failure) {
            (CoordinatorState::Failed, _, Some((_, e))) => Err(e.clone()),
            (_, Some(data), _) => Ok(data.clone()),
            _ => Err(IntuisError::no_data(self.source.name())),
        }
    }

    /// Refreshes on every interval tick and on request until cancelled. The first tick is
    /// skipped, the initial refresh is expected to have happened through `first_refresh`.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut timer = tokio::time::interval(self.interval.into());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Stopping {} polling", self.source.name());
                    return;
                }
                _ = timer.tick() => {},
                _ = self.refresh_requested.notified() => {
                    tracing::debug!("Out-of-band {} refresh requested", self.source.name());
                },
            }

            if let Err(e) = self.refresh().await {
                tracing::error!("Scheduled {} refresh failed: {}", self.source.name(), e);
            }
        }
    }
}
