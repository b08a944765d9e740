//! Event intake and job execution.
//!
//! A watcher task owns the runtime's event stream and forwards events into
//! a bounded channel; when the channel is full the watcher waits, so
//! events are never dropped and memory stays bounded. The receiver loop
//! turns each qualifying event into a job. Jobs run as independent tasks,
//! at most `max_in_flight` at a time, and are tracked so shutdown can
//! wait for them.
//!
//! The bootstrap scan runs alongside the event stream instead of before
//! it. The stream is opened first, so a container that turns healthy while
//! the scan is listing is still seen as an event. Docker only registers the
//! subscription when the stream is first polled, which happens as soon as
//! the scan task is spawned; that short window is not closed.
//!
//! Every `select!` that races shutdown against other work is `biased` with
//! the shutdown arm first: once shutdown starts, no new job is admitted.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bootstrap;
use crate::reconciler::{Outcome, Reconciler};
use crate::types::{EventAction, LifecycleEvent};

/// Delay before resubscribing after the event stream ends.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Unit of work executed on the job pool.
#[derive(Debug, Clone)]
pub enum Job {
    /// A live lifecycle event.
    Event(LifecycleEvent),
    /// Republish an already-running container found by the bootstrap scan.
    Republish(String),
}

#[derive(Clone)]
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Stops intake of new jobs.
    shutdown: CancellationToken,
    /// Aborts jobs still running after the shutdown grace period.
    abort: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        max_in_flight: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            tracker: TaskTracker::new(),
            shutdown,
            abort: CancellationToken::new(),
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Spawns `job` once a slot is free. Returns `false` if shutdown
    /// started before the job could be scheduled.
    pub async fn submit(&self, job: Job) -> bool {
        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return false,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        let reconciler = Arc::clone(&self.reconciler);
        let abort = self.abort.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            tokio::select! {
                _ = abort.cancelled() => warn!("Aborted unfinished job {:?}", job),
                outcome = run_job(&reconciler, &job) => debug!("{:?} -> {:?}", job, outcome),
            }
        });
        true
    }

    /// Waits up to `grace` for running jobs, then aborts the rest.
    pub async fn drain(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                "{} jobs still running after {:?}, aborting",
                self.tracker.len(),
                grace
            );
            self.abort.cancel();
            self.tracker.wait().await;
        }
    }
}

async fn run_job(reconciler: &Reconciler, job: &Job) -> Outcome {
    match job {
        Job::Event(event) => reconciler.handle_event(event).await,
        Job::Republish(container_id) => bootstrap::republish(reconciler, container_id).await,
    }
}

/// Receiver loop: dispatches container events until the channel closes
/// or shutdown is requested.
pub async fn receive(
    dispatcher: Dispatcher,
    mut events: mpsc::Receiver<LifecycleEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if !event.is_container() || event.action() == EventAction::Other {
            continue;
        }
        if event.actor_id.is_empty() {
            debug!("Dropping {} event without actor id", event.action);
            continue;
        }
        if !dispatcher.submit(Job::Event(event)).await {
            break;
        }
    }
    info!("Event receiver stopped");
}

/// Watches the runtime: opens the event stream, runs the bootstrap scan
/// next to it, and forwards events to `events`. Rescans and resubscribes
/// whenever the stream is lost.
pub async fn watch(
    dispatcher: Dispatcher,
    events: mpsc::Sender<LifecycleEvent>,
    shutdown: CancellationToken,
) {
    let runtime = Arc::clone(dispatcher.reconciler().runtime());
    loop {
        let mut stream = runtime.events();
        spawn_scan(&dispatcher, &shutdown);

        info!("Start listening for docker events");
        loop {
            let msg = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                msg = stream.next() => msg,
            };
            match msg {
                Some(Ok(event)) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return,
                        sent = events.send(event) => if sent.is_err() {
                            info!("Event channel closed, stopping watcher");
                            return;
                        },
                    }
                }
                Some(Err(e)) => {
                    error!("Error in Docker event stream: {}", e);
                    break;
                }
                None => break,
            }
        }

        warn!("Docker event stream ended. Reconnecting in {:?}...", RECONNECT_DELAY);
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = sleep(RECONNECT_DELAY) => {}
        }
    }
}

fn spawn_scan(dispatcher: &Dispatcher, shutdown: &CancellationToken) {
    let dispatcher = dispatcher.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            res = bootstrap::scan(&dispatcher) => if let Err(e) = res {
                error!("Failed to get containers: {}", e);
            },
        }
    });
}
