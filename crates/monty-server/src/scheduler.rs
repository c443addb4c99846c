use chrono::{DateTime, Utc};
use monty_common::types::{CheckOutcome, Endpoint};
use monty_storage::ResultStore;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::Instant;

use crate::probe::{ProbeReport, Prober};

/// Control messages into the coordinator.
enum Command {
    /// New endpoint; the first probe fires immediately.
    Register(Endpoint),
    /// Changed endpoint; the next probe fires one interval out.
    Update(Endpoint),
    /// Acked so callers know no further outcome will be persisted for
    /// this endpoint once the ack arrives.
    Remove { id: String, ack: oneshot::Sender<()> },
}

struct Completion {
    endpoint_id: String,
    generation: u64,
    report: ProbeReport,
    checked_at: DateTime<Utc>,
}

/// Cheap handle the API layer holds to talk to the coordinator.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    pub fn register(&self, endpoint: Endpoint) {
        let _ = self.tx.send(Command::Register(endpoint));
    }

    pub fn update(&self, endpoint: Endpoint) {
        let _ = self.tx.send(Command::Update(endpoint));
    }

    /// Deregister and wait until the coordinator has forgotten the
    /// endpoint. After this returns, an in-flight probe for it can no
    /// longer write anything.
    pub async fn remove(&self, id: &str) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(Command::Remove {
                id: id.to_string(),
                ack: ack_tx,
            })
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }
}

/// Single coordinator task owning all timer and in-flight state.
///
/// Timers live in a min-heap keyed by fire instant. Entries are never
/// removed eagerly; each endpoint carries a generation counter that is
/// bumped on update/remove, and stale heap entries are skipped when
/// they surface. At most one probe per endpoint is ever in flight: a
/// firing that lands while one is running is skipped, not queued, and
/// the endpoint re-arms one interval after the running probe completes.
pub struct ProbeScheduler {
    prober: Arc<dyn Prober>,
    results: Arc<dyn ResultStore>,
    semaphore: Arc<Semaphore>,
}

impl ProbeScheduler {
    pub fn spawn(
        prober: Arc<dyn Prober>,
        results: Arc<dyn ResultStore>,
        max_concurrent: usize,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            prober,
            results,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        };
        tokio::spawn(async move {
            scheduler.run(rx).await;
        });
        SchedulerHandle { tx }
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

        let mut endpoints: HashMap<String, Arc<Endpoint>> = HashMap::new();
        let mut generations: HashMap<String, u64> = HashMap::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        // Endpoints whose timer fired while a probe was running; they
        // re-arm when that probe completes.
        let mut skipped: HashSet<String> = HashSet::new();
        let mut timers: BinaryHeap<Reverse<(Instant, u64, String)>> = BinaryHeap::new();
        let mut generation_counter: u64 = 0;

        loop {
            let next_fire = timers.peek().map(|Reverse((at, _, _))| *at);

            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(Command::Register(endpoint)) => {
                            generation_counter += 1;
                            let id = endpoint.id.clone();
                            tracing::info!(
                                endpoint_id = %id,
                                url = %endpoint.url,
                                check_type = %endpoint.check_type,
                                interval = endpoint.interval_secs,
                                "Endpoint registered"
                            );
                            generations.insert(id.clone(), generation_counter);
                            endpoints.insert(id.clone(), Arc::new(endpoint));
                            timers.push(Reverse((Instant::now(), generation_counter, id)));
                        }
                        Some(Command::Update(endpoint)) => {
                            generation_counter += 1;
                            let id = endpoint.id.clone();
                            tracing::info!(
                                endpoint_id = %id,
                                url = %endpoint.url,
                                interval = endpoint.interval_secs,
                                "Endpoint rescheduled"
                            );
                            generations.insert(id.clone(), generation_counter);
                            let fire_at =
                                Instant::now() + Duration::from_secs(endpoint.interval_secs);
                            endpoints.insert(id.clone(), Arc::new(endpoint));
                            timers.push(Reverse((fire_at, generation_counter, id)));
                        }
                        Some(Command::Remove { id, ack }) => {
                            endpoints.remove(&id);
                            generations.remove(&id);
                            skipped.remove(&id);
                            tracing::info!(endpoint_id = %id, "Endpoint deregistered");
                            let _ = ack.send(());
                        }
                        None => break,
                    }
                }
                completion = done_rx.recv() => {
                    if let Some(completion) = completion {
                        self.handle_completion(
                            completion,
                            &endpoints,
                            &generations,
                            &mut in_flight,
                            &mut skipped,
                            &mut timers,
                        );
                    }
                }
                _ = sleep_until_or_forever(next_fire) => {
                    let now = Instant::now();
                    while let Some(Reverse((at, _, _))) = timers.peek() {
                        if *at > now {
                            break;
                        }
                        let Some(Reverse((_, generation, id))) = timers.pop() else {
                            break;
                        };
                        if generations.get(&id) != Some(&generation) {
                            continue; // stale entry, lazily cancelled
                        }
                        let Some(endpoint) = endpoints.get(&id) else {
                            continue;
                        };
                        if in_flight.contains(&id) {
                            // Skip, never queue. The running probe's
                            // completion re-arms this endpoint.
                            skipped.insert(id);
                            continue;
                        }
                        in_flight.insert(id.clone());
                        self.dispatch(endpoint.clone(), generation, done_tx.clone());
                    }
                }
            }
        }
    }

    /// Probes run on their own task under the concurrency semaphore,
    /// against a config snapshot taken at dispatch.
    fn dispatch(
        &self,
        endpoint: Arc<Endpoint>,
        generation: u64,
        done: mpsc::UnboundedSender<Completion>,
    ) {
        let prober = self.prober.clone();
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            tracing::debug!(
                endpoint_id = %endpoint.id,
                url = %endpoint.url,
                check_type = %endpoint.check_type,
                "Probing"
            );
            // Outcome time is the probe start, not its completion.
            let checked_at = Utc::now();
            let report = prober.probe(&endpoint).await;
            let _ = done.send(Completion {
                endpoint_id: endpoint.id.clone(),
                generation,
                report,
                checked_at,
            });
        });
    }

    fn handle_completion(
        &self,
        completion: Completion,
        endpoints: &HashMap<String, Arc<Endpoint>>,
        generations: &HashMap<String, u64>,
        in_flight: &mut HashSet<String>,
        skipped: &mut HashSet<String>,
        timers: &mut BinaryHeap<Reverse<(Instant, u64, String)>>,
    ) {
        let id = completion.endpoint_id;
        in_flight.remove(&id);

        let Some(endpoint) = endpoints.get(&id) else {
            // Removed while the probe was running; nothing is persisted.
            skipped.remove(&id);
            tracing::debug!(endpoint_id = %id, "Discarding outcome of removed endpoint");
            return;
        };

        self.persist(endpoint, completion.report, completion.checked_at);

        // Re-arm from the completion time. An update that happened
        // mid-probe already armed its own timer under a newer
        // generation, unless a firing of that timer was skipped above.
        let current = generations.get(&id).copied();
        if current == Some(completion.generation) || skipped.remove(&id) {
            if let Some(generation) = current {
                let fire_at = Instant::now() + Duration::from_secs(endpoint.interval_secs);
                timers.push(Reverse((fire_at, generation, id)));
            }
        }
    }

    fn persist(&self, endpoint: &Endpoint, report: ProbeReport, checked_at: DateTime<Utc>) {
        if report.succeeded {
            tracing::debug!(endpoint_id = %endpoint.id, url = %endpoint.url, "Probe succeeded");
        } else {
            tracing::info!(
                endpoint_id = %endpoint.id,
                url = %endpoint.url,
                error = report.error_message.as_deref().unwrap_or("-"),
                "Probe failed"
            );
        }

        let outcome = CheckOutcome {
            id: monty_common::id::next_id(),
            endpoint_id: endpoint.id.clone(),
            succeeded: report.succeeded,
            response_time_ms: report.response_time_ms,
            error_message: report.error_message,
            checked_at,
        };
        if let Err(e) = self.results.append_outcome(&outcome) {
            tracing::error!(endpoint_id = %endpoint.id, error = %e, "Failed to store outcome");
        }
        if let Some(status) = report.ssl_status {
            if let Err(e) = self.results.upsert_ssl_status(&status) {
                tracing::error!(endpoint_id = %endpoint.id, error = %e, "Failed to store SSL status");
            }
        }
        if let Some(status) = report.domain_status {
            if let Err(e) = self.results.upsert_domain_status(&status) {
                tracing::error!(endpoint_id = %endpoint.id, error = %e, "Failed to store domain status");
            }
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
