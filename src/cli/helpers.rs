use crate::config::simulation_config::SimulationConfig;
use crate::coordination::{MemoryServer, MemorySession};
use crate::queue::{DistributedQueue, QueueError};
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of a simulation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub offered: usize,
    pub delivered: usize,
    pub duplicates: usize,
    /// Claims where a consumer saw a producer's items out of offer order
    pub out_of_order: usize,
}

impl SimulationReport {
    pub fn is_clean(&self) -> bool {
        self.offered == self.delivered && self.duplicates == 0 && self.out_of_order == 0
    }
}

struct Claim {
    consumer: usize,
    payload: String,
}

fn payload(prefix: &str, producer: usize, index: usize) -> String {
    format!("{}:{}:{}", prefix, producer, index)
}

fn parse_payload(payload: &str) -> Option<(usize, usize)> {
    let mut parts = payload.rsplitn(3, ':');
    let index = parts.next()?.parse().ok()?;
    let producer = parts.next()?.parse().ok()?;
    Some((producer, index))
}

/// Run producers and blocking consumers, each with its own session, against
/// one in-memory coordination service
pub async fn run_simulation(directory: &str, settings: &SimulationConfig) -> Result<SimulationReport> {
    if settings.producers == 0 || settings.consumers == 0 {
        bail!("simulation needs at least one producer and one consumer");
    }
    let server = MemoryServer::new();
    let total = settings.items;

    info!(
        "Simulating {} producer(s), {} consumer(s), {} item(s) on {}",
        settings.producers, settings.consumers, total, directory
    );

    let (claim_tx, mut claim_rx) = mpsc::unbounded_channel::<Claim>();
    let mut consumer_sessions: Vec<Arc<MemorySession>> = Vec::new();
    let mut consumers = Vec::new();
    for consumer in 0..settings.consumers {
        let session = Arc::new(server.connect());
        debug!("Consumer {} uses session {}", consumer, session.id());
        consumer_sessions.push(session.clone());
        let queue = DistributedQueue::new(session, directory)?;
        let tx = claim_tx.clone();
        consumers.push(tokio::spawn(async move {
            loop {
                match queue.take().await {
                    Ok(data) => {
                        let payload = String::from_utf8_lossy(&data).into_owned();
                        if tx.send(Claim { consumer, payload }).is_err() {
                            return Ok(());
                        }
                    }
                    // The session is closed once every item has been claimed
                    Err(e) if e.is_connection_failure() => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        }));
    }
    drop(claim_tx);

    let mut producers = Vec::new();
    for producer in 0..settings.producers {
        let count = total / settings.producers + usize::from(producer < total % settings.producers);
        let queue = DistributedQueue::new(Arc::new(server.connect()), directory)?;
        let prefix = settings.payload_prefix.clone();
        producers.push(tokio::spawn(async move {
            for index in 0..count {
                queue.offer(payload(&prefix, producer, index)).await?;
            }
            debug!("Producer {} offered {} item(s)", producer, count);
            Ok::<usize, QueueError>(count)
        }));
    }

    let mut offered = 0;
    for handle in producers {
        offered += handle.await.context("producer task panicked")??;
    }

    let mut report = SimulationReport {
        offered,
        ..SimulationReport::default()
    };
    let mut seen = HashSet::new();
    let mut last_index: HashMap<(usize, usize), usize> = HashMap::new();
    while report.delivered < offered {
        let Some(claim) = claim_rx.recv().await else {
            warn!("All consumers stopped before the queue was drained");
            break;
        };
        report.delivered += 1;
        if !seen.insert(claim.payload.clone()) {
            report.duplicates += 1;
        }
        if let Some((producer, index)) = parse_payload(&claim.payload) {
            let previous = last_index.insert((claim.consumer, producer), index);
            if previous.is_some_and(|prev| prev >= index) {
                report.out_of_order += 1;
            }
        }
    }

    for session in &consumer_sessions {
        session.close().await;
    }
    for handle in consumers {
        handle.await.context("consumer task panicked")??;
    }

    info!("Simulation finished: {:?}", report);
    Ok(report)
}

/// Offer `items` payloads through one handle and remove them through a
/// second. Returns the removed payloads in the order they came out.
pub async fn run_drain(directory: &str, prefix: &str, items: usize) -> Result<Vec<String>> {
    let server = MemoryServer::new();
    let producer = DistributedQueue::new(Arc::new(server.connect()), directory)?;
    let consumer = DistributedQueue::new(Arc::new(server.connect()), directory)?;

    for i in 0..items {
        producer.offer(format!("{}{}", prefix, i)).await?;
    }

    let mut drained = Vec::with_capacity(items);
    loop {
        match consumer.remove().await {
            Ok(data) => drained.push(String::from_utf8_lossy(&data).into_owned()),
            Err(QueueError::NoSuchElement) => break,
            Err(e) => return Err(e.into()),
        }
    }

    match consumer.element().await {
        Err(QueueError::NoSuchElement) => debug!("Queue {} drained", directory),
        Ok(_) => bail!("queue {} still has elements after draining", directory),
        Err(e) => return Err(e.into()),
    }
    Ok(drained)
}
