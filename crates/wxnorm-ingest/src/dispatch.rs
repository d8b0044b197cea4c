//! Per-station sequential dispatch
//!
//! Each worker owns one queue. A station always hashes to the same worker,
//! so its batches are applied one after another while different stations
//! proceed in parallel.

use crate::ingestor::{BatchReport, Ingestor};
use crate::{IngestError, IngestResult, FACILITY};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use wxnorm_core::ObservationBatch;
use wxnorm_obs::Event;

const SERVICE: &str = "dispatcher";

struct Job {
    batch: ObservationBatch,
    reply: Option<oneshot::Sender<IngestResult<BatchReport>>>,
}

pub struct Dispatcher {
    queues: Vec<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

/// FNV-1a; stable across processes and builds
fn station_hash(station_id: &str) -> u64 {
    station_id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
        })
}

impl Dispatcher {
    /// Start `workers` tasks, each with a queue of `queue_depth` batches
    pub fn spawn(ingestor: Arc<Ingestor>, workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, rx) = mpsc::channel(queue_depth.max(1));
            queues.push(tx);
            handles.push(tokio::spawn(run_worker(index, Arc::clone(&ingestor), rx)));
        }

        info!(workers, queue_depth, "Dispatcher started");
        Self {
            queues,
            workers: handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    /// Index of the worker that owns a station
    pub fn worker_for(&self, station_id: &str) -> usize {
        (station_hash(station_id) % self.queues.len() as u64) as usize
    }

    async fn send(&self, job: Job) -> IngestResult<()> {
        let index = self.worker_for(&job.batch.station_id);
        self.queues[index]
            .send(job)
            .await
            .map_err(|_| IngestError::QueueClosed)
    }

    /// Queue a batch and wait for its report
    pub async fn submit(&self, batch: ObservationBatch) -> IngestResult<BatchReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Job {
            batch,
            reply: Some(tx),
        })
        .await?;
        rx.await.map_err(|_| IngestError::WorkerGone)?
    }

    /// Queue a batch without waiting for it to be applied
    pub async fn enqueue(&self, batch: ObservationBatch) -> IngestResult<()> {
        self.send(Job { batch, reply: None }).await
    }

    /// Close the queues and wait for workers to drain them
    pub async fn shutdown(self) {
        drop(self.queues);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!("Ingest worker panicked: {}", e);
            }
        }
        info!("Dispatcher stopped");
    }
}

async fn run_worker(index: usize, ingestor: Arc<Ingestor>, mut rx: mpsc::Receiver<Job>) {
    debug!(worker = index, "Ingest worker started");

    while let Some(job) = rx.recv().await {
        let now = chrono::Utc::now().timestamp();
        let result = ingestor.ingest(&job.batch, now).await;

        if let Err(e) = &result {
            // Continue running despite errors
            let event = Event::new(FACILITY, SERVICE, e.code(), e.to_string())
                .device(job.batch.station_id.clone())
                .module(job.batch.module_id.clone());
            match e {
                IngestError::MalformedBatch(_) => event.warning(),
                _ => event.error(),
            }
        }

        if let Some(reply) = job.reply {
            // the caller may have given up waiting
            let _ = reply.send(result);
        }
    }

    debug!(worker = index, "Ingest worker stopped");
}
