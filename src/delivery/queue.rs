use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::job::{DeliveryJob, DeliveryReport, Mailer};
use super::payload::EmailPayload;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery queue is closed")]
    QueueClosed,
}

/// Producer side of the delivery channel. Enqueueing never waits.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryJob>,
}

impl DeliveryQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeliveryJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, payload: EmailPayload) -> Result<Uuid, DeliveryError> {
        let job = DeliveryJob::new(payload);
        let id = job.id;
        self.tx.send(job).map_err(|_| DeliveryError::QueueClosed)?;
        tracing::debug!(job_id = %id, "Delivery job queued");
        Ok(id)
    }
}

/// Runs queued jobs concurrently until shutdown
pub struct DeliveryWorker {
    mailer: Arc<Mailer>,
    rx: mpsc::UnboundedReceiver<DeliveryJob>,
    reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
}

impl DeliveryWorker {
    pub fn new(mailer: Arc<Mailer>, rx: mpsc::UnboundedReceiver<DeliveryJob>) -> Self {
        Self {
            mailer,
            rx,
            reports: None,
        }
    }

    /// Forward every finished job's report to `tx`
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<DeliveryReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    fn spawn(&self, in_flight: &mut JoinSet<()>, job: DeliveryJob) {
        let mailer = self.mailer.clone();
        let reports = self.reports.clone();
        in_flight.spawn(async move {
            let report = job.handle(&mailer).await;
            if let Some(tx) = reports {
                let _ = tx.send(report);
            }
        });
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut in_flight = JoinSet::new();
        tracing::info!("Delivery worker started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Delivery worker received shutdown signal");
                    break;
                }
                job = self.rx.recv() => match job {
                    Some(job) => self.spawn(&mut in_flight, job),
                    None => {
                        tracing::info!("Delivery queue closed");
                        break;
                    }
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Delivery task panicked");
                    }
                }
            }
        }

        // Jobs already queued were accepted; run them before exiting
        self.rx.close();
        while let Ok(job) = self.rx.try_recv() {
            self.spawn(&mut in_flight, job);
        }

        let pending = in_flight.len();
        if pending > 0 {
            tracing::info!(pending, "Draining in-flight delivery jobs");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Delivery task panicked");
            }
        }
        tracing::info!("Delivery worker stopped");
    }
}
