//! Background resumption of settlements interrupted after the buyer paid.
//!
//! Each pass resumes up to [`MAX_CONCURRENT_RESUMES`] settlements at once, so
//! one settlement waiting out an attestation does not hold up the rest.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, warn};

use super::{Settlement, SettlementError, Settler, store};
use crate::cctp::CctpError;

const MAX_CONCURRENT_RESUMES: usize = 4;

fn resume_retry_strat() -> ExponentialBuilder {
    const RESUME_MAX_RETRIES: usize = 3;
    const RESUME_INITIAL_DELAY: Duration = Duration::from_secs(1);
    const RESUME_MAX_DELAY: Duration = Duration::from_secs(30);

    ExponentialBuilder::default()
        .with_max_times(RESUME_MAX_RETRIES)
        .with_min_delay(RESUME_INITIAL_DELAY)
        .with_max_delay(RESUME_MAX_DELAY)
        .with_jitter()
}

/// Whether a quick retry within the same pass can help. An attestation that
/// already timed out waits for the next pass instead of polling again.
const fn retry_within_pass(err: &SettlementError) -> bool {
    !matches!(
        err,
        SettlementError::PayerRequired { .. }
            | SettlementError::Failed { .. }
            | SettlementError::Corrupt { .. }
            | SettlementError::MissingField { .. }
            | SettlementError::NotFound(_)
            | SettlementError::Claimed { .. }
            | SettlementError::Conflict { .. }
            | SettlementError::Cctp(CctpError::AttestationTimeout { .. })
    )
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResumeSummary {
    pub(crate) completed: usize,
    pub(crate) failed: usize,
    /// Claimed by another driver when this pass reached them.
    pub(crate) skipped: usize,
}

enum ResumeOutcome {
    Completed,
    Failed,
    Skipped,
}

/// Periodically drives every resumable settlement to completion.
pub struct SettlementWorker {
    settler: Arc<Settler>,
    interval: Duration,
    retry_strat: ExponentialBuilder,
}

impl SettlementWorker {
    pub fn new(settler: Arc<Settler>, interval: Duration) -> Self {
        Self {
            settler,
            interval,
            retry_strat: resume_retry_strat(),
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(interval = ?self.interval, "Settlement worker started");

        loop {
            interval.tick().await;
            debug!("Checking for resumable settlements");

            if let Err(error) = self.resume_all().await {
                error!(%error, "Settlement resume pass failed");
            }
        }
    }

    pub(crate) async fn resume_all(&self) -> Result<ResumeSummary, SettlementError> {
        let pending = store::resumable(self.settler.pool()).await?;
        let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_RESUMES));
        let mut resumes = JoinSet::new();

        for settlement in pending {
            let settler = Arc::clone(&self.settler);
            let permits = Arc::clone(&permits);
            let retry_strat = self.retry_strat;

            resumes.spawn(
                async move {
                    let _permit = permits.acquire_owned().await;
                    resume(&settler, settlement, retry_strat).await
                }
                .in_current_span(),
            );
        }

        let mut summary = ResumeSummary::default();

        while let Some(joined) = resumes.join_next().await {
            match joined {
                Ok(ResumeOutcome::Completed) => summary.completed += 1,
                Ok(ResumeOutcome::Failed) => summary.failed += 1,
                Ok(ResumeOutcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    error!(%err, "Settlement resume task panicked");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    #[cfg(test)]
    fn with_retry_strat(mut self, retry_strat: ExponentialBuilder) -> Self {
        self.retry_strat = retry_strat;
        self
    }
}

async fn resume(
    settler: &Settler,
    settlement: Settlement,
    retry_strat: ExponentialBuilder,
) -> ResumeOutcome {
    let id = settlement.id;

    info!(%id, state = %settlement.state, attempts = settlement.attempts, "Resuming settlement");

    let drive = || async { settler.drive(&id, None).await };

    match drive
        .retry(retry_strat)
        .when(retry_within_pass)
        .notify(|err, dur| warn!(%id, %err, ?dur, "Settlement step failed, retrying"))
        .await
    {
        Ok(done) => {
            info!(%id, transaction_id = ?done.transaction_id, "Settlement completed");
            ResumeOutcome::Completed
        }
        Err(SettlementError::Claimed { .. }) => {
            debug!(%id, "Settlement claimed by another driver");
            ResumeOutcome::Skipped
        }
        Err(err) => {
            error!(%id, %err, "Settlement still incomplete, will retry next pass");
            ResumeOutcome::Failed
        }
    }
}
