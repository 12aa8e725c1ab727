/*!
Main async coordinator that folds live contract events into election standings
*/

use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use trustvote_chain::{ContractEvent, EventRecord, OfficeResult, TallyBook};

use crate::core::{
    event_system::{ChainEvent, ChainMonitor},
    output_plugins::OutputManager,
};

/// What output handlers receive for every contract event
#[derive(Debug, Clone, Serialize)]
pub struct ResultUpdate {
    pub timestamp: DateTime<Utc>,
    pub record: EventRecord,
    /// The affected office after applying the event
    pub standing: Option<OfficeResult>,
}

/// Statistics about the tracker's operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerStats {
    pub events_processed: u64,
    pub votes_seen: u64,
    pub elections_tracked: usize,
    pub monitoring_errors: u64,
    pub last_block: Option<u64>,
    pub uptime_seconds: u64,
    pub last_event_time: Option<DateTime<Utc>>,
}

/// Main tracker that coordinates tallies and outputs
pub struct ResultsTracker {
    book: TallyBook,
    output_manager: OutputManager,
    stats: TrackerStats,
    started: Instant,
}

impl ResultsTracker {
    pub fn new(output_manager: OutputManager) -> Self {
        Self {
            book: TallyBook::new(),
            output_manager,
            stats: TrackerStats::default(),
            started: Instant::now(),
        }
    }

    /// Runs until the event stream ends or `shutdown` resolves, then
    /// finalizes the outputs
    pub async fn run(
        mut self,
        monitor: ChainMonitor,
        shutdown: impl Future<Output = ()>,
    ) -> Result<TrackerStats, Box<dyn std::error::Error + Send + Sync>> {
        info!(
            "🚀 Starting TrustVote results tracker with {} outputs...",
            self.output_manager.len()
        );
        if self.output_manager.is_empty() {
            warn!("No outputs enabled, events will only be logged");
        }
        self.output_manager.initialize().await?;

        let mut event_stream = Box::pin(monitor.into_stream());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Shutdown requested");
                    break;
                }
                event = event_stream.next() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        // Cleanup
        self.output_manager.finalize().await?;
        let stats = self.stats();
        info!(
            "🏁 Results tracker stopped after {} events ({} votes)",
            stats.events_processed, stats.votes_seen
        );
        Ok(stats)
    }

    /// Handle a single chain event
    pub async fn handle_event(&mut self, event: ChainEvent) {
        match event {
            ChainEvent::Contract(record) => {
                let tally = self.book.apply(&record.event);
                let standing = record.event.office().map(|office| tally.office_result(office));

                match &record.event {
                    ContractEvent::VoteCast {
                        election, office, ..
                    } => {
                        self.stats.votes_seen += 1;
                        info!("🗳️ Vote in election {election}, office {office}");
                    }
                    other => info!("📥 {:?} for election {}", other.kind(), other.election()),
                }
                self.stats.events_processed += 1;
                self.stats.last_event_time = Some(Utc::now());

                let update = ResultUpdate {
                    timestamp: Utc::now(),
                    record,
                    standing,
                };
                self.output_manager.handle_update(&update).await;
            }
            ChainEvent::NewHead(block) => {
                debug!("Scanned up to block {block}");
                self.stats.last_block = Some(block);
            }
            ChainEvent::MonitoringError(error) => {
                error!("⚠️ Monitoring error: {}", error);
                self.stats.monitoring_errors += 1;
            }
        }
    }

    /// Get current tracker statistics
    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            elections_tracked: self.book.len(),
            uptime_seconds: self.started.elapsed().as_secs(),
            ..self.stats.clone()
        }
    }
}
