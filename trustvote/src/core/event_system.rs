/*!
Event-driven monitoring of the voting contract via block polling
*/

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::{Stream, StreamExt, wrappers::IntervalStream};
use tracing::{debug, error, info};
use trustvote_chain::{ChainError, EventQuery, EventRecord, VotingReader};

/// Events emitted by the chain monitoring system
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A decoded contract event
    Contract(EventRecord),
    /// Blocks up to this height have been scanned
    NewHead(u64),
    /// Error occurred during monitoring
    MonitoringError(String),
}

/// Polls the node for new blocks and the contract logs inside them
pub struct ChainMonitor {
    reader: Arc<dyn VotingReader>,
    query: EventQuery,
    poll_interval: Duration,
    /// First block not yet scanned
    next_block: Option<u64>,
}

impl ChainMonitor {
    /// Follows every contract event starting at `from_block`, or at the
    /// current head when `None`
    pub fn new(
        reader: Arc<dyn VotingReader>,
        query: EventQuery,
        from_block: Option<u64>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            reader,
            query,
            poll_interval,
            next_block: from_block,
        }
    }

    /// One polling round: everything between the last scanned block and the
    /// current head
    pub async fn poll(&mut self) -> Result<Vec<ChainEvent>, ChainError> {
        let head = self.reader.latest_block().await?;
        let Some(next) = self.next_block else {
            info!("Watching from block {head}");
            self.next_block = Some(head + 1);
            return Ok(vec![ChainEvent::NewHead(head)]);
        };
        if head < next {
            return Ok(Vec::new());
        }

        let query = self.query.clone().blocks(next, head);
        let records = self.reader.events(&query).await?;
        debug!("Blocks {next}..={head}: {} events", records.len());

        self.next_block = Some(head + 1);
        let mut events: Vec<ChainEvent> = records.into_iter().map(ChainEvent::Contract).collect();
        events.push(ChainEvent::NewHead(head));
        Ok(events)
    }

    /// Start monitoring the chain. A failed round is reported and retried
    /// from the same block on the next tick.
    pub fn into_stream(mut self) -> impl Stream<Item = ChainEvent> {
        let mut interval_stream = IntervalStream::new(tokio::time::interval(self.poll_interval));

        async_stream::stream! {
            while interval_stream.next().await.is_some() {
                match self.poll().await {
                    Ok(events) => {
                        for event in events {
                            yield event;
                        }
                    }
                    Err(e) => {
                        error!("Chain monitoring error: {e}");
                        yield ChainEvent::MonitoringError(e.reason());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use trustvote_chain::{Address, Candidate, ContractEvent, ElectionSummary, EventKind, Role};

    use super::*;

    /// Chain whose head moves when told to; one event per block
    struct MovingChain {
        head: Mutex<u64>,
        fail_next: Mutex<bool>,
        queries: Mutex<Vec<(Option<u64>, Option<u64>)>>,
    }

    impl MovingChain {
        fn at(head: u64) -> Arc<Self> {
            Arc::new(Self {
                head: Mutex::new(head),
                fail_next: Mutex::new(false),
                queries: Mutex::new(Vec::new()),
            })
        }

        fn advance_to(&self, head: u64) {
            *self.head.lock().unwrap() = head;
        }
    }

    #[async_trait]
    impl VotingReader for MovingChain {
        async fn election_count(&self) -> Result<u64, ChainError> {
            Ok(0)
        }

        async fn election_details(&self, _election: u64) -> Result<ElectionSummary, ChainError> {
            Err(ChainError::Malformed("unused".into()))
        }

        async fn candidates(
            &self,
            _election: u64,
            _office: u64,
        ) -> Result<Vec<Candidate>, ChainError> {
            Ok(Vec::new())
        }

        async fn has_role(&self, _role: Role, _account: Address) -> Result<bool, ChainError> {
            Ok(false)
        }

        async fn view_admins(&self) -> Result<Vec<Address>, ChainError> {
            Ok(Vec::new())
        }

        async fn view_voters(&self) -> Result<Vec<Address>, ChainError> {
            Ok(Vec::new())
        }

        async fn latest_block(&self) -> Result<u64, ChainError> {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(ChainError::Transport("connection reset".into()));
            }
            Ok(*self.head.lock().unwrap())
        }

        async fn events(&self, query: &EventQuery) -> Result<Vec<EventRecord>, ChainError> {
            self.queries.lock().unwrap().push((query.from_block, query.to_block));
            let from = query.from_block.unwrap_or(0);
            let to = query.to_block.unwrap_or(0);
            Ok((from..=to)
                .map(|block| EventRecord {
                    block_number: block,
                    log_index: 0,
                    transaction_hash: None,
                    event: ContractEvent::VoteCast {
                        election: 1,
                        office: 0,
                        candidate: 0,
                        voter: Address::ZERO,
                    },
                })
                .collect())
        }
    }

    fn monitor(chain: &Arc<MovingChain>, from_block: Option<u64>) -> ChainMonitor {
        ChainMonitor::new(
            chain.clone(),
            EventQuery::new([EventKind::VoteCast]),
            from_block,
            Duration::from_millis(10),
        )
    }

    fn contract_blocks(events: &[ChainEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                ChainEvent::Contract(record) => Some(record.block_number),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn starts_at_head_without_from_block() {
        let chain = MovingChain::at(10);
        let mut monitor = monitor(&chain, None);

        let first = monitor.poll().await.unwrap();
        assert!(matches!(first.as_slice(), [ChainEvent::NewHead(10)]));
        assert!(chain.queries.lock().unwrap().is_empty());

        chain.advance_to(12);
        let second = monitor.poll().await.unwrap();
        assert_eq!(contract_blocks(&second), [11, 12]);
        assert!(matches!(second.last(), Some(ChainEvent::NewHead(12))));
    }

    #[tokio::test]
    async fn catches_up_from_configured_block() {
        let chain = MovingChain::at(5);
        let mut monitor = monitor(&chain, Some(3));

        let events = monitor.poll().await.unwrap();
        assert_eq!(contract_blocks(&events), [3, 4, 5]);
        assert!(monitor.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_round_is_retried() {
        let chain = MovingChain::at(5);
        let mut monitor = monitor(&chain, Some(5));
        *chain.fail_next.lock().unwrap() = true;

        assert!(monitor.poll().await.is_err());
        let events = monitor.poll().await.unwrap();
        assert_eq!(contract_blocks(&events), [5]);
    }

    #[tokio::test]
    async fn stream_reports_failures_and_continues() {
        let chain = MovingChain::at(2);
        *chain.fail_next.lock().unwrap() = true;

        let stream = monitor(&chain, Some(1)).into_stream();
        let events: Vec<ChainEvent> = stream.take(4).collect().await;

        assert!(matches!(events[0], ChainEvent::MonitoringError(_)));
        assert_eq!(contract_blocks(&events), [1, 2]);
        assert!(matches!(events[3], ChainEvent::NewHead(2)));
    }
}
