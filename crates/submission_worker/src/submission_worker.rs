use crate::domain::{
    EventStream, FetchRequest, PartitionKeySource, QueueEndpoint, QueueMessage, RecordBuildError,
    RecordBuilder, SubmissionQueue, TransportError, TransportErrorKind,
};
use crate::nats::{NatsEventStreamProducer, NatsSubmissionQueue};
use common::nats::NatsClient;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone)]
pub struct SubmissionWorkerConfig {
    pub queue_name: String,
    pub stream_name: String,
    pub batch_size: usize,
    pub visibility_hold: Duration,
    pub poll_interval: Duration,
    pub fetch_wait: Duration,
    pub partition_key_source: PartitionKeySource,
    pub consumer_name: String,
}

impl Default for SubmissionWorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: "submissions".to_string(),
            stream_name: "events".to_string(),
            batch_size: 1,
            visibility_hold: Duration::from_secs(300),
            poll_interval: Duration::from_secs(30),
            fetch_wait: Duration::from_secs(5),
            partition_key_source: PartitionKeySource::MessageId,
            consumer_name: "preprocessor".to_string(),
        }
    }
}

/// Transport call sites of the polling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOperation {
    Resolve,
    Fetch,
    Publish,
    Delete,
}

/// What the loop does after a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Abandon the rest of this cycle and go idle
    SkipCycle,
    /// Carry on with the next step
    Continue,
}

/// How loudly a transport failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected to clear on its own; logged at warn
    Transient,
    /// Needs operator attention; logged at error
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryDecision {
    pub recovery: Recovery,
    pub severity: Severity,
}

/// Maps a failed transport call to the loop's next move
pub type RecoveryPolicy = fn(TransportOperation, TransportErrorKind) -> RecoveryDecision;

/// Default recovery policy; nothing here stops the loop
pub fn recovery_for(operation: TransportOperation, kind: TransportErrorKind) -> RecoveryDecision {
    let recovery = match operation {
        TransportOperation::Resolve | TransportOperation::Fetch => Recovery::SkipCycle,
        // A failed publish still deletes the message; a failed delete means redelivery
        TransportOperation::Publish | TransportOperation::Delete => Recovery::Continue,
    };
    let severity = match kind {
        TransportErrorKind::Unreachable => Severity::Transient,
        TransportErrorKind::AccessDenied | TransportErrorKind::NotFound => Severity::Operator,
    };

    RecoveryDecision { recovery, severity }
}

/// Running totals since the worker started
#[derive(Debug, Default)]
pub struct WorkerStats {
    cycles: AtomicU64,
    messages_fetched: AtomicU64,
    messages_acknowledged: AtomicU64,
    malformed_messages: AtomicU64,
    records_published: AtomicU64,
    records_failed: AtomicU64,
    transport_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub cycles: u64,
    pub messages_fetched: u64,
    pub messages_acknowledged: u64,
    pub malformed_messages: u64,
    pub records_published: u64,
    pub records_failed: u64,
    pub transport_errors: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            messages_fetched: self.messages_fetched.load(Ordering::Relaxed),
            messages_acknowledged: self.messages_acknowledged.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            records_published: self.records_published.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }

    fn record_cycle(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.messages_fetched
            .fetch_add(report.fetched as u64, Ordering::Relaxed);
        self.messages_acknowledged
            .fetch_add(report.acknowledged as u64, Ordering::Relaxed);
        self.malformed_messages
            .fetch_add(report.malformed as u64, Ordering::Relaxed);
        self.records_published
            .fetch_add(report.records_published as u64, Ordering::Relaxed);
        self.records_failed
            .fetch_add(report.records_failed as u64, Ordering::Relaxed);
        self.transport_errors
            .fetch_add(report.transport_errors as u64, Ordering::Relaxed);
    }
}

/// Outcome of one fetch-process-acknowledge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub acknowledged: usize,
    pub malformed: usize,
    pub records_published: usize,
    pub records_failed: usize,
    pub transport_errors: usize,
    /// Set when a transport failure cut the cycle short
    pub skipped: bool,
}

/// Polls the submission queue, republishes valid events to the event stream
/// and acknowledges handled messages.
///
/// One cycle runs at a time; messages within a batch are handled in order.
/// Transport failures are logged and handled by a [`RecoveryPolicy`],
/// [`recovery_for`] unless overridden.
pub struct SubmissionWorker {
    queue: Arc<dyn SubmissionQueue>,
    stream: Arc<dyn EventStream>,
    builder: RecordBuilder,
    config: SubmissionWorkerConfig,
    recovery_policy: RecoveryPolicy,
    stats: Arc<WorkerStats>,
}

impl SubmissionWorker {
    pub fn new(
        queue: Arc<dyn SubmissionQueue>,
        stream: Arc<dyn EventStream>,
        config: SubmissionWorkerConfig,
    ) -> Self {
        let builder = RecordBuilder::new(config.partition_key_source);
        Self::with_record_builder(queue, stream, builder, config)
    }

    pub fn with_record_builder(
        queue: Arc<dyn SubmissionQueue>,
        stream: Arc<dyn EventStream>,
        builder: RecordBuilder,
        config: SubmissionWorkerConfig,
    ) -> Self {
        Self {
            queue,
            stream,
            builder,
            config,
            recovery_policy: recovery_for,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn with_recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery_policy = policy;
        self
    }

    /// Wire the worker to JetStream through an existing NATS connection
    pub fn from_nats(nats_client: &NatsClient, config: SubmissionWorkerConfig) -> Self {
        info!(
            queue = %config.queue_name,
            stream = %config.stream_name,
            batch_size = config.batch_size,
            partition_key_source = ?config.partition_key_source,
            "Initializing submission worker"
        );

        let queue = Arc::new(NatsSubmissionQueue::new(
            nats_client.create_consumer_client(),
            config.consumer_name.clone(),
        ));
        let stream = Arc::new(NatsEventStreamProducer::new(
            nats_client.create_publisher_client(),
        ));

        Self::new(queue, stream, config)
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Run cycles until `ctx` is cancelled
    ///
    /// Cancellation is observed between cycles and during the idle sleep, so a
    /// batch is never abandoned between publish and delete.
    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(
            queue = %self.config.queue_name,
            stream = %self.config.stream_name,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Starting submission worker"
        );

        while !ctx.is_cancelled() {
            let report = self.run_cycle().await;
            if report.fetched > 0 || report.skipped {
                info!(
                    fetched = report.fetched,
                    acknowledged = report.acknowledged,
                    malformed = report.malformed,
                    records_published = report.records_published,
                    records_failed = report.records_failed,
                    skipped = report.skipped,
                    "cycle complete"
                );
            } else {
                debug!("no messages received");
            }

            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(stats = ?self.stats.snapshot(), "Submission worker stopped gracefully");
        Ok(())
    }

    /// Resolve, fetch and process one batch
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let endpoint = match self.queue.resolve(&self.config.queue_name).await {
            Ok(endpoint) => endpoint,
            Err(e) => match self.on_transport_error(TransportOperation::Resolve, &e, &mut report) {
                Recovery::SkipCycle => return self.skip_cycle(report),
                // Address the queue by its logical name
                Recovery::Continue => QueueEndpoint {
                    queue_name: self.config.queue_name.clone(),
                    address: self.config.queue_name.clone(),
                },
            },
        };

        let request = FetchRequest {
            max_messages: self.config.batch_size,
            visibility_hold: self.config.visibility_hold,
            wait: self.config.fetch_wait,
        };

        let messages = match self.queue.fetch(&endpoint, request).await {
            Ok(messages) => messages,
            Err(e) => match self.on_transport_error(TransportOperation::Fetch, &e, &mut report) {
                Recovery::SkipCycle => return self.skip_cycle(report),
                Recovery::Continue => Vec::new(),
            },
        };

        report.fetched = messages.len();
        for message in &messages {
            let span = info_span!("process_submission", message_id = %message.message_id);
            let recovery = self
                .process_message(&endpoint, message, &mut report)
                .instrument(span)
                .await;
            if recovery == Recovery::SkipCycle {
                return self.skip_cycle(report);
            }
        }

        self.stats.record_cycle(&report);
        report
    }

    fn skip_cycle(&self, mut report: CycleReport) -> CycleReport {
        report.skipped = true;
        self.stats.record_cycle(&report);
        report
    }

    async fn process_message(
        &self,
        endpoint: &QueueEndpoint,
        message: &QueueMessage,
        report: &mut CycleReport,
    ) -> Recovery {
        let records = match self.builder.build_records(message) {
            Ok(records) => records,
            Err(e @ RecordBuildError::MalformedSubmission { .. }) => {
                // Left on the queue: redelivered once the visibility hold expires
                error!(error = %e, "failed to decode submission, leaving message on queue");
                report.malformed += 1;
                return Recovery::Continue;
            }
        };

        if !records.is_empty() {
            match self.stream.put_records(&self.config.stream_name, &records).await {
                Ok(outcome) => {
                    info!(
                        record_count = records.len(),
                        failed_record_count = outcome.failed_record_count,
                        "published records"
                    );
                    if outcome.failed_record_count > 0 {
                        warn!(
                            failed_record_count = outcome.failed_record_count,
                            "stream rejected records, they will not be retried"
                        );
                    }
                    let failed = outcome.failed_record_count.min(records.len());
                    report.records_published += records.len() - failed;
                    report.records_failed += failed;
                }
                Err(e) => {
                    report.records_failed += records.len();
                    if self.on_transport_error(TransportOperation::Publish, &e, report)
                        == Recovery::SkipCycle
                    {
                        return Recovery::SkipCycle;
                    }
                }
            }
        } else {
            debug!("submission produced no records");
        }

        match self.queue.delete(endpoint, &message.receipt_handle).await {
            Ok(()) => {
                info!("message has been processed and removed");
                report.acknowledged += 1;
                Recovery::Continue
            }
            Err(e) => self.on_transport_error(TransportOperation::Delete, &e, report),
        }
    }

    fn on_transport_error(
        &self,
        operation: TransportOperation,
        err: &TransportError,
        report: &mut CycleReport,
    ) -> Recovery {
        report.transport_errors += 1;
        let decision = (self.recovery_policy)(operation, err.kind());
        let recovery = decision.recovery;

        match decision.severity {
            Severity::Transient => warn!(
                ?operation,
                ?recovery,
                error = %err,
                "transport unreachable"
            ),
            Severity::Operator => error!(
                ?operation,
                ?recovery,
                error = %err,
                "transport call failed"
            ),
        }

        recovery
    }
}
