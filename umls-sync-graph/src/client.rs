//! Thin wrapper over the Bolt driver.
//!
//! Three operations: single-transaction execution, client-driven batched
//! iteration (one transaction per batch, failures isolated per batch), and a
//! connectivity + capability ping. Transient failures (connection drops,
//! cluster leader switches) are retried with exponential backoff and jitter;
//! everything else fails fast.

use crate::{GraphError, Result};
use async_trait::async_trait;
use neo4rs::{query, BoltType, Graph, Query};
use std::time::Duration;
use tracing::{debug, warn};
use umls_sync_core::{CancelFlag, GraphSettings, Settings};

/// Result of one batched-iteration call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Payload items in batches whose transaction committed.
    pub committed: u64,
    /// Payload items in batches whose transaction failed permanently.
    pub failed: u64,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn absorb(&mut self, other: BatchOutcome) {
        self.committed += other.committed;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// One batched mutation: `statement` is applied per payload row via
/// `UNWIND $rows AS row`, in batches of `batch_size`, each batch its own
/// transaction.
///
/// Batches must be order-independent: the upsert/union semantics of every
/// statement passed here converge to the same state for any permutation.
#[derive(Debug, Clone)]
pub struct BatchSpec {
    /// Short operation name for logs and error messages.
    pub context: &'static str,
    /// Per-row mutation; sees each payload item bound as `row`.
    pub statement: String,
    pub rows: Vec<BoltType>,
    /// Parameters shared by every batch (e.g. the release version).
    pub params: Vec<(String, BoltType)>,
    pub batch_size: usize,
}

/// Seam between the delta strategy and the database.
///
/// `GraphClient` is the production implementation; tests drive the strategy
/// against a recording double.
#[async_trait]
pub trait CypherExecutor: Send + Sync {
    /// Run one statement in its own transaction, discarding results.
    async fn run(
        &self,
        context: &'static str,
        statement: &str,
        params: Vec<(String, BoltType)>,
    ) -> Result<()>;

    /// Run one statement and return the `value` column of the first row.
    async fn fetch_optional_string(
        &self,
        context: &'static str,
        statement: &str,
        params: Vec<(String, BoltType)>,
    ) -> Result<Option<String>>;

    /// Run one statement and return the integer `value` column of the first
    /// row (0 when no row comes back).
    async fn fetch_count(
        &self,
        context: &'static str,
        statement: &str,
        params: Vec<(String, BoltType)>,
    ) -> Result<i64>;

    /// Iterate a payload in batches; each batch is one transaction. A batch
    /// that fails permanently is reported in the outcome and does not abort
    /// the remaining batches.
    async fn run_batched(&self, spec: BatchSpec) -> Result<BatchOutcome>;
}

/// Retry tuning for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        RetryPolicy {
            max_attempts: settings.retry_max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }
}

/// Bolt client with retry, batching, and cancellation awareness.
pub struct GraphClient {
    graph: Graph,
    retry: RetryPolicy,
    tx_timeout: Duration,
    cancel: CancelFlag,
}

impl GraphClient {
    pub async fn connect(
        graph_settings: &GraphSettings,
        retry: RetryPolicy,
        tx_timeout: Duration,
        cancel: CancelFlag,
    ) -> Result<Self> {
        let config = neo4rs::ConfigBuilder::default()
            .uri(graph_settings.uri.as_str())
            .user(graph_settings.user.as_str())
            .password(graph_settings.password.as_str())
            .db(graph_settings.database.as_str())
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        let graph = Graph::connect(config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        Ok(GraphClient {
            graph,
            retry,
            tx_timeout,
            cancel,
        })
    }

    /// Verify connectivity and the server-side capabilities the delta
    /// strategy requires (APOC's dynamic merge and label procedures).
    pub async fn ping(&self) -> Result<()> {
        self.run("ping", "RETURN 1", Vec::new()).await?;
        self.fetch_optional_string("apoc probe", "RETURN apoc.version() AS value", Vec::new())
            .await
            .map_err(|e| GraphError::ApocMissing(e.to_string()))?;
        Ok(())
    }

    fn build_query(statement: &str, params: &[(String, BoltType)]) -> Query {
        let mut q = query(statement);
        for (key, value) in params {
            q = q.param(key.as_str(), value.clone());
        }
        q
    }

    /// Run `q` in one transaction, retrying transient failures.
    async fn run_with_retry(&self, context: &'static str, q: Query) -> Result<()> {
        self.with_retry(context, || async {
            let mut txn = self.graph.start_txn().await?;
            txn.run(q.clone()).await?;
            txn.commit().await?;
            Ok(None)
        })
        .await
        .map(|_| ())
    }

    /// Run `q` and return its first row, retrying transient failures.
    async fn fetch_first_row(&self, context: &'static str, q: Query) -> Result<Option<neo4rs::Row>> {
        self.with_retry(context, || async {
            let mut stream = self.graph.execute(q.clone()).await?;
            stream.next().await
        })
        .await
    }

    async fn with_retry<F, Fut>(&self, context: &'static str, operation: F) -> Result<Option<neo4rs::Row>>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<Option<neo4rs::Row>, neo4rs::Error>>,
    {
        let mut backoff =
            ExponentialBackoff::new(self.retry.initial_delay, self.retry.max_delay, 2.0);
        let mut attempt = 1u32;
        loop {
            let result = tokio::time::timeout(self.tx_timeout, operation()).await;

            let error_text = match result {
                Ok(Ok(row)) => return Ok(row),
                Ok(Err(e)) => {
                    if !is_transient(&e) {
                        return Err(GraphError::query(context, e.to_string()));
                    }
                    e.to_string()
                }
                Err(_) => format!("transaction exceeded {:?} timeout", self.tx_timeout),
            };

            if attempt >= self.retry.max_attempts {
                return Err(GraphError::query(
                    context,
                    format!("{error_text} (after {attempt} attempts)"),
                ));
            }
            let delay = backoff.next_delay();
            warn!(context, attempt, ?delay, error = %error_text, "transient graph error, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl CypherExecutor for GraphClient {
    async fn run(
        &self,
        context: &'static str,
        statement: &str,
        params: Vec<(String, BoltType)>,
    ) -> Result<()> {
        self.run_with_retry(context, Self::build_query(statement, &params))
            .await
    }

    async fn fetch_optional_string(
        &self,
        context: &'static str,
        statement: &str,
        params: Vec<(String, BoltType)>,
    ) -> Result<Option<String>> {
        let row = self
            .fetch_first_row(context, Self::build_query(statement, &params))
            .await?;
        Ok(row.and_then(|r| r.get::<String>("value").ok()))
    }

    async fn fetch_count(
        &self,
        context: &'static str,
        statement: &str,
        params: Vec<(String, BoltType)>,
    ) -> Result<i64> {
        let row = self
            .fetch_first_row(context, Self::build_query(statement, &params))
            .await?;
        Ok(row
            .and_then(|r| r.get::<i64>("value").ok())
            .unwrap_or_default())
    }

    async fn run_batched(&self, spec: BatchSpec) -> Result<BatchOutcome> {
        let statement = format!("UNWIND $rows AS row\n{}", spec.statement);
        let batch_size = spec.batch_size.max(1);
        let total_batches = spec.rows.len().div_ceil(batch_size);
        let mut outcome = BatchOutcome::default();

        for (index, chunk) in spec.rows.chunks(batch_size).enumerate() {
            // An in-flight batch is the server's to roll back; between
            // batches we stop cleanly.
            if self.cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            let mut q = query(&statement).param("rows", chunk.to_vec());
            for (key, value) in &spec.params {
                q = q.param(key.as_str(), value.clone());
            }
            match self.run_with_retry(spec.context, q).await {
                Ok(()) => {
                    outcome.committed += chunk.len() as u64;
                    debug!(
                        context = spec.context,
                        batch = index + 1,
                        total_batches,
                        rows = chunk.len(),
                        "batch committed"
                    );
                }
                Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
                Err(e) => {
                    outcome.failed += chunk.len() as u64;
                    warn!(context = spec.context, batch = index + 1, error = %e, "batch failed, continuing");
                    outcome.errors.push(format!(
                        "{} batch {}/{}: {e}",
                        spec.context,
                        index + 1,
                        total_batches
                    ));
                }
            }
        }
        Ok(outcome)
    }
}

/// Whether an error is worth retrying.
///
/// The driver does not expose a stable error taxonomy for server-side
/// failure codes, so this goes by the rendered message: connection-level
/// faults and Neo4j's `TransientError` class (which covers leader switches
/// and lock timeouts) retry, everything else fails fast.
fn is_transient(error: &neo4rs::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("connection")
        || message.contains("transient")
        || message.contains("leader")
        || message.contains("unavailable")
        || message.contains("broken pipe")
        || message.contains("reset by peer")
        || message.contains("timed out")
}

/// Exponential backoff with ±25% jitter.
pub(crate) struct ExponentialBackoff {
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl ExponentialBackoff {
    pub(crate) fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        ExponentialBackoff {
            max,
            multiplier,
            current: initial,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(
            self.max,
            Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier),
        );
        let jitter = rand::random::<f64>() * 0.5 - 0.25;
        Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_increases_toward_cap() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(300),
            2.0,
        );
        let first = backoff.next_delay();
        assert!(first.as_millis() >= 75 && first.as_millis() <= 125);
        let second = backoff.next_delay();
        assert!(second.as_millis() >= 150 && second.as_millis() <= 250);
        let _ = backoff.next_delay();
        // Capped at 300ms, +25% jitter worst case.
        let fourth = backoff.next_delay();
        assert!(fourth.as_millis() <= 375);
    }

    #[test]
    fn batch_outcomes_accumulate() {
        let mut total = BatchOutcome::default();
        total.absorb(BatchOutcome {
            committed: 10,
            failed: 0,
            errors: vec![],
        });
        total.absorb(BatchOutcome {
            committed: 5,
            failed: 5,
            errors: vec!["upsert concepts batch 2/2: boom".to_string()],
        });
        assert_eq!(total.committed, 15);
        assert_eq!(total.failed, 5);
        assert_eq!(total.errors.len(), 1);
    }
}
