use async_trait::async_trait;
use scylla::batch::{Batch, BatchType};
use scylla::frame::value::SerializedValues;
use scylla::statement::prepared_statement::PreparedStatement;
use scylla::statement::Consistency;
use scylla::transport::errors::{DbError, QueryError};
use scylla::Session;
use std::sync::Arc;
use tracing::debug;

use crate::error::SubmitError;

use super::builder::CqlBatch;

/// Thin wrapper around the backend driver: binds prepared statements for the
/// four mutation kinds, applies the configured consistency, and surfaces
/// backend errors to the handler as a classified `SubmitError`. The handler
/// never talks to the driver directly.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    async fn submit(&self, batch: &CqlBatch) -> Result<(), SubmitError>;
}

pub struct ScyllaBatchSubmitter {
    session: Arc<Session>,
    consistency: Consistency,
    insert_data_point: PreparedStatement,
    insert_row_key: PreparedStatement,
    insert_metric_name: PreparedStatement,
    insert_time_index: PreparedStatement,
}

impl ScyllaBatchSubmitter {
    pub async fn new(
        session: Arc<Session>,
        keyspace: &str,
        consistency: Consistency,
    ) -> Result<Self, QueryError> {
        let prepare = |stmt: String| {
            let session = session.clone();
            async move { session.prepare(stmt).await }
        };

        let mut insert_data_point = prepare(format!(
            "INSERT INTO {keyspace}.data_points (row_key, column_name, value) VALUES (?, ?, ?) USING TTL ?"
        ))
        .await?;
        let mut insert_row_key = prepare(format!(
            "INSERT INTO {keyspace}.row_keys (metric_name, row_key) VALUES (?, ?) USING TTL ?"
        ))
        .await?;
        let mut insert_metric_name = prepare(format!(
            "INSERT INTO {keyspace}.metric_names (metric_name) VALUES (?)"
        ))
        .await?;
        let mut insert_time_index = prepare(format!(
            "INSERT INTO {keyspace}.time_index (metric_name, row_time) VALUES (?, ?) USING TTL ?"
        ))
        .await?;

        for stmt in [
            &mut insert_data_point,
            &mut insert_row_key,
            &mut insert_metric_name,
            &mut insert_time_index,
        ] {
            stmt.set_consistency(consistency);
        }

        Ok(Self {
            session,
            consistency,
            insert_data_point,
            insert_row_key,
            insert_metric_name,
            insert_time_index,
        })
    }

    fn classify(err: QueryError) -> SubmitError {
        let is_unavailable = matches!(
            err,
            QueryError::DbError(DbError::Unavailable { .. }, _)
                | QueryError::DbError(DbError::ReadTimeout { .. }, _)
                | QueryError::DbError(DbError::WriteTimeout { .. }, _)
                | QueryError::RequestTimeout(_)
                | QueryError::ConnectionPoolError(_)
        );
        SubmitError::classify(err.to_string(), is_unavailable)
    }
}

#[async_trait]
impl BatchSubmitter for ScyllaBatchSubmitter {
    async fn submit(&self, cql_batch: &CqlBatch) -> Result<(), SubmitError> {
        if cql_batch.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::new(BatchType::Logged);
        let mut values: Vec<SerializedValues> = Vec::with_capacity(cql_batch.mutation_count());

        for insert in cql_batch.row_key_inserts() {
            batch.append_statement(self.insert_row_key.clone());
            let mut sv = SerializedValues::new();
            sv.add_value(&insert.row_key.metric_name)
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            sv.add_value(&insert.row_key.to_wire_bytes())
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            sv.add_value(&(insert.ttl_sec as i32))
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            values.push(sv);
        }

        for insert in cql_batch.metric_name_inserts() {
            batch.append_statement(self.insert_metric_name.clone());
            let mut sv = SerializedValues::new();
            sv.add_value(&insert.timed_name.name)
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            values.push(sv);
        }

        for insert in cql_batch.time_index_inserts() {
            batch.append_statement(self.insert_time_index.clone());
            let mut sv = SerializedValues::new();
            sv.add_value(&insert.metric_name)
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            sv.add_value(&insert.row_time)
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            sv.add_value(&(insert.ttl_sec as i32))
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            values.push(sv);
        }

        for insert in cql_batch.data_point_inserts() {
            batch.append_statement(self.insert_data_point.clone());
            let mut sv = SerializedValues::new();
            sv.add_value(&insert.row_key.to_wire_bytes())
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            sv.add_value(&insert.column_name)
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            sv.add_value(&insert.value.to_wire_bytes())
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            sv.add_value(&(insert.ttl_sec as i32))
                .map_err(|e| SubmitError::Other(e.to_string()))?;
            values.push(sv);
        }

        batch.set_consistency(self.consistency);

        debug!(statements = values.len(), "submitting logged batch");

        self.session
            .batch(&batch, values)
            .await
            .map(|_| ())
            .map_err(Self::classify)
    }
}

/// Test double for `BatchSubmitter`. Not behind `#[cfg(test)]` since the
/// scenario tests under `tests/` exercise the handler from outside the
/// crate and need a way to stand in for the storage backend too.
pub mod fake {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// In-memory stand-in for tests: records every batch it was asked to
    /// submit, and can be told to fail the next N submits with a given error.
    #[derive(Default)]
    pub struct FakeBatchSubmitter {
        submitted_mutation_counts: Mutex<Vec<usize>>,
        call_count: AtomicUsize,
        failures: Mutex<Vec<SubmitError>>,
    }

    impl FakeBatchSubmitter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues errors to return on the next N `submit` calls, in order.
        pub fn fail_next(&self, errors: Vec<SubmitError>) {
            *self.failures.lock().unwrap() = errors;
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn submitted_mutation_counts(&self) -> Vec<usize> {
            self.submitted_mutation_counts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchSubmitter for FakeBatchSubmitter {
        async fn submit(&self, batch: &CqlBatch) -> Result<(), SubmitError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let next_failure = {
                let mut failures = self.failures.lock().unwrap();
                if failures.is_empty() {
                    None
                } else {
                    Some(failures.remove(0))
                }
            };
            if let Some(err) = next_failure {
                return Err(err);
            }
            self.submitted_mutation_counts
                .lock()
                .unwrap()
                .push(batch.mutation_count());
            Ok(())
        }
    }

    #[tokio::test]
    async fn records_submitted_batches_until_told_to_fail() {
        let fake = FakeBatchSubmitter::new();
        let mut batch = CqlBatch::new();
        batch.add_time_index("cpu", 0, 60);

        fake.submit(&batch).await.unwrap();
        assert_eq!(fake.call_count(), 1);
        assert_eq!(fake.submitted_mutation_counts(), vec![1]);

        fake.fail_next(vec![SubmitError::Other("boom".to_string())]);
        assert!(fake.submit(&batch).await.is_err());
        assert_eq!(fake.call_count(), 2);
        // the failed submit must not be recorded as having landed
        assert_eq!(fake.submitted_mutation_counts(), vec![1]);
    }
}
