//! Per-check DataFusion sessions.
//!
//! Every evaluation runs in its own [`TermContext`], a thin wrapper over a
//! [`SessionContext`] configured for contract checks: a single target partition so
//! that `ROW_NUMBER() OVER ()` follows input row order, a bounded memory pool, and
//! the logging switches of [`LogConfig`]. The caller's own sessions and tables are
//! never touched.

use crate::core::{MaterializedTable, Table};
use crate::logging::LogConfig;
use crate::prelude::*;
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::execution::memory_pool::{FairSpillPool, MemoryPool};
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Name under which the checked table is registered.
pub const DATA_TABLE: &str = "data";

/// Name under which a second table (e.g. the reference of a relationship check) is
/// registered.
pub const REFERENCE_TABLE: &str = "reference_data";

/// Configuration for creating a [`TermContext`].
#[derive(Debug, Clone)]
pub struct TermContextConfig {
    /// Batch size for query execution
    pub batch_size: usize,
    /// Maximum memory for query execution (in bytes)
    pub max_memory: usize,
    /// Maximum number of rows attached to a violation
    pub max_report_rows: Option<usize>,
    /// Logging switches for check events
    pub log: LogConfig,
}

impl Default for TermContextConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            max_memory: 2 * 1024 * 1024 * 1024, // 2GB
            max_report_rows: None,
            log: LogConfig::default(),
        }
    }
}

impl TermContextConfig {
    /// Small batches and a low memory limit, useful in tests.
    pub fn small() -> Self {
        Self {
            batch_size: 1024,
            max_memory: 256 * 1024 * 1024,
            max_report_rows: Some(1000),
            log: LogConfig::default(),
        }
    }

    /// Caps every violation at `rows` rows.
    pub fn with_max_report_rows(mut self, rows: usize) -> Self {
        self.max_report_rows = Some(rows);
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

/// A DataFusion session owned by one check evaluation.
pub struct TermContext {
    inner: SessionContext,
    config: TermContextConfig,
}

impl std::fmt::Debug for TermContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermContext")
            .field("config", &self.config)
            .finish()
    }
}

impl TermContext {
    /// Creates a session with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(TermContextConfig::default())
    }

    /// Creates a session with custom configuration.
    ///
    /// ```rust
    /// use term_contract::core::{TermContext, TermContextConfig};
    ///
    /// let ctx = TermContext::with_config(TermContextConfig {
    ///     batch_size: 4096,
    ///     ..Default::default()
    /// })
    /// .unwrap();
    /// assert_eq!(ctx.config().batch_size, 4096);
    /// ```
    #[instrument(skip(config))]
    pub fn with_config(config: TermContextConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(TermError::invalid_argument("batch_size must be positive"));
        }

        // Row-order sensitive checks rely on a single partition.
        let session_config = SessionConfig::new()
            .with_batch_size(config.batch_size)
            .with_target_partitions(1)
            .with_information_schema(false);

        let memory_pool = Arc::new(FairSpillPool::new(config.max_memory)) as Arc<dyn MemoryPool>;

        let runtime_env = RuntimeEnvBuilder::new()
            .with_memory_pool(memory_pool)
            .build()
            .map(Arc::new)?;

        let inner = SessionContext::new_with_config_rt(session_config, runtime_env);

        Ok(Self { inner, config })
    }

    /// Returns the underlying DataFusion [`SessionContext`].
    pub fn inner(&self) -> &SessionContext {
        &self.inner
    }

    pub fn config(&self) -> &TermContextConfig {
        &self.config
    }

    /// Registers `table` under `name`, replacing any previous registration.
    pub fn register(&self, name: &str, table: &Table) -> Result<()> {
        self.inner.register_table(name, table.table_provider()?)?;
        debug!(table = name, planned = table.is_planned(), "registered table");
        Ok(())
    }

    /// Registers the checked table under [`DATA_TABLE`].
    pub fn register_data(&self, table: &Table) -> Result<()> {
        self.register(DATA_TABLE, table)
    }

    /// Runs a query and realizes its result.
    pub async fn query(&self, sql: &str) -> Result<MaterializedTable> {
        crate::log_query!(self.config.log, sql);
        let df = self.inner.sql(sql).await?;
        let schema = df.schema().inner().clone();
        let batches = df.collect().await?;
        Ok(MaterializedTable::from_parts(schema, batches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{int_batch, planned};

    #[tokio::test]
    async fn test_query_over_materialized_and_planned() -> Result<()> {
        let batch = int_batch(&[("a", vec![Some(3), Some(1), Some(2)])]);

        for table in [Table::from_batch(batch.clone()), planned(batch.clone())?] {
            let ctx = TermContext::new()?;
            ctx.register_data(&table)?;
            let result = ctx
                .query("SELECT \"a\", ROW_NUMBER() OVER () AS rn FROM data")
                .await?;
            assert_eq!(result.num_rows(), 3);
            // Row numbers follow input order.
            let a = result.column_by_name("a")?;
            assert_eq!(a.as_ref(), batch.column(0).as_ref());
        }
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let config = TermContextConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(TermContext::with_config(config).is_err());
    }

    #[test]
    fn test_config_presets() {
        let config = TermContextConfig::small().with_max_report_rows(5);
        assert_eq!(config.max_report_rows, Some(5));
        assert_eq!(config.batch_size, 1024);
    }
}
