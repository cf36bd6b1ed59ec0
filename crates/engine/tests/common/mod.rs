//! Shared fixtures: two in-memory SQLite stores and a pool that fails on cue
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use relabel_engine::backends::{
    AnyBackend, DatabasePool, DatabasePoolConfig, DatabaseRow, DatabaseTransaction, DatabaseValue,
    SqlDialect,
};
use relabel_engine::{
    EngineError, EngineResult, EnvironmentConfig, LogConfig, MatchPredicate, StoreConfig,
    StoreSession, TargetConfig,
};

pub const ENV_NAME: &str = "test";

pub async fn memory_pool() -> Arc<dyn DatabasePool> {
    AnyBackend::new()
        .create_pool("sqlite::memory:", &DatabasePoolConfig::single_connection())
        .await
        .expect("in-memory sqlite pool")
}

pub fn environment() -> EnvironmentConfig {
    EnvironmentConfig {
        name: ENV_NAME.to_string(),
        target: TargetConfig {
            store: StoreConfig::sqlite(":memory:"),
            table: "customers".to_string(),
            value_column: "name".to_string(),
            key_column: "id".to_string(),
        },
        log: LogConfig {
            store: StoreConfig::sqlite(":memory:"),
            ledger_table: "rename_batches".to_string(),
            detail_table: "rename_details".to_string(),
        },
    }
}

/// Create and fill the target table
pub async fn seed_customers(pool: &Arc<dyn DatabasePool>, rows: &[(i64, Option<&str>)]) {
    pool.execute("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .await
        .expect("create customers");
    for (id, name) in rows {
        pool.execute(
            "INSERT INTO customers (id, name) VALUES (?, ?)",
            &[DatabaseValue::Int64(*id), DatabaseValue::from(*name)],
        )
        .await
        .expect("insert customer");
    }
}

/// Current value of one customer
pub async fn customer_name(pool: &Arc<dyn DatabasePool>, id: i64) -> Option<String> {
    let row = pool
        .fetch_optional("SELECT name FROM customers WHERE id = ?", &[DatabaseValue::Int64(id)])
        .await
        .expect("select customer")
        .expect("customer exists");
    row.get_by_name("name").expect("name column").into_text()
}

pub async fn set_customer_name(pool: &Arc<dyn DatabasePool>, id: i64, name: &str) {
    pool.execute(
        "UPDATE customers SET name = ? WHERE id = ?",
        &[DatabaseValue::from(name), DatabaseValue::Int64(id)],
    )
    .await
    .expect("update customer");
}

/// A session over separate target and log stores, with the log schema in place
pub struct Stores {
    pub target: Arc<dyn DatabasePool>,
    pub log: Arc<dyn DatabasePool>,
    pub session: StoreSession,
}

impl Stores {
    pub async fn new(customers: &[(i64, Option<&str>)]) -> Self {
        let target = memory_pool().await;
        seed_customers(&target, customers).await;
        Self::with_target(target.clone(), target).await
    }

    /// Use `session_target` for the session while `target` stays reachable for assertions
    pub async fn with_target(
        target: Arc<dyn DatabasePool>,
        session_target: Arc<dyn DatabasePool>,
    ) -> Self {
        let log = memory_pool().await;
        Self::with_pools(target, session_target, log.clone(), log).await
    }

    /// Like [`Stores::with_target`], with the log store wrapped the same way
    pub async fn with_pools(
        target: Arc<dyn DatabasePool>,
        session_target: Arc<dyn DatabasePool>,
        log: Arc<dyn DatabasePool>,
        session_log: Arc<dyn DatabasePool>,
    ) -> Self {
        let session = StoreSession::from_pools(environment(), session_target, session_log);
        session.ensure_log_schema().await.expect("log schema");
        Self { target, log, session }
    }
}

pub fn by_value(value: &str) -> MatchPredicate {
    MatchPredicate::ByValue(value.to_string())
}

pub fn by_key(key: &str) -> MatchPredicate {
    MatchPredicate::ByKey(key.to_string())
}

/// Which calls a [`FailingPool`] counts
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Statements whose SQL starts with this keyword
    Statement(&'static str),
    /// Any call to `begin_transaction`
    BeginTransaction,
}

/// Delegates to a real pool, then fails every counted call once `allowed`
/// matching calls have gone through
pub struct FailingPool {
    inner: Arc<dyn DatabasePool>,
    store: &'static str,
    fault: Fault,
    allowed: usize,
    seen: AtomicUsize,
}

impl FailingPool {
    pub fn wrap(
        inner: Arc<dyn DatabasePool>,
        fault: Fault,
        allowed: usize,
    ) -> Arc<dyn DatabasePool> {
        Self::named("store", inner, fault, allowed)
    }

    /// Same as [`FailingPool::wrap`]; `store` prefixes the injected error message
    pub fn named(
        store: &'static str,
        inner: Arc<dyn DatabasePool>,
        fault: Fault,
        allowed: usize,
    ) -> Arc<dyn DatabasePool> {
        Arc::new(Self {
            inner,
            store,
            fault,
            allowed,
            seen: AtomicUsize::new(0),
        })
    }

    fn check(&self, counted: bool) -> EngineResult<()> {
        if !counted {
            return Ok(());
        }
        if self.seen.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(EngineError::connection(format!(
                "{}: connection reset by peer (injected)",
                self.store
            )));
        }
        Ok(())
    }

    fn counts_statement(&self, sql: &str) -> bool {
        match self.fault {
            Fault::Statement(keyword) => sql.trim_start().to_ascii_uppercase().starts_with(keyword),
            Fault::BeginTransaction => false,
        }
    }
}

#[async_trait]
impl DatabasePool for FailingPool {
    fn dialect(&self) -> SqlDialect {
        self.inner.dialect()
    }

    async fn begin_transaction(&self) -> EngineResult<Box<dyn DatabaseTransaction>> {
        self.check(matches!(self.fault, Fault::BeginTransaction))?;
        self.inner.begin_transaction().await
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> EngineResult<u64> {
        self.check(self.counts_statement(sql))?;
        self.inner.execute(sql, params).await
    }

    async fn fetch_all(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> EngineResult<Vec<Box<dyn DatabaseRow>>> {
        self.check(self.counts_statement(sql))?;
        self.inner.fetch_all(sql, params).await
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> EngineResult<Option<Box<dyn DatabaseRow>>> {
        self.check(self.counts_statement(sql))?;
        self.inner.fetch_optional(sql, params).await
    }

    async fn close(&self) {
        self.inner.close().await
    }

    async fn health_check(&self) -> EngineResult<Duration> {
        self.inner.health_check().await
    }
}
