//! In-memory [`Database`] double for tests across the workspace.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::database::{
    ConnectMode, ConnectionSlot, ConnectionState, Database, DatabaseError, ExecResult, Row, Value,
};
use crate::shutdown::ShutdownSignal;
use crate::supervision::{establish, HealthMonitor};

/// A statement received by [`MemoryDatabase::query`] or [`MemoryDatabase::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub statement: String,
    pub args: Vec<Value>,
}

/// Transport error as a driver would surface a dropped connection.
pub fn transport_error(message: &str) -> DatabaseError {
    DatabaseError::Transport(sqlx::Error::Io(io::Error::new(
        io::ErrorKind::ConnectionReset,
        message.to_owned(),
    )))
}

/// Scriptable store: probe outcomes are popped in order (healthy once the script
/// runs out), query results are popped in order (empty once it runs out), and
/// every statement is recorded.
pub struct MemoryDatabase {
    mode: ConnectMode,
    monitor: HealthMonitor,
    probe_delay: Duration,
    slot: ConnectionSlot<()>,
    probe_script: Mutex<VecDeque<Option<String>>>,
    row_script: Mutex<VecDeque<Vec<Row>>>,
    statements: Mutex<Vec<Statement>>,
    connects: AtomicUsize,
    probes_started: AtomicUsize,
    probes: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MemoryDatabase {
    pub fn new(mode: ConnectMode) -> Self {
        Self {
            mode,
            monitor: HealthMonitor::new(Duration::from_millis(20)),
            probe_delay: Duration::ZERO,
            slot: ConnectionSlot::new(),
            probe_script: Default::default(),
            row_script: Default::default(),
            statements: Default::default(),
            connects: AtomicUsize::new(0),
            probes_started: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Already connected, for tests that only exercise queries.
    pub fn connected() -> Self {
        let db = Self::new(ConnectMode::OneShot);
        db.slot
            .install(())
            .expect("a fresh slot accepts a handle");
        db.slot.mark_verified();
        db
    }

    pub fn with_monitor(mut self, monitor: HealthMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Delay before every probe answers, like a slow round trip.
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn push_probe_ok(&self) {
        lock(&self.probe_script).push_back(None);
    }

    pub fn push_probe_failure(&self, message: &str) {
        lock(&self.probe_script).push_back(Some(message.to_owned()));
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        lock(&self.row_script).push_back(rows);
    }

    pub fn statements(&self) -> Vec<Statement> {
        lock(&self.statements).clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Probes that began, including any still waiting out the delay.
    pub fn started_probe_count(&self) -> usize {
        self.probes_started.load(Ordering::SeqCst)
    }

    /// Probes that answered.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn record(&self, statement: &str, args: &[Value]) {
        lock(&self.statements).push(Statement {
            statement: statement.to_owned(),
            args: args.to_vec(),
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn connect(&self, shutdown: &ShutdownSignal) -> Result<(), DatabaseError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        establish(
            self,
            &self.slot,
            (),
            self.mode,
            &self.monitor,
            shutdown,
            |()| std::future::ready(()),
        )
        .await
    }

    async fn query(&self, statement: &str, args: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        self.slot.get()?;
        self.record(statement, args);
        Ok(lock(&self.row_script).pop_front().unwrap_or_default())
    }

    async fn execute(
        &self,
        statement: &str,
        args: &[Value],
    ) -> Result<ExecResult, DatabaseError> {
        self.slot.get()?;
        self.record(statement, args);
        Ok(ExecResult { rows_affected: 1 })
    }

    async fn disconnect(&self) -> Result<(), DatabaseError> {
        self.slot.take()?;
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn probe(&self) -> Result<(), DatabaseError> {
        self.slot.get()?;
        self.probes_started.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
            // Released while the round trip was pending.
            self.slot.get()?;
        }
        self.probes.fetch_add(1, Ordering::SeqCst);
        match lock(&self.probe_script).pop_front().flatten() {
            Some(message) => Err(transport_error(&message)),
            None => Ok(()),
        }
    }

    fn state(&self) -> ConnectionState {
        self.slot.state()
    }
}
