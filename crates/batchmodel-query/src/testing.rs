//! Entities and a scripted connection shared by the command tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use asupersync::{Cx, Outcome};
use batchmodel_core::{Connection, Dialect, Error, Row, Value};
use batchmodel_macros::{Entity, Enumeration, Reflect};

#[derive(Debug, Clone, Copy, PartialEq, Default, Enumeration)]
pub enum Status {
    #[default]
    Open,
    Shipped = 5,
}

#[derive(Debug, Clone, Default, PartialEq, Reflect)]
pub struct Embedded {
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(table = "orders")]
pub struct Order {
    pub id: i64,
    pub total: i64,
    #[entity(enumeration)]
    pub status: Option<Status>,
    #[entity(unmapped)]
    pub note: String,
    #[entity(owned)]
    pub shipping: Option<Embedded>,
}

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

#[derive(Debug, Default)]
struct MockState {
    executed: Vec<(String, Vec<Value>)>,
    results: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
    fail_on: Option<usize>,
}

/// Records every statement and replays scripted results in order.
#[derive(Debug, Clone)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    dialect: Dialect,
}

impl MockConnection {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            dialect,
        }
    }

    /// Result set for the next `query` call.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.lock().expect("lock poisoned").results.push_back(rows);
    }

    /// Affected count for the next `execute` call.
    pub fn push_affected(&self, n: u64) {
        self.state.lock().expect("lock poisoned").affected.push_back(n);
    }

    /// Fail the `call`-th statement (1-based).
    pub fn fail_on_call(&self, call: usize) {
        self.state.lock().expect("lock poisoned").fail_on = Some(call);
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().expect("lock poisoned").executed.clone()
    }

    fn record(&self, sql: &str, params: &[Value]) -> bool {
        let mut guard = self.state.lock().expect("lock poisoned");
        guard.executed.push((sql.to_string(), params.to_vec()));
        guard.fail_on == Some(guard.executed.len())
    }
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let failed = self.record(sql, params);
        let rows = self
            .state
            .lock()
            .expect("lock poisoned")
            .results
            .pop_front()
            .unwrap_or_default();
        async move {
            if failed {
                return Outcome::Err(Error::Custom("scripted failure".into()));
            }
            Outcome::Ok(rows)
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let failed = self.record(sql, params);
        let affected = self
            .state
            .lock()
            .expect("lock poisoned")
            .affected
            .pop_front()
            .unwrap_or(0);
        async move {
            if failed {
                return Outcome::Err(Error::Custom("scripted failure".into()));
            }
            Outcome::Ok(affected)
        }
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}
