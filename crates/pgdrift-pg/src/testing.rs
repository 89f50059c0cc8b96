//! In-memory executor for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use pgdrift_core::{Row, Value};

use crate::error::{PgError, PgResult};
use crate::executor::QueryExecutor;

/// Replays canned results in order and records every query it is given.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<PgResult<Vec<Row>>>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, rows: Vec<Row>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(rows));
        self
    }

    pub fn fail(self, error: PgError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queue more results on an executor that is already in use.
    pub fn push(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push_back(Ok(rows));
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, query: &str) -> PgResult<Vec<Row>> {
        self.queries.lock().unwrap().push(query.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PgError::Postgres(format!("no scripted result for: {}", query))))
    }
}

pub fn row(fields: &[(&str, Value)]) -> Row {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// A single-row, single-column result.
pub fn scalar(name: &str, value: i64) -> Vec<Row> {
    vec![row(&[(name, Value::Int(value))])]
}
