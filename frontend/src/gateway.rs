//! Row-level access to the persistence service.
//!
//! Everything the screens read or write goes through [`Gateway`]. Records are
//! plain JSON objects; the gateway does not know about settings bundles or
//! devices, only about tables, natural keys and equality filters.

use std::{collections::HashMap, sync::Mutex};

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Devices,
    Settings,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Devices => "devices",
            Table::Settings => "settings",
        }
    }

    /// Columns that identify a row for `insert` conflicts and `upsert`.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Devices => &["id"],
            Table::Settings => &["device_id", "user_id", "setting_type", "setting_key"],
        }
    }
}

/// Conjunction of `column = value` terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter(Vec<(&'static str, String)>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl ToString) -> Self {
        self.0.push((column, value.to_string()));
        self
    }

    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.0
            .iter()
            .all(|(column, value)| column_text(row, column).as_deref() == Some(value.as_str()))
    }
}

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Transport(String),
    #[error("{message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn rejected(status: u16, code: &str, message: impl Into<String>) -> Self {
        GatewayError::Rejected {
            status,
            code: Some(code.to_owned()),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

/// Outcome of a single-row lookup. "No such row" is a regular answer here,
/// not an error, so callers have to decide what it means.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Found(T),
    NotFound,
    Error(GatewayError),
}

impl<T> Fetch<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Found(v) => Fetch::Found(f(v)),
            Fetch::NotFound => Fetch::NotFound,
            Fetch::Error(e) => Fetch::Error(e),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Gateway {
    /// Plain insert, fails when a row with the same key exists.
    async fn insert(&self, table: Table, record: Value) -> Result<(), GatewayError>;
    /// Insert or replace the whole row with the same key.
    async fn upsert(&self, table: Table, record: Value) -> Result<(), GatewayError>;
    /// Overwrite the given fields of every matching row.
    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<(), GatewayError>;
    async fn fetch_one(&self, table: Table, filter: &Filter) -> Fetch<Value>;
    async fn fetch_all(&self, table: Table, filter: &Filter) -> Result<Vec<Value>, GatewayError>;
    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), GatewayError>;
}

/// Gateway keeping rows in process memory. Follows the same rules as the
/// backend: key conflicts on insert, 404 on updates that match nothing,
/// filters required for update/delete, device deletion drops its settings.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    failure: Mutex<Option<GatewayError>>,
    calls: Mutex<usize>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with `err` (or succeed again with `None`).
    pub fn set_failure(&self, err: Option<GatewayError>) {
        *lock(&self.failure) = err;
    }

    /// Number of gateway calls issued so far.
    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        lock(&self.tables).get(&table).cloned().unwrap_or_default()
    }

    fn enter(&self) -> Result<(), GatewayError> {
        *lock(&self.calls) += 1;
        match lock(&self.failure).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn same_key(table: Table, a: &Value, b: &Value) -> bool {
    table
        .key_columns()
        .iter()
        .all(|column| a.get(*column).unwrap_or(&Value::Null) == b.get(*column).unwrap_or(&Value::Null))
}

fn require_object(record: &Value) -> Result<(), GatewayError> {
    if record.is_object() {
        Ok(())
    } else {
        Err(GatewayError::rejected(400, common::req::ErrorBody::BAD_REQUEST, "record must be an object"))
    }
}

fn require_filter(filter: &Filter) -> Result<(), GatewayError> {
    if filter.is_empty() {
        Err(GatewayError::rejected(400, common::req::ErrorBody::BAD_REQUEST, "a filter is required"))
    } else {
        Ok(())
    }
}

impl Gateway for MemoryGateway {
    async fn insert(&self, table: Table, record: Value) -> Result<(), GatewayError> {
        self.enter()?;
        require_object(&record)?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table).or_default();
        if rows.iter().any(|row| same_key(table, row, &record)) {
            return Err(GatewayError::rejected(
                409,
                common::req::ErrorBody::CONFLICT,
                format!("duplicate key in {}", table.name()),
            ));
        }
        rows.push(record);
        Ok(())
    }

    async fn upsert(&self, table: Table, record: Value) -> Result<(), GatewayError> {
        self.enter()?;
        require_object(&record)?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table).or_default();
        match rows.iter_mut().find(|row| same_key(table, row, &record)) {
            Some(row) => *row = record,
            None => rows.push(record),
        }
        Ok(())
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<(), GatewayError> {
        self.enter()?;
        require_filter(filter)?;
        let Value::Object(patch) = patch else {
            return Err(GatewayError::rejected(400, common::req::ErrorBody::BAD_REQUEST, "patch must be an object"));
        };
        let mut tables = lock(&self.tables);
        let mut matched = 0;
        for row in tables.entry(table).or_default().iter_mut().filter(|row| filter.matches(row)) {
            if let Value::Object(fields) = row {
                for (column, value) in &patch {
                    fields.insert(column.clone(), value.clone());
                }
            }
            matched += 1;
        }
        if matched == 0 {
            return Err(GatewayError::rejected(
                404,
                common::req::ErrorBody::NOT_FOUND,
                format!("no {} row matched", table.name()),
            ));
        }
        Ok(())
    }

    async fn fetch_one(&self, table: Table, filter: &Filter) -> Fetch<Value> {
        if let Err(err) = self.enter() {
            return Fetch::Error(err);
        }
        let tables = lock(&self.tables);
        let mut hits = tables
            .get(&table)
            .into_iter()
            .flatten()
            .filter(|row| filter.matches(row));
        match (hits.next(), hits.next()) {
            (None, _) => Fetch::NotFound,
            (Some(row), None) => Fetch::Found(row.clone()),
            (Some(_), Some(_)) => Fetch::Error(GatewayError::rejected(
                406,
                common::req::ErrorBody::AMBIGUOUS,
                "multiple rows returned",
            )),
        }
    }

    async fn fetch_all(&self, table: Table, filter: &Filter) -> Result<Vec<Value>, GatewayError> {
        self.enter()?;
        let tables = lock(&self.tables);
        Ok(tables
            .get(&table)
            .into_iter()
            .flatten()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), GatewayError> {
        self.enter()?;
        require_filter(filter)?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table).or_default();
        let (gone, kept): (Vec<Value>, Vec<Value>) = rows.drain(..).partition(|row| filter.matches(row));
        *rows = kept;

        if table == Table::Devices {
            let gone_ids: Vec<&Value> = gone.iter().filter_map(|row| row.get("id")).collect();
            if let Some(settings) = tables.get_mut(&Table::Settings) {
                settings.retain(|row| !gone_ids.iter().any(|id| row.get("device_id") == Some(*id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setting(device: &str, ty: &str, value: i64) -> Value {
        json!({
            "device_id": device,
            "user_id": "u1",
            "setting_type": ty,
            "setting_key": "k",
            "setting_value": { "v": value },
        })
    }

    #[tokio::test]
    async fn upsert_replaces_row_with_same_key() {
        let gw = MemoryGateway::new();
        gw.upsert(Table::Settings, setting("d1", "thresholds", 1)).await.unwrap();
        gw.upsert(Table::Settings, setting("d1", "thresholds", 2)).await.unwrap();
        gw.upsert(Table::Settings, setting("d2", "thresholds", 3)).await.unwrap();

        let rows = gw.rows(Table::Settings);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["setting_value"]["v"], json!(2));
    }

    #[tokio::test]
    async fn fetch_one_distinguishes_missing_and_ambiguous() {
        let gw = MemoryGateway::new();
        let filter = Filter::new().eq("setting_type", "thresholds");
        assert_eq!(gw.fetch_one(Table::Settings, &filter).await, Fetch::NotFound);

        gw.insert(Table::Settings, setting("d1", "thresholds", 1)).await.unwrap();
        assert!(matches!(gw.fetch_one(Table::Settings, &filter).await, Fetch::Found(_)));

        gw.insert(Table::Settings, setting("d2", "thresholds", 1)).await.unwrap();
        match gw.fetch_one(Table::Settings, &filter).await {
            Fetch::Error(GatewayError::Rejected { status, .. }) => assert_eq!(status, 406),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn insert_conflicts_on_existing_key() {
        let gw = MemoryGateway::new();
        gw.insert(Table::Devices, json!({ "id": "a" })).await.unwrap();
        let err = gw.insert(Table::Devices, json!({ "id": "a" })).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 409, .. }));
    }

    #[tokio::test]
    async fn update_and_delete_need_a_filter() {
        let gw = MemoryGateway::new();
        gw.insert(Table::Devices, json!({ "id": "a", "device_name": "x" })).await.unwrap();
        assert!(gw.delete(Table::Devices, &Filter::new()).await.is_err());
        assert!(gw.update(Table::Devices, &Filter::new(), json!({})).await.is_err());
        assert_eq!(gw.rows(Table::Devices).len(), 1);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_rejected() {
        let gw = MemoryGateway::new();
        let err = gw
            .update(Table::Devices, &Filter::new().eq("id", "nope"), json!({ "device_name": "y" }))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn deleting_device_drops_its_settings() {
        let gw = MemoryGateway::new();
        gw.insert(Table::Devices, json!({ "id": "d1" })).await.unwrap();
        gw.insert(Table::Settings, setting("d1", "thresholds", 1)).await.unwrap();
        gw.insert(Table::Settings, setting("d2", "thresholds", 1)).await.unwrap();

        gw.delete(Table::Devices, &Filter::new().eq("id", "d1")).await.unwrap();

        assert!(gw.rows(Table::Devices).is_empty());
        let settings = gw.rows(Table::Settings);
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0]["device_id"], json!("d2"));
    }

    #[tokio::test]
    async fn failure_applies_to_every_call() {
        let gw = MemoryGateway::new();
        gw.set_failure(Some(GatewayError::Transport("offline".into())));
        assert!(gw.fetch_all(Table::Devices, &Filter::new()).await.is_err());
        assert!(matches!(
            gw.fetch_one(Table::Devices, &Filter::new()).await,
            Fetch::Error(GatewayError::Transport(_))
        ));
        assert_eq!(gw.calls(), 2);
    }

    #[test]
    fn filter_compares_non_string_columns_by_text() {
        let row = json!({ "is_online": false, "count": 3, "device_id": null });
        assert!(Filter::new().eq("is_online", false).matches(&row));
        assert!(Filter::new().eq("count", 3).matches(&row));
        assert!(!Filter::new().eq("device_id", "null").matches(&row));
    }
}
