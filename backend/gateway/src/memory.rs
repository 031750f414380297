//! In-memory [`Backend`] with the same read semantics as the hosted one, a call
//! log, and switches to make individual operations fail.
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::{
    backend::Backend,
    error::{GatewayError, GatewayResult},
    models::{AuthData, ImageHandle, User},
    query::{text, Select},
};

const NOT_SINGLE: &str = "JSON object requested, multiple (or no) rows returned";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Select { table: String, select: Select },
    InsertSingle { table: String, row: Value },
    Insert { table: String, rows: Vec<Value> },
    UpdateSingle { table: String, field: String, value: String, changes: Value },
    Download { bucket: String, path: String },
    SignIn { email: String },
    SignUp { email: String },
    SignOut,
    CurrentUser,
}

#[derive(Default)]
struct Failures {
    queries: HashMap<String, String>,
    writes: Option<String>,
    downloads: HashSet<String>,
    sign_out: Option<String>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    unique: Mutex<Vec<(String, String)>>,
    objects: Mutex<HashMap<(String, String), Bytes>>,
    accounts: Mutex<HashMap<String, String>>,
    session: Mutex<Option<User>>,
    failures: Mutex<Failures>,
    calls: Mutex<Vec<Call>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .extend(rows);
        self
    }

    /// Rejects inserts that repeat an existing value of `field`.
    pub fn with_unique(self, table: &str, field: &str) -> Self {
        lock(&self.unique).push((table.to_string(), field.to_string()));
        self
    }

    pub fn with_object(self, bucket: &str, path: &str, bytes: &'static [u8]) -> Self {
        lock(&self.objects).insert(
            (bucket.to_string(), path.to_string()),
            Bytes::from_static(bytes),
        );
        self
    }

    pub fn with_account(self, email: &str, password: &str) -> Self {
        lock(&self.accounts).insert(email.to_string(), password.to_string());
        self
    }

    pub fn fail_query(&self, table: &str, message: &str) {
        lock(&self.failures)
            .queries
            .insert(table.to_string(), message.to_string());
    }

    pub fn fail_writes(&self, message: &str) {
        lock(&self.failures).writes = Some(message.to_string());
    }

    pub fn fail_download(&self, path: &str) {
        lock(&self.failures).downloads.insert(path.to_string());
    }

    pub fn fail_sign_out(&self, message: &str) {
        lock(&self.failures).sign_out = Some(message.to_string());
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    fn check_write(&self) -> GatewayResult<()> {
        match &lock(&self.failures).writes {
            Some(message) => Err(GatewayError::write(message.clone())),
            None => Ok(()),
        }
    }

    fn check_unique(&self, table: &str, row: &Value) -> GatewayResult<()> {
        let tables = lock(&self.tables);
        let existing = tables.get(table).map(Vec::as_slice).unwrap_or_default();

        for (unique_table, field) in lock(&self.unique).iter() {
            if unique_table != table {
                continue;
            }

            let Some(value) = text(row.get(field)) else {
                continue;
            };

            if existing
                .iter()
                .any(|other| text(other.get(field)).as_deref() == Some(value.as_str()))
            {
                return Err(GatewayError::write(format!(
                    "duplicate key value violates unique constraint \"{table}_{field}_key\""
                )));
            }
        }

        Ok(())
    }

    fn embed(&self, tables: &HashMap<String, Vec<Value>>, select: &Select, row: &mut Value) {
        for embed in &select.embeds {
            let key = text(row.get(&embed.local));
            let related: Vec<Value> = tables
                .get(&embed.table)
                .map(|rows| {
                    rows.iter()
                        .filter(|other| key.is_some() && text(other.get(&embed.foreign)) == key)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let nested = if embed.many {
                Value::Array(related)
            } else {
                related.into_iter().next().unwrap_or(Value::Null)
            };

            if let Value::Object(map) = row {
                map.insert(embed.table.clone(), nested);
            }
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, table: &str, select: &Select) -> GatewayResult<Vec<Value>> {
        self.record(Call::Select {
            table: table.to_string(),
            select: select.clone(),
        });

        if let Some(message) = lock(&self.failures).queries.get(table) {
            return Err(GatewayError::query(table, message.clone()));
        }

        let tables = lock(&self.tables);
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| select.matches(row)).cloned().collect())
            .unwrap_or_default();

        select.sort(&mut rows);

        if let Some(limit) = select.limit {
            rows.truncate(limit);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut row = select.project(row);
                self.embed(&tables, select, &mut row);
                row
            })
            .collect())
    }

    async fn insert_single(&self, table: &str, row: Value) -> GatewayResult<Value> {
        self.record(Call::InsertSingle {
            table: table.to_string(),
            row: row.clone(),
        });

        self.check_write()?;
        self.check_unique(table, &row)?;

        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .push(row.clone());

        Ok(row)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> GatewayResult<()> {
        self.record(Call::Insert {
            table: table.to_string(),
            rows: rows.clone(),
        });

        self.check_write()?;
        for row in &rows {
            self.check_unique(table, row)?;
        }

        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .extend(rows);

        Ok(())
    }

    async fn update_single(
        &self,
        table: &str,
        field: &str,
        value: &str,
        changes: Value,
    ) -> GatewayResult<Value> {
        self.record(Call::UpdateSingle {
            table: table.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            changes: changes.clone(),
        });

        self.check_write()?;

        let mut tables = lock(&self.tables);
        let rows = tables.entry(table.to_string()).or_default();
        let mut matching: Vec<&mut Value> = rows
            .iter_mut()
            .filter(|row| text(row.get(field)).as_deref() == Some(value))
            .collect();

        if matching.len() != 1 {
            return Err(GatewayError::write(NOT_SINGLE));
        }

        let row = &mut matching[0];
        if let (Value::Object(target), Value::Object(changes)) = (&mut **row, changes) {
            target.extend(changes);
        }

        Ok(row.clone())
    }

    async fn download(&self, bucket: &str, path: &str) -> GatewayResult<ImageHandle> {
        self.record(Call::Download {
            bucket: bucket.to_string(),
            path: path.to_string(),
        });

        let missing = || GatewayError::Download {
            path: path.to_string(),
            message: "Object not found".to_string(),
        };

        if lock(&self.failures).downloads.contains(path) {
            return Err(missing());
        }

        lock(&self.objects)
            .get(&(bucket.to_string(), path.to_string()))
            .map(|bytes| ImageHandle {
                bytes: bytes.clone(),
                content_type: Some("image/png".to_string()),
            })
            .ok_or_else(missing)
    }

    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<AuthData> {
        self.record(Call::SignIn {
            email: email.to_string(),
        });

        let known = lock(&self.accounts).get(email).map(String::as_str) == Some(password);
        if !known {
            return Err(GatewayError::auth("Invalid login credentials"));
        }

        let user = user_for(email);
        *lock(&self.session) = Some(user.clone());

        Ok(AuthData {
            user: Some(user),
            session: None,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> GatewayResult<AuthData> {
        self.record(Call::SignUp {
            email: email.to_string(),
        });

        let mut accounts = lock(&self.accounts);
        if accounts.contains_key(email) {
            return Err(GatewayError::auth("User already registered"));
        }
        accounts.insert(email.to_string(), password.to_string());

        Ok(AuthData {
            user: Some(user_for(email)),
            session: None,
        })
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        self.record(Call::SignOut);

        if let Some(message) = &lock(&self.failures).sign_out {
            return Err(GatewayError::auth(message.clone()));
        }

        *lock(&self.session) = None;
        Ok(())
    }

    async fn current_user(&self) -> GatewayResult<Option<User>> {
        self.record(Call::CurrentUser);
        Ok(lock(&self.session).clone())
    }
}

fn user_for(email: &str) -> User {
    User {
        id: format!("user-{email}"),
        email: Some(email.to_string()),
    }
}
