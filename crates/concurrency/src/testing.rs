//! In-memory record service for exercising the transaction manager
//!
//! [`InMemoryRecords`] answers the call shapes produced by
//! [`ObjectCalls`](crate::ObjectCalls) against a local table per model, so
//! tests can check what a commit or a compensation actually left behind.
//! Remote errors are built with the same mapper the HTTP transport uses.
//!
//! # Example
//!
//! ```ignore
//! let records = Arc::new(InMemoryRecords::new());
//! let stub = Arc::new(records.transport().fail_on_call(3, || Error::connection("reset")));
//! let manager = TransactionManager::new(stub.clone());
//! ```

use parking_lot::Mutex;
use remtx_core::error_map::{INVALID_PARAMS, METHOD_NOT_FOUND, SERVER_ERROR};
use remtx_core::{map_remote_error, Error, FieldValues, RecordId, Result};
use remtx_transport::testing::{RecordedCall, StubTransport};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Tables {
    models: HashMap<String, BTreeMap<RecordId, FieldValues>>,
    last_id: RecordId,
}

/// Record store speaking `object.execute_kw`
#[derive(Debug, Default)]
pub struct InMemoryRecords {
    tables: Mutex<Tables>,
    prefix_len: usize,
}

impl InMemoryRecords {
    /// Store expecting calls without an args prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Store expecting `prefix_len` identity values before the model name
    pub fn with_prefix_len(prefix_len: usize) -> Self {
        InMemoryRecords {
            prefix_len,
            ..Self::default()
        }
    }

    /// Stub transport answering every call from this store
    pub fn transport(self: &Arc<Self>) -> StubTransport {
        let records = Arc::clone(self);
        StubTransport::new(move |call| records.handle(call))
    }

    /// Seed a record directly, bypassing the call path
    pub fn insert(&self, model: &str, values: FieldValues) -> RecordId {
        let mut tables = self.tables.lock();
        tables.last_id += 1;
        let id = tables.last_id;
        tables.models.entry(model.to_string()).or_default().insert(id, values);
        id
    }

    /// Current values of one record
    pub fn get(&self, model: &str, id: RecordId) -> Option<FieldValues> {
        self.tables.lock().models.get(model)?.get(&id).cloned()
    }

    /// Every record of `model`, in id order
    pub fn records(&self, model: &str) -> Vec<(RecordId, FieldValues)> {
        self.tables
            .lock()
            .models
            .get(model)
            .map(|table| table.iter().map(|(id, v)| (*id, v.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of records of `model`
    pub fn count(&self, model: &str) -> usize {
        self.tables.lock().models.get(model).map_or(0, BTreeMap::len)
    }

    /// Answer one recorded call
    pub fn handle(&self, call: &RecordedCall) -> Result<Value> {
        match (call.service.as_str(), call.method.as_str()) {
            ("common", "version") => Ok(json!({"server_version": "17.0", "protocol_version": 1})),
            ("object", "execute_kw") => self.execute_kw(&call.args),
            (service, method) => Err(map_remote_error(
                METHOD_NOT_FOUND,
                Some(&format!("{}.{} does not exist", service, method)),
                None,
            )),
        }
    }

    fn execute_kw(&self, args: &[Value]) -> Result<Value> {
        let args = args.get(self.prefix_len..).unwrap_or_default();
        let (model, method, params) = match args {
            [Value::String(model), Value::String(method), Value::Array(params), ..] => {
                (model.as_str(), method.as_str(), params.as_slice())
            }
            _ => return Err(invalid_params("expected model, method and params")),
        };
        let kwargs = args.get(3);

        let mut tables = self.tables.lock();
        match method {
            "create" => {
                let values = params
                    .first()
                    .and_then(Value::as_object)
                    .ok_or_else(|| invalid_params("create expects a values map"))?;
                tables.last_id += 1;
                let id = tables.last_id;
                tables.models.entry(model.to_string()).or_default().insert(id, values.clone());
                Ok(json!(id))
            }
            "write" => {
                let ids = ids_param(params)?;
                let values = params
                    .get(1)
                    .and_then(Value::as_object)
                    .ok_or_else(|| invalid_params("write expects a values map"))?;
                let table = tables.models.entry(model.to_string()).or_default();
                check_exist(model, table, &ids)?;
                for id in &ids {
                    if let Some(record) = table.get_mut(id) {
                        for (field, value) in values {
                            record.insert(field.clone(), value.clone());
                        }
                    }
                }
                Ok(json!(true))
            }
            "unlink" => {
                let ids = ids_param(params)?;
                let table = tables.models.entry(model.to_string()).or_default();
                check_exist(model, table, &ids)?;
                for id in &ids {
                    table.remove(id);
                }
                Ok(json!(true))
            }
            "read" => {
                let ids = ids_param(params)?;
                let fields: Option<Vec<&str>> = kwargs
                    .and_then(|k| k.get("fields"))
                    .and_then(Value::as_array)
                    .map(|fields| fields.iter().filter_map(Value::as_str).collect());
                let table = tables.models.entry(model.to_string()).or_default();
                check_exist(model, table, &ids)?;
                let rows = ids
                    .iter()
                    .filter_map(|id| table.get(id).map(|record| (id, record)))
                    .map(|(id, record)| {
                        let mut row = FieldValues::new();
                        row.insert("id".to_string(), json!(id));
                        for (field, value) in record {
                            if fields.as_ref().map_or(true, |f| f.contains(&field.as_str())) {
                                row.insert(field.clone(), value.clone());
                            }
                        }
                        Value::Object(row)
                    })
                    .collect();
                Ok(Value::Array(rows))
            }
            other => Err(map_remote_error(
                METHOD_NOT_FOUND,
                Some(&format!("method {} does not exist on {}", other, model)),
                None,
            )),
        }
    }
}

fn ids_param(params: &[Value]) -> Result<Vec<RecordId>> {
    params
        .first()
        .and_then(Value::as_array)
        .and_then(|ids| ids.iter().map(Value::as_i64).collect())
        .ok_or_else(|| invalid_params("expected a list of record ids"))
}

fn check_exist(model: &str, table: &BTreeMap<RecordId, FieldValues>, ids: &[RecordId]) -> Result<()> {
    let missing: Vec<RecordId> = ids.iter().copied().filter(|id| !table.contains_key(id)).collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(map_remote_error(
        SERVER_ERROR,
        Some(&format!("{}({:?}) does not exist or has been deleted", model, missing)),
        Some(&json!({"name": "exceptions.MissingError", "debug": "MissingError raised by record store"})),
    ))
}

fn invalid_params(message: &str) -> Error {
    map_remote_error(INVALID_PARAMS, Some(message), None)
}
