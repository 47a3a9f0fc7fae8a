//! Call shapes for record mutations
//!
//! The transaction manager knows four kinds of remote call: create, write,
//! unlink and the read that captures a WRITE's pre-image. [`RecordCalls`]
//! turns each into a concrete `service` / `method` / `args` triple and decodes
//! the two results the manager has to understand.

use remtx_core::{Error, FieldValues, RecordId, RemoteFault, Result};
use serde_json::{json, Value};

/// Concrete call sent through the transport
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    /// Remote service
    pub service: String,
    /// Method on that service
    pub method: String,
    /// Positional arguments
    pub args: Vec<Value>,
}

/// Builds record-mutation calls and decodes their results
pub trait RecordCalls: Send + Sync {
    /// Create one record from `values`
    fn create(&self, model: &str, values: &FieldValues) -> RemoteCall;

    /// Update `ids` with `values`
    fn write(&self, model: &str, ids: &[RecordId], values: &FieldValues) -> RemoteCall;

    /// Delete `ids`
    fn unlink(&self, model: &str, ids: &[RecordId]) -> RemoteCall;

    /// Read `fields` of `ids`
    fn read(&self, model: &str, ids: &[RecordId], fields: &[String]) -> RemoteCall;

    /// Record ids assigned by a create call
    ///
    /// Accepts a single id or a non-empty list of ids.
    fn created_ids(&self, result: Value) -> Result<Vec<RecordId>> {
        match &result {
            Value::Number(n) => n.as_i64().map(|id| vec![id]),
            Value::Array(items) if !items.is_empty() => items.iter().map(Value::as_i64).collect(),
            _ => None,
        }
        .ok_or_else(|| unexpected("create", &result))
    }

    /// Field values per record from a read call
    ///
    /// Expects a list of objects, each carrying its `id`.
    fn read_records(&self, result: Value) -> Result<Vec<(RecordId, FieldValues)>> {
        let items = match result {
            Value::Array(items) => items,
            other => return Err(unexpected("read", &other)),
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut fields) => match fields.remove("id").as_ref().and_then(Value::as_i64) {
                    Some(id) => Ok((id, fields)),
                    None => Err(unexpected("read", &Value::Object(fields))),
                },
                other => Err(unexpected("read", &other)),
            })
            .collect()
    }
}

fn unexpected(call: &str, result: &Value) -> Error {
    let shown: String = result.to_string().chars().take(200).collect();
    Error::Remote(
        RemoteFault::new(format!("unexpected {} result: {}", call, shown))
            .with_context("result", result.clone()),
    )
}

/// `object.execute_kw` call shapes
///
/// Args are the prefix (identity values supplied by the session layer,
/// forwarded untouched) followed by `model`, `method`, positional params and,
/// for reads, a keyword map.
#[derive(Debug, Clone, Default)]
pub struct ObjectCalls {
    prefix: Vec<Value>,
}

impl ObjectCalls {
    /// Service name
    pub const SERVICE: &'static str = "object";
    /// Method name
    pub const METHOD: &'static str = "execute_kw";

    /// Shapes with no prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Shapes that put `prefix` before the model name
    pub fn with_prefix(prefix: Vec<Value>) -> Self {
        Self { prefix }
    }

    fn execute(&self, model: &str, method: &str, params: Vec<Value>, kwargs: Option<Value>) -> RemoteCall {
        let mut args = self.prefix.clone();
        args.push(Value::from(model));
        args.push(Value::from(method));
        args.push(Value::Array(params));
        if let Some(kwargs) = kwargs {
            args.push(kwargs);
        }
        RemoteCall {
            service: Self::SERVICE.to_string(),
            method: Self::METHOD.to_string(),
            args,
        }
    }
}

impl RecordCalls for ObjectCalls {
    fn create(&self, model: &str, values: &FieldValues) -> RemoteCall {
        self.execute(model, "create", vec![Value::Object(values.clone())], None)
    }

    fn write(&self, model: &str, ids: &[RecordId], values: &FieldValues) -> RemoteCall {
        self.execute(model, "write", vec![json!(ids), Value::Object(values.clone())], None)
    }

    fn unlink(&self, model: &str, ids: &[RecordId]) -> RemoteCall {
        self.execute(model, "unlink", vec![json!(ids)], None)
    }

    fn read(&self, model: &str, ids: &[RecordId], fields: &[String]) -> RemoteCall {
        self.execute(model, "read", vec![json!(ids)], Some(json!({ "fields": fields })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remtx_core::ErrorKind;

    #[test]
    fn create_shape() {
        let values = json!({"name": "Acme"}).as_object().cloned().unwrap();
        let call = ObjectCalls::new().create("res.partner", &values);
        assert_eq!(call.service, "object");
        assert_eq!(call.method, "execute_kw");
        assert_eq!(call.args, vec![json!("res.partner"), json!("create"), json!([{"name": "Acme"}])]);
    }

    #[test]
    fn prefix_is_forwarded_first() {
        let calls = ObjectCalls::with_prefix(vec![json!("db"), json!(2), json!("secret")]);
        let call = calls.unlink("res.partner", &[4, 5]);
        assert_eq!(
            call.args,
            vec![
                json!("db"),
                json!(2),
                json!("secret"),
                json!("res.partner"),
                json!("unlink"),
                json!([[4, 5]])
            ]
        );
    }

    #[test]
    fn read_shape_requests_fields() {
        let call = ObjectCalls::new().read("res.partner", &[1], &["name".to_string()]);
        assert_eq!(call.args[3], json!({"fields": ["name"]}));
    }

    #[test]
    fn created_ids_accepts_single_and_list() {
        let calls = ObjectCalls::new();
        assert_eq!(calls.created_ids(json!(12)).unwrap(), vec![12]);
        assert_eq!(calls.created_ids(json!([12, 13])).unwrap(), vec![12, 13]);
        assert_eq!(
            calls.created_ids(json!("x")).unwrap_err().kind(),
            ErrorKind::Remote
        );
        assert!(calls.created_ids(json!([])).is_err());
    }

    #[test]
    fn read_records_strips_id() {
        let records = ObjectCalls::new()
            .read_records(json!([{"id": 3, "name": "A"}, {"id": 4, "name": "B"}]))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 3);
        assert!(!records[0].1.contains_key("id"));
        assert_eq!(records[1].1.get("name"), Some(&json!("B")));
    }

    #[test]
    fn read_records_rejects_unexpected_shapes() {
        let calls = ObjectCalls::new();
        assert!(calls.read_records(json!({"id": 1})).is_err());
        assert!(calls.read_records(json!([{"name": "no id"}])).is_err());
        assert!(calls.read_records(json!([1, 2])).is_err());
    }
}
