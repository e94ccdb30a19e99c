//! JSON requests accepted by the binary host.

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::{
    engine::Engine,
    error::{Error, FieldViolation, QueryError, ValidationError},
    model::{accountability::Accountability, item::Item, mutation::MutationOptions, query::Query},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Read,
    Aggregate,
    Create,
    Update,
    Delete,
}

/// One engine call.
///
/// `key` or `keys` address items directly; otherwise `query` selects them. Requests run
/// as the system caller unless `accountability` is given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub op: Operation,
    pub collection: String,
    #[serde(default)]
    pub query: Option<Query>,
    #[serde(default)]
    pub key: Option<JsonValue>,
    #[serde(default)]
    pub keys: Option<Vec<JsonValue>>,
    #[serde(default)]
    pub data: Option<JsonValue>,
    #[serde(default)]
    pub options: MutationOptions,
    #[serde(default = "Accountability::system")]
    pub accountability: Accountability,
}

impl Request {
    pub fn from_json(value: JsonValue) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }

    fn object(&self, value: JsonValue) -> Result<Item, Error> {
        match value {
            JsonValue::Object(item) => Ok(item),
            _ => Err(self.bad_data("expected an object").into()),
        }
    }

    fn bad_data(&self, message: &str) -> ValidationError {
        ValidationError::new(
            self.collection.clone(),
            vec![FieldViolation::new("data", "type", message)],
        )
    }

    fn missing_target(&self) -> Error {
        QueryError::InvalidFilter(format!(
            "{:?} on \"{}\" needs a key, keys or a query",
            self.op, self.collection
        ))
        .into()
    }
}

impl Engine {
    /// Runs `request` and returns its JSON result.
    ///
    /// Reads return the item, item list or `{data, totalCount}` page; mutations return
    /// `{"key": ..}` or `{"keys": [..]}`.
    pub async fn execute(&self, request: Request) -> Result<JsonValue, Error> {
        let items = self.items(&request.accountability);
        let collection = request.collection.as_str();
        let query = request.query.clone().unwrap_or_default();
        let options = request.options;

        tracing::debug!(collection, op = ?request.op, "executing request");
        match request.op {
            Operation::Read => match (&request.key, &request.keys) {
                (Some(key), _) => Ok(JsonValue::Object(items.read_one(collection, key, &query).await?)),
                (None, Some(keys)) => Ok(json!(items.read_many(collection, keys, &query).await?)),
                (None, None) => Ok(serde_json::to_value(items.read_by_query(collection, &query).await?)?),
            },
            Operation::Aggregate => Ok(json!(items.aggregate(collection, &query).await?)),
            Operation::Create => match request.data.clone() {
                Some(JsonValue::Array(list)) => {
                    let payloads = list
                        .into_iter()
                        .map(|value| request.object(value))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(json!({"keys": items.create_many(collection, payloads, options).await?}))
                }
                Some(value) => {
                    let payload = request.object(value)?;
                    Ok(json!({"key": items.create_one(collection, payload, options).await?}))
                }
                None => Err(request.bad_data("missing").into()),
            },
            Operation::Update => {
                let payload = match request.data.clone() {
                    Some(value) => request.object(value)?,
                    None => return Err(request.bad_data("missing").into()),
                };
                match (request.key.clone(), request.keys.clone(), &request.query) {
                    (Some(key), _, _) => Ok(json!({"key": items.update_one(collection, key, payload, options).await?})),
                    (None, Some(keys), _) => Ok(json!({"keys": items.update_many(collection, keys, payload, options).await?})),
                    (None, None, Some(query)) => Ok(json!({"keys": items.update_by_query(collection, query, payload, options).await?})),
                    (None, None, None) => Err(request.missing_target()),
                }
            }
            Operation::Delete => match (request.key.clone(), request.keys.clone(), &request.query) {
                (Some(key), _, _) => Ok(json!({"key": items.delete_one(collection, key, options).await?})),
                (None, Some(keys), _) => Ok(json!({"keys": items.delete_many(collection, keys, options).await?})),
                (None, None, Some(query)) => Ok(json!({"keys": items.delete_by_query(collection, query, options).await?})),
                (None, None, None) => Err(request.missing_target()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_system_caller() {
        let request = Request::from_json(json!({
            "op": "update",
            "collection": "posts",
            "keys": [1, 2],
            "data": {"title": "x"},
            "options": {"force": true}
        }))
        .unwrap();

        assert_eq!(request.op, Operation::Update);
        assert!(request.accountability.system);
        assert!(request.options.force);
        assert_eq!(request.keys, Some(vec![json!(1), json!(2)]));
    }

    #[test]
    fn rejects_unknown_operations() {
        assert!(Request::from_json(json!({"op": "upsert", "collection": "posts"})).is_err());
    }
}
