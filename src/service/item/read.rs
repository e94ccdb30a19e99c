//! Read path shared by [`ItemService`](super::ItemService) and
//! [`MutationScope`](super::MutationScope).

use std::collections::{BTreeSet, HashMap};

use sea_orm::{ConnectionTrait, DbErr};
use serde_json::Value as JsonValue;

use crate::{
    data::loader::RelationLoader,
    error::Error,
    model::{
        app::AppState,
        filter::{Filter, Operator},
        item::{Item, ReadResult},
        query::Query,
    },
    permission::Access,
    query::planner::Planner,
    schema::Collection,
    util::key_string,
};

/// Plans `query` and loads its result with every requested relation.
///
/// # Returns
/// - `Ok((ReadResult, BTreeSet))` - Result page and the tables it was read from
/// - `Err(Error)` - Unknown names, malformed query, missing permissions or database failure
pub async fn load<C: ConnectionTrait>(
    db: &C,
    state: &AppState,
    access: &Access<'_>,
    collection: &str,
    query: &Query,
) -> Result<(ReadResult, BTreeSet<String>), Error> {
    let plan = Planner::new(access, state.dialect, &state.settings).plan(collection, query)?;
    let result = RelationLoader::new(db, state.dialect, state.settings.batch_size)
        .load(&plan)
        .await?;
    Ok((result, plan.tables_involved))
}

/// Runs the aggregate of `query`, one item per group.
pub async fn load_aggregate<C: ConnectionTrait>(
    db: &C,
    state: &AppState,
    access: &Access<'_>,
    collection: &str,
    query: &Query,
) -> Result<(Vec<Item>, BTreeSet<String>), Error> {
    let plan = Planner::new(access, state.dialect, &state.settings).plan_aggregate(collection, query)?;
    let rows = db.query_all_raw(plan.statement.render(state.dialect)).await?;
    let items = rows
        .iter()
        .map(|row| plan.row_to_item(row))
        .collect::<Result<Vec<_>, DbErr>>()?;
    Ok((items, plan.tables_involved))
}

/// `query` narrowed to the items with primary keys in `keys`.
///
/// Returns whether the primary key had to be added to the selected fields so the caller
/// can match rows to keys and strip it again.
pub fn keyed_query(schema: &Collection, query: &Query, keys: &[JsonValue]) -> (Query, bool) {
    let mut keyed = query.clone();
    let by_key = Filter::field(
        schema.primary_key.clone(),
        Operator::In,
        JsonValue::Array(keys.to_vec()),
    );
    keyed.filter = Filter::merge_and(keyed.filter.take(), Some(by_key));
    keyed.limit = Some(keys.len() as i64);
    keyed.offset = None;
    keyed.page = None;

    let mut added_pk = false;
    if let Some(fields) = keyed.fields.as_mut() {
        let selects_pk = fields
            .iter()
            .any(|f| f == "*" || *f == schema.primary_key);
        if !selects_pk {
            fields.push(schema.primary_key.clone());
            added_pk = true;
        }
    }
    (keyed, added_pk)
}

/// Splits `keys` into chunks no larger than `limit_max` (`-1` for a single chunk).
pub fn key_chunks(keys: &[JsonValue], limit_max: i64) -> std::slice::Chunks<'_, JsonValue> {
    let size = match usize::try_from(limit_max) {
        Ok(max) => max.max(1),
        Err(_) => keys.len().max(1),
    };
    keys.chunks(size)
}

/// Orders `items` like `keys`, dropping keys without an item.
pub fn order_by_keys(items: Vec<Item>, primary_key: &str, keys: &[JsonValue], strip_pk: bool) -> Vec<Item> {
    let mut by_key: HashMap<String, Item> = items
        .into_iter()
        .filter_map(|item| Some((item.get(primary_key).and_then(key_string)?, item)))
        .collect();
    keys.iter()
        .filter_map(|key| by_key.remove(&key_string(key)?))
        .map(|mut item| {
            if strip_pk {
                item.remove(primary_key);
            }
            item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::query::tests::blog_catalog;

    #[test]
    fn chunks_keys_by_the_maximum_limit() {
        let keys = [json!(1), json!(2), json!(3)];
        let sizes: Vec<usize> = key_chunks(&keys, 2).map(<[JsonValue]>::len).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(key_chunks(&keys, -1).count(), 1);
        assert_eq!(key_chunks(&[], -1).count(), 0);
    }

    #[test]
    fn narrows_the_query_to_the_keys() {
        let catalog = blog_catalog();
        let schema = catalog.get_schema_definition("posts").unwrap();
        let query = Query::new().fields(["title"]).offset(20);

        let (keyed, added_pk) = keyed_query(schema, &query, &[json!(3), json!(1)]);

        assert!(added_pk);
        assert_eq!(keyed.fields, Some(vec!["title".to_string(), "id".to_string()]));
        assert_eq!(keyed.limit, Some(2));
        assert_eq!(keyed.offset, None);
        assert_eq!(
            keyed.filter.map(|f| f.to_json()),
            Some(json!({"id": {"in": [3, 1]}}))
        );
    }

    #[test]
    fn orders_items_like_the_keys() {
        let items = vec![
            json!({"id": 1, "title": "a"}).as_object().cloned().unwrap(),
            json!({"id": 3, "title": "c"}).as_object().cloned().unwrap(),
        ];
        let ordered = order_by_keys(items, "id", &[json!("3"), json!(2), json!(1)], true);
        assert_eq!(
            ordered,
            vec![
                json!({"title": "c"}).as_object().cloned().unwrap(),
                json!({"title": "a"}).as_object().cloned().unwrap(),
            ]
        );
    }
}
