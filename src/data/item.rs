//! Row level statements against catalog collections.
//!
//! The mutation pipeline validates and coerces payloads before they get here; this
//! repository only binds values by field type and runs plain INSERT/UPDATE/DELETE and
//! equality SELECTs.

use sea_orm::{ConnectionTrait, Value};
use serde_json::Value as JsonValue;

use crate::{
    error::{Error, QueryError},
    model::item::Item,
    schema::{collection::SORT, Collection, FieldType, SchemaCatalog},
    sql::{quote, value::decode, value::to_db_value, ColumnKind, Dialect, Fragment},
};

const MAX_SORT: &str = "max_sort";

pub struct ItemRepository<'a, C: ConnectionTrait> {
    db: &'a C,
    catalog: &'a SchemaCatalog,
    dialect: Dialect,
}

impl<'a, C: ConnectionTrait> ItemRepository<'a, C> {
    /// Creates a new instance of [`ItemRepository`]
    pub fn new(db: &'a C, catalog: &'a SchemaCatalog, dialect: Dialect) -> Self {
        Self {
            db,
            catalog,
            dialect,
        }
    }

    fn bind(&self, schema: &Collection, field: &str, value: &JsonValue) -> Result<Value, Error> {
        let field_type = schema
            .field(field)
            .map(|f| f.field_type)
            .ok_or_else(|| QueryError::UnknownField {
                collection: schema.name.clone(),
                field: field.to_string(),
            })?;
        to_db_value(field_type, value, self.dialect).map_err(|reason| {
            QueryError::InvalidValue {
                field: field.to_string(),
                reason,
            }
            .into()
        })
    }

    fn pk_type(schema: &Collection) -> FieldType {
        schema
            .primary_key_field()
            .map(|f| f.field_type)
            .unwrap_or(FieldType::Integer)
    }

    fn bind_keys(&self, schema: &Collection, keys: &[JsonValue]) -> Result<Vec<Value>, Error> {
        keys.iter()
            .map(|key| self.bind(schema, &schema.primary_key, key))
            .collect()
    }

    /// Inserts one row and returns its primary key.
    pub async fn insert(&self, collection: &str, values: &Item) -> Result<JsonValue, Error> {
        let schema = self.catalog.get_schema_definition(collection)?;

        let mut statement = Fragment::sql(format!("INSERT INTO {}", quote(&schema.table)));
        if values.is_empty() {
            statement.push_sql(" DEFAULT VALUES");
        } else {
            let columns: Vec<String> = values.keys().map(|k| quote(k)).collect();
            statement.push_sql(format!(" ({}) VALUES (", columns.join(", ")));
            let mut bound = Vec::with_capacity(values.len());
            for (field, value) in values {
                bound.push(Fragment::value(self.bind(schema, field, value)?));
            }
            statement.push(Fragment::join(bound, ", "));
            statement.push_sql(")");
        }
        statement.push_sql(format!(" RETURNING {}", quote(&schema.primary_key)));

        let row = self
            .db
            .query_one_raw(statement.render(self.dialect))
            .await?
            .ok_or_else(|| Error::InternalError(format!("insert into \"{}\" returned no row", collection)))?;
        let key = decode(&row, &schema.primary_key, ColumnKind::Field(Self::pk_type(schema)))?;

        tracing::debug!(collection, key = %key, "inserted item");
        Ok(key)
    }

    /// Updates the rows with primary keys in `keys`. Returns the affected row count.
    pub async fn update(&self, collection: &str, keys: &[JsonValue], values: &Item) -> Result<u64, Error> {
        if keys.is_empty() || values.is_empty() {
            return Ok(0);
        }
        let schema = self.catalog.get_schema_definition(collection)?;

        let mut assignments = Vec::with_capacity(values.len());
        for (field, value) in values {
            let mut assignment = Fragment::sql(format!("{} = ", quote(field)));
            assignment.push_value(self.bind(schema, field, value)?);
            assignments.push(assignment);
        }

        let mut statement = Fragment::sql(format!("UPDATE {} SET ", quote(&schema.table)));
        statement.push(Fragment::join(assignments, ", "));
        statement.push_sql(" WHERE ");
        statement.push(Fragment::sql(quote(&schema.primary_key)).in_list(self.bind_keys(schema, keys)?, false));

        let result = self.db.execute_raw(statement.render(self.dialect)).await?;
        Ok(result.rows_affected())
    }

    /// Deletes the rows with primary keys in `keys`. Returns the affected row count.
    pub async fn delete(&self, collection: &str, keys: &[JsonValue]) -> Result<u64, Error> {
        if keys.is_empty() {
            return Ok(0);
        }
        let schema = self.catalog.get_schema_definition(collection)?;

        let mut statement = Fragment::sql(format!("DELETE FROM {} WHERE ", quote(&schema.table)));
        statement.push(Fragment::sql(quote(&schema.primary_key)).in_list(self.bind_keys(schema, keys)?, false));

        let result = self.db.execute_raw(statement.render(self.dialect)).await?;
        Ok(result.rows_affected())
    }

    /// Every field of the rows matching all `conditions` (column equality, `null` matches
    /// `IS NULL`), ordered by primary key.
    pub async fn find_where(&self, collection: &str, conditions: &[(&str, &JsonValue)]) -> Result<Vec<Item>, Error> {
        let schema = self.catalog.get_schema_definition(collection)?;
        let mut parts = Vec::with_capacity(conditions.len());
        for (field, value) in conditions {
            if value.is_null() {
                parts.push(Fragment::sql(format!("{} IS NULL", quote(field))));
            } else {
                let mut part = Fragment::sql(format!("{} = ", quote(field)));
                part.push_value(self.bind(schema, field, value)?);
                parts.push(part);
            }
        }
        self.select(schema, Fragment::and(parts)).await
    }

    /// Every field of the rows with primary keys in `keys`.
    pub async fn find_by_keys(&self, collection: &str, keys: &[JsonValue]) -> Result<Vec<Item>, Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let schema = self.catalog.get_schema_definition(collection)?;
        let condition = Fragment::sql(quote(&schema.primary_key)).in_list(self.bind_keys(schema, keys)?, false);
        self.select(schema, Some(condition)).await
    }

    async fn select(&self, schema: &Collection, condition: Option<Fragment>) -> Result<Vec<Item>, Error> {
        let columns: Vec<String> = schema.fields.keys().map(|f| quote(f)).collect();
        let mut statement = Fragment::sql(format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            quote(&schema.table)
        ));
        if let Some(condition) = condition {
            statement.push_sql(" WHERE ");
            statement.push(condition);
        }
        statement.push_sql(format!(" ORDER BY {}", quote(&schema.primary_key)));

        let rows = self.db.query_all_raw(statement.render(self.dialect)).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut item = Item::new();
            for (name, field) in &schema.fields {
                item.insert(name.clone(), decode(row, name, ColumnKind::Field(field.field_type))?);
            }
            items.push(item);
        }
        Ok(items)
    }

    /// Highest manual sort value, optionally within one tenant.
    pub async fn max_sort(&self, collection: &str, tenant: Option<(&str, &str)>) -> Result<Option<i64>, Error> {
        let schema = self.catalog.get_schema_definition(collection)?;
        let mut statement = Fragment::sql(format!(
            "SELECT MAX({}) AS {} FROM {}",
            quote(SORT),
            quote(MAX_SORT),
            quote(&schema.table)
        ));
        if let Some((column, tenant)) = tenant {
            statement.push_sql(format!(" WHERE {} = ", quote(column)));
            statement.push_value(tenant.to_string());
        }

        let row = self.db.query_one_raw(statement.render(self.dialect)).await?;
        Ok(match row {
            Some(row) => decode(&row, MAX_SORT, ColumnKind::Count)?.as_i64(),
            None => None,
        })
    }
}
