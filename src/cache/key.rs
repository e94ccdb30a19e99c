//! Content-addressed cache keys.

use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};

use crate::{
    error::Error,
    model::{accountability::Accountability, query::Query},
    permission::TenantScope,
    util::canonical_json,
};

/// Kind of read a key addresses, so a list read and an aggregate of the same query
/// never share an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Query,
    Aggregate,
}

impl ReadKind {
    fn as_str(&self) -> &'static str {
        match self {
            ReadKind::Query => "query",
            ReadKind::Aggregate => "aggregate",
        }
    }
}

/// Cache key of a read: `<collection>:<sha256 of the canonical read description>`.
///
/// The description covers the whole query and every part of the caller context that
/// changes what the read may return (user and role for placeholder-resolved filters,
/// admin/system flags and the resolved tenant).
pub fn read_key(
    kind: ReadKind,
    collection: &str,
    query: &Query,
    accountability: &Accountability,
    tenant: &TenantScope,
) -> Result<String, Error> {
    let tenant = match tenant {
        TenantScope::Unrestricted => JsonValue::Null,
        TenantScope::Tenant(id) => JsonValue::String(id.clone()),
        TenantScope::Missing => JsonValue::String("$missing".to_string()),
    };
    // canonical JSON sorts object keys, so map-form sorts are keyed as ordered terms
    let mut query_value = serde_json::to_value(query)?;
    if let (Some(sort), Ok(terms)) = (query_value.get_mut("sort"), query.sort_terms()) {
        *sort = terms
            .iter()
            .map(|term| {
                let prefix = if term.descending { "-" } else { "" };
                JsonValue::String(format!("{}{}", prefix, term.field))
            })
            .collect();
    }
    let description = json!({
        "kind": kind.as_str(),
        "collection": collection,
        "query": query_value,
        "user": accountability.user,
        "role": accountability.role,
        "admin": accountability.admin,
        "system": accountability.system,
        "tenant": tenant,
    });

    let digest = Sha256::digest(canonical_json(&description).as_bytes());
    Ok(format!("{}:{:x}", collection, digest))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(query: &Query, caller: &Accountability) -> String {
        read_key(ReadKind::Query, "posts", query, caller, &TenantScope::Unrestricted).unwrap()
    }

    #[test]
    fn equal_reads_share_a_key() {
        let caller = Accountability::user("1", "editor");
        let a = Query::from_json(json!({"filter": {"title": "x", "views": {"gt": 1}}, "limit": 5})).unwrap();
        let b = Query::from_json(json!({"limit": 5, "filter": {"views": {"gt": 1}, "title": "x"}})).unwrap();
        assert_eq!(key(&a, &caller), key(&b, &caller));
        assert!(key(&a, &caller).starts_with("posts:"));
    }

    #[test]
    fn sort_order_changes_the_key() {
        let caller = Accountability::user("1", "editor");
        let a = Query::from_json(json!({"sort": {"title": "desc", "id": "asc"}})).unwrap();
        let b = Query::from_json(json!({"sort": {"id": "asc", "title": "desc"}})).unwrap();
        let list = Query::from_json(json!({"sort": ["-title", "id"]})).unwrap();
        assert_ne!(key(&a, &caller), key(&b, &caller));
        assert_eq!(key(&a, &caller), key(&list, &caller));
    }

    #[test]
    fn caller_context_changes_the_key() {
        let query = Query::new().limit(5);
        let editor = Accountability::user("1", "editor");
        let other = Accountability::user("2", "editor");
        assert_ne!(key(&query, &editor), key(&query, &other));

        let tenant_a = read_key(
            ReadKind::Query,
            "posts",
            &query,
            &editor,
            &TenantScope::Tenant("a".to_string()),
        )
        .unwrap();
        assert_ne!(tenant_a, key(&query, &editor));

        let aggregate = read_key(
            ReadKind::Aggregate,
            "posts",
            &query,
            &editor,
            &TenantScope::Unrestricted,
        )
        .unwrap();
        assert_ne!(aggregate, key(&query, &editor));
    }
}
