use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::sql::{quote, Fragment};

/// Longest alias emitted as-is; PostgreSQL truncates identifiers past 63 bytes.
const MAX_ALIAS_LEN: usize = 60;

/// Alias of the relation `segment` joined from `parent`.
///
/// Aliases are the parent alias and the relation name joined by `__`, so the same
/// relation path always maps to the same alias. Over-long aliases keep a readable
/// prefix followed by a digest of the full alias.
pub fn child_alias(parent: &str, segment: &str) -> String {
    let full = format!("{}__{}", parent, segment);
    if full.len() <= MAX_ALIAS_LEN {
        return full;
    }
    let digest = format!("{:x}", Sha256::digest(full.as_bytes()));
    let mut cut = 40;
    while !full.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", &full[..cut], &digest[..16])
}

/// Alias of the junction table of a many-to-many relation joined under `alias`.
pub fn junction_alias(alias: &str) -> String {
    format!("{}$junction", alias)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Inner,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub alias: String,
    pub table: String,
    pub kind: JoinKind,
    pub on: Fragment,
    /// The join can match more than one row per parent row.
    pub multi_valued: bool,
    /// Needed to hydrate selected include columns, not only for filtering or sorting.
    pub for_include: bool,
}

/// Joins of one SELECT, deduplicated by alias and kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct JoinAccumulator {
    joins: IndexMap<String, Join>,
}

impl JoinAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, alias: &str) -> Option<&Join> {
        self.joins.get(alias)
    }

    pub fn get_mut(&mut self, alias: &str) -> Option<&mut Join> {
        self.joins.get_mut(alias)
    }

    /// Adds `join` unless its alias is already joined. Returns whether it was added.
    pub fn insert(&mut self, join: Join) -> bool {
        if self.joins.contains_key(&join.alias) {
            return false;
        }
        self.joins.insert(join.alias.clone(), join);
        true
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Join> {
        self.joins.values()
    }

    /// Whether any join fans out parent rows.
    pub fn has_multi_valued(&self) -> bool {
        self.joins.values().any(|j| j.multi_valued)
    }

    /// ` LEFT JOIN "table" AS "alias" ON (...)` for every join, or only for include joins.
    pub fn render(&self, include_only: bool) -> Fragment {
        let mut out = Fragment::new();
        for join in self.joins.values() {
            if include_only && !join.for_include {
                continue;
            }
            let keyword = match join.kind {
                JoinKind::Left => " LEFT JOIN ",
                JoinKind::Inner => " INNER JOIN ",
            };
            out.push_sql(format!(
                "{}{} AS {} ON ",
                keyword,
                quote(&join.table),
                quote(&join.alias)
            ));
            out.push(join.on.clone().parens());
        }
        out
    }
}
