//! Per-request view of the caller's permissions and tenant.

use serde_json::{Map, Value as JsonValue};

use crate::{
    error::{AccessError, QueryError},
    model::{accountability::Accountability, filter::Filter, filter::Operator, permission::Action},
    permission::{pattern::FieldPatterns, PermissionProvider},
    schema::{collection::TENANT_ID, SchemaCatalog},
};

/// Tenant restriction applied to multi-tenant collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantScope {
    /// No tenant predicate (system callers, or enforcement disabled).
    Unrestricted,
    /// Rows of this tenant only.
    Tenant(String),
    /// Enforcement is on but no tenant could be resolved.
    Missing,
}

impl TenantScope {
    /// Resolves the scope of a request.
    ///
    /// An explicit tenant always scopes the query. Callers that do not bypass permissions
    /// may only name their own tenant.
    pub fn resolve(
        accountability: &Accountability,
        explicit: Option<&str>,
        enforcement: bool,
    ) -> Result<Self, AccessError> {
        if let Some(explicit) = explicit {
            let own = accountability.tenant.as_deref() == Some(explicit);
            if !own && !accountability.bypasses_permissions() && enforcement {
                return Err(AccessError::TenantForbidden {
                    tenant: explicit.to_string(),
                });
            }
            return Ok(TenantScope::Tenant(explicit.to_string()));
        }

        if accountability.system || !enforcement {
            return Ok(TenantScope::Unrestricted);
        }

        Ok(match &accountability.tenant {
            Some(tenant) => TenantScope::Tenant(tenant.clone()),
            None => TenantScope::Missing,
        })
    }

    /// Tenant stamped onto created rows.
    pub fn tenant(&self) -> Option<&str> {
        match self {
            TenantScope::Tenant(tenant) => Some(tenant),
            _ => None,
        }
    }
}

/// Caller permissions bound to a catalog, provider and tenant scope.
pub struct Access<'a> {
    catalog: &'a SchemaCatalog,
    provider: &'a dyn PermissionProvider,
    accountability: &'a Accountability,
    tenant: TenantScope,
}

impl<'a> Access<'a> {
    pub fn new(
        catalog: &'a SchemaCatalog,
        provider: &'a dyn PermissionProvider,
        accountability: &'a Accountability,
        tenant: TenantScope,
    ) -> Self {
        Self {
            catalog,
            provider,
            accountability,
            tenant,
        }
    }

    pub fn catalog(&self) -> &'a SchemaCatalog {
        self.catalog
    }

    pub fn accountability(&self) -> &'a Accountability {
        self.accountability
    }

    pub fn tenant(&self) -> &TenantScope {
        &self.tenant
    }

    pub fn bypasses_permissions(&self) -> bool {
        self.accountability.bypasses_permissions()
    }

    pub fn can(&self, collection: &str, action: Action) -> bool {
        if self.bypasses_permissions() {
            return true;
        }
        match &self.accountability.role {
            Some(role) => self.provider.can_access(role, collection, action),
            None => false,
        }
    }

    /// Fails with `PermissionDenied` when the role lacks `action` on `collection`.
    pub fn check(&self, collection: &str, action: Action) -> Result<(), AccessError> {
        if self.can(collection, action) {
            Ok(())
        } else {
            Err(AccessError::PermissionDenied {
                collection: collection.to_string(),
                action,
            })
        }
    }

    /// Fails with `NotFoundOrForbidden` when the role may not read `collection`.
    pub fn check_read(&self, collection: &str) -> Result<(), AccessError> {
        if self.can(collection, Action::Read) {
            Ok(())
        } else {
            Err(AccessError::NotFoundOrForbidden {
                collection: collection.to_string(),
            })
        }
    }

    /// Role row filter for `action`, `None` for callers that bypass permissions.
    pub fn row_filter(&self, collection: &str, action: Action) -> Option<Filter> {
        if self.bypasses_permissions() {
            return None;
        }
        let role = self.accountability.role.as_deref()?;
        self.provider
            .get_filter(role, collection, action, self.accountability)
            .filter(|f| !f.is_empty())
    }

    /// Field allow-list for `action`, `None` when every field is allowed.
    pub fn field_patterns(&self, collection: &str, action: Action) -> Option<FieldPatterns> {
        if self.bypasses_permissions() {
            return None;
        }
        let role = self.accountability.role.as_deref()?;
        let fields = self.provider.get_allowed_fields(role, collection, action)?;
        match FieldPatterns::parse(&fields) {
            Ok(patterns) => Some(patterns),
            Err(e) => {
                // providers validate patterns up front, an invalid entry allows nothing
                tracing::error!(collection, %action, error = %e, "invalid field pattern");
                Some(FieldPatterns::default())
            }
        }
    }

    /// Whether the top-level `field` may be touched for `action`.
    pub fn field_allowed(&self, collection: &str, action: Action, field: &str) -> bool {
        match self.field_patterns(collection, action) {
            Some(patterns) => patterns.allows_any_of(field),
            None => true,
        }
    }

    /// Fields of `collection` the caller may read, in schema order.
    pub fn readable_fields(&self, collection: &str) -> Result<Vec<String>, QueryError> {
        let schema = self.catalog.get_schema_definition(collection)?;
        let patterns = self.field_patterns(collection, Action::Read);
        Ok(schema
            .fields
            .keys()
            .filter(|name| {
                patterns
                    .as_ref()
                    .map(|p| p.allows_any_of(name))
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    /// Tenant predicate for `collection`, `None` when the collection is not tenant scoped.
    pub fn tenant_filter(&self, collection: &str) -> Result<Option<Filter>, AccessError> {
        let Ok(schema) = self.catalog.get_schema_definition(collection) else {
            return Ok(None);
        };
        if !schema.multi_tenant {
            return Ok(None);
        }

        let is_public = Filter::field(TENANT_ID, Operator::IsNull, JsonValue::Bool(true));
        match &self.tenant {
            TenantScope::Unrestricted => Ok(None),
            TenantScope::Tenant(tenant) => {
                let own = Filter::eq(TENANT_ID, tenant.clone());
                if schema.public_rows {
                    Ok(Some(Filter::Or(vec![own, is_public])))
                } else {
                    Ok(Some(own))
                }
            }
            TenantScope::Missing if schema.public_rows => Ok(Some(is_public)),
            TenantScope::Missing => Err(AccessError::TenantRequired {
                collection: collection.to_string(),
            }),
        }
    }

    /// Tenant predicate AND-ed with the role's row filter for `action`.
    pub fn scope_filter(&self, collection: &str, action: Action) -> Result<Option<Filter>, AccessError> {
        Ok(Filter::merge_and(
            self.tenant_filter(collection)?,
            self.row_filter(collection, action),
        ))
    }

    /// Role presets for `action` with placeholders resolved.
    pub fn presets(&self, collection: &str, action: Action) -> Map<String, JsonValue> {
        if self.bypasses_permissions() {
            return Map::new();
        }
        match self.accountability.role.as_deref() {
            Some(role) => self
                .provider
                .get_default_values(role, collection, action, self.accountability),
            None => Map::new(),
        }
    }
}
