//! SQL Server table types backing structured parameters.
//!
//! A structured parameter must be bound against a server-side table type
//! whose columns match the source rows. Types are named after the table plus
//! the SHA-256 of their column schema, so a changed entity shape yields a
//! new type instead of binding against a stale one. Provisioned names are
//! remembered per database in a process-wide, append-only [`TableTypeCache`].

use crate::config::{ColumnInterceptor, TableTypeOptions};
use asupersync::{Cx, Outcome};
use sha2::{Digest, Sha256};
use sqlbulk_core::error::ProvisionError;
use sqlbulk_core::{Connection, Dialect, EntityDescriptor, Error, Value, sanitize_identifier};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::RwLock;

/// Longest table-name prefix kept in a type name; the digest adds 65 chars.
const MAX_PREFIX_LEN: usize = 60;

/// Table types known to exist, keyed by (database identity, type name).
#[derive(Debug, Default)]
pub struct TableTypeCache {
    entries: RwLock<HashSet<(String, String)>>,
}

impl TableTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, database: &str, type_name: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains(&(database.to_string(), type_name.to_string()))
    }

    pub fn insert(&self, database: &str, type_name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert((database.to_string(), type_name.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Creates table types on demand and records them in a cache.
#[derive(Debug, Clone, Copy)]
pub struct TableTypeProvisioner<'a> {
    cache: &'a TableTypeCache,
    options: &'a TableTypeOptions,
}

impl<'a> TableTypeProvisioner<'a> {
    pub fn new(cache: &'a TableTypeCache, options: &'a TableTypeOptions) -> Self {
        Self { cache, options }
    }

    /// Ordered `(column, storage type)` pairs of the type for an entity.
    ///
    /// The interceptor may override the storage type of any column; columns
    /// it does not mention keep the dialect's mapping.
    pub fn schema_columns(
        entity: &EntityDescriptor,
        interceptor: Option<&ColumnInterceptor>,
    ) -> Vec<(String, String)> {
        let overrides: HashMap<String, String> = interceptor
            .map(|f| f(entity.fields()).into_iter().collect())
            .unwrap_or_default();
        entity
            .fields()
            .iter()
            .map(|field| {
                let ty = overrides
                    .get(field.column_name)
                    .cloned()
                    .unwrap_or_else(|| Dialect::SqlServer.storage_type(field));
                (field.column_name.to_string(), ty)
            })
            .collect()
    }

    /// Unqualified type name: `<table>_<sha256 of the schema string>`.
    pub fn type_name(entity: &EntityDescriptor, columns: &[(String, String)]) -> String {
        let mut schema = columns
            .iter()
            .map(|(name, ty)| format!("{name} {ty}"))
            .collect::<Vec<_>>()
            .join(",");
        schema.push('|');
        schema.push_str(
            &entity
                .key_fields()
                .map(|f| f.column_name)
                .collect::<Vec<_>>()
                .join(","),
        );

        let digest = Sha256::digest(schema.as_bytes());
        let mut prefix = sanitize_identifier(entity.table_name());
        prefix.truncate(MAX_PREFIX_LEN);

        let mut name = String::with_capacity(prefix.len() + 65);
        name.push_str(&prefix);
        name.push('_');
        for byte in digest {
            let _ = write!(name, "{byte:02x}");
        }
        name
    }

    /// Name the structured parameter is bound with: `<schema>.<type>`.
    pub fn qualified_name(&self, type_name: &str) -> String {
        format!("{}.{}", self.options.schema, type_name)
    }

    /// Idempotent `CREATE TYPE` for the given columns.
    pub fn create_statement(
        &self,
        entity: &EntityDescriptor,
        type_name: &str,
        columns: &[(String, String)],
    ) -> String {
        let quote = |s: &str| Dialect::SqlServer.quote_identifier(s);
        let qualified = format!("{}.{}", quote(&self.options.schema), quote(type_name));

        let mut sql = format!(
            "IF TYPE_ID(N'{}') IS NULL CREATE TYPE {} AS TABLE (",
            qualified.replace('\'', "''"),
            qualified
        );
        for (name, ty) in columns {
            let nullability = if entity.index_of(name).is_some_and(|i| entity.is_key(i)) {
                "NOT NULL"
            } else {
                "NULL"
            };
            let _ = write!(sql, "{} {} {}, ", quote(name), ty, nullability);
        }
        let keys = entity
            .key_fields()
            .map(|f| quote(f.column_name))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(sql, "PRIMARY KEY {} ({}))", self.options.index.as_sql(), keys);
        if self.options.memory_optimized {
            sql.push_str(" WITH (MEMORY_OPTIMIZED = ON)");
        }
        sql
    }

    /// Make sure the table type for `entity` exists on the connected
    /// database, returning the qualified name to bind structured parameters
    /// with.
    pub async fn ensure<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        entity: &EntityDescriptor,
        interceptor: Option<&ColumnInterceptor>,
    ) -> Outcome<String, Error> {
        let columns = Self::schema_columns(entity, interceptor);
        let type_name = Self::type_name(entity, &columns);
        let qualified = self.qualified_name(&type_name);
        let database = conn.database_identity();

        if self.cache.contains(&database, &type_name) {
            return Outcome::Ok(qualified);
        }

        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }

        let sql = self.create_statement(entity, &type_name, &columns);
        tracing::trace!(sql = %sql, "provisioning table type");
        match conn.execute(cx, &sql, &[]).await {
            Outcome::Ok(_) => {
                tracing::info!(
                    table = entity.table_name(),
                    type_name = %qualified,
                    "Provisioned table type"
                );
            }
            Outcome::Err(Error::Query(e)) if e.is_already_exists() => {
                match self.confirm_exists(cx, conn, &type_name).await {
                    Outcome::Ok(true) => {
                        tracing::warn!(
                            type_name = %qualified,
                            "Table type was created concurrently; using existing type"
                        );
                    }
                    Outcome::Ok(false) => {
                        return Outcome::Err(Error::Provision(ProvisionError {
                            type_name: qualified,
                            message: "creation reported an existing type that could not be found"
                                .to_string(),
                            source: Some(Box::new(Error::Query(e))),
                        }));
                    }
                    Outcome::Err(lookup) => {
                        return Outcome::Err(Error::Provision(ProvisionError {
                            type_name: qualified,
                            message: format!("existence check failed: {lookup}"),
                            source: Some(Box::new(Error::Query(e))),
                        }));
                    }
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        self.cache.insert(&database, &type_name);
        Outcome::Ok(qualified)
    }

    async fn confirm_exists<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        type_name: &str,
    ) -> Outcome<bool, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let sql = "SELECT 1 FROM sys.types WHERE is_table_type = 1 AND name = @p1 AND schema_id = SCHEMA_ID(@p2)";
        let params = [
            Value::Text(type_name.to_string()),
            Value::Text(self.options.schema.clone()),
        ];
        tracing::trace!(sql = %sql, "checking table type");
        match conn.query_one(cx, sql, &params).await {
            Outcome::Ok(row) => Outcome::Ok(row.is_some()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableTypeIndex;
    use sqlbulk_core::{Entity, FieldInfo, Result, Row, SqlType};
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    struct Product {
        id: i64,
        name: String,
    }

    impl Entity for Product {
        const TABLE_NAME: &'static str = "products";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 2] = [
                FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
                FieldInfo::new("name", "name", SqlType::VarChar(100)),
            ];
            &FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.into()), ("name", self.name.clone().into())]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                name: row.get_named("name")?,
            })
        }
    }

    fn products() -> EntityDescriptor {
        EntityDescriptor::of::<Product>().unwrap()
    }

    #[test]
    fn test_schema_columns_follow_dialect_mapping() {
        let cols = TableTypeProvisioner::schema_columns(&products(), None);
        assert_eq!(
            cols,
            vec![
                ("id".to_string(), "BIGINT".to_string()),
                ("name".to_string(), "NVARCHAR(100)".to_string()),
            ]
        );
    }

    #[test]
    fn test_interceptor_overrides_named_columns() {
        let interceptor: ColumnInterceptor =
            Arc::new(|_| vec![("name".to_string(), "NVARCHAR(MAX)".to_string())]);
        let cols = TableTypeProvisioner::schema_columns(&products(), Some(&interceptor));
        assert_eq!(cols[0].1, "BIGINT");
        assert_eq!(cols[1].1, "NVARCHAR(MAX)");
    }

    #[test]
    fn test_type_name_is_deterministic_and_shape_sensitive() {
        let entity = products();
        let cols = TableTypeProvisioner::schema_columns(&entity, None);
        let a = TableTypeProvisioner::type_name(&entity, &cols);
        let b = TableTypeProvisioner::type_name(&entity, &cols);
        assert_eq!(a, b);
        assert!(a.starts_with("products_"));
        assert_eq!(a.len(), "products_".len() + 64);
        assert!(a["products_".len()..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let mut widened = cols.clone();
        widened[1].1 = "NVARCHAR(MAX)".to_string();
        assert_ne!(a, TableTypeProvisioner::type_name(&entity, &widened));
    }

    #[test]
    fn test_create_statement() {
        let cache = TableTypeCache::new();
        let options = TableTypeOptions::default();
        let provisioner = TableTypeProvisioner::new(&cache, &options);
        let entity = products();
        let cols = TableTypeProvisioner::schema_columns(&entity, None);
        let sql = provisioner.create_statement(&entity, "products_x", &cols);
        assert_eq!(
            sql,
            "IF TYPE_ID(N'[dbo].[products_x]') IS NULL CREATE TYPE [dbo].[products_x] AS TABLE \
             ([id] BIGINT NOT NULL, [name] NVARCHAR(100) NULL, PRIMARY KEY CLUSTERED ([id]))"
        );
    }

    #[test]
    fn test_create_statement_memory_optimized() {
        let cache = TableTypeCache::new();
        let options = TableTypeOptions::default()
            .schema("bulk")
            .memory_optimized(true)
            .index(TableTypeIndex::NonClustered);
        let provisioner = TableTypeProvisioner::new(&cache, &options);
        let entity = products();
        let cols = TableTypeProvisioner::schema_columns(&entity, None);
        let sql = provisioner.create_statement(&entity, "products_x", &cols);
        assert!(sql.contains("PRIMARY KEY NONCLUSTERED ([id])"));
        assert!(sql.starts_with("IF TYPE_ID(N'[bulk].[products_x]')"));
        assert!(sql.ends_with(") WITH (MEMORY_OPTIMIZED = ON)"));
        assert_eq!(provisioner.qualified_name("products_x"), "bulk.products_x");
    }

    #[test]
    fn test_cache_is_keyed_by_database() {
        let cache = TableTypeCache::new();
        assert!(cache.is_empty());
        cache.insert("srv/db1", "products_x");
        cache.insert("srv/db1", "products_x");
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("srv/db1", "products_x"));
        assert!(!cache.contains("srv/db2", "products_x"));
    }
}
