//! Storage engine dialects
//!
//! PostgreSQL gives every tenant its own schema inside one database and pins
//! the pool's `search_path` to it. SQLite has no schemas, so every tenant gets
//! its own database file named after the namespace.

use std::path::PathBuf;

use confstore_common::CONFIG_TABLE;
use sea_orm::sea_query::{Alias, Index, IntoTableRef, TableRef};
use sea_orm::{DbBackend, Schema, Statement};

use crate::entity::config_data;
use crate::error::StoreError;

const CONFIG_INDEX: &str = "idx_config_data_module_config_name";

/// The engine a `StorageConfig` url points at
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Postgres { url: String },
    Sqlite { dir: PathBuf },
}

impl Engine {
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Engine::Postgres {
                url: url.to_string(),
            });
        }
        if let Some(rest) = url.strip_prefix("sqlite://") {
            let dir = rest.split('?').next().unwrap_or_default();
            if dir.is_empty() {
                return Err(StoreError::Config(
                    "sqlite url must name a directory for tenant databases".to_string(),
                ));
            }
            return Ok(Engine::Sqlite {
                dir: PathBuf::from(dir),
            });
        }
        Err(StoreError::Config(format!(
            "unsupported storage url scheme in '{}'",
            url.split("://").next().unwrap_or(url)
        )))
    }

    pub fn backend(&self) -> DbBackend {
        match self {
            Engine::Postgres { .. } => DbBackend::Postgres,
            Engine::Sqlite { .. } => DbBackend::Sqlite,
        }
    }

    /// Connection url for a tenant's pool
    pub fn tenant_url(&self, schema: &str) -> String {
        match self {
            Engine::Postgres { url } => url.clone(),
            Engine::Sqlite { dir } => format!(
                "sqlite://{}?mode=rwc",
                dir.join(format!("{schema}.db")).display()
            ),
        }
    }

    /// Catalog lookup yielding a single `present` count for `schema.table`
    pub(crate) fn table_exists_statement(&self, schema: &str, table: &str) -> Statement {
        match self {
            Engine::Postgres { .. } => Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT COUNT(*) AS present FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
                [schema.into(), table.into()],
            ),
            Engine::Sqlite { .. } => Statement::from_sql_and_values(
                DbBackend::Sqlite,
                "SELECT COUNT(*) AS present FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table.into()],
            ),
        }
    }

    /// DDL creating the namespace, its base table and the lookup index
    pub(crate) fn namespace_ddl(&self, schema: &str) -> Vec<Statement> {
        let backend = self.backend();
        let mut statements = Vec::with_capacity(3);

        if let Engine::Postgres { .. } = self {
            statements.push(Statement::from_string(
                backend,
                format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)),
            ));
        }

        let table_ref = self.table_ref(schema, CONFIG_TABLE);
        let mut table = Schema::new(backend).create_table_from_entity(config_data::Entity);
        table.table(table_ref.clone()).if_not_exists();
        statements.push(backend.build(&table));

        let index = Index::create()
            .if_not_exists()
            .name(CONFIG_INDEX)
            .table(table_ref)
            .col(config_data::Column::Module)
            .col(config_data::Column::ConfigName)
            .to_owned();
        statements.push(backend.build(&index));

        statements
    }

    fn table_ref(&self, schema: &str, table: &str) -> TableRef {
        match self {
            Engine::Postgres { .. } => (Alias::new(schema), Alias::new(table)).into_table_ref(),
            Engine::Sqlite { .. } => Alias::new(table).into_table_ref(),
        }
    }
}

/// Double-quote an identifier for DDL
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_url() {
        let engine = Engine::from_url("postgres://u:p@localhost:5432/okapi").unwrap();
        assert_eq!(engine.backend(), DbBackend::Postgres);
        assert_eq!(
            engine.tenant_url("harvard_mod_configuration"),
            "postgres://u:p@localhost:5432/okapi"
        );

        let engine = Engine::from_url("sqlite:///var/lib/confstore?mode=rwc").unwrap();
        assert_eq!(
            engine,
            Engine::Sqlite {
                dir: PathBuf::from("/var/lib/confstore")
            }
        );
        assert_eq!(
            engine.tenant_url("harvard_mod_configuration"),
            "sqlite:///var/lib/confstore/harvard_mod_configuration.db?mode=rwc"
        );
    }

    #[test]
    fn test_engine_rejects_unknown_urls() {
        assert!(Engine::from_url("mysql://localhost/db").is_err());
        assert!(Engine::from_url("sqlite://").is_err());
        assert!(Engine::from_url("harvard").is_err());
    }

    #[test]
    fn test_postgres_namespace_ddl() {
        let engine = Engine::from_url("postgres://localhost/db").unwrap();
        let ddl = engine.namespace_ddl("harvard_mod_configuration");
        assert_eq!(ddl.len(), 3);
        assert_eq!(
            ddl[0].sql,
            r#"CREATE SCHEMA IF NOT EXISTS "harvard_mod_configuration""#
        );
        assert!(ddl[1].sql.starts_with(
            r#"CREATE TABLE IF NOT EXISTS "harvard_mod_configuration"."config_data""#
        ));
        assert!(ddl[2].sql.contains(CONFIG_INDEX));
    }

    #[test]
    fn test_sqlite_namespace_ddl() {
        let engine = Engine::from_url("sqlite:///tmp/x").unwrap();
        let ddl = engine.namespace_ddl("harvard_mod_configuration");
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "config_data""#));
        assert!(!ddl[0].sql.contains("harvard"));
    }

    #[test]
    fn test_table_exists_statement_binds_names() {
        let engine = Engine::from_url("postgres://localhost/db").unwrap();
        let stmt = engine.table_exists_statement("diku_mod_configuration", "config_data");
        assert!(stmt.sql.contains("information_schema.tables"));
        assert_eq!(stmt.values.map(|v| v.0.len()), Some(2));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("mytablecache"), "\"mytablecache\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
