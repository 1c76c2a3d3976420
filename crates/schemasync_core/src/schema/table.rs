//! SQLite-backed entity declaration.
//!
//! # Responsibility
//! - Describe one table (columns plus foreign keys from the relationship graph).
//! - Implement the store's sync primitive: create, force-recreate, alter.
//!
//! # Invariants
//! - Every table carries an `id INTEGER PRIMARY KEY AUTOINCREMENT` column.
//! - Without `allow_alter`, an existing table is never structurally changed;
//!   drift is reported instead.
//! - A rebuild keeps every row and every column the old and new shape share.

use super::entity::{EntityDescriptor, SyncContext, SyncError};
use super::{is_valid_identifier, quote_ident};
use rusqlite::Connection;
use std::collections::BTreeSet;

const ID_COLUMN: &str = "id";
const REBUILD_SUFFIX: &str = "__schemasync_rebuild";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    /// Stored as `INTEGER` 0/1.
    Boolean,
    /// Stored as ISO-8601 `TEXT`.
    Timestamp,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Timestamp => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub nullable: bool,
    /// SQL literal used as `DEFAULT`, e.g. `0` or `'active'`.
    pub default: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }
}

/// Declared table for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    entity: String,
    table: String,
    columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn resolve(&self, ctx: &SyncContext<'_>) -> Result<Vec<ResolvedColumn>, SyncError> {
        if !is_valid_identifier(&self.entity) || !is_valid_identifier(&self.table) {
            return Err(self.invalid(format!("bad table name `{}`", self.table)));
        }

        let mut resolved = vec![ResolvedColumn {
            name: ID_COLUMN.to_string(),
            sql_type: "INTEGER",
            not_null: false,
            default: None,
            references: None,
        }];

        for column in &self.columns {
            resolved.push(ResolvedColumn {
                name: column.name.clone(),
                sql_type: column.kind.sql(),
                not_null: !column.nullable,
                default: column.default.clone(),
                references: None,
            });
        }

        for fk in ctx.relationships.foreign_keys_for(&self.entity) {
            let target = ctx
                .tables
                .table_for(&fk.references)
                .ok_or_else(|| SyncError::UnknownReference {
                    entity: self.entity.clone(),
                    target: fk.references.clone(),
                })?;
            resolved.push(ResolvedColumn {
                name: fk.column,
                sql_type: "INTEGER",
                not_null: false,
                default: None,
                references: Some(target.to_string()),
            });
        }

        let mut names = BTreeSet::new();
        for column in &resolved {
            if !is_valid_identifier(&column.name) {
                return Err(self.invalid(format!("bad column name `{}`", column.name)));
            }
            if !names.insert(column.name.to_ascii_lowercase()) {
                return Err(self.invalid(format!("duplicate column `{}`", column.name)));
            }
        }

        Ok(resolved)
    }

    fn invalid(&self, detail: String) -> SyncError {
        SyncError::InvalidDeclaration {
            entity: self.entity.clone(),
            detail,
        }
    }

    fn execute(&self, ctx: &SyncContext<'_>, sql: &str) -> Result<(), SyncError> {
        ctx.trace_statement(&self.entity, sql);
        ctx.conn.execute_batch(sql)?;
        Ok(())
    }

    fn create(
        &self,
        ctx: &SyncContext<'_>,
        table: &str,
        columns: &[ResolvedColumn],
    ) -> Result<(), SyncError> {
        self.execute(ctx, &create_table_sql(table, columns))
    }

    fn alter(
        &self,
        ctx: &SyncContext<'_>,
        declared: &[ResolvedColumn],
        drift: &Drift,
    ) -> Result<(), SyncError> {
        let additive_only = drift.extra.is_empty()
            && drift.changed.is_empty()
            && drift
                .missing
                .iter()
                .all(|name| find(declared, name).is_some_and(ResolvedColumn::can_be_added));

        if additive_only {
            for name in &drift.missing {
                if let Some(column) = find(declared, name) {
                    let sql = format!(
                        "ALTER TABLE {} ADD COLUMN {};",
                        quote_ident(&self.table),
                        column.definition()
                    );
                    self.execute(ctx, &sql)?;
                }
            }
            return Ok(());
        }

        self.rebuild(ctx, declared, drift)
    }

    /// Re-creates the table under a scratch name, copies shared columns and
    /// swaps it in. Foreign-key enforcement is suspended for the swap and
    /// checked before commit.
    fn rebuild(
        &self,
        ctx: &SyncContext<'_>,
        declared: &[ResolvedColumn],
        drift: &Drift,
    ) -> Result<(), SyncError> {
        let fk_enabled: bool = ctx
            .conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get::<_, i64>(0))?
            == 1;
        if fk_enabled {
            self.execute(ctx, "PRAGMA foreign_keys = OFF;")?;
        }

        let result = self.rebuild_in_transaction(ctx, declared, drift);

        if fk_enabled {
            let restored = self.execute(ctx, "PRAGMA foreign_keys = ON;");
            result?;
            restored
        } else {
            result
        }
    }

    fn rebuild_in_transaction(
        &self,
        ctx: &SyncContext<'_>,
        declared: &[ResolvedColumn],
        drift: &Drift,
    ) -> Result<(), SyncError> {
        let scratch = format!("{}{}", self.table, REBUILD_SUFFIX);
        let shared = declared
            .iter()
            .filter(|column| !drift.missing.contains(&column.name))
            .map(|column| quote_ident(&column.name))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = ctx.conn.unchecked_transaction()?;
        self.execute(ctx, &format!("DROP TABLE IF EXISTS {};", quote_ident(&scratch)))?;
        self.create(ctx, &scratch, declared)?;
        self.execute(
            ctx,
            &format!(
                "INSERT INTO {} ({shared}) SELECT {shared} FROM {};",
                quote_ident(&scratch),
                quote_ident(&self.table)
            ),
        )?;
        self.execute(ctx, &format!("DROP TABLE {};", quote_ident(&self.table)))?;
        self.execute(
            ctx,
            &format!(
                "ALTER TABLE {} RENAME TO {};",
                quote_ident(&scratch),
                quote_ident(&self.table)
            ),
        )?;

        let violations = count_fk_violations(ctx.conn, &self.table)?;
        if violations > 0 {
            return Err(SyncError::Drift {
                entity: self.entity.clone(),
                detail: format!("rebuild would leave {violations} foreign key violation(s)"),
            });
        }

        tx.commit()?;
        Ok(())
    }
}

impl EntityDescriptor for TableSchema {
    fn name(&self) -> &str {
        &self.entity
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn sync(&self, ctx: &SyncContext<'_>) -> Result<(), SyncError> {
        let declared = self.resolve(ctx)?;

        if ctx.options.force_recreate {
            self.execute(ctx, &format!("DROP TABLE IF EXISTS {};", quote_ident(&self.table)))?;
            return self.create(ctx, &self.table, &declared);
        }

        if !table_exists(ctx.conn, &self.table)? {
            return self.create(ctx, &self.table, &declared);
        }

        let drift = Drift::detect(ctx.conn, &self.table, &declared)?;
        if drift.is_empty() {
            return Ok(());
        }
        if !ctx.options.allow_alter {
            return Err(SyncError::Drift {
                entity: self.entity.clone(),
                detail: drift.describe(),
            });
        }
        self.alter(ctx, &declared, &drift)
    }
}

#[derive(Debug, Clone)]
struct ResolvedColumn {
    name: String,
    sql_type: &'static str,
    not_null: bool,
    default: Option<String>,
    references: Option<String>,
}

impl ResolvedColumn {
    fn definition(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.sql_type);
        if self.name == ID_COLUMN {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
            return sql;
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if let Some(target) = &self.references {
            sql.push_str(&format!(
                " REFERENCES {} ({}) ON DELETE SET NULL ON UPDATE CASCADE",
                quote_ident(target),
                quote_ident(ID_COLUMN)
            ));
        }
        sql
    }

    /// SQLite only allows `ADD COLUMN` for columns it can back-fill with a
    /// constant.
    fn can_be_added(&self) -> bool {
        if self.name == ID_COLUMN {
            return false;
        }
        match &self.default {
            Some(default) => is_constant_default(default),
            None => !self.not_null,
        }
    }
}

#[derive(Debug, Default)]
struct Drift {
    missing: Vec<String>,
    extra: Vec<String>,
    changed: Vec<String>,
}

impl Drift {
    fn detect(
        conn: &Connection,
        table: &str,
        declared: &[ResolvedColumn],
    ) -> rusqlite::Result<Self> {
        let live = live_columns(conn, table)?;
        let live_refs = live_references(conn, table)?;
        let mut drift = Self::default();

        for column in declared {
            let Some(existing) = live
                .iter()
                .find(|live| live.name.eq_ignore_ascii_case(&column.name))
            else {
                drift.missing.push(column.name.clone());
                continue;
            };
            let type_changed = !existing.sql_type.eq_ignore_ascii_case(column.sql_type);
            let null_changed = column.name != ID_COLUMN && existing.not_null != column.not_null;
            let reference = live_refs
                .iter()
                .find(|(from, _)| from.eq_ignore_ascii_case(&column.name))
                .map(|(_, target)| target.to_ascii_lowercase());
            let reference_changed =
                reference != column.references.as_ref().map(|target| target.to_ascii_lowercase());
            if type_changed || null_changed || reference_changed {
                drift.changed.push(column.name.clone());
            }
        }

        for existing in &live {
            if !declared
                .iter()
                .any(|column| column.name.eq_ignore_ascii_case(&existing.name))
            {
                drift.extra.push(existing.name.clone());
            }
        }

        Ok(drift)
    }

    fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.changed.is_empty()
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing columns [{}]", self.missing.join(", ")));
        }
        if !self.extra.is_empty() {
            parts.push(format!("undeclared columns [{}]", self.extra.join(", ")));
        }
        if !self.changed.is_empty() {
            parts.push(format!("changed columns [{}]", self.changed.join(", ")));
        }
        parts.join("; ")
    }
}

struct LiveColumn {
    name: String,
    sql_type: String,
    not_null: bool,
}

fn is_constant_default(literal: &str) -> bool {
    let upper = literal.trim().to_ascii_uppercase();
    !(upper.starts_with('(') || upper.starts_with("CURRENT_"))
}

fn find<'a>(columns: &'a [ResolvedColumn], name: &str) -> Option<&'a ResolvedColumn> {
    columns.iter().find(|column| column.name == name)
}

fn create_table_sql(table: &str, columns: &[ResolvedColumn]) -> String {
    let definitions = columns
        .iter()
        .map(ResolvedColumn::definition)
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({definitions});", quote_ident(table))
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn live_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<LiveColumn>> {
    let mut stmt = conn.prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1);")?;
    let rows = stmt.query_map([table], |row| {
        Ok(LiveColumn {
            name: row.get(0)?,
            sql_type: row.get(1)?,
            not_null: row.get::<_, i64>(2)? == 1,
        })
    })?;
    rows.collect()
}

fn live_references(conn: &Connection, table: &str) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT \"from\", \"table\" FROM pragma_foreign_key_list(?1);")?;
    let rows = stmt.query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

fn count_fk_violations(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM pragma_foreign_key_check(?1);",
        [table],
        |row| row.get(0),
    )
}
