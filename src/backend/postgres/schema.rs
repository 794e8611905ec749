//! Schema introspector: discovers the unique-constraint column set on
//! `time_series` at backend construction and precomputes the SQL templates the
//! upsert engine reuses on every call.

use crate::errors::{StoreError, StoreResult};
use crate::fields::ts_fields;
use sqlx::PgPool;

/// The five parallel-array link columns, always first in `all_ts_cols()`.
const LINK_COLS: [&str; 5] = [
    "link_href",
    "link_rel",
    "link_type",
    "link_hreflang",
    "link_title",
];

/// Schema facts discovered once at construction and reused for the backend's
/// lifetime: the unique-constraint column set, and the two upsert templates built
/// from it.
#[derive(Debug, Clone)]
pub struct TsSchema {
    /// Every `time_series` column in a fixed order: links, then `level`, then every
    /// registered string field, matching [`all_ts_cols`].
    pub all_cols: Vec<String>,
    /// The column subset from the `unique_main` constraint definition, in the order
    /// Postgres reports them.
    pub unique_cols: Vec<String>,
    /// `INSERT INTO time_series (...) VALUES (...) ON CONFLICT ON CONSTRAINT
    /// unique_main DO UPDATE SET <first_col> = EXCLUDED.<first_col> WHERE false`.
    pub upsert_insert: String,
    /// `SELECT id FROM time_series WHERE <unique_col_i IS NOT DISTINCT FROM $i AND ...>`.
    pub upsert_select: String,
}

/// Every `time_series` column, in the order values are bound for insert/select.
pub fn all_ts_cols() -> Vec<String> {
    let mut cols: Vec<String> = LINK_COLS.iter().map(|s| s.to_string()).collect();
    cols.push("level".to_string());
    cols.extend(ts_fields().iter().filter_map(|f| {
        if f.name == "level" {
            None
        } else {
            Some(f.column.to_string())
        }
    }));
    cols
}

impl TsSchema {
    /// Queries `pg_constraint`/`pg_get_constraintdef` for the `unique_main`
    /// constraint on `time_series`, parses its column list, and builds the upsert
    /// templates. Failure here is fatal to backend construction.
    pub async fn introspect(pool: &PgPool) -> StoreResult<Self> {
        let row: (String,) = sqlx::query_as(
            r#"
            SELECT pg_get_constraintdef(c.oid)
            FROM pg_constraint c
            JOIN pg_namespace n ON n.oid = c.connamespace
            WHERE conrelid::regclass::text = 'time_series'
                AND conname = 'unique_main'
                AND contype = 'u'
            "#,
        )
        .fetch_one(pool)
        .await?;

        let unique_cols = parse_unique_main_def(&row.0).ok_or_else(|| {
            StoreError::Internal(format!(
                "'{}' did not match the expected 'UNIQUE (...)' constraint shape",
                row.0
            ))
        })?;

        let all_cols = all_ts_cols();
        let upsert_insert = build_upsert_insert(&all_cols);
        let upsert_select = build_upsert_select(&unique_cols);

        Ok(Self {
            all_cols,
            unique_cols,
            upsert_insert,
            upsert_select,
        })
    }
}

fn parse_unique_main_def(def: &str) -> Option<Vec<String>> {
    let open = def.find('(')?;
    let close = def.rfind(')')?;
    if close <= open {
        return None;
    }
    let inner = &def[open + 1..close];
    Some(inner.split(',').map(|s| s.trim().to_string()).collect())
}

fn build_upsert_insert(all_cols: &[String]) -> String {
    let placeholders: Vec<String> = (1..=all_cols.len()).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO time_series ({}) VALUES ({}) \
         ON CONFLICT ON CONSTRAINT unique_main DO UPDATE SET {} = EXCLUDED.{} WHERE false",
        all_cols.join(","),
        placeholders.join(","),
        all_cols[0],
        all_cols[0],
    )
}

/// Uses `IS NOT DISTINCT FROM` rather than `=` so that a unique column bound to
/// `NULL` (e.g. an unset `level`) still matches the row the guarded insert just
/// locked, the same way `unique_main`'s `NULLS NOT DISTINCT` treats `NULL` as a
/// comparable value rather than "unknown" for conflict detection.
fn build_upsert_select(unique_cols: &[String]) -> String {
    let where_expr: Vec<String> = unique_cols
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} IS NOT DISTINCT FROM ${}", i + 1))
        .collect();
    format!(
        "SELECT id FROM time_series WHERE {}",
        where_expr.join(" AND ")
    )
}

/// Column index lookup used by the upsert engine to pull the unique-column subset
/// of a full column-value vector without recomputing positions per call.
pub fn unique_col_indices(all_cols: &[String], unique_cols: &[String]) -> StoreResult<Vec<usize>> {
    unique_cols
        .iter()
        .map(|uc| {
            all_cols.iter().position(|c| c == uc).ok_or_else(|| {
                StoreError::Internal(format!(
                    "unique_main column '{uc}' is not a recognized time_series column"
                ))
            })
        })
        .collect()
}
