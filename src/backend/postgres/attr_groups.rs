//! Attribute-group engine: distinct combinations of requested time-series
//! metadata columns, optionally grouped with the full instances that share them.

use super::PostgresBackend;
use crate::errors::{StoreError, StoreResult};
use crate::fields::{self, FieldKind, ScalarValue, TsFieldSpec};
use crate::model::{GetTsAttrGroupsRequest, Link, TsMdataGroup, TsMetadata};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashSet;

const LINK_COLS: [&str; 5] = [
    "link_href",
    "link_rel",
    "link_type",
    "link_hreflang",
    "link_title",
];

fn resolve_attrs(attrs: &[String]) -> StoreResult<Vec<&'static TsFieldSpec>> {
    if attrs.is_empty() {
        return Err(StoreError::InvalidArgument(
            "attrs must not be empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(attrs.len());
    for name in attrs {
        if !seen.insert(name.as_str()) {
            return Err(StoreError::InvalidArgument(format!(
                "duplicate attribute name '{name}'"
            )));
        }
        let spec = fields::ts_field_by_name(name)
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown attribute '{name}'")))?;
        specs.push(spec);
    }
    Ok(specs)
}

pub async fn get_ts_attr_groups(
    backend: &PostgresBackend,
    request: GetTsAttrGroupsRequest,
) -> StoreResult<Vec<TsMdataGroup>> {
    let attr_specs = resolve_attrs(&request.attrs)?;
    let attr_cols: Vec<&str> = attr_specs.iter().map(|f| f.column).collect();

    if !request.include_instances {
        let sql = format!(
            "SELECT DISTINCT {cols} FROM time_series ORDER BY {cols}",
            cols = attr_cols.join(",")
        );
        let rows = sqlx::query(&sql).fetch_all(backend.pool()).await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let mut combo = TsMetadata::default();
            for (i, field) in attr_specs.iter().enumerate() {
                assign_scalar(&mut combo, field, &row, i)?;
            }
            groups.push(TsMdataGroup {
                combo,
                instances: None,
            });
        }
        return Ok(groups);
    }

    let mut full_cols: Vec<String> = LINK_COLS.iter().map(|s| s.to_string()).collect();
    full_cols.extend(fields::ts_fields().iter().map(|f| f.column.to_string()));

    let sql = format!(
        "SELECT {full} FROM time_series ORDER BY {order}",
        full = full_cols.join(","),
        order = attr_cols.join(",")
    );
    let rows = sqlx::query(&sql).fetch_all(backend.pool()).await?;

    let mut groups: Vec<TsMdataGroup> = Vec::new();
    let mut prev_projection: Option<Vec<ScalarValue>> = None;

    for row in rows {
        let ts = scan_full_ts_row(&row)?;
        let projection: Vec<ScalarValue> = attr_specs.iter().map(|f| (f.get)(&ts)).collect();

        if prev_projection.as_ref() != Some(&projection) {
            let mut combo = TsMetadata::default();
            for (field, value) in attr_specs.iter().zip(projection.iter()) {
                (field.set)(&mut combo, value.clone());
            }
            groups.push(TsMdataGroup {
                combo,
                instances: Some(Vec::new()),
            });
            prev_projection = Some(projection);
        }

        groups
            .last_mut()
            .expect("a group was just pushed if the vec was empty")
            .instances
            .as_mut()
            .expect("include_instances groups always carry Some(instances)")
            .push(ts);
    }

    Ok(groups)
}

fn assign_scalar(
    ts: &mut TsMetadata,
    field: &TsFieldSpec,
    row: &PgRow,
    idx: usize,
) -> StoreResult<()> {
    match field.kind {
        // NULL stays NULL (e.g. an unset `level`); `TsMetadata::default()` already
        // leaves the field as `None`, so only a present value needs setting.
        FieldKind::Int64 => {
            if let Some(v) = row.try_get::<Option<i64>, _>(idx)? {
                (field.set)(ts, ScalarValue::Int64(v));
            }
        }
        FieldKind::Str => {
            let v: Option<String> = row.try_get(idx)?;
            (field.set)(ts, ScalarValue::Str(v.unwrap_or_default()));
        }
    }
    Ok(())
}

fn scan_full_ts_row(row: &PgRow) -> StoreResult<TsMetadata> {
    let mut ts = TsMetadata::default();

    let mut link_arrays: Vec<Vec<String>> = Vec::with_capacity(5);
    for i in 0..5 {
        let arr: Option<Vec<String>> = row.try_get(i)?;
        link_arrays.push(arr.unwrap_or_default());
    }
    let link_count = link_arrays.iter().map(|a| a.len()).max().unwrap_or(0);
    for i in 0..link_count {
        ts.links.push(Link {
            href: link_arrays[0].get(i).cloned().unwrap_or_default(),
            rel: link_arrays[1].get(i).cloned().unwrap_or_default(),
            r#type: link_arrays[2].get(i).cloned().unwrap_or_default(),
            hreflang: link_arrays[3].get(i).cloned().unwrap_or_default(),
            title: link_arrays[4].get(i).cloned().unwrap_or_default(),
        });
    }

    let mut idx = 5;
    for field in fields::ts_fields() {
        assign_scalar(&mut ts, field, row, idx)?;
        idx += 1;
    }

    Ok(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_attrs_rejects_empty() {
        assert!(resolve_attrs(&[]).is_err());
    }

    #[test]
    fn resolve_attrs_rejects_duplicates() {
        let attrs = vec!["platform".to_string(), "platform".to_string()];
        assert!(resolve_attrs(&attrs).is_err());
    }

    #[test]
    fn resolve_attrs_rejects_unknown_name() {
        let attrs = vec!["not_a_field".to_string()];
        assert!(resolve_attrs(&attrs).is_err());
    }

    #[test]
    fn resolve_attrs_accepts_known_names() {
        let attrs = vec!["platform".to_string(), "level".to_string()];
        let specs = resolve_attrs(&attrs).unwrap();
        assert_eq!(specs.len(), 2);
    }
}
