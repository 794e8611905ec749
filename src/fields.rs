//! Column↔field registry: a typed stand-in for runtime reflection. Each
//! reflectable scalar attribute of `TsMetadata`/`ObsMetadata` is registered once, at
//! process startup, as a `(field_name, column, kind, getter, setter)` tuple. Scan and
//! assemble loops elsewhere in the backend iterate this registry instead of naming
//! columns one by one, staying statically checked: unknown field kinds are a
//! compile error, not a per-row runtime failure.
//!
//! `links`, `geo_point`, and `obstime_instant` are "non-reflectable": they need
//! special-cased handling (parallel arrays, a non-nullable driver geometry type, and
//! the DISTINCT ON / ORDER BY key, respectively) and are never generically scanned.

use crate::model::{ObsMetadata, TsMetadata};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int64,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Int64(i64),
    Str(String),
    /// A bound parameter that must round-trip through SQL as a real float8, not
    /// text. Used by the filter composer for coordinates and `to_timestamp(...)`
    /// arguments, where a `Str` value would silently fail typed binding.
    F64(f64),
}

impl ScalarValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::F64(v) => Some(*v),
            _ => None,
        }
    }
}

/// One reflectable scalar attribute of `TsMetadata`.
pub struct TsFieldSpec {
    /// The name clients use in `filter` maps and `attrs`/`included_response_fields`.
    pub name: &'static str,
    /// The underlying `time_series` column name (identical to `name` for every
    /// current attribute, but kept distinct since the two need not coincide).
    pub column: &'static str,
    pub kind: FieldKind,
    pub get: fn(&TsMetadata) -> ScalarValue,
    pub set: fn(&mut TsMetadata, ScalarValue),
}

/// One reflectable scalar attribute of `ObsMetadata`.
pub struct ObsFieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub get: fn(&ObsMetadata) -> ScalarValue,
    pub set: fn(&mut ObsMetadata, ScalarValue),
}

macro_rules! str_field {
    ($name:literal, $field:ident) => {
        TsFieldSpec {
            name: $name,
            column: $name,
            kind: FieldKind::Str,
            get: |t| ScalarValue::Str(t.$field.clone()),
            set: |t, v| {
                if let ScalarValue::Str(s) = v {
                    t.$field = s;
                }
            },
        }
    };
}

macro_rules! obs_str_field {
    ($name:literal, $field:ident) => {
        ObsFieldSpec {
            name: $name,
            column: $name,
            kind: FieldKind::Str,
            get: |o| ScalarValue::Str(o.$field.clone()),
            set: |o, v| {
                if let ScalarValue::Str(s) = v {
                    o.$field = s;
                }
            },
        }
    };
}

fn ts_field_specs() -> Vec<TsFieldSpec> {
    vec![
        TsFieldSpec {
            name: "level",
            column: "level",
            kind: FieldKind::Int64,
            get: |t| ScalarValue::Int64(t.level.unwrap_or(0)),
            set: |t, v| {
                if let ScalarValue::Int64(i) = v {
                    t.level = Some(i);
                }
            },
        },
        str_field!("version", version),
        str_field!("type", r#type),
        str_field!("title", title),
        str_field!("summary", summary),
        str_field!("keywords", keywords),
        str_field!("keywords_vocabulary", keywords_vocabulary),
        str_field!("license", license),
        str_field!("conventions", conventions),
        str_field!("naming_authority", naming_authority),
        str_field!("creator_type", creator_type),
        str_field!("creator_name", creator_name),
        str_field!("creator_email", creator_email),
        str_field!("creator_url", creator_url),
        str_field!("institution", institution),
        str_field!("project", project),
        str_field!("source", source),
        str_field!("platform", platform),
        str_field!("platform_vocabulary", platform_vocabulary),
        str_field!("standard_name", standard_name),
        str_field!("unit", unit),
        str_field!("instrument", instrument),
        str_field!("instrument_vocabulary", instrument_vocabulary),
        str_field!("function", function),
        str_field!("period", period),
    ]
}

fn obs_field_specs() -> Vec<ObsFieldSpec> {
    vec![
        obs_str_field!("processing_level", processing_level),
        obs_str_field!("data_id", data_id),
        obs_str_field!("history", history),
        obs_str_field!("metadata_id", metadata_id),
    ]
}

static TS_FIELDS: OnceLock<Vec<TsFieldSpec>> = OnceLock::new();
static OBS_FIELDS: OnceLock<Vec<ObsFieldSpec>> = OnceLock::new();

pub fn ts_fields() -> &'static [TsFieldSpec] {
    TS_FIELDS.get_or_init(ts_field_specs)
}

pub fn obs_fields() -> &'static [ObsFieldSpec] {
    OBS_FIELDS.get_or_init(obs_field_specs)
}

pub fn ts_field_by_name(name: &str) -> Option<&'static TsFieldSpec> {
    ts_fields().iter().find(|f| f.name == name)
}

pub fn obs_field_by_name(name: &str) -> Option<&'static ObsFieldSpec> {
    obs_fields().iter().find(|f| f.name == name)
}

/// Non-reflectable field names, for validating `included_response_fields`/`filter`
/// keys that refer to the special-cased columns rather than a registry entry.
pub const NON_REFLECTABLE_TS_FIELDS: &[&str] = &["links"];
pub const NON_REFLECTABLE_OBS_FIELDS: &[&str] =
    &["obstime_instant", "geo_point", "pubtime", "value", "id"];

/// Every field name a client may reference in `included_response_fields`, combining
/// both registries and the non-reflectable names.
pub fn all_known_field_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ts_fields().iter().map(|f| f.name).collect();
    names.extend(obs_fields().iter().map(|f| f.name));
    names.extend(NON_REFLECTABLE_TS_FIELDS);
    names.extend(NON_REFLECTABLE_OBS_FIELDS);
    names
}
