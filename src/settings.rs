//! Site settings persisted as key/value rows. Values are stored as JSON text
//! and checked against a fixed table of known keys.

use std::collections::{BTreeMap, HashMap};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult, FieldErrors};

#[derive(Debug, Clone, Copy)]
enum Kind {
    Text { max: usize },
    Email,
    Bool,
    Int { min: i64, max: i64 },
}

struct Definition {
    key: &'static str,
    kind: Kind,
    default: fn() -> Value,
}

const DEFINITIONS: &[Definition] = &[
    Definition {
        key: "site_name",
        kind: Kind::Text { max: 100 },
        default: || Value::from("Forkful"),
    },
    Definition {
        key: "site_description",
        kind: Kind::Text { max: 500 },
        default: || Value::from("Find and review great places to eat"),
    },
    Definition {
        key: "contact_email",
        kind: Kind::Email,
        default: || Value::from("hello@forkful.local"),
    },
    Definition {
        key: "allow_registration",
        kind: Kind::Bool,
        default: || Value::from(true),
    },
    Definition {
        key: "restaurants_per_page",
        kind: Kind::Int { min: 1, max: 100 },
        default: || Value::from(12),
    },
    Definition {
        key: "reviews_per_page",
        kind: Kind::Int { min: 1, max: 100 },
        default: || Value::from(10),
    },
];

/// Typed view over the stored settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_description: String,
    pub contact_email: String,
    pub allow_registration: bool,
    pub restaurants_per_page: u32,
    pub reviews_per_page: u32,
}

impl SiteSettings {
    pub fn load(conn: &Connection) -> AppResult<Self> {
        let map: serde_json::Map<String, Value> = all(conn)?.into_iter().collect();
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

fn definition(key: &str) -> Option<&'static Definition> {
    DEFINITIONS.iter().find(|d| d.key == key)
}

/// Defaults overlaid with whatever has been stored.
pub fn all(conn: &Connection) -> AppResult<BTreeMap<String, Value>> {
    let mut values: BTreeMap<String, Value> = DEFINITIONS
        .iter()
        .map(|d| (d.key.to_string(), (d.default)()))
        .collect();

    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    for (key, raw) in rows {
        if definition(&key).is_none() {
            continue;
        }
        match serde_json::from_str(&raw) {
            Ok(value) => {
                values.insert(key, value);
            }
            Err(e) => tracing::warn!("Ignoring unreadable setting {}: {}", key, e),
        }
    }

    Ok(values)
}

pub fn get(conn: &Connection, key: &str) -> AppResult<Value> {
    let def = definition(key).ok_or(AppError::NotFound)?;
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(|| (def.default)()))
}

/// Validate every entry, then persist them together. Nothing is written if any entry fails.
pub fn update(conn: &mut Connection, changes: BTreeMap<String, Value>) -> AppResult<BTreeMap<String, Value>> {
    let mut errors = FieldErrors::new();
    let mut checked = Vec::with_capacity(changes.len());

    for (key, value) in changes {
        match definition(&key) {
            None => {
                errors.insert(key, vec!["Unknown setting".into()]);
            }
            Some(def) => match check(def.kind, value) {
                Ok(value) => checked.push((key, value)),
                Err(msg) => {
                    errors.insert(key, vec![msg]);
                }
            },
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let tx = crate::db::write_tx(conn)?;
    for (key, value) in &checked {
        tx.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, serde_json::to_string(value)?],
        )?;
    }
    tx.commit()?;

    tracing::info!("Updated {} setting(s)", checked.len());
    all(conn)
}

fn check(kind: Kind, value: Value) -> Result<Value, String> {
    match kind {
        Kind::Text { max } => match value {
            Value::String(s) if s.trim().is_empty() => Err("Must not be empty".into()),
            Value::String(s) if s.chars().count() > max => {
                Err(format!("Must be at most {} characters", max))
            }
            Value::String(s) => Ok(Value::String(s.trim().to_string())),
            _ => Err("Must be text".into()),
        },
        Kind::Email => match value {
            Value::String(s) if is_email(s.trim()) => Ok(Value::String(s.trim().to_string())),
            _ => Err("Must be an email address".into()),
        },
        Kind::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            _ => Err("Must be true or false".into()),
        },
        Kind::Int { min, max } => match value.as_i64() {
            Some(n) if (min..=max).contains(&n) => Ok(Value::from(n)),
            _ => Err(format!("Must be a whole number from {} to {}", min, max)),
        },
    }
}

fn is_email(s: &str) -> bool {
    use validator::ValidateEmail;
    s.validate_email()
}

/// Convert an HTML form submission into typed values. Unchecked checkboxes
/// are absent from the form, so every boolean setting defaults to false.
pub fn from_form(form: HashMap<String, String>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for def in DEFINITIONS {
        let raw = form.get(def.key);
        let value = match (def.kind, raw) {
            (Kind::Bool, raw) => Value::Bool(matches!(
                raw.map(|s| s.as_str()),
                Some("true") | Some("on") | Some("1")
            )),
            (_, None) => continue,
            (Kind::Int { .. }, Some(raw)) => match raw.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(raw.clone()),
            },
            (_, Some(raw)) => Value::String(raw.clone()),
        };
        out.insert(def.key.to_string(), value);
    }
    out
}
