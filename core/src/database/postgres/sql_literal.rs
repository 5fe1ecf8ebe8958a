use std::fmt;

use postgres_protocol::escape::escape_literal;

use crate::database::sql_value::{format_float, SqlValue};

/// A value rendered as PostgreSQL literal syntax, safe to splice into statement text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlLiteral(String);

impl SqlLiteral {
    pub fn null() -> Self {
        SqlLiteral("null".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SqlLiteral {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How booleans are spelled.
///
/// The update path casts every source column explicitly, so the integer form is enough
/// there. Inserts have no cast and Postgres will not assign an integer to a boolean
/// column, so they use the keyword form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BooleanLiteral {
    #[default]
    Integer,
    Keyword,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LiteralError {
    #[error("hstore column expects a mapping, got {0}")]
    HstoreRequiresMapping(&'static str),

    #[error("text can not contain NUL (0x00) characters")]
    NulCharacter,

    #[error("could not serialize value as json: {0}")]
    Json(String),
}

const JSON_TYPES: &[&str] = &["json", "jsonb"];
const HSTORE_TYPE: &str = "hstore";

fn hint_is(hint: Option<&str>, names: &[&str]) -> bool {
    hint.map(|hint| names.iter().any(|name| hint.trim().eq_ignore_ascii_case(name)))
        .unwrap_or(false)
}

/// Renders a value the way the update path expects it: integer booleans.
pub fn to_literal(value: &SqlValue, type_hint: Option<&str>) -> Result<SqlLiteral, LiteralError> {
    to_literal_with(value, type_hint, BooleanLiteral::Integer)
}

pub fn to_literal_with(
    value: &SqlValue,
    type_hint: Option<&str>,
    booleans: BooleanLiteral,
) -> Result<SqlLiteral, LiteralError> {
    match value {
        SqlValue::Null => Ok(SqlLiteral::null()),
        SqlValue::String(text) => quote_string(text),
        SqlValue::Bool(flag) => Ok(SqlLiteral(
            match (booleans, flag) {
                (BooleanLiteral::Integer, true) => "1",
                (BooleanLiteral::Integer, false) => "0",
                (BooleanLiteral::Keyword, true) => "true",
                (BooleanLiteral::Keyword, false) => "false",
            }
            .to_string(),
        )),
        SqlValue::Int(number) => Ok(SqlLiteral(number.to_string())),
        SqlValue::Float(number) => {
            if number.is_finite() {
                Ok(SqlLiteral(format_float(*number)))
            } else {
                quote_string(&format_float(*number))
            }
        }
        SqlValue::Decimal(number) => Ok(SqlLiteral(number.to_string())),
        SqlValue::List(_) | SqlValue::Map(_) => collection_literal(value, type_hint, booleans),
        SqlValue::Json(json) => quote_string(&json.to_string()),
        SqlValue::Date(_) | SqlValue::Timestamp(_) | SqlValue::TimestampTz(_) | SqlValue::Uuid(_) => {
            match value.to_plain_text() {
                Some(text) => quote_string(&text),
                None => Ok(SqlLiteral::null()),
            }
        }
    }
}

fn collection_literal(
    value: &SqlValue,
    type_hint: Option<&str>,
    booleans: BooleanLiteral,
) -> Result<SqlLiteral, LiteralError> {
    if hint_is(type_hint, JSON_TYPES) {
        return json_literal(value);
    }

    if hint_is(type_hint, &[HSTORE_TYPE]) {
        return match value {
            SqlValue::Map(entries) => {
                let pairs = entries
                    .iter()
                    .map(|(key, item)| {
                        Ok(match hstore_text(item)? {
                            Some(text) => format!("{}=>{}", hstore_quote(key), hstore_quote(&text)),
                            None => format!("{}=>NULL", hstore_quote(key)),
                        })
                    })
                    .collect::<Result<Vec<_>, LiteralError>>()?
                    .join(",");
                quote_string(&pairs)
            }
            _ => Err(LiteralError::HstoreRequiresMapping("a list")),
        };
    }

    match value {
        SqlValue::List(items) => list_literal(items, type_hint, booleans),
        // a mapping has no array form, it travels as json text
        _ => json_literal(value),
    }
}

/// `ARRAY[..]`, or `'{}'` when empty. An array column hint is appended as a cast, since a
/// bare constructor of quoted elements is typed `text[]` and Postgres will not assign that to
/// `date[]`, `uuid[]` or enum arrays. Nested lists are sub-arrays of the same type.
fn list_literal(
    items: &[SqlValue],
    type_hint: Option<&str>,
    booleans: BooleanLiteral,
) -> Result<SqlLiteral, LiteralError> {
    let array_hint = type_hint.map(str::trim).filter(|hint| hint.ends_with("[]"));
    let element_hint = array_hint.and_then(|hint| hint.strip_suffix("[]"));

    let constructor = if items.is_empty() {
        "'{}'".to_string()
    } else {
        let elements = items
            .iter()
            .map(|item| {
                let hint = match item {
                    SqlValue::List(_) => array_hint,
                    _ => element_hint,
                };
                to_literal_with(item, hint, booleans).map(SqlLiteral::into_string)
            })
            .collect::<Result<Vec<_>, _>>()?;
        format!("ARRAY[{}]", elements.join(","))
    };

    Ok(SqlLiteral(match array_hint {
        Some(hint) => format!("{}::{}", constructor, hint),
        None => constructor,
    }))
}

fn json_text(value: &SqlValue) -> Result<String, LiteralError> {
    serde_json::to_string(value).map_err(|e| LiteralError::Json(e.to_string()))
}

fn json_literal(value: &SqlValue) -> Result<SqlLiteral, LiteralError> {
    quote_string(&json_text(value)?)
}

fn hstore_text(value: &SqlValue) -> Result<Option<String>, LiteralError> {
    match value {
        SqlValue::List(_) | SqlValue::Map(_) => json_text(value).map(Some),
        _ => Ok(value.to_plain_text()),
    }
}

fn hstore_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Quotes text as a string constant.
///
/// Escaping is left to `postgres_protocol`: quotes are doubled, and text holding a backslash
/// uses the `E'...'` form with the backslashes doubled, which reads the same whatever
/// `standard_conforming_strings` is set to. NUL can not be stored in Postgres text and is
/// rejected.
pub fn quote_string(text: &str) -> Result<SqlLiteral, LiteralError> {
    if text.contains('\0') {
        return Err(LiteralError::NulCharacter);
    }

    // the escape form comes back with a leading space
    Ok(SqlLiteral(escape_literal(text).trim_start().to_string()))
}
