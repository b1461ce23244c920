//! Execute aggregate plans and reshape their rows into nested objects.
//!
//! A row `{ "avg_addresses_country_version": "2.5" }` answering the path
//! `avg.addresses.country.version` becomes
//! `{ "avg": { "addresses": { "country": { "version": 2.5 } } } }`.

use tracing::Instrument;

use query_engine_translation::translation::query::aggregates::AggregatePlan;

use crate::error::Error;
use crate::executor::{self, Executor, Row, Variables};
use crate::metrics::Metrics;

/// Execute an aggregate plan, returning one object per group.
pub async fn execute(
    executor: &dyn Executor,
    metrics: &Metrics,
    plan: &AggregatePlan,
) -> Result<Vec<serde_json::Value>, Error> {
    let rows = executor::fetch(executor, metrics, &plan.query, &Variables::new())
        .instrument(tracing::info_span!("Execute aggregate", entity = %plan.entity))
        .await?;
    rows.iter().map(|row| reshape(plan, row)).collect()
}

/// Reshape one flat aggregate row following the alias map of its plan.
pub fn reshape(plan: &AggregatePlan, row: &Row) -> Result<serde_json::Value, Error> {
    let mut object = serde_json::Map::new();
    for (alias, paths) in &plan.aliases {
        let raw = row
            .get(alias)
            .ok_or_else(|| Error::MissingColumn(alias.clone()))?;
        for path in paths {
            let mut segments = path.split('.');
            let Some(function) = segments.next() else {
                continue;
            };
            let value = convert(function, raw)?;
            insert_path(&mut object, function, segments.collect(), value);
        }
    }
    Ok(serde_json::Value::Object(object))
}

fn convert(function: &str, value: &serde_json::Value) -> Result<serde_json::Value, Error> {
    match function {
        "count" => match value {
            serde_json::Value::Null => Ok(serde_json::Value::from(0)),
            serde_json::Value::Number(_) => Ok(value.clone()),
            serde_json::Value::String(text) => parse_number(text)
                .filter(serde_json::Value::is_u64)
                .ok_or_else(|| Error::InvalidCount(value.clone())),
            _ => Err(Error::InvalidCount(value.clone())),
        },
        // grouped values and the other functions keep nulls and non numeric text
        _ => Ok(sniff(value)),
    }
}

/// Numbers sent back as text, e.g. `numeric` results, are parsed. Anything else
/// passes through.
fn sniff(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => parse_number(text).unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

/// Parse `-?[0-9]+` as an integer and `-?[0-9]+.[0-9]+` as a decimal.
fn parse_number(text: &str) -> Option<serde_json::Value> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    match digits.split_once('.') {
        None if all_digits(digits) => text.parse::<i64>().ok().map(serde_json::Value::from),
        Some((whole, fraction)) if all_digits(whole) && all_digits(fraction) => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number),
        _ => None,
    }
}

fn insert_path(
    object: &mut serde_json::Map<String, serde_json::Value>,
    head: &str,
    rest: Vec<&str>,
    value: serde_json::Value,
) {
    match rest.split_first() {
        None => {
            object.insert(head.to_string(), value);
        }
        Some((next, rest)) => {
            let child = object
                .entry(head.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if !child.is_object() {
                *child = serde_json::Value::Object(serde_json::Map::new());
            }
            if let serde_json::Value::Object(child) = child {
                insert_path(child, next, rest.to_vec(), value);
            }
        }
    }
}
