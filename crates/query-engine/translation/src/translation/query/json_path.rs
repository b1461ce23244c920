//! Comparisons against values nested inside JSON columns.
//!
//! A JSON filter compiles to a `jsonb_path_exists` call. The path expression is
//! bound as a parameter and the compared values are passed as path variables
//! (`$v0`, `$v1`, ...), each cast to the requested type.

use std::collections::BTreeMap;

use query_engine_metadata::metadata::ComparisonOperator;
use query_engine_models::CastType;
use query_engine_sql::sql;

use super::values;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, State};

pub fn translate_json_predicate(
    env: &Env<'_>,
    state: &mut State,
    column: sql::ast::Expression,
    path: &[String],
    operator: ComparisonOperator,
    value: &serde_json::Value,
    cast: Option<CastType>,
) -> Result<sql::ast::Expression, Error> {
    let operands: Vec<&serde_json::Value> = match value {
        serde_json::Value::Array(items) if operator.takes_list() => items.iter().collect(),
        _ => vec![value],
    };
    let cast = cast.unwrap_or_else(|| values::infer_cast_type(value));
    let datetime = cast == CastType::Timestamp;
    let subject = if datetime { "@.datetime()" } else { "@" };
    let variable = |index: usize| {
        if datetime {
            format!("$v{index}.datetime()")
        } else {
            format!("$v{index}")
        }
    };
    let compare = |symbol: &str| format!("{subject} {symbol} {}", variable(0));

    let mut bound = operands.clone();
    let condition = match operator {
        ComparisonOperator::Equals => compare("=="),
        ComparisonOperator::NotEquals => compare("!="),
        ComparisonOperator::LessThan => compare("<"),
        ComparisonOperator::LessThanOrEqualTo => compare("<="),
        ComparisonOperator::GreaterThan => compare(">"),
        ComparisonOperator::GreaterThanOrEqualTo => compare(">="),
        ComparisonOperator::Like | ComparisonOperator::NotLike => {
            let pattern = value
                .as_str()
                .ok_or_else(|| Error::type_mismatch(operator.name(), "a pattern", value))?;
            // the pattern lives in the path itself
            bound.clear();
            let flag = if env.settings().normalization.case_insensitive {
                " flag \"i\""
            } else {
                ""
            };
            let condition = format!("@ like_regex \"{}\"{flag}", like_to_regex(pattern));
            if operator == ComparisonOperator::NotLike {
                format!("!({condition})")
            } else {
                condition
            }
        }
        ComparisonOperator::In | ComparisonOperator::NotIn => {
            if operands.is_empty() {
                return Ok(if operator == ComparisonOperator::NotIn {
                    sql::helpers::true_expr()
                } else {
                    sql::helpers::false_expr()
                });
            }
            let alternatives = (0..operands.len())
                .map(|index| format!("{subject} == {}", variable(index)))
                .collect::<Vec<_>>()
                .join(" || ");
            if operator == ComparisonOperator::NotIn {
                format!("!({alternatives})")
            } else {
                format!("({alternatives})")
            }
        }
        ComparisonOperator::Between | ComparisonOperator::NotBetween => {
            if operands.len() != 2 {
                return Err(Error::type_mismatch(operator.name(), "a pair of bounds", value));
            }
            let range = format!(
                "({subject} >= {} && {subject} <= {})",
                variable(0),
                variable(1)
            );
            if operator == ComparisonOperator::NotBetween {
                format!("!{range}")
            } else {
                range
            }
        }
    };

    let path_text = format!("{} ? ({condition})", path_to_text(path));
    let path_parameter = state.make_parameter(serde_json::Value::String(path_text));
    let type_name = values::cast_type_name(cast);
    let variables: BTreeMap<String, sql::ast::Expression> = bound
        .into_iter()
        .enumerate()
        .map(|(index, operand)| {
            (
                format!("v{index}"),
                sql::helpers::cast(state.make_parameter(operand.clone()), type_name),
            )
        })
        .collect();

    Ok(sql::helpers::function_call(
        sql::ast::Function::JsonbPathExists,
        vec![
            column,
            sql::helpers::cast(path_parameter, "jsonpath"),
            sql::ast::Expression::JsonBuildObject(variables),
        ],
    ))
}

/// `$."a"."b"` for the path `a.b`.
pub fn path_to_text(path: &[String]) -> String {
    let mut text = String::from("$");
    for segment in path {
        text.push_str(".\"");
        text.push_str(&escape(segment));
        text.push('"');
    }
    text
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Turn a LIKE pattern into an anchored regular expression, written as the
/// contents of a JSON path string literal.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => regex.push_str("\\\\\\\\"),
            '.' | '^' | '$' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}' => {
                regex.push_str("\\\\");
                regex.push(c);
            }
            '"' => regex.push_str("\\\""),
            c => regex.push(c),
        }
    }
    regex.push('$');
    regex
}
