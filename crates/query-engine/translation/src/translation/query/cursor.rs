//! Opaque pagination cursors and the predicates that seek past them.
//!
//! A cursor records, for every element of the ordering, the property path, the
//! direction and the value of the row it was taken at. It is handed out as
//! base64 encoded JSON: `[[key, "ASC" | "DESC", value], ...]`.

use base64::Engine;

use query_engine_models::OrderDirection;
use query_engine_sql::sql;

use super::sorting::OrderElement;
use crate::translation::helpers::State;

/// The value of one ordering element at the row a cursor was taken at.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorEntry {
    pub key: String,
    pub direction: OrderDirection,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    Encoding,
    #[error("cursor is not valid JSON")]
    Json,
    #[error("cursor entry {0} is malformed")]
    Entry(usize),
    #[error("cursor was taken with ordering [{found}], the query orders by [{expected}]")]
    Mismatch { expected: String, found: String },
}

pub fn encode_cursor(entries: &[CursorEntry]) -> String {
    let entries = entries
        .iter()
        .map(|entry| {
            serde_json::Value::Array(vec![
                serde_json::Value::String(entry.key.clone()),
                serde_json::Value::String(entry.direction.name().to_string()),
                entry.value.clone(),
            ])
        })
        .collect();
    base64::engine::general_purpose::STANDARD.encode(serde_json::Value::Array(entries).to_string())
}

pub fn decode_cursor(cursor: &str) -> Result<Vec<CursorEntry>, CursorError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cursor)
        .map_err(|_| CursorError::Encoding)?;
    let entries: Vec<serde_json::Value> =
        serde_json::from_slice(&bytes).map_err(|_| CursorError::Json)?;
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            serde_json::Value::Array(mut parts) if parts.len() == 3 => {
                let value = parts.pop().unwrap_or_default();
                let direction = match parts.pop() {
                    Some(serde_json::Value::String(direction)) if direction == "ASC" => {
                        OrderDirection::Asc
                    }
                    Some(serde_json::Value::String(direction)) if direction == "DESC" => {
                        OrderDirection::Desc
                    }
                    _ => return Err(CursorError::Entry(index)),
                };
                let Some(serde_json::Value::String(key)) = parts.pop() else {
                    return Err(CursorError::Entry(index));
                };
                Ok(CursorEntry {
                    key,
                    direction,
                    value,
                })
            }
            _ => Err(CursorError::Entry(index)),
        })
        .collect()
}

/// Check that a cursor was taken with the ordering it is applied to.
pub fn validate(entries: &[CursorEntry], order: &[OrderElement]) -> Result<(), CursorError> {
    let matches = entries.len() == order.len()
        && entries
            .iter()
            .zip(order)
            .all(|(entry, element)| entry.key == element.key && entry.direction == element.direction);
    if matches {
        Ok(())
    } else {
        let describe = |pairs: Vec<(&str, OrderDirection)>| {
            pairs
                .iter()
                .map(|(key, direction)| format!("{key} {}", direction.name()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        Err(CursorError::Mismatch {
            expected: describe(order.iter().map(|e| (e.key.as_str(), e.direction)).collect()),
            found: describe(entries.iter().map(|e| (e.key.as_str(), e.direction)).collect()),
        })
    }
}

/// Decode a cursor for the given ordering. A cursor that cannot be used is
/// dropped, and the query reads from the start.
pub fn read_cursor(cursor: &str, order: &[OrderElement]) -> Option<Vec<CursorEntry>> {
    let entries = decode_cursor(cursor).and_then(|entries| {
        validate(&entries, order)?;
        Ok(entries)
    });
    match entries {
        Ok(entries) => Some(entries),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring cursor");
            None
        }
    }
}

/// The cursor of a result row, read from the projected ordering values.
pub fn row_cursor(
    order: &[OrderElement],
    row: &serde_json::Map<String, serde_json::Value>,
) -> String {
    let entries: Vec<CursorEntry> = order
        .iter()
        .map(|element| CursorEntry {
            key: element.key.clone(),
            direction: element.direction,
            value: row
                .get(&element.alias.name)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        })
        .collect();
    encode_cursor(&entries)
}

/// A predicate selecting the rows strictly after the cursor in the ordering, or
/// strictly before it when reading backwards.
///
/// For elements `k1 .. kn` this is `k1 > v1 OR (k1 = v1 AND k2 > v2) OR ...`,
/// with `>` flipped for descending elements. `NULL` sorts after every value.
pub fn seek_predicate(
    state: &mut State,
    order: &[OrderElement],
    entries: &[CursorEntry],
    backward: bool,
) -> sql::ast::Expression {
    let mut alternatives = vec![];
    for (index, (element, entry)) in order.iter().zip(entries).enumerate() {
        let mut terms: Vec<sql::ast::Expression> = order[..index]
            .iter()
            .zip(entries)
            .map(|(element, entry)| equal(state, element, &entry.value))
            .collect();
        let ascending = element.direction == OrderDirection::Asc;
        terms.push(if ascending != backward {
            greater(state, element, &entry.value)
        } else {
            less(state, element, &entry.value)
        });
        alternatives.push(sql::helpers::and_all(terms));
    }
    sql::helpers::or_all(alternatives)
}

fn greater(
    state: &mut State,
    element: &OrderElement,
    value: &serde_json::Value,
) -> sql::ast::Expression {
    if value.is_null() {
        return sql::helpers::false_expr();
    }
    let greater = sql::helpers::binary(
        element.target.clone(),
        sql::ast::BinaryOperator::GreaterThan,
        state.make_parameter(value.clone()),
    );
    if element.nullable {
        sql::helpers::or_all(vec![greater, sql::helpers::is_null(element.target.clone())])
    } else {
        greater
    }
}

fn less(state: &mut State, element: &OrderElement, value: &serde_json::Value) -> sql::ast::Expression {
    if value.is_null() {
        return sql::helpers::is_not_null(element.target.clone());
    }
    sql::helpers::binary(
        element.target.clone(),
        sql::ast::BinaryOperator::LessThan,
        state.make_parameter(value.clone()),
    )
}

fn equal(state: &mut State, element: &OrderElement, value: &serde_json::Value) -> sql::ast::Expression {
    if value.is_null() {
        return sql::helpers::is_null(element.target.clone());
    }
    sql::helpers::binary(
        element.target.clone(),
        sql::ast::BinaryOperator::Equals,
        state.make_parameter(value.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(key: &str, column: &str, direction: OrderDirection, nullable: bool) -> OrderElement {
        let table = sql::helpers::make_table_alias("self".to_string());
        OrderElement {
            key: key.to_string(),
            alias: sql::helpers::make_column_alias(format!("self_{column}")),
            target: sql::helpers::aliased_column(&table, column),
            direction,
            nullable,
            cursorable: true,
        }
    }

    fn ordering() -> Vec<OrderElement> {
        vec![
            element("lastName", "last_name", OrderDirection::Asc, true),
            element("id", "id", OrderDirection::Asc, false),
        ]
    }

    fn render(expression: &sql::ast::Expression) -> String {
        let mut sql = sql::string::SQL::new();
        expression.to_sql(&mut sql);
        sql.sql
    }

    #[test]
    fn cursors_survive_encoding() {
        let entries = vec![
            CursorEntry {
                key: "lastName".to_string(),
                direction: OrderDirection::Asc,
                value: json!("Doe"),
            },
            CursorEntry {
                key: "id".to_string(),
                direction: OrderDirection::Desc,
                value: json!(5),
            },
        ];
        assert_eq!(decode_cursor(&encode_cursor(&entries)), Ok(entries));
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        assert_eq!(decode_cursor("not base64!"), Err(CursorError::Encoding));
        let not_json = base64::engine::general_purpose::STANDARD.encode("{");
        assert_eq!(decode_cursor(&not_json), Err(CursorError::Json));
        let bad_direction = base64::engine::general_purpose::STANDARD.encode(r#"[["id", "UP", 1]]"#);
        assert_eq!(decode_cursor(&bad_direction), Err(CursorError::Entry(0)));
    }

    #[test]
    fn cursors_must_match_the_ordering() {
        let order = ordering();
        let cursor = encode_cursor(&[CursorEntry {
            key: "id".to_string(),
            direction: OrderDirection::Asc,
            value: json!(1),
        }]);
        assert!(read_cursor(&cursor, &order).is_none());

        let mut row = serde_json::Map::new();
        row.insert("self_last_name".to_string(), json!("Doe"));
        row.insert("self_id".to_string(), json!(5));
        let cursor = row_cursor(&order, &row);
        let entries = read_cursor(&cursor, &order).unwrap();
        assert_eq!(entries[0].value, json!("Doe"));
        assert_eq!(entries[1].value, json!(5));
    }

    #[test]
    fn seeking_forward_treats_null_as_largest() {
        let order = ordering();
        let entries = vec![
            CursorEntry {
                key: "lastName".to_string(),
                direction: OrderDirection::Asc,
                value: json!("Doe"),
            },
            CursorEntry {
                key: "id".to_string(),
                direction: OrderDirection::Asc,
                value: json!(5),
            },
        ];
        let mut state = State::new(63);
        let predicate = seek_predicate(&mut state, &order, &entries, false);
        assert_eq!(
            render(&predicate),
            r#"(("self"."last_name" > :p0 OR "self"."last_name" IS NULL) OR ("self"."last_name" = :p1 AND "self"."id" > :p2))"#
        );
    }

    #[test]
    fn seeking_backward_from_a_null() {
        let order = ordering();
        let entries = vec![
            CursorEntry {
                key: "lastName".to_string(),
                direction: OrderDirection::Asc,
                value: json!(null),
            },
            CursorEntry {
                key: "id".to_string(),
                direction: OrderDirection::Asc,
                value: json!(5),
            },
        ];
        let mut state = State::new(63);
        let predicate = seek_predicate(&mut state, &order, &entries, true);
        assert_eq!(
            render(&predicate),
            r#"("self"."last_name" IS NOT NULL OR ("self"."last_name" IS NULL AND "self"."id" < :p0))"#
        );
    }
}
