//! Helpers for building sql::ast types in certain shapes and patterns.

use super::ast::*;
use super::string::Param;

// Empty clauses //

/// An empty `WHERE` clause.
pub fn empty_where() -> Where {
    Where(true_expr())
}

/// An empty `GROUP BY` clause.
pub fn empty_group_by() -> GroupBy {
    GroupBy { elements: vec![] }
}

/// An empty `HAVING` clause.
pub fn empty_having() -> Having {
    Having(true_expr())
}

/// An empty `ORDER BY` clause.
pub fn empty_order_by() -> OrderBy {
    OrderBy { elements: vec![] }
}

/// Empty `LIMIT` and `OFFSET` clauses.
pub fn empty_limit() -> Limit {
    Limit {
        limit: None,
        offset: None,
    }
}

/// A `true` expression.
pub fn true_expr() -> Expression {
    Expression::Value(Value::Bool(true))
}

/// A `false` expression.
pub fn false_expr() -> Expression {
    Expression::Value(Value::Bool(false))
}

// Boolean combinations //

/// Combine two expressions with AND, dropping a `true` operand.
pub fn and(left: Expression, right: Expression) -> Expression {
    if left == true_expr() {
        right
    } else if right == true_expr() {
        left
    } else {
        Expression::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Combine a list of expressions with AND. An empty list is `true`.
pub fn and_all(expressions: Vec<Expression>) -> Expression {
    let mut expressions = expressions.into_iter().rev();
    match expressions.next() {
        None => true_expr(),
        Some(last) => expressions.fold(last, |acc, expression| and(expression, acc)),
    }
}

/// Combine a list of expressions with OR. An empty list is `false`.
pub fn or_all(expressions: Vec<Expression>) -> Expression {
    let mut expressions = expressions.into_iter().rev();
    match expressions.next() {
        None => false_expr(),
        Some(last) => expressions.fold(last, |acc, expression| Expression::Or {
            left: Box::new(expression),
            right: Box::new(acc),
        }),
    }
}

pub fn not(expression: Expression) -> Expression {
    Expression::Not(Box::new(expression))
}

pub fn binary(left: Expression, operator: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOperation {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    }
}

pub fn is_null(expression: Expression) -> Expression {
    Expression::UnaryOperation {
        expression: Box::new(expression),
        operator: UnaryOperator::IsNull,
    }
}

pub fn is_not_null(expression: Expression) -> Expression {
    Expression::UnaryOperation {
        expression: Box::new(expression),
        operator: UnaryOperator::IsNotNull,
    }
}

pub fn function_call(function: Function, args: Vec<Expression>) -> Expression {
    Expression::FunctionCall { function, args }
}

pub fn cast(expression: Expression, type_name: &str) -> Expression {
    Expression::Cast {
        expression: Box::new(expression),
        r#type: ScalarTypeName(type_name.to_string()),
    }
}

/// A named parameter holding a caller supplied value.
pub fn parameter(name: String, value: serde_json::Value) -> Expression {
    Expression::Value(Value::Parameter {
        name,
        param: Param::Value(value),
    })
}

/// A named parameter bound from a variable at execution time.
pub fn variable(name: String, variable: String) -> Expression {
    Expression::Value(Value::Parameter {
        name,
        param: Param::Variable(variable),
    })
}

// Aliasing //

/// A column of an aliased table.
pub fn aliased_column(table: &TableAlias, name: &str) -> Expression {
    Expression::ColumnReference(ColumnReference::TableColumn {
        table: TableReference::AliasedTable(table.clone()),
        name: ColumnName(name.to_string()),
    })
}

/// Create column aliases using this function so we build everything in one place.
pub fn make_column_alias(name: String) -> ColumnAlias {
    ColumnAlias { name }
}

/// Create table aliases using this function so we build everything in one place.
pub fn make_table_alias(name: String) -> TableAlias {
    TableAlias { name }
}

/// A reference to a database table, optionally qualified by its schema.
pub fn table_reference(schema: Option<&str>, table: &str) -> TableReference {
    TableReference::DBTable {
        schema: schema.map(|schema| SchemaName(schema.to_string())),
        table: TableName(table.to_string()),
    }
}

// SELECTs //

/// Build a simple select with a select list and the rest are empty.
pub fn simple_select(select_list: Vec<(ColumnAlias, Expression)>) -> Select {
    Select {
        distinct: false,
        select_list: SelectList::SelectList(select_list),
        from: None,
        joins: vec![],
        where_: empty_where(),
        group_by: empty_group_by(),
        having: empty_having(),
        order_by: empty_order_by(),
        limit: empty_limit(),
    }
}

/// Turn a row select into one counting the rows it matches. Ordering, limits and
/// DISTINCT are dropped; a DISTINCT select counts distinct values of `identity`.
pub fn count_select(select: &Select, identity: Expression, alias: ColumnAlias) -> Select {
    let count = match (select.distinct, identity) {
        (true, Expression::ColumnReference(column)) => CountType::Distinct(column),
        _ => CountType::Star,
    };
    Select {
        distinct: false,
        select_list: SelectList::SelectList(vec![(alias, Expression::Count(count))]),
        from: select.from.clone(),
        joins: select.joins.clone(),
        where_: select.where_.clone(),
        group_by: empty_group_by(),
        having: empty_having(),
        order_by: empty_order_by(),
        limit: empty_limit(),
    }
}
