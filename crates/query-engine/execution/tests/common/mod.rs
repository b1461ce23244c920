//! An executor interpreting the SQL AST over rows held in memory.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use query_engine_configuration::Configuration;
use query_engine_execution::executor::{Executor, Row, Statement};
use query_engine_execution::metrics::Metrics;
use query_engine_sql::sql::ast;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Load the runtime configuration of the contacts fixture.
pub async fn configuration() -> anyhow::Result<Configuration> {
    let _ = env_logger::builder().is_test(true).try_init();

    let directory = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../../static/contacts");
    let parsed_configuration = query_engine_configuration::parse_configuration(&directory).await?;
    Ok(query_engine_configuration::make_runtime_configuration(
        parsed_configuration,
    )?)
}

pub fn metrics() -> Metrics {
    Metrics::initialise(&mut prometheus::Registry::new()).unwrap()
}

/// Tables by name, each a list of rows keyed by column name.
#[derive(Default)]
pub struct MemoryExecutor {
    tables: HashMap<String, Vec<Row>>,
    pub statements: Mutex<Vec<String>>,
}

/// The row of every table alias in scope. `None` is the missing side of an outer join.
type Scope = HashMap<String, Option<Row>>;

type Params = indexmap::IndexMap<String, serde_json::Value>;

impl MemoryExecutor {
    pub fn with_table(mut self, name: &str, rows: serde_json::Value) -> Self {
        let rows = match rows {
            serde_json::Value::Array(rows) => rows
                .into_iter()
                .filter_map(|row| match row {
                    serde_json::Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        };
        self.tables.insert(name.to_string(), rows);
        self
    }

    fn table(&self, reference: &ast::TableReference) -> Result<&Vec<Row>, BoxError> {
        match reference {
            ast::TableReference::DBTable { table, .. } => self
                .tables
                .get(&table.0)
                .ok_or_else(|| format!("unknown table {}", table.0).into()),
            ast::TableReference::AliasedTable(alias) => {
                Err(format!("cannot read from alias {}", alias.name).into())
            }
        }
    }

    fn run(&self, statement: &Statement<'_>) -> Result<Vec<Row>, BoxError> {
        self.select(&statement.query.select, &statement.params)
    }

    fn select(&self, select: &ast::Select, params: &Params) -> Result<Vec<Row>, BoxError> {
        let mut scopes: Vec<Scope> = match &select.from {
            Some(ast::From::Table { reference, alias }) => self
                .table(reference)?
                .iter()
                .map(|row| Scope::from([(alias.name.clone(), Some(row.clone()))]))
                .collect(),
            None => vec![Scope::new()],
        };

        for join in &select.joins {
            let ast::Join::LeftOuterJoin(join) = join;
            let ast::JoinSource::Table(reference) = &join.source else {
                return Err("nested join trees are not supported".into());
            };
            let candidates = self.table(reference)?;
            let mut joined = vec![];
            for scope in scopes {
                let mut matched = false;
                for candidate in candidates {
                    let mut extended = scope.clone();
                    extended.insert(join.alias.name.clone(), Some(candidate.clone()));
                    if self.eval(&join.on, Input::One(&extended), params)? == serde_json::Value::Bool(true) {
                        joined.push(extended);
                        matched = true;
                    }
                }
                if !matched {
                    let mut extended = scope;
                    extended.insert(join.alias.name.clone(), None);
                    joined.push(extended);
                }
            }
            scopes = joined;
        }

        let mut filtered = vec![];
        for scope in scopes {
            if self.eval(&select.where_.0, Input::One(&scope), params)? == serde_json::Value::Bool(true) {
                filtered.push(scope);
            }
        }

        let ast::SelectList::SelectList(list) = &select.select_list;
        let grouped = !select.group_by.elements.is_empty()
            || list.iter().any(|(_, expression)| is_aggregate(expression));

        // Every output row is computed from one scope, or from a group of them.
        let mut units: Vec<Vec<Scope>> = vec![];
        if grouped {
            let mut groups: Vec<(Vec<serde_json::Value>, Vec<Scope>)> = vec![];
            for scope in filtered {
                let key = select
                    .group_by
                    .elements
                    .iter()
                    .map(|element| self.eval(element, Input::One(&scope), params))
                    .collect::<Result<Vec<_>, _>>()?;
                match groups.iter().position(|(existing, _)| *existing == key) {
                    Some(index) => groups[index].1.push(scope),
                    None => groups.push((key, vec![scope])),
                }
            }
            if groups.is_empty() && select.group_by.elements.is_empty() {
                groups.push((vec![], vec![]));
            }
            for (_, members) in groups {
                if self.eval(&select.having.0, Input::Group(&members), params)?
                    == serde_json::Value::Bool(true)
                {
                    units.push(members);
                }
            }
        } else {
            units = filtered.into_iter().map(|scope| vec![scope]).collect();
        }

        let mut keyed = vec![];
        for unit in &units {
            let keys = select
                .order_by
                .elements
                .iter()
                .map(|element| self.eval(&element.target, Input::of(grouped, unit), params))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.push((keys, unit));
        }
        keyed.sort_by(|(left, _), (right, _)| {
            for ((left, right), element) in left.iter().zip(right).zip(&select.order_by.elements) {
                let ordering = sort_order(left, right);
                let ordering = match element.direction {
                    ast::OrderByDirection::Asc => ordering,
                    ast::OrderByDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        let mut rows: Vec<Row> = vec![];
        for (_, unit) in keyed {
            let mut row = Row::new();
            for (alias, expression) in list {
                row.insert(
                    alias.name.clone(),
                    self.eval(expression, Input::of(grouped, unit), params)?,
                );
            }
            if !(select.distinct && rows.contains(&row)) {
                rows.push(row);
            }
        }

        let offset = usize::try_from(select.limit.offset.unwrap_or(0))?;
        let limit = match select.limit.limit {
            Some(limit) => usize::try_from(limit)?,
            None => usize::MAX,
        };
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    fn eval(
        &self,
        expression: &ast::Expression,
        input: Input<'_>,
        params: &Params,
    ) -> Result<serde_json::Value, BoxError> {
        let value = match expression {
            ast::Expression::And { left, right } => {
                match (
                    self.eval(left, input, params)?.as_bool(),
                    self.eval(right, input, params)?.as_bool(),
                ) {
                    (Some(false), _) | (_, Some(false)) => truth(Some(false)),
                    (Some(true), Some(true)) => truth(Some(true)),
                    _ => truth(None),
                }
            }
            ast::Expression::Or { left, right } => {
                match (
                    self.eval(left, input, params)?.as_bool(),
                    self.eval(right, input, params)?.as_bool(),
                ) {
                    (Some(true), _) | (_, Some(true)) => truth(Some(true)),
                    (Some(false), Some(false)) => truth(Some(false)),
                    _ => truth(None),
                }
            }
            ast::Expression::Not(inner) => {
                truth(self.eval(inner, input, params)?.as_bool().map(|b| !b))
            }
            ast::Expression::BinaryOperation {
                left,
                operator,
                right,
            } => {
                let left = self.eval(left, input, params)?;
                let right = self.eval(right, input, params)?;
                if left.is_null() || right.is_null() {
                    return Ok(serde_json::Value::Null);
                }
                let ordering = compare(&left, &right);
                truth(match operator {
                    ast::BinaryOperator::Equals => {
                        Some(left == right || ordering == Some(Ordering::Equal))
                    }
                    ast::BinaryOperator::NotEquals => {
                        Some(!(left == right || ordering == Some(Ordering::Equal)))
                    }
                    ast::BinaryOperator::GreaterThan => ordering.map(Ordering::is_gt),
                    ast::BinaryOperator::GreaterThanOrEqualTo => ordering.map(Ordering::is_ge),
                    ast::BinaryOperator::LessThan => ordering.map(Ordering::is_lt),
                    ast::BinaryOperator::LessThanOrEqualTo => ordering.map(Ordering::is_le),
                    ast::BinaryOperator::Like => like(&left, &right),
                    ast::BinaryOperator::NotLike => like(&left, &right).map(|b| !b),
                })
            }
            ast::Expression::BinaryArrayOperation {
                left,
                operator,
                right,
            } => {
                let left = self.eval(left, input, params)?;
                if left.is_null() {
                    return Ok(serde_json::Value::Null);
                }
                let mut found = false;
                for candidate in right {
                    if self.eval(candidate, input, params)? == left {
                        found = true;
                    }
                }
                truth(Some(match operator {
                    ast::BinaryArrayOperator::In => found,
                    ast::BinaryArrayOperator::NotIn => !found,
                }))
            }
            ast::Expression::InSelect { expression, select } => {
                let value = self.eval(expression, input, params)?;
                if value.is_null() {
                    return Ok(serde_json::Value::Null);
                }
                let rows = self.select(select, params)?;
                truth(Some(
                    rows.iter()
                        .any(|row| row.values().next() == Some(&value)),
                ))
            }
            ast::Expression::Between {
                expression,
                low,
                high,
                negated,
            } => {
                let value = self.eval(expression, input, params)?;
                let low = compare(&value, &self.eval(low, input, params)?);
                let high = compare(&value, &self.eval(high, input, params)?);
                truth(match (low, high) {
                    (Some(low), Some(high)) => Some((low.is_ge() && high.is_le()) != *negated),
                    _ => None,
                })
            }
            ast::Expression::UnaryOperation {
                expression,
                operator,
            } => {
                let is_null = self.eval(expression, input, params)?.is_null();
                truth(Some(match operator {
                    ast::UnaryOperator::IsNull => is_null,
                    ast::UnaryOperator::IsNotNull => !is_null,
                }))
            }
            ast::Expression::Count(count) => {
                let Input::Group(members) = input else {
                    return Err("COUNT outside of a group".into());
                };
                match count {
                    ast::CountType::Star => serde_json::Value::from(members.len()),
                    ast::CountType::Simple(column) | ast::CountType::Distinct(column) => {
                        let column = ast::Expression::ColumnReference(column.clone());
                        let mut values = self.values(&column, members, params)?;
                        if matches!(count, ast::CountType::Distinct(_)) {
                            values.dedup();
                        }
                        serde_json::Value::from(values.len())
                    }
                }
            }
            ast::Expression::FunctionCall { function, args } => {
                let [argument] = args.as_slice() else {
                    return Err(format!("unsupported call of {function:?}").into());
                };
                match (function, input) {
                    (
                        ast::Function::Avg | ast::Function::Sum | ast::Function::Min | ast::Function::Max,
                        Input::Group(members),
                    ) => aggregate(function, &self.values(argument, members, params)?),
                    (ast::Function::Lower, _) => match self.eval(argument, input, params)? {
                        serde_json::Value::String(text) => serde_json::Value::String(text.to_lowercase()),
                        other => other,
                    },
                    (ast::Function::Unaccent, _) => self.eval(argument, input, params)?,
                    (function, _) => return Err(format!("unsupported function {function:?}").into()),
                }
            }
            ast::Expression::ColumnReference(ast::ColumnReference::TableColumn {
                table: ast::TableReference::AliasedTable(alias),
                name,
            }) => {
                let scope = match input {
                    Input::One(scope) => scope,
                    // grouped columns are the same across the group
                    Input::Group(members) => match members.first() {
                        Some(scope) => scope,
                        None => return Ok(serde_json::Value::Null),
                    },
                };
                match scope.get(&alias.name) {
                    Some(Some(row)) => row.get(&name.0).cloned().unwrap_or(serde_json::Value::Null),
                    Some(None) => serde_json::Value::Null,
                    None => return Err(format!("unknown table alias {}", alias.name).into()),
                }
            }
            ast::Expression::Value(value) => match value {
                ast::Value::Bool(value) => serde_json::Value::Bool(*value),
                ast::Value::Parameter { name, .. } => params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| format!("unbound parameter {name}"))?,
            },
            ast::Expression::Cast { expression, .. } => self.eval(expression, input, params)?,
            other => return Err(format!("unsupported expression {other:?}").into()),
        };
        Ok(value)
    }

    /// The non-null values of an expression across a group, sorted.
    fn values(
        &self,
        expression: &ast::Expression,
        members: &[Scope],
        params: &Params,
    ) -> Result<Vec<serde_json::Value>, BoxError> {
        let mut values = vec![];
        for scope in members {
            let value = self.eval(expression, Input::One(scope), params)?;
            if !value.is_null() {
                values.push(value);
            }
        }
        values.sort_by(sort_order);
        Ok(values)
    }
}

#[async_trait::async_trait]
impl Executor for MemoryExecutor {
    async fn fetch(&self, statement: &Statement<'_>) -> Result<Vec<Row>, BoxError> {
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(statement.sql.clone());
        }
        self.run(statement)
    }
}

/// What an expression is evaluated against.
#[derive(Clone, Copy)]
enum Input<'s> {
    One(&'s Scope),
    Group(&'s [Scope]),
}

impl<'s> Input<'s> {
    /// Ungrouped units hold a single scope.
    fn of(grouped: bool, unit: &'s [Scope]) -> Input<'s> {
        if grouped {
            Input::Group(unit)
        } else {
            Input::One(&unit[0])
        }
    }
}

fn is_aggregate(expression: &ast::Expression) -> bool {
    matches!(
        expression,
        ast::Expression::Count(_)
            | ast::Expression::FunctionCall {
                function: ast::Function::Avg
                    | ast::Function::Sum
                    | ast::Function::Min
                    | ast::Function::Max,
                ..
            }
    )
}

/// AVG, SUM, MIN or MAX over sorted non-null values. Integer sums stay integers.
fn aggregate(function: &ast::Function, values: &[serde_json::Value]) -> serde_json::Value {
    let (Some(first), Some(last)) = (values.first(), values.last()) else {
        return serde_json::Value::Null;
    };
    match function {
        ast::Function::Min => first.clone(),
        ast::Function::Max => last.clone(),
        ast::Function::Sum if values.iter().all(serde_json::Value::is_i64) => {
            serde_json::Value::from(values.iter().filter_map(serde_json::Value::as_i64).sum::<i64>())
        }
        ast::Function::Sum | ast::Function::Avg => {
            let sum: f64 = values.iter().filter_map(serde_json::Value::as_f64).sum();
            if *function == ast::Function::Sum {
                serde_json::Value::from(sum)
            } else {
                serde_json::Value::from(sum / values.len() as f64)
            }
        }
        _ => serde_json::Value::Null,
    }
}

/// `NULL` sorts after every value, as it does in PostgreSQL.
fn sort_order(left: &serde_json::Value, right: &serde_json::Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
    }
}

fn compare(left: &serde_json::Value, right: &serde_json::Value) -> Option<Ordering> {
    match (left, right) {
        (serde_json::Value::Number(left), serde_json::Value::Number(right)) => {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        (serde_json::Value::String(left), serde_json::Value::String(right)) => Some(left.cmp(right)),
        (serde_json::Value::Bool(left), serde_json::Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

fn truth(value: Option<bool>) -> serde_json::Value {
    value.map_or(serde_json::Value::Null, serde_json::Value::Bool)
}

/// `%` matches any run of characters, `_` a single one.
fn like(value: &serde_json::Value, pattern: &serde_json::Value) -> Option<bool> {
    fn matches(value: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => value.is_empty(),
            Some(('%', rest)) => (0..=value.len()).any(|skip| matches(&value[skip..], rest)),
            Some(('_', rest)) => !value.is_empty() && matches(&value[1..], rest),
            Some((c, rest)) => value.first() == Some(c) && matches(&value[1..], rest),
        }
    }
    let (serde_json::Value::String(value), serde_json::Value::String(pattern)) = (value, pattern)
    else {
        return None;
    };
    let value: Vec<char> = value.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    Some(matches(&value, &pattern))
}

/// Ten contacts, two of them without a company, one without a first name.
pub fn contacts() -> MemoryExecutor {
    MemoryExecutor::default()
        .with_table(
            "contact",
            serde_json::json!([
                { "id": 1, "first_name": "Alice", "last_name": "Smith", "email": "alice@example.com", "age": 31, "created_at": null, "company_id": 1, "notes": "met at the fair" },
                { "id": 2, "first_name": "Bob", "last_name": "Jones", "email": "bob@example.com", "age": 45, "created_at": null, "company_id": 1, "notes": null },
                { "id": 3, "first_name": "Carol", "last_name": "Brown", "email": "carol@example.com", "age": 28, "created_at": null, "company_id": 2, "notes": null },
                { "id": 4, "first_name": null, "last_name": "Anonymous", "email": "anon@example.com", "age": null, "created_at": null, "company_id": null, "notes": null },
                { "id": 5, "first_name": "Dave", "last_name": "Miller", "email": "dave@example.com", "age": 52, "created_at": null, "company_id": 2, "notes": null },
                { "id": 6, "first_name": "Bob", "last_name": "Taylor", "email": "bob.t@example.com", "age": 39, "created_at": null, "company_id": 3, "notes": null },
                { "id": 7, "first_name": "Erin", "last_name": "Wilson", "email": "erin@example.com", "age": 24, "created_at": null, "company_id": 3, "notes": null },
                { "id": 8, "first_name": "Alice", "last_name": "Moore", "email": "alice.m@example.com", "age": 60, "created_at": null, "company_id": null, "notes": null },
                { "id": 9, "first_name": "Frank", "last_name": "Clark", "email": "frank@example.com", "age": 35, "created_at": null, "company_id": 1, "notes": null },
                { "id": 10, "first_name": "Grace", "last_name": "Hall", "email": "grace@example.com", "age": 41, "created_at": null, "company_id": 2, "notes": null }
            ]),
        )
        .with_table(
            "company",
            serde_json::json!([
                { "id": 1, "name": "Acme" },
                { "id": 2, "name": "Globex" },
                { "id": 3, "name": "Initech" }
            ]),
        )
        .with_table(
            "address",
            serde_json::json!([
                { "id": 1, "street": "1 Main Street", "city": "Springfield", "contact_id": 1, "country_id": null },
                { "id": 2, "street": "2 High Street", "city": "Shelbyville", "contact_id": 1, "country_id": null },
                { "id": 3, "street": "3 Elm Street", "city": "Springfield", "contact_id": 3, "country_id": null }
            ]),
        )
}
