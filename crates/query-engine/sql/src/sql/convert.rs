//! Convert a SQL AST to a low-level SQL string.

use super::ast::*;
use super::helpers;
use super::string::*;

// Convert to SQL strings

impl SelectList {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            SelectList::SelectList(select_list) => {
                for (index, (col, expr)) in select_list.iter().enumerate() {
                    expr.to_sql(sql);
                    sql.append_syntax(" AS ");
                    col.to_sql(sql);
                    if index < (select_list.len() - 1) {
                        sql.append_syntax(", ");
                    }
                }
            }
        }
    }
}

impl Select {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_syntax("SELECT ");
        if self.distinct {
            sql.append_syntax("DISTINCT ");
        }

        self.select_list.to_sql(sql);

        if let Some(from) = &self.from {
            from.to_sql(sql);
        }

        for join in &self.joins {
            join.to_sql(sql);
        }

        self.where_.to_sql(sql);

        self.group_by.to_sql(sql);

        self.having.to_sql(sql);

        self.order_by.to_sql(sql);

        self.limit.to_sql(sql);
    }
}

impl From {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_syntax(" FROM ");
        match &self {
            From::Table { reference, alias } => {
                reference.to_sql(sql);
                sql.append_syntax(" AS ");
                alias.to_sql(sql);
            }
        }
    }
}

impl Join {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            Join::LeftOuterJoin(join) => {
                sql.append_syntax(" LEFT OUTER JOIN ");
                match &join.source {
                    JoinSource::Table(reference) => {
                        reference.to_sql(sql);
                        sql.append_syntax(" AS ");
                        join.alias.to_sql(sql);
                    }
                    JoinSource::Through {
                        link,
                        link_alias,
                        link_on,
                        table,
                    } => {
                        sql.append_syntax("(");
                        link.to_sql(sql);
                        sql.append_syntax(" AS ");
                        link_alias.to_sql(sql);
                        sql.append_syntax(" INNER JOIN ");
                        table.to_sql(sql);
                        sql.append_syntax(" AS ");
                        join.alias.to_sql(sql);
                        sql.append_syntax(" ON ");
                        link_on.to_sql(sql);
                        sql.append_syntax(")");
                    }
                }
                sql.append_syntax(" ON ");
                join.on.to_sql(sql);
            }
        }
    }
}

impl Where {
    pub fn to_sql(&self, sql: &mut SQL) {
        let Where(expression) = self;
        if *expression != helpers::true_expr() {
            sql.append_syntax(" WHERE ");
            expression.to_sql(sql);
        }
    }
}

impl GroupBy {
    pub fn to_sql(&self, sql: &mut SQL) {
        if !self.elements.is_empty() {
            sql.append_syntax(" GROUP BY ");
            for (index, element) in self.elements.iter().enumerate() {
                element.to_sql(sql);
                if index < (self.elements.len() - 1) {
                    sql.append_syntax(", ");
                }
            }
        }
    }
}

impl Having {
    pub fn to_sql(&self, sql: &mut SQL) {
        let Having(expression) = self;
        if *expression != helpers::true_expr() {
            sql.append_syntax(" HAVING ");
            expression.to_sql(sql);
        }
    }
}

// scalars
impl Expression {
    pub fn to_sql(&self, sql: &mut SQL) {
        match &self {
            Expression::ColumnReference(column_reference) => column_reference.to_sql(sql),
            Expression::Value(value) => value.to_sql(sql),
            // AND is associative, chains are written flat.
            Expression::And { left, right } => {
                left.to_sql(sql);
                sql.append_syntax(" AND ");
                right.to_sql(sql);
            }
            Expression::Or { left, right } => {
                sql.append_syntax("(");
                left.to_sql_grouped(sql);
                sql.append_syntax(" OR ");
                right.to_sql_grouped(sql);
                sql.append_syntax(")");
            }
            Expression::Not(expr) => {
                sql.append_syntax("NOT ");
                if let Expression::Or { .. } = **expr {
                    expr.to_sql(sql);
                } else {
                    sql.append_syntax("(");
                    expr.to_sql(sql);
                    sql.append_syntax(")");
                }
            }
            Expression::BinaryOperation {
                left,
                operator,
                right,
            } => {
                left.to_sql(sql);
                operator.to_sql(sql);
                right.to_sql(sql);
            }
            Expression::BinaryArrayOperation {
                left,
                operator,
                right,
            } => {
                left.to_sql(sql);
                operator.to_sql(sql);
                sql.append_syntax("(");
                for (index, item) in right.iter().enumerate() {
                    item.to_sql(sql);
                    if index < (right.len() - 1) {
                        sql.append_syntax(", ");
                    }
                }
                sql.append_syntax(")");
            }
            Expression::Between {
                expression,
                low,
                high,
                negated,
            } => {
                sql.append_syntax("(");
                expression.to_sql(sql);
                if *negated {
                    sql.append_syntax(" NOT");
                }
                sql.append_syntax(" BETWEEN ");
                low.to_sql(sql);
                sql.append_syntax(" AND ");
                high.to_sql(sql);
                sql.append_syntax(")");
            }
            Expression::UnaryOperation {
                expression,
                operator,
            } => {
                expression.to_sql(sql);
                operator.to_sql(sql);
            }
            Expression::InSelect { expression, select } => {
                expression.to_sql(sql);
                sql.append_syntax(" IN (");
                select.to_sql(sql);
                sql.append_syntax(")");
            }
            Expression::FunctionCall { function, args } => {
                function.to_sql(sql);
                sql.append_syntax("(");
                for (index, arg) in args.iter().enumerate() {
                    arg.to_sql(sql);
                    if index < (args.len() - 1) {
                        sql.append_syntax(", ");
                    }
                }
                sql.append_syntax(")");
            }
            Expression::JsonBuildObject(map) => {
                sql.append_syntax("jsonb_build_object");
                sql.append_syntax("(");

                for (index, (label, item)) in map.iter().enumerate() {
                    sql.append_syntax("'");
                    sql.append_syntax(label);
                    sql.append_syntax("'");
                    sql.append_syntax(", ");
                    item.to_sql(sql);

                    if index < (map.len() - 1) {
                        sql.append_syntax(", ");
                    }
                }

                sql.append_syntax(")");
            }
            Expression::Cast {
                expression,
                r#type,
            } => {
                sql.append_syntax("CAST(");
                expression.to_sql(sql);
                sql.append_syntax(" AS ");
                r#type.to_sql(sql);
                sql.append_syntax(")");
            }
            Expression::Count(count_type) => {
                sql.append_syntax("COUNT");
                sql.append_syntax("(");
                count_type.to_sql(sql);
                sql.append_syntax(")");
            }
        }
    }

    /// Operands of OR: a conjunction gets its own parentheses.
    fn to_sql_grouped(&self, sql: &mut SQL) {
        if let Expression::And { .. } = self {
            sql.append_syntax("(");
            self.to_sql(sql);
            sql.append_syntax(")");
        } else {
            self.to_sql(sql);
        }
    }
}

impl UnaryOperator {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            UnaryOperator::IsNull => sql.append_syntax(" IS NULL"),
            UnaryOperator::IsNotNull => sql.append_syntax(" IS NOT NULL"),
        }
    }
}

impl BinaryOperator {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            BinaryOperator::Equals => sql.append_syntax(" = "),
            BinaryOperator::NotEquals => sql.append_syntax(" <> "),
            BinaryOperator::GreaterThan => sql.append_syntax(" > "),
            BinaryOperator::GreaterThanOrEqualTo => sql.append_syntax(" >= "),
            BinaryOperator::LessThan => sql.append_syntax(" < "),
            BinaryOperator::LessThanOrEqualTo => sql.append_syntax(" <= "),
            BinaryOperator::Like => sql.append_syntax(" LIKE "),
            BinaryOperator::NotLike => sql.append_syntax(" NOT LIKE "),
        }
    }
}

impl BinaryArrayOperator {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            BinaryArrayOperator::In => sql.append_syntax(" IN "),
            BinaryArrayOperator::NotIn => sql.append_syntax(" NOT IN "),
        }
    }
}

impl Function {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            Function::Lower => sql.append_syntax("lower"),
            Function::Unaccent => sql.append_syntax("unaccent"),
            Function::Avg => sql.append_syntax("AVG"),
            Function::Sum => sql.append_syntax("SUM"),
            Function::Min => sql.append_syntax("MIN"),
            Function::Max => sql.append_syntax("MAX"),
            Function::JsonbPathExists => sql.append_syntax("jsonb_path_exists"),
            Function::JsonbExtractPathText => sql.append_syntax("jsonb_extract_path_text"),
        }
    }
}

impl CountType {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            CountType::Star => sql.append_syntax("*"),
            CountType::Simple(column) => column.to_sql(sql),
            CountType::Distinct(column) => {
                sql.append_syntax("DISTINCT ");
                column.to_sql(sql);
            }
        }
    }
}

impl Value {
    pub fn to_sql(&self, sql: &mut SQL) {
        match &self {
            Value::Bool(true) => sql.append_syntax("true"),
            Value::Bool(false) => sql.append_syntax("false"),
            Value::Parameter { name, param } => sql.append_param(name, param.clone()),
        }
    }
}

impl ScalarTypeName {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_syntax(&self.0);
    }
}

impl Limit {
    pub fn to_sql(&self, sql: &mut SQL) {
        if let Some(limit) = self.limit {
            sql.append_syntax(" LIMIT ");
            sql.append_syntax(limit.to_string().as_str());
        }
        if let Some(offset) = self.offset {
            sql.append_syntax(" OFFSET ");
            sql.append_syntax(offset.to_string().as_str());
        }
    }
}

// names
impl TableReference {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            TableReference::DBTable { schema, table } => {
                if let Some(schema) = schema {
                    schema.to_sql(sql);
                    sql.append_syntax(".");
                }
                table.to_sql(sql);
            }
            TableReference::AliasedTable(alias) => alias.to_sql(sql),
        };
    }
}

impl SchemaName {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_identifier(&self.0);
    }
}

impl TableName {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_identifier(&self.0);
    }
}

impl TableAlias {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_identifier(&self.name);
    }
}

impl ColumnReference {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            ColumnReference::TableColumn { table, name } => {
                table.to_sql(sql);
                sql.append_syntax(".");
                name.to_sql(sql);
            }
        };
    }
}

impl ColumnName {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_identifier(&self.0);
    }
}

impl ColumnAlias {
    pub fn to_sql(&self, sql: &mut SQL) {
        sql.append_identifier(&self.name);
    }
}

impl OrderBy {
    pub fn to_sql(&self, sql: &mut SQL) {
        if !self.elements.is_empty() {
            sql.append_syntax(" ORDER BY ");
            for (index, order_by_item) in self.elements.iter().enumerate() {
                order_by_item.to_sql(sql);
                if index < (self.elements.len() - 1) {
                    sql.append_syntax(", ");
                }
            }
        }
    }
}

impl OrderByElement {
    pub fn to_sql(&self, sql: &mut SQL) {
        self.target.to_sql(sql);
        self.direction.to_sql(sql);
    }
}

impl OrderByDirection {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            OrderByDirection::Asc => sql.append_syntax(" ASC"),
            OrderByDirection::Desc => sql.append_syntax(" DESC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(table: &str, name: &str) -> Expression {
        Expression::ColumnReference(ColumnReference::TableColumn {
            table: TableReference::AliasedTable(helpers::make_table_alias(table.to_string())),
            name: ColumnName(name.to_string()),
        })
    }

    fn param(name: &str, value: serde_json::Value) -> Expression {
        Expression::Value(Value::Parameter {
            name: name.to_string(),
            param: Param::Value(value),
        })
    }

    fn equals(left: Expression, right: Expression) -> Expression {
        Expression::BinaryOperation {
            left: Box::new(left),
            operator: BinaryOperator::Equals,
            right: Box::new(right),
        }
    }

    fn to_string(expression: &Expression) -> SQL {
        let mut sql = SQL::new();
        expression.to_sql(&mut sql);
        sql
    }

    #[test]
    fn conjunctions_are_flat_and_disjunctions_grouped() {
        let expression = helpers::and_all(vec![
            equals(column("self", "id"), param("p0", serde_json::json!(1))),
            helpers::or_all(vec![
                equals(column("self", "a"), param("p1", serde_json::json!("x"))),
                helpers::and_all(vec![
                    equals(column("self", "b"), param("p2", serde_json::json!("y"))),
                    equals(column("self", "c"), param("p3", serde_json::json!("z"))),
                ]),
            ]),
        ]);

        insta::assert_snapshot!(to_string(&expression).sql, @r###""self"."id" = :p0 AND ("self"."a" = :p1 OR ("self"."b" = :p2 AND "self"."c" = :p3))"###);
    }

    #[test]
    fn negations_wrap_their_operand() {
        let expression = Expression::Not(Box::new(equals(
            column("self", "id"),
            param("p0", serde_json::json!(1)),
        )));
        assert_eq!(to_string(&expression).sql, "NOT (\"self\".\"id\" = :p0)");
    }

    #[test]
    fn selects_render_every_clause() {
        let mut select = helpers::simple_select(vec![(
            helpers::make_column_alias("id".to_string()),
            column("self", "id"),
        )]);
        select.distinct = true;
        select.from = Some(From::Table {
            reference: helpers::table_reference(Some("crm"), "contact"),
            alias: helpers::make_table_alias("self".to_string()),
        });
        select.joins = vec![Join::LeftOuterJoin(LeftOuterJoin {
            source: JoinSource::Table(helpers::table_reference(None, "address")),
            alias: helpers::make_table_alias("self_address".to_string()),
            on: equals(column("self", "address_id"), column("self_address", "id")),
        })];
        select.where_ = Where(Expression::UnaryOperation {
            expression: Box::new(column("self_address", "city")),
            operator: UnaryOperator::IsNotNull,
        });
        select.order_by = OrderBy {
            elements: vec![OrderByElement {
                target: column("self", "id"),
                direction: OrderByDirection::Desc,
            }],
        };
        select.limit = Limit {
            limit: Some(11),
            offset: Some(5),
        };

        let mut sql = SQL::new();
        select.to_sql(&mut sql);
        insta::assert_snapshot!(sql.sql, @r###"SELECT DISTINCT "self"."id" AS "id" FROM "crm"."contact" AS "self" LEFT OUTER JOIN "address" AS "self_address" ON "self"."address_id" = "self_address"."id" WHERE "self_address"."city" IS NOT NULL ORDER BY "self"."id" DESC LIMIT 11 OFFSET 5"###);
        assert!(sql.params.is_empty());
    }

    #[test]
    fn sub_queries_are_parenthesized() {
        let mut select = helpers::simple_select(vec![(
            helpers::make_column_alias("id".to_string()),
            column("self", "id"),
        )]);
        select.from = Some(From::Table {
            reference: helpers::table_reference(Some("crm"), "contact"),
            alias: helpers::make_table_alias("self".to_string()),
        });
        select.where_ = Where(equals(column("self", "age"), param("p0", serde_json::json!(30))));
        let expression = Expression::InSelect {
            expression: Box::new(column("self", "id")),
            select: Box::new(select),
        };

        let sql = to_string(&expression);
        insta::assert_snapshot!(sql.sql, @r###""self"."id" IN (SELECT "self"."id" AS "id" FROM "crm"."contact" AS "self" WHERE "self"."age" = :p0)"###);
        assert_eq!(sql.params.len(), 1);
    }

    #[test]
    fn link_tables_nest_inside_the_outer_join() {
        let join = Join::LeftOuterJoin(LeftOuterJoin {
            source: JoinSource::Through {
                link: helpers::table_reference(None, "contact_tag"),
                link_alias: helpers::make_table_alias("self_tags_link".to_string()),
                link_on: equals(column("self_tags_link", "tag_id"), column("self_tags", "id")),
                table: helpers::table_reference(None, "tag"),
            },
            alias: helpers::make_table_alias("self_tags".to_string()),
            on: equals(column("self_tags_link", "contact_id"), column("self", "id")),
        });

        let mut sql = SQL::new();
        join.to_sql(&mut sql);
        insta::assert_snapshot!(sql.sql, @r###" LEFT OUTER JOIN ("contact_tag" AS "self_tags_link" INNER JOIN "tag" AS "self_tags" ON "self_tags_link"."tag_id" = "self_tags"."id") ON "self_tags_link"."contact_id" = "self"."id""###);
    }
}
