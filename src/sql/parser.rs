use super::lexer::{column_ref, span_text, split_top_level, tokenize, Keyword, Spanned, Token};
use super::{aggregate_alias, AggregateFunction, SortDirection, SqlError};
use log::debug;

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*` or `t.*`
    Wildcard,
    Column {
        name: String,
        alias: Option<String>,
    },
    Aggregate {
        function: AggregateFunction,
        /// `None` for `COUNT(*)`
        argument: Option<String>,
        alias: Option<String>,
    },
    /// Anything else; kept as source text and not evaluated.
    Expression { text: String, alias: Option<String> },
}

impl SelectItem {
    /// Name the item takes in the output rows. `None` for `*`.
    pub fn output_name(&self) -> Option<String> {
        match self {
            SelectItem::Wildcard => None,
            SelectItem::Column { name, alias } => Some(alias.clone().unwrap_or_else(|| name.clone())),
            SelectItem::Aggregate {
                function,
                argument,
                alias,
            } => Some(
                alias
                    .clone()
                    .unwrap_or_else(|| aggregate_alias(*function, argument.as_deref())),
            ),
            SelectItem::Expression { text, alias } => {
                Some(alias.clone().unwrap_or_else(|| text.clone()))
            }
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectItem::Aggregate { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    /// Output alias or source column
    Column(String),
    /// 1-based position in the SELECT list
    Position(usize),
    Aggregate {
        function: AggregateFunction,
        argument: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub target: OrderTarget,
    pub direction: SortDirection,
}

/// Clauses of a SELECT statement, read from SQL text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedSqlComponents {
    pub select: Vec<SelectItem>,
    pub distinct: bool,
    pub table: String,
    /// Raw predicate text between WHERE and the next clause
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderSpec>,
    pub limit: Option<usize>,
}

impl ParsedSqlComponents {
    pub fn has_aggregates(&self) -> bool {
        self.select.iter().any(SelectItem::is_aggregate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Clause {
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
}

/// Reads the clauses of a single SELECT statement.
///
/// Keywords are only recognized outside parentheses and quotes, so a literal
/// such as `'Group by region'` or a nested `(a OR b)` never splits a clause.
pub fn parse_components(sql: &str) -> Result<ParsedSqlComponents, SqlError> {
    let mut tokens = tokenize(sql)?;
    while matches!(tokens.last(), Some(t) if t.token == Token::Semicolon) {
        tokens.pop();
    }

    let select_at = find_top_level(&tokens, 0, |t| *t == Token::Keyword(Keyword::Select))
        .ok_or(SqlError::MissingSelect)?;
    let from_at = find_top_level(&tokens, select_at + 1, |t| {
        *t == Token::Keyword(Keyword::From)
    })
    .ok_or(SqlError::MissingFrom)?;

    let mut select_tokens = &tokens[select_at + 1..from_at];
    let distinct = matches!(
        select_tokens.first(),
        Some(t) if t.token == Token::Keyword(Keyword::Distinct)
    );
    if distinct {
        select_tokens = &select_tokens[1..];
    }
    if select_tokens.is_empty() {
        return Err(SqlError::MissingSelect);
    }
    let select = split_top_level(select_tokens, &Token::Comma)
        .into_iter()
        .filter(|item| !item.is_empty())
        .map(|item| parse_select_item(sql, item))
        .collect();

    let (table_tokens, clauses) = split_clauses(&tokens[from_at + 1..]);
    let table = span_text(sql, table_tokens).to_string();
    if table.is_empty() {
        return Err(SqlError::MissingFrom);
    }

    let mut components = ParsedSqlComponents {
        select,
        distinct,
        table,
        ..Default::default()
    };

    for (clause, body) in clauses {
        match clause {
            Clause::Where => {
                let text = span_text(sql, body);
                if !text.is_empty() {
                    components.where_clause = Some(text.to_string());
                }
            }
            Clause::GroupBy => {
                components.group_by = split_top_level(body, &Token::Comma)
                    .into_iter()
                    .filter(|part| !part.is_empty())
                    .filter_map(|part| {
                        let column = column_ref(part);
                        if column.is_none() {
                            debug!("GROUP BY key ignored: {}", span_text(sql, part));
                        }
                        column
                    })
                    .collect();
            }
            Clause::Having => {
                debug!("HAVING is not evaluated: {}", span_text(sql, body));
            }
            Clause::OrderBy => {
                components.order_by = split_top_level(body, &Token::Comma)
                    .into_iter()
                    .filter(|part| !part.is_empty())
                    .map(|part| parse_order_key(sql, part))
                    .collect();
            }
            Clause::Limit => {
                components.limit = Some(parse_limit(sql, body)?);
            }
        }
    }

    Ok(components)
}

fn find_top_level(tokens: &[Spanned], from: usize, pred: impl Fn(&Token) -> bool) -> Option<usize> {
    let mut depth = 0i32;
    for (i, spanned) in tokens.iter().enumerate().skip(from) {
        match spanned.token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            ref t if depth == 0 && pred(t) => return Some(i),
            _ => {}
        }
    }
    None
}

/// Splits the tokens after FROM into the table reference and the clause bodies.
fn split_clauses(tokens: &[Spanned]) -> (&[Spanned], Vec<(Clause, &[Spanned])>) {
    let mut boundaries: Vec<(Clause, usize, usize)> = Vec::new();
    let mut depth = 0i32;
    let mut i = 0;
    while i < tokens.len() {
        let next_is_by = matches!(
            tokens.get(i + 1),
            Some(t) if t.token == Token::Keyword(Keyword::By)
        );
        match tokens[i].token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            Token::Keyword(k) if depth == 0 => {
                let found = match k {
                    Keyword::Where => Some((Clause::Where, 1)),
                    Keyword::Group if next_is_by => Some((Clause::GroupBy, 2)),
                    Keyword::Order if next_is_by => Some((Clause::OrderBy, 2)),
                    Keyword::Having => Some((Clause::Having, 1)),
                    Keyword::Limit => Some((Clause::Limit, 1)),
                    _ => None,
                };
                if let Some((clause, width)) = found {
                    boundaries.push((clause, i, i + width));
                    i += width;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    let head_end = boundaries.first().map(|b| b.1).unwrap_or(tokens.len());
    let clauses = boundaries
        .iter()
        .enumerate()
        .map(|(n, &(clause, _, body_start))| {
            let body_end = boundaries.get(n + 1).map(|b| b.1).unwrap_or(tokens.len());
            (clause, &tokens[body_start..body_end])
        })
        .collect();
    (&tokens[..head_end], clauses)
}

/// Splits a trailing `AS alias` or bare alias off a SELECT item.
fn split_alias(tokens: &[Spanned]) -> (&[Spanned], Option<String>) {
    let n = tokens.len();
    if n >= 3 && tokens[n - 2].token == Token::Keyword(Keyword::As) {
        if let Token::Ident(alias) | Token::QuotedIdent(alias) = &tokens[n - 1].token {
            return (&tokens[..n - 2], Some(alias.clone()));
        }
    }
    if n >= 2 {
        let implicit = matches!(
            tokens[n - 2].token,
            Token::Ident(_) | Token::QuotedIdent(_) | Token::RParen
        );
        if let (true, Token::Ident(alias) | Token::QuotedIdent(alias)) = (implicit, &tokens[n - 1].token) {
            return (&tokens[..n - 1], Some(alias.clone()));
        }
    }
    (tokens, None)
}

/// Matches `FUNC(*)`, `FUNC(col)` or `FUNC(DISTINCT col)` spanning all of `tokens`.
fn parse_aggregate(tokens: &[Spanned]) -> Option<(AggregateFunction, Option<String>)> {
    let (first, rest) = tokens.split_first()?;
    let function = match &first.token {
        Token::Ident(name) => AggregateFunction::from_name(name)?,
        _ => return None,
    };
    let inner = match rest {
        [open, inner @ .., close] if open.token == Token::LParen && close.token == Token::RParen => {
            inner
        }
        _ => return None,
    };
    let inner = match inner.split_first() {
        Some((d, rest)) if d.token == Token::Keyword(Keyword::Distinct) => rest,
        _ => inner,
    };
    match inner {
        [] => Some((function, None)),
        [star] if star.token == Token::Star => Some((function, None)),
        _ => column_ref(inner).map(|column| (function, Some(column))),
    }
}

fn parse_select_item(sql: &str, tokens: &[Spanned]) -> SelectItem {
    let is_wildcard = match tokens {
        [star] => star.token == Token::Star,
        [_, dot, star] => dot.token == Token::Dot && star.token == Token::Star,
        _ => false,
    };
    if is_wildcard {
        return SelectItem::Wildcard;
    }

    let (expr, alias) = split_alias(tokens);
    if let Some((function, argument)) = parse_aggregate(expr) {
        return SelectItem::Aggregate {
            function,
            argument,
            alias,
        };
    }
    if let Some(name) = column_ref(expr) {
        return SelectItem::Column { name, alias };
    }
    SelectItem::Expression {
        text: span_text(sql, expr).to_string(),
        alias,
    }
}

fn parse_order_key(sql: &str, tokens: &[Spanned]) -> OrderSpec {
    let (expr, direction) = match tokens.split_last() {
        Some((last, rest)) if last.token == Token::Keyword(Keyword::Desc) => {
            (rest, SortDirection::Desc)
        }
        Some((last, rest)) if last.token == Token::Keyword(Keyword::Asc) => (rest, SortDirection::Asc),
        _ => (tokens, SortDirection::default()),
    };

    let target = match expr {
        [only] => match &only.token {
            Token::Number(n) if *n >= 1.0 && n.fract() == 0.0 => OrderTarget::Position(*n as usize),
            _ => column_ref(expr)
                .map(OrderTarget::Column)
                .unwrap_or_else(|| OrderTarget::Column(span_text(sql, expr).to_string())),
        },
        _ => match parse_aggregate(expr) {
            Some((function, argument)) => OrderTarget::Aggregate { function, argument },
            None => OrderTarget::Column(
                column_ref(expr).unwrap_or_else(|| span_text(sql, expr).to_string()),
            ),
        },
    };
    OrderSpec { target, direction }
}

fn parse_limit(sql: &str, body: &[Spanned]) -> Result<usize, SqlError> {
    match body.first().map(|t| &t.token) {
        Some(Token::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => {
            if body.len() > 1 {
                debug!("ignoring trailing LIMIT text: {}", span_text(sql, &body[1..]));
            }
            Ok(*n as usize)
        }
        _ => Err(SqlError::InvalidLimit(span_text(sql, body).to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grouped_query() {
        let c = parse_components(
            "SELECT REGION, SUM(SALES) AS sum_sales FROM T GROUP BY REGION ORDER BY sum_sales DESC LIMIT 10",
        )
        .unwrap();
        assert_eq!(
            c.select,
            vec![
                SelectItem::Column {
                    name: "REGION".to_string(),
                    alias: None
                },
                SelectItem::Aggregate {
                    function: AggregateFunction::Sum,
                    argument: Some("SALES".to_string()),
                    alias: Some("sum_sales".to_string()),
                },
            ]
        );
        assert_eq!(c.table, "T");
        assert_eq!(c.where_clause, None);
        assert_eq!(c.group_by, vec!["REGION".to_string()]);
        assert_eq!(
            c.order_by,
            vec![OrderSpec {
                target: OrderTarget::Column("sum_sales".to_string()),
                direction: SortDirection::Desc,
            }]
        );
        assert_eq!(c.limit, Some(10));
    }

    #[test]
    fn test_missing_select_or_from() {
        assert_eq!(
            parse_components("UPDATE t SET a = 1").unwrap_err(),
            SqlError::MissingSelect
        );
        assert_eq!(
            parse_components("SELECT 1").unwrap_err(),
            SqlError::MissingFrom
        );
        assert_eq!(parse_components("SELECT FROM t").unwrap_err(), SqlError::MissingSelect);
    }

    #[test]
    fn test_where_text_stops_at_next_clause() {
        let c = parse_components(
            "select * from t where CATEGORY = 'Group by me' and SALES > 5 order by SALES",
        )
        .unwrap();
        assert_eq!(
            c.where_clause.as_deref(),
            Some("CATEGORY = 'Group by me' and SALES > 5")
        );
        assert_eq!(c.select, vec![SelectItem::Wildcard]);
        assert_eq!(c.order_by[0].direction, SortDirection::Asc);
        assert!(c.group_by.is_empty());
    }

    #[test]
    fn test_aliases_and_qualified_names() {
        let c = parse_components(
            "SELECT DISTINCT s.\"Customer Name\" customer, COUNT(*), AVG(s.discount) avg_d, SALES * 2 AS doubled FROM sales s;",
        )
        .unwrap();
        assert!(c.distinct);
        assert_eq!(c.table, "sales s");
        let names: Vec<String> = c.select.iter().filter_map(SelectItem::output_name).collect();
        assert_eq!(names, vec!["customer", "total_count", "avg_d", "doubled"]);
        assert!(matches!(
            &c.select[3],
            SelectItem::Expression { text, .. } if text == "SALES * 2"
        ));
    }

    #[test]
    fn test_order_keys() {
        let c = parse_components(
            "SELECT REGION, SEGMENT, SUM(SALES) FROM t GROUP BY REGION, SEGMENT ORDER BY 1, SUM(SALES) DESC, SEGMENT ASC",
        )
        .unwrap();
        assert_eq!(c.group_by, vec!["REGION".to_string(), "SEGMENT".to_string()]);
        assert_eq!(c.order_by[0].target, OrderTarget::Position(1));
        assert_eq!(
            c.order_by[1],
            OrderSpec {
                target: OrderTarget::Aggregate {
                    function: AggregateFunction::Sum,
                    argument: Some("SALES".to_string())
                },
                direction: SortDirection::Desc,
            }
        );
        assert_eq!(c.order_by[2].target, OrderTarget::Column("SEGMENT".to_string()));
    }

    #[test]
    fn test_limit_validation() {
        assert_eq!(
            parse_components("SELECT * FROM t LIMIT ten").unwrap_err(),
            SqlError::InvalidLimit("ten".to_string())
        );
        assert_eq!(parse_components("SELECT * FROM t LIMIT 0").unwrap().limit, Some(0));
    }

    #[test]
    fn test_dialect_fragments_degrade() {
        let c = parse_components(
            "-- customer's revenue\nSELECT REGION, REGION || '-x' AS tag FROM t WHERE SALES::FLOAT > 0 GROUP BY REGION, REGION::text",
        )
        .unwrap();
        assert!(matches!(
            &c.select[1],
            SelectItem::Expression { text, alias } if text == "REGION || '-x'" && alias.as_deref() == Some("tag")
        ));
        assert_eq!(c.where_clause.as_deref(), Some("SALES::FLOAT > 0"));
        assert_eq!(c.group_by, vec!["REGION".to_string()]);
    }

    #[test]
    fn test_nested_parens_do_not_split_clauses() {
        let c = parse_components(
            "SELECT a FROM t WHERE (EXTRACT(YEAR FROM d) = 2015) AND b = 'x' LIMIT 5",
        )
        .unwrap();
        assert_eq!(
            c.where_clause.as_deref(),
            Some("(EXTRACT(YEAR FROM d) = 2015) AND b = 'x'")
        );
        assert_eq!(c.limit, Some(5));
    }
}
