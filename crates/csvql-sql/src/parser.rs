//! Query validator and metadata extractor
//!
//! Walks the token stream by fixed positional expectation and extracts a
//! [`QueryMetadata`] at the same time:
//!
//! ```text
//! SELECT (* | 'a.col' [, 'a.col']...)
//! FROM path:<file.csv>
//! AS <alias>
//! [WHERE 'a.col'[::int|::float|::string] <op> 'value' [(AND|OR) ...]]
//! [OFFSET <n>] [LIMIT <n>] [ORDER BY 'a.col' [, 'a.col']... [ASC|DESC]]
//! ```
//!
//! Errors in independent clauses are all collected. Running out of tokens
//! where the grammar still needs one stops the walk.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::GrammarError;
use crate::tokenizer::{tokenize, Token};
use crate::types::*;

/// Tokenize and validate a query.
pub fn parse_query(sql: &str) -> std::result::Result<QueryMetadata, Vec<GrammarError>> {
    validate(&tokenize(sql))
}

/// Validate a token stream and extract its metadata.
///
/// Returns every grammar error found; the error list is never empty on `Err`.
pub fn validate(tokens: &[Token<'_>]) -> std::result::Result<QueryMetadata, Vec<GrammarError>> {
    let mut validator = Validator {
        tokens,
        pos: 0,
        errors: Vec::new(),
    };

    let walked = validator.walk();
    match walked {
        Ok(metadata) if validator.errors.is_empty() => {
            debug!(
                alias = %metadata.alias,
                columns = metadata.selected_columns.len(),
                conditions = metadata.conditions.len(),
                "query validated"
            );
            Ok(metadata)
        }
        _ => Err(validator.errors),
    }
}

/// Structural failure: there is nothing left to inspect safely.
struct Halt;

type Walk<T> = std::result::Result<T, Halt>;

struct Validator<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
    errors: Vec<GrammarError>,
}

impl<'t, 'a> Validator<'t, 'a> {
    fn walk(&mut self) -> Walk<QueryMetadata> {
        self.keyword("SELECT", GrammarError::InvalidSelect)?;
        let selected_columns = self.selectable_columns()?;
        self.keyword("FROM", GrammarError::InvalidFrom)?;
        let file_path = self.path()?;
        self.keyword("AS", GrammarError::InvalidAs)?;
        let alias = self.alias()?;

        if let Some(alias) = &alias {
            self.check_selected_aliases(alias, &selected_columns);
        }

        let conditions = if self.peek().is_some_and(|t| t.eq_ignore_ascii_case("where")) {
            self.pos += 1;
            self.conditions(alias.as_deref())?
        } else {
            Vec::new()
        };

        let constraints = self.constraints(alias.as_deref())?;

        Ok(QueryMetadata {
            selected_columns,
            file_path,
            alias: alias.unwrap_or_default(),
            conditions,
            constraints,
        })
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn next_or_end(&mut self, expected: &str) -> Walk<Token<'a>> {
        match self.next() {
            Some(token) => Ok(token),
            None => {
                self.errors
                    .push(GrammarError::UnexpectedEnd(format!("expected {expected}")));
                Err(Halt)
            }
        }
    }

    /// Consume the next token as `keyword`. A wrong token is reported and
    /// consumed in its place, so a misspelled keyword does not shift the
    /// rest of the query.
    fn keyword(&mut self, keyword: &str, err: fn(String) -> GrammarError) -> Walk<()> {
        let token = self.next_or_end(keyword)?;
        if !token.eq_ignore_ascii_case(keyword) {
            self.errors.push(err(token.to_string()));
        }
        Ok(())
    }

    fn skip_to_constraint(&mut self) {
        while let Some(token) = self.peek() {
            if is_constraint_keyword(token) {
                break;
            }
            self.pos += 1;
        }
    }

    // ------------------------------------------------------------------
    // SELECT list
    // ------------------------------------------------------------------

    fn selectable_columns(&mut self) -> Walk<Vec<SelectableColumn>> {
        if self.peek().is_some_and(|t| t.eq_ignore_ascii_case("from")) {
            self.errors.push(GrammarError::InvalidSelectableColumn(
                "expected at least one column or *".to_string(),
            ));
            return Ok(Vec::new());
        }

        let first = self.next_or_end("selectable column")?;
        if first == "*" {
            if self.peek() == Some(",") {
                self.errors.push(GrammarError::InvalidSelectableColumn(
                    "* must be the only selected column".to_string(),
                ));
                while self.peek().is_some_and(|t| !t.eq_ignore_ascii_case("from")) {
                    self.pos += 1;
                }
            }
            return Ok(vec![SelectableColumn::All]);
        }

        let mut columns = Vec::new();
        let mut token = first;
        loop {
            if token == "*" {
                self.errors.push(GrammarError::InvalidSelectableColumn(
                    "* must be the only selected column".to_string(),
                ));
            } else {
                match parse_column_ref(token) {
                    Ok((alias, column)) => columns.push(SelectableColumn::Column {
                        original: format!("{alias}.{column}"),
                        alias,
                        column,
                    }),
                    Err(reason) => self
                        .errors
                        .push(GrammarError::InvalidSelectableColumn(format!("{reason}, got {token}"))),
                }
            }

            if self.peek() != Some(",") {
                break;
            }
            self.pos += 1;
            token = self.next_or_end("selectable column after ','")?;
        }

        let mut seen: Vec<&str> = Vec::with_capacity(columns.len());
        let mut reported: Vec<&str> = Vec::new();
        for column in columns.iter().filter_map(SelectableColumn::column) {
            if seen.contains(&column) {
                if !reported.contains(&column) {
                    self.errors
                        .push(GrammarError::DuplicateColumn(column.to_string()));
                    reported.push(column);
                }
            } else {
                seen.push(column);
            }
        }

        Ok(columns)
    }

    fn check_selected_aliases(&mut self, alias: &str, columns: &[SelectableColumn]) {
        for column in columns {
            if let SelectableColumn::Column {
                alias: found,
                original,
                ..
            } = column
            {
                if found != alias {
                    self.errors.push(GrammarError::AliasMismatch {
                        expected: alias.to_string(),
                        found: found.clone(),
                        reference: original.clone(),
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // FROM path:<file> AS alias
    // ------------------------------------------------------------------

    fn path(&mut self) -> Walk<PathBuf> {
        let token = self.next_or_end("path:<file>")?;

        let raw = match token.split_once(':') {
            Some((prefix, rest)) if prefix == "path" && !rest.is_empty() => rest,
            _ => {
                self.errors.push(GrammarError::InvalidPath(format!(
                    "expected 'path:<file>', got {token}"
                )));
                return Ok(PathBuf::new());
            }
        };

        let raw = strip_quotes(raw).unwrap_or(raw);
        let path = PathBuf::from(raw);

        if let Err(reason) = check_csv_path(&path) {
            self.errors.push(GrammarError::InvalidPath(reason));
        }

        Ok(path)
    }

    fn alias(&mut self) -> Walk<Option<String>> {
        let token = match self.peek() {
            Some(token) => token,
            None => {
                self.errors
                    .push(GrammarError::UnexpectedEnd("expected alias".to_string()));
                return Err(Halt);
            }
        };

        if is_reserved(token) {
            self.errors.push(GrammarError::InvalidAlias(token.to_string()));
            return Ok(None);
        }

        self.pos += 1;
        if token.contains(['\'', '.', ',']) {
            self.errors.push(GrammarError::InvalidAlias(token.to_string()));
            return Ok(None);
        }

        Ok(Some(token.to_string()))
    }

    // ------------------------------------------------------------------
    // WHERE
    // ------------------------------------------------------------------

    fn conditions(&mut self, alias: Option<&str>) -> Walk<Vec<ConditionDescriptor>> {
        let mut conditions = Vec::new();
        let mut after: Option<LogicalOperator> = None;

        loop {
            match self.peek() {
                None if after.is_none() => {
                    self.errors.push(GrammarError::InvalidWhere(
                        "WHERE requires at least one condition".to_string(),
                    ));
                    return Ok(conditions);
                }
                None => {
                    self.errors.push(GrammarError::UnexpectedEnd(
                        "expected a condition after logical operator".to_string(),
                    ));
                    return Err(Halt);
                }
                Some(token) if is_constraint_keyword(token) => {
                    let message = match after {
                        None => format!("WHERE requires at least one condition, got {token}"),
                        Some(op) => format!("expected a condition after {op}, got {token}"),
                    };
                    self.errors.push(GrammarError::InvalidWhere(message));
                    return Ok(conditions);
                }
                Some(_) => {}
            }

            let column_token = self.next_or_end("condition column")?;
            let operator_token = self.next_or_end("comparison operator")?;
            let value_token = self.next_or_end("condition value")?;

            let parsed = self.condition(alias, column_token, operator_token, value_token);

            let logical_operator = match self.peek() {
                None => None,
                Some(token) if is_constraint_keyword(token) => None,
                Some(token) => match LogicalOperator::parse(token) {
                    Some(op) => {
                        self.pos += 1;
                        Some(op)
                    }
                    None => {
                        self.errors
                            .push(GrammarError::InvalidLogicalOperator(token.to_string()));
                        self.skip_to_constraint();
                        None
                    }
                },
            };

            if let Some(mut condition) = parsed {
                condition.logical_operator = logical_operator;
                conditions.push(condition);
            }

            match logical_operator {
                Some(op) => after = Some(op),
                None => return Ok(conditions),
            }
        }
    }

    /// Validate the three tokens of one condition; `None` if any was invalid.
    fn condition(
        &mut self,
        alias: Option<&str>,
        column_token: &str,
        operator_token: &str,
        value_token: &str,
    ) -> Option<ConditionDescriptor> {
        let (column_part, type_part) = split_data_type(column_token);

        let column = match parse_column_ref(column_part) {
            Ok((found, column)) => match alias {
                Some(alias) if found != alias => {
                    self.errors.push(GrammarError::AliasMismatch {
                        expected: alias.to_string(),
                        found: found.clone(),
                        reference: format!("{found}.{column}"),
                    });
                    None
                }
                _ => Some(column),
            },
            Err(reason) => {
                self.errors.push(GrammarError::InvalidConditionColumn(format!(
                    "{reason}, got {column_token}"
                )));
                None
            }
        };

        let data_type = match type_part {
            None => Ok(None),
            Some(name) => name.parse::<DataType>().map(Some).map_err(|_| {
                self.errors.push(GrammarError::InvalidDataType(format!(
                    "expected one of {}, got '{name}'",
                    DataType::NAMES.join(", ")
                )));
            }),
        };

        let operator = operator_token.parse::<ComparisonOperator>().map_err(|_| {
            self.errors.push(GrammarError::InvalidComparisonOperator(
                operator_token.to_string(),
            ));
        });

        let value = match strip_quotes(value_token) {
            Some(value) => Some(value),
            None => {
                self.errors
                    .push(GrammarError::InvalidValueQuoting(value_token.to_string()));
                None
            }
        };

        if let (Ok(Some(data_type)), Some(value)) = (&data_type, value) {
            let parses = match data_type {
                DataType::Int => parse_int(value).is_some(),
                DataType::Float => parse_float(value).is_some(),
                DataType::String => true,
            };
            if !parses {
                self.errors.push(GrammarError::InvalidDataType(format!(
                    "expected a valid {data_type}, got '{value}'"
                )));
                return None;
            }
        }

        Some(ConditionDescriptor {
            alias: alias?.to_string(),
            column: column?,
            data_type: data_type.ok()?,
            operator: operator.ok()?,
            value: value?.to_string(),
            logical_operator: None,
        })
    }

    // ------------------------------------------------------------------
    // OFFSET / LIMIT / ORDER BY
    // ------------------------------------------------------------------

    fn constraints(&mut self, alias: Option<&str>) -> Walk<Constraints> {
        let mut constraints = Constraints::default();

        while let Some(token) = self.next() {
            if token.eq_ignore_ascii_case("limit") {
                let value = self.constraint_value("LIMIT")?;
                if constraints.limit.is_some() {
                    self.errors.push(GrammarError::InvalidConstraint(
                        "LIMIT given more than once".to_string(),
                    ));
                }
                constraints.limit = value.or(constraints.limit);
            } else if token.eq_ignore_ascii_case("offset") {
                let value = self.constraint_value("OFFSET")?;
                if constraints.offset.is_some() {
                    self.errors.push(GrammarError::InvalidConstraint(
                        "OFFSET given more than once".to_string(),
                    ));
                }
                constraints.offset = value.or(constraints.offset);
            } else if token.eq_ignore_ascii_case("order") {
                let order_by = self.order_by(alias)?;
                if constraints.order_by.is_some() {
                    self.errors.push(GrammarError::InvalidOrderBy(
                        "ORDER BY given more than once".to_string(),
                    ));
                }
                constraints.order_by = order_by.or(constraints.order_by);
            } else {
                self.errors
                    .push(GrammarError::UnexpectedToken(token.to_string()));
            }
        }

        Ok(constraints)
    }

    fn constraint_value(&mut self, name: &str) -> Walk<Option<usize>> {
        let token = self.next_or_end(&format!("integer after {name}"))?;
        match token.parse::<usize>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                self.errors.push(GrammarError::InvalidConstraint(format!(
                    "expected {name} to be a non-negative integer, got '{token}'"
                )));
                Ok(None)
            }
        }
    }

    fn order_by(&mut self, alias: Option<&str>) -> Walk<Option<OrderBy>> {
        let Some(by) = self.peek() else {
            self.errors
                .push(GrammarError::UnexpectedEnd("expected BY after ORDER".to_string()));
            return Err(Halt);
        };
        if by.eq_ignore_ascii_case("by") {
            self.pos += 1;
        } else {
            self.errors.push(GrammarError::InvalidOrderBy(format!(
                "expected BY after ORDER, got {by}"
            )));
        }

        let mut columns = Vec::new();
        let mut valid = true;
        loop {
            let token = match self.peek() {
                Some(token) if !is_constraint_keyword(token) => {
                    self.pos += 1;
                    token
                }
                _ => {
                    self.errors.push(GrammarError::InvalidOrderBy(
                        "expected a column to order by".to_string(),
                    ));
                    valid = false;
                    break;
                }
            };

            match parse_column_ref(token) {
                Ok((found, column)) => match alias {
                    Some(alias) if found != alias => {
                        self.errors.push(GrammarError::AliasMismatch {
                            expected: alias.to_string(),
                            found: found.clone(),
                            reference: format!("{found}.{column}"),
                        });
                        valid = false;
                    }
                    _ => columns.push(ColumnRef {
                        alias: found,
                        column,
                    }),
                },
                Err(reason) => {
                    self.errors.push(GrammarError::InvalidOrderBy(format!(
                        "{reason}, got {token}"
                    )));
                    valid = false;
                }
            }

            if self.peek() != Some(",") {
                break;
            }
            self.pos += 1;
        }

        let mut direction = SortDirection::Asc;
        if let Some(token) = self.peek() {
            if token.eq_ignore_ascii_case("desc") {
                direction = SortDirection::Desc;
                self.pos += 1;
            } else if token.eq_ignore_ascii_case("asc") {
                self.pos += 1;
            }
        }

        Ok(valid.then_some(OrderBy { columns, direction }))
    }
}

// ----------------------------------------------------------------------
// Token helpers
// ----------------------------------------------------------------------

const RESERVED: [&str; 10] = [
    "select", "from", "as", "where", "and", "or", "limit", "offset", "order", "by",
];

fn is_reserved(token: &str) -> bool {
    RESERVED.iter().any(|kw| token.eq_ignore_ascii_case(kw))
}

fn is_constraint_keyword(token: &str) -> bool {
    ["limit", "offset", "order"]
        .iter()
        .any(|kw| token.eq_ignore_ascii_case(kw))
}

/// Inner text of a `'...'` token.
fn strip_quotes(token: &str) -> Option<&str> {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        Some(&token[1..token.len() - 1])
    } else {
        None
    }
}

/// `'alias.column'` into `(alias, column)`.
fn parse_column_ref(token: &str) -> std::result::Result<(String, String), &'static str> {
    let inner = strip_quotes(token).ok_or("columns must be enclosed in single quotes")?;
    match inner.split('.').collect::<Vec<_>>().as_slice() {
        [alias, column] if !alias.is_empty() && !column.is_empty() => {
            Ok((alias.to_string(), column.to_string()))
        }
        _ => Err("columns must be in the form 'alias.column'"),
    }
}

/// `'e.Year'::int` into `("'e.Year'", Some("int"))`.
fn split_data_type(token: &str) -> (&str, Option<&str>) {
    if strip_quotes(token).is_some() {
        return (token, None);
    }
    match token.rsplit_once("::") {
        Some((column, data_type)) => (column, Some(data_type)),
        None => (token, None),
    }
}

fn check_csv_path(path: &Path) -> std::result::Result<(), String> {
    let stat = std::fs::metadata(path)
        .map_err(|_| format!("file path {} does not exist", path.display()))?;

    if !stat.is_file() {
        return Err(format!("{} is not a file", path.display()));
    }

    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(format!(
            "file {} is not a csv file or it does not have a csv extension",
            path.display()
        ));
    }

    Ok(())
}

pub(crate) fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

pub(crate) fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}
