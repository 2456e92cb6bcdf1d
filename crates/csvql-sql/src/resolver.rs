//! Condition resolver
//!
//! Evaluates a [`ConditionChain`] against one row. AND-groups are evaluated
//! left to right and the first group whose predicates all hold decides the
//! row, so later groups are never looked at.

use std::cmp::Ordering;

use crate::columns::ConditionColumns;
use crate::condition::{ConditionChain, Predicate};
use crate::error::ResolveError;
use crate::parser::{parse_float, parse_int};
use crate::types::{ComparisonOperator, DataType};

/// Does `row` satisfy `chain`? An empty chain matches every row.
pub fn resolve(
    chain: &ConditionChain,
    lookup: &ConditionColumns,
    row: &[String],
) -> std::result::Result<bool, ResolveError> {
    if chain.is_empty() {
        return Ok(true);
    }

    for group in chain.groups() {
        let mut satisfied = true;
        for predicate in group {
            if !evaluate(predicate, lookup, row)? {
                satisfied = false;
                break;
            }
        }
        if satisfied {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Evaluate a single predicate.
pub fn evaluate(
    predicate: &Predicate,
    lookup: &ConditionColumns,
    row: &[String],
) -> std::result::Result<bool, ResolveError> {
    let position = lookup
        .position(&predicate.column)
        .ok_or_else(|| ResolveError::UnknownColumn(predicate.column.clone()))?;

    let field = row.get(position).ok_or_else(|| ResolveError::MissingField {
        column: predicate.column.clone(),
        position,
        row_len: row.len(),
    })?;

    compare(
        &predicate.column,
        field,
        predicate.operator,
        &predicate.value,
        predicate.data_type,
    )
}

/// Compare a row field with a literal under the declared type.
///
/// Without a type both sides compare as strings. A float comparison with NaN
/// on either side is false for every operator except `!=`.
pub fn compare(
    column: &str,
    field: &str,
    operator: ComparisonOperator,
    literal: &str,
    data_type: Option<DataType>,
) -> std::result::Result<bool, ResolveError> {
    let coercion = |value: &str, data_type: DataType| ResolveError::TypeCoercion {
        column: column.to_string(),
        value: value.to_string(),
        data_type: data_type.to_string(),
    };

    let ordering = match data_type {
        Some(DataType::Int) => {
            let left = parse_int(field).ok_or_else(|| coercion(field, DataType::Int))?;
            let right = parse_int(literal).ok_or_else(|| coercion(literal, DataType::Int))?;
            Some(left.cmp(&right))
        }
        Some(DataType::Float) => {
            let left = parse_float(field).ok_or_else(|| coercion(field, DataType::Float))?;
            let right = parse_float(literal).ok_or_else(|| coercion(literal, DataType::Float))?;
            left.partial_cmp(&right)
        }
        Some(DataType::String) | None => Some(field.cmp(literal)),
    };

    Ok(match ordering {
        Some(ordering) => matches_ordering(operator, ordering),
        None => operator == ComparisonOperator::NotEq,
    })
}

fn matches_ordering(operator: ComparisonOperator, ordering: Ordering) -> bool {
    match operator {
        ComparisonOperator::Eq => ordering == Ordering::Equal,
        ComparisonOperator::NotEq => ordering != Ordering::Equal,
        ComparisonOperator::Lt => ordering == Ordering::Less,
        ComparisonOperator::LtEq => ordering != Ordering::Greater,
        ComparisonOperator::Gt => ordering == Ordering::Greater,
        ComparisonOperator::GtEq => ordering != Ordering::Less,
    }
}

/// Ordering used by ORDER BY: integers, then floats, then plain text.
pub fn compare_sort_values(left: &str, right: &str) -> Ordering {
    if let (Some(l), Some(r)) = (parse_int(left), parse_int(right)) {
        return l.cmp(&r);
    }
    if let (Some(l), Some(r)) = (parse_float(left), parse_float(right)) {
        if let Some(ordering) = l.partial_cmp(&r) {
            return ordering;
        }
    }
    left.cmp(right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConditionDescriptor, LogicalOperator};
    use csvql_core::FileMetadata;
    use proptest::prelude::*;

    fn lookup() -> ConditionColumns {
        ConditionColumns::from_metadata(&FileMetadata::from_header(
            "t.csv",
            vec!["Year".into(), "Units".into(), "Value".into()],
        ))
    }

    fn row(year: &str, units: &str, value: &str) -> Vec<String> {
        vec![year.into(), units.into(), value.into()]
    }

    fn cond(
        column: &str,
        data_type: Option<DataType>,
        operator: ComparisonOperator,
        value: &str,
        logical_operator: Option<LogicalOperator>,
    ) -> ConditionDescriptor {
        ConditionDescriptor {
            alias: "e".into(),
            column: column.into(),
            data_type,
            operator,
            value: value.into(),
            logical_operator,
        }
    }

    #[test]
    fn test_empty_chain_matches_everything() {
        let chain = ConditionChain::build(&[]);
        assert!(resolve(&chain, &lookup(), &row("x", "y", "z")).unwrap());
    }

    #[test]
    fn test_int_comparison_is_numeric() {
        let chain = ConditionChain::build(&[cond(
            "Year",
            Some(DataType::Int),
            ComparisonOperator::Gt,
            "2013",
            None,
        )]);

        assert!(resolve(&chain, &lookup(), &row("2014", "", "")).unwrap());
        assert!(!resolve(&chain, &lookup(), &row("2013", "", "")).unwrap());
        assert!(resolve(&chain, &lookup(), &row("10000", "", "")).unwrap());
    }

    #[test]
    fn test_untyped_comparison_is_lexicographic() {
        let chain = ConditionChain::build(&[cond(
            "Year",
            None,
            ComparisonOperator::Gt,
            "2013",
            None,
        )]);

        // "10000" < "2013" as text
        assert!(!resolve(&chain, &lookup(), &row("10000", "", "")).unwrap());
        assert!(resolve(&chain, &lookup(), &row("2014", "", "")).unwrap());
    }

    #[test]
    fn test_and_or_precedence() {
        // Year = 2020 AND Units = x OR Value = 9
        let chain = ConditionChain::build(&[
            cond("Year", None, ComparisonOperator::Eq, "2020", Some(LogicalOperator::And)),
            cond("Units", None, ComparisonOperator::Eq, "x", Some(LogicalOperator::Or)),
            cond("Value", None, ComparisonOperator::Eq, "9", None),
        ]);
        let lookup = lookup();

        assert!(resolve(&chain, &lookup, &row("2020", "x", "0")).unwrap());
        assert!(resolve(&chain, &lookup, &row("1999", "y", "9")).unwrap());
        assert!(!resolve(&chain, &lookup, &row("2020", "y", "0")).unwrap());
        assert!(!resolve(&chain, &lookup, &row("1999", "x", "0")).unwrap());
    }

    #[test]
    fn test_satisfied_group_short_circuits_later_errors() {
        // The second group references an unknown column and is never reached
        let chain = ConditionChain::build(&[
            cond("Year", None, ComparisonOperator::Eq, "2020", Some(LogicalOperator::Or)),
            cond("Missing", None, ComparisonOperator::Eq, "x", None),
        ]);

        assert!(resolve(&chain, &lookup(), &row("2020", "", "")).unwrap());
        let err = resolve(&chain, &lookup(), &row("2021", "", "")).unwrap_err();
        assert_eq!(err, ResolveError::UnknownColumn("Missing".into()));
    }

    #[test]
    fn test_unknown_column_message() {
        let chain = ConditionChain::build(&[cond("Region", None, ComparisonOperator::Eq, "x", None)]);
        let err = resolve(&chain, &lookup(), &row("1", "2", "3")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid column to compare. Column Region not found");
    }

    #[test]
    fn test_type_coercion_failure() {
        let chain = ConditionChain::build(&[cond(
            "Units",
            Some(DataType::Int),
            ComparisonOperator::Eq,
            "1",
            None,
        )]);
        let err = resolve(&chain, &lookup(), &row("1", "Dollars", "3")).unwrap_err();
        assert!(matches!(err, ResolveError::TypeCoercion { ref value, .. } if value == "Dollars"));
    }

    #[test]
    fn test_short_row() {
        let chain = ConditionChain::build(&[cond("Value", None, ComparisonOperator::Eq, "1", None)]);
        let err = resolve(&chain, &lookup(), &["1".to_string()]).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingField {
                column: "Value".into(),
                position: 2,
                row_len: 1
            }
        );
    }

    #[test]
    fn test_float_nan() {
        let nan = |op| compare("v", "NaN", op, "1.0", Some(DataType::Float)).unwrap();
        assert!(!nan(ComparisonOperator::Eq));
        assert!(!nan(ComparisonOperator::Lt));
        assert!(!nan(ComparisonOperator::GtEq));
        assert!(nan(ComparisonOperator::NotEq));
    }

    #[test]
    fn test_int_fields_are_trimmed() {
        assert!(compare("v", " 42 ", ComparisonOperator::Eq, "42", Some(DataType::Int)).unwrap());
    }

    #[test]
    fn test_sort_values() {
        assert_eq!(compare_sort_values("9", "10"), Ordering::Less);
        assert_eq!(compare_sort_values("1.5", "1.25"), Ordering::Greater);
        assert_eq!(compare_sort_values("b", "a"), Ordering::Greater);
        assert_eq!(compare_sort_values("10", "9x"), Ordering::Less);
    }

    proptest! {
        #[test]
        fn prop_int_comparison_matches_i64(a in any::<i64>(), b in any::<i64>()) {
            let (fa, fb) = (a.to_string(), b.to_string());
            let ty = Some(DataType::Int);
            prop_assert_eq!(compare("c", &fa, ComparisonOperator::Lt, &fb, ty).unwrap(), a < b);
            prop_assert_eq!(compare("c", &fa, ComparisonOperator::GtEq, &fb, ty).unwrap(), a >= b);
            prop_assert_eq!(compare("c", &fa, ComparisonOperator::NotEq, &fb, ty).unwrap(), a != b);
        }

        #[test]
        fn prop_not_eq_is_negation_of_eq(a in "[a-z0-9]{0,4}", b in "[a-z0-9]{0,4}") {
            let eq = compare("c", &a, ComparisonOperator::Eq, &b, None).unwrap();
            let ne = compare("c", &a, ComparisonOperator::NotEq, &b, None).unwrap();
            prop_assert_eq!(eq, !ne);
        }
    }
}
