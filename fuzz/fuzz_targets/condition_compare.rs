#![no_main]

use libfuzzer_sys::fuzz_target;
use csvql_sql::{compare, compare_sort_values, ComparisonOperator, DataType};

fuzz_target!(|data: (&str, &str, u8, u8)| {
    let (field, literal, op, data_type) = data;
    let op = match op % 6 {
        0 => ComparisonOperator::Eq,
        1 => ComparisonOperator::NotEq,
        2 => ComparisonOperator::Lt,
        3 => ComparisonOperator::LtEq,
        4 => ComparisonOperator::Gt,
        _ => ComparisonOperator::GtEq,
    };
    let data_type = match data_type % 4 {
        0 => None,
        1 => Some(DataType::Int),
        2 => Some(DataType::Float),
        _ => Some(DataType::String),
    };

    // Coercion failures surface as errors
    let _ = compare("c", field, op, literal, data_type);
    let _ = compare_sort_values(field, literal);
});
