#![no_main]

use libfuzzer_sys::fuzz_target;
use csvql_sql::{tokenize, validate};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as query text: unbalanced quotes, stray `::` suffixes,
    // truncated clauses, invalid UTF-8 (converted lossily).
    let sql = String::from_utf8_lossy(data);

    let tokens = tokenize(&sql);
    for token in &tokens {
        assert!(!token.is_empty());
    }

    // Validation only returns metadata or errors, never panics
    if let Err(errors) = validate(&tokens) {
        assert!(!errors.is_empty());
    }
});
