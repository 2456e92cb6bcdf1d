//! Quote-aware tokenizer
//!
//! Splits query text on whitespace. A comma outside quotes is a token of its
//! own, and everything between a pair of single quotes (quotes included)
//! stays inside one token, spaces and commas too. Quotes only toggle the mode,
//! so `'e.Year'::int` is a single token. An unterminated quote swallows the
//! rest of the input; the validator reports it.

/// A token borrows directly from the query text.
pub type Token<'a> = &'a str;

fn is_separator(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r')
}

/// Tokenize `sql`. Pure: the same input always yields the same tokens.
pub fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_quote = false;

    for (idx, ch) in sql.char_indices() {
        if ch == '\'' {
            in_quote = !in_quote;
            start.get_or_insert(idx);
            continue;
        }

        if in_quote {
            continue;
        }

        if is_separator(ch) {
            if let Some(s) = start.take() {
                tokens.push(&sql[s..idx]);
            }
        } else if ch == ',' {
            if let Some(s) = start.take() {
                tokens.push(&sql[s..idx]);
            }
            tokens.push(&sql[idx..idx + 1]);
        } else {
            start.get_or_insert(idx);
        }
    }

    if let Some(s) = start {
        tokens.push(&sql[s..]);
    }

    tokens
}
