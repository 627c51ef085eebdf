//! Natural (human) string ordering.
//!
//! Splits a string into alternating text and number runs so that
//! `stub-meta-history2` sorts before `stub-meta-history10`.

use std::cmp::Ordering;

/// Compare two strings in natural order.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut xs = runs(a);
    let mut ys = runs(b);
    loop {
        match (xs.next(), ys.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x, y) {
                    (Run::Number(x), Run::Number(y)) => cmp_digits(x, y),
                    (Run::Text(x), Run::Text(y)) => x.cmp(y),
                    // A digit run sorts before a text run at the same position.
                    (Run::Number(_), Run::Text(_)) => Ordering::Less,
                    (Run::Text(_), Run::Number(_)) => Ordering::Greater,
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Run<'a> {
    Text(&'a str),
    Number(&'a str),
}

fn runs(s: &str) -> impl Iterator<Item = Run<'_>> {
    let bytes = s.as_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= bytes.len() {
            return None;
        }
        let start = pos;
        let numeric = bytes[pos].is_ascii_digit();
        while pos < bytes.len() && bytes[pos].is_ascii_digit() == numeric {
            pos += 1;
        }
        let run = &s[start..pos];
        Some(if numeric {
            Run::Number(run)
        } else {
            Run::Text(run)
        })
    })
}

/// Compare two ASCII digit runs numerically without parsing into a fixed
/// width integer (runs can be arbitrarily long).
fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        // Equal values: more leading zeros sorts first, keeps the order total.
        .then_with(|| b.len().cmp(&a.len()))
}
