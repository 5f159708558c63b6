//! Field helpers
//!
//! Small text primitives shared by the protocol decoders: delimiter
//! splitting, single-letter keyed tuples and lenient numeric coercion.

use std::collections::BTreeMap;
use std::str::FromStr;

/// Split `s` on `delimiter`.
///
/// Mirrors stream tokenizing: an empty input yields no fields and a single
/// trailing delimiter does not produce a trailing empty field. Interior empty
/// fields are preserved (`"a,,b"` gives three fields).
pub fn split_fields(s: &str, delimiter: char) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    let mut fields: Vec<&str> = s.split(delimiter).collect();
    if s.ends_with(delimiter) {
        fields.pop();
    }
    fields
}

/// Parse `"X100,E50,F0"` style tuples into a key/value map.
///
/// The first character of each tuple is the key and the rest is the value.
/// Empty tuples are skipped; a repeated key keeps the last value.
pub fn parse_tuples(s: &str, delimiter: char) -> BTreeMap<char, String> {
    let mut map = BTreeMap::new();
    for tuple in split_fields(s, delimiter) {
        let mut chars = tuple.chars();
        if let Some(key) = chars.next() {
            map.insert(key, chars.as_str().to_string());
        }
    }
    map
}

/// Remove every occurrence of `pattern` from `s`.
pub fn remove_all(s: &str, pattern: &str) -> String {
    if pattern.is_empty() {
        return s.to_string();
    }
    s.replace(pattern, "")
}

/// Replace the first occurrence of `from` with `to`.
///
/// Returns `None` when `from` does not occur.
pub fn replace_first(s: &str, from: &str, to: &str) -> Option<String> {
    s.find(from).map(|pos| {
        let mut out = String::with_capacity(s.len());
        out.push_str(&s[..pos]);
        out.push_str(to);
        out.push_str(&s[pos + from.len()..]);
        out
    })
}

/// Length of the longest prefix of `s` that looks like a number.
///
/// Accepts an optional sign and digits; when `fraction` is set also a
/// decimal point and an exponent.
fn numeric_prefix_len(s: &str, fraction: bool) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if !fraction {
        return if digits > 0 { i } else { 0 };
    }

    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        digits += j - frac_start;
        if digits > 0 {
            i = j;
        }
    }
    if digits == 0 {
        return 0;
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    i
}

/// Numeric types accepted by [`parse_or`].
pub trait Numeric: FromStr + Copy {
    /// Whether the textual form may carry a fraction or exponent.
    const FRACTIONAL: bool;
}

impl Numeric for f32 {
    const FRACTIONAL: bool = true;
}

impl Numeric for f64 {
    const FRACTIONAL: bool = true;
}

impl Numeric for i32 {
    const FRACTIONAL: bool = false;
}

impl Numeric for i64 {
    const FRACTIONAL: bool = false;
}

impl Numeric for u32 {
    const FRACTIONAL: bool = false;
}

impl Numeric for u64 {
    const FRACTIONAL: bool = false;
}

/// Parse a number out of `s`, falling back to `default`.
///
/// Leading whitespace is skipped and the longest numeric prefix is used, so
/// `"12abc"` yields 12 while `""`, `"M*53"` and out-of-range values yield
/// `default`.
pub fn parse_or<T: Numeric>(s: &str, default: T) -> T {
    let trimmed = s.trim_start();
    let len = numeric_prefix_len(trimmed, T::FRACTIONAL);
    if len == 0 {
        return default;
    }
    trimmed[..len].parse().unwrap_or(default)
}

/// Look up `key` in a tuple map and coerce it, falling back to `default`.
pub fn value_or<T: Numeric>(map: &BTreeMap<char, String>, key: char, default: T) -> T {
    map.get(&key)
        .map(|raw| parse_or(raw, default))
        .unwrap_or(default)
}
