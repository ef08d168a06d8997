//! Canonical identifier form for attribute names.
//!
//! SCIM attribute names are camelCase (`userName`, `x509Certificates`).
//! Consumers that key resources by snake_case identifiers use
//! [`canonical_identifier`] to map one onto the other. The parser keeps the
//! literal name alongside the canonical one.

/// Convert an attribute name to its canonical snake_case identifier.
///
/// Word boundaries are a lowercase letter or digit followed by an uppercase
/// letter (`userName`), and the last capital of an acronym followed by a
/// lowercase letter (`HTTPHeader`). Hyphens become underscores.
pub fn canonical_identifier(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' {
            out.push('_');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let after_word = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let ends_acronym =
                prev.is_ascii_uppercase() && next.is_some_and(|n| n.is_ascii_lowercase());
            if (after_word || ends_acronym) && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }

    out
}
