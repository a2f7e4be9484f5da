/// Decode the character references that matter when comparing attribute values.
///
/// Contract:
/// - Named references: `&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;`, `&nbsp;`, `&sol;`.
/// - Numeric references decode only when semicolon-terminated and a valid Unicode scalar
///   (`&#47;`, `&#x2F;`).
/// - Anything else passes through unchanged.
pub(crate) fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    const NAMED: &[(&str, char)] = &[
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&apos;", '\''),
        ("&nbsp;", '\u{00A0}'),
        ("&sol;", '/'),
    ];
    // 0x10FFFF needs at most 6 hex or 7 decimal digits.
    const MAX_DIGITS: usize = 7;

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        if let Some((name, ch)) = NAMED.iter().find(|(name, _)| rest.starts_with(name)) {
            out.push(*ch);
            rest = &rest[name.len()..];
            continue;
        }

        if let Some((ch, consumed)) = decode_numeric(rest, MAX_DIGITS) {
            out.push(ch);
            rest = &rest[consumed..];
            continue;
        }

        out.push('&');
        rest = &rest[1..];
    }
    out.push_str(rest);
    out
}

fn decode_numeric(s: &str, max_digits: usize) -> Option<(char, usize)> {
    let body = s.strip_prefix("&#")?;
    let (digits_start, radix) = match body.as_bytes().first()? {
        b'x' | b'X' => (1, 16),
        _ => (0, 10),
    };
    let digits = &body[digits_start..];
    let end = digits.find(';')?;
    if end == 0 || end > max_digits {
        return None;
    }
    let value = u32::from_str_radix(&digits[..end], radix).ok()?;
    let ch = char::from_u32(value)?;
    Some((ch, 2 + digits_start + end + 1))
}
