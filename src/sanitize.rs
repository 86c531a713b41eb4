//! Transport-encoding removal for submitted source text.
//!
//! Rich-text editors deliver code HTML-entity-escaped. [`decode`] turns it back
//! into literal source and must run before validation: a banned token hidden
//! behind `&lt;`/`&#105;` would otherwise slip past the rules.

use std::borrow::Cow;

/// Longest entity accepted, measured from `&` to `;` exclusive (`&#x10FFFF`).
const MAX_ENTITY_LEN: usize = 9;

/// Decode HTML entities until no further entity can be decoded.
///
/// Handles `&lt;`, `&gt;`, `&amp;`, `&quot;`, `&#39;`, `&apos;` and numeric
/// references (`&#NNN;`, `&#xHH;`). Unknown entities are kept verbatim.
/// Decoding repeats to a fixpoint, so `decode(decode(x)) == decode(x)`.
pub fn decode(text: &str) -> Cow<'_, str> {
    let Some(mut current) = decode_once(text) else {
        return Cow::Borrowed(text);
    };
    // Every replacement shortens the text, so this terminates.
    while let Some(next) = decode_once(&current) {
        current = next;
    }
    Cow::Owned(current)
}

/// Single left-to-right pass. Returns `None` when nothing was decoded.
fn decode_once(text: &str) -> Option<String> {
    if !text.contains('&') {
        return None;
    }

    let mut out = String::with_capacity(text.len());
    let mut changed = false;
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match parse_entity(tail) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
                changed = true;
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    changed.then_some(out)
}

/// Parse an entity at the start of `tail` (which begins with `&`).
///
/// Returns the decoded character and the number of bytes consumed.
fn parse_entity(tail: &str) -> Option<(char, usize)> {
    let semi = tail
        .bytes()
        .take(MAX_ENTITY_LEN.saturating_add(1))
        .position(|b| b == b';')?;
    if semi < 2 {
        return None;
    }
    let body = &tail[1..semi];

    let ch = match body {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        _ => parse_numeric(body)?,
    };
    Some((ch, semi.saturating_add(1)))
}

fn parse_numeric(body: &str) -> Option<char> {
    let digits = body.strip_prefix('#')?;
    let (digits, radix) = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => (hex, 16),
        None => (digits, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let code = u32::from_str_radix(digits, radix).ok()?;
    char::from_u32(code)
}
