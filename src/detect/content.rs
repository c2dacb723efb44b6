//! Content-string argument parsing shared by byte-pattern keywords
//!
//! Accepted syntax: optional leading `!`, optional surrounding double quotes,
//! `|hex bytes|` runs and backslash escapes, e.g. `!"tar|2e|gz"`.

/// A parsed content string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentString {
    pub pattern: Vec<u8>,
    pub negated: bool,
}

/// Parse a content-string argument. Errors carry a human readable reason.
pub fn parse_content_string(input: &str) -> Result<ContentString, String> {
    let input = input.trim();
    let (negated, input) = match input.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, input),
    };

    let input = unquote(input)?;
    let mut pattern = Vec::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '|' => {
                let mut hex = String::new();
                let mut closed = false;
                for hc in chars.by_ref() {
                    if hc == '|' {
                        closed = true;
                        break;
                    }
                    if !hc.is_whitespace() {
                        hex.push(hc);
                    }
                }
                if !closed {
                    return Err("unterminated hex run".into());
                }
                pattern.extend(parse_hex(&hex)?);
            }
            '\\' => match chars.next() {
                Some('n') => pattern.push(b'\n'),
                Some('r') => pattern.push(b'\r'),
                Some('t') => pattern.push(b'\t'),
                Some(esc @ ('\\' | '"' | ';' | ':' | '|')) => pattern.push(esc as u8),
                Some(other) => return Err(format!("unknown escape sequence \\{}", other)),
                None => return Err("trailing backslash".into()),
            },
            _ => {
                let mut buf = [0u8; 4];
                pattern.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    if pattern.is_empty() {
        return Err("empty pattern".into());
    }

    Ok(ContentString { pattern, negated })
}

fn unquote(input: &str) -> Result<&str, String> {
    match (input.strip_prefix('"'), input.ends_with('"')) {
        (Some(rest), true) if !rest.is_empty() => Ok(&rest[..rest.len() - 1]),
        (Some(_), _) => Err("unbalanced quotes".into()),
        (None, true) if !input.ends_with("\\\"") => Err("unbalanced quotes".into()),
        (None, _) => Ok(input),
    }
}

fn parse_hex(hex: &str) -> Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in |{}|", hex));
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| format!("invalid hex byte in |{}|", hex))
        })
        .collect()
}
