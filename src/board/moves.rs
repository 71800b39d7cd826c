//! Move tokens and canonical move equivalence
//!
//! A checker-play move is an ordered list of single-checker parts. Transcripts
//! and the engine write the same move in several dialects: `bar/19*` vs
//! `25/19*`, `8/5(2)` shorthand for a repeated hop, reordered tokens. The
//! canonical form is the sorted multiset of normalized tokens after shorthand
//! expansion; two moves are equal iff their canonical forms are equal.

use serde::{Deserialize, Serialize};

/// A single checker hop. `from` is 1..=25 (25 = bar), `to` is 0..=24
/// (0 = bearoff). `hit` marks a blot sent to the opponent's bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePart {
    pub from: u8,
    pub to: u8,
    pub hit: bool,
}

/// Parse one move token (`bar/19*`, `24/18`, `6/off`) into a part.
///
/// Case-insensitive. Returns `None` for anything that does not match the
/// `^(bar|\d+)/(off|\d+)\*?$` shape or whose indices are out of range.
pub fn parse_token(token: &str) -> Option<MovePart> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let (body, hit) = match token.strip_suffix('*') {
        Some(rest) => (rest, true),
        None => (token, false),
    };
    let (from_str, to_str) = body.split_once('/')?;

    let from = if from_str.eq_ignore_ascii_case("bar") {
        25
    } else {
        from_str.parse::<u8>().ok()?
    };
    let to = if to_str.eq_ignore_ascii_case("off") {
        0
    } else {
        to_str.parse::<u8>().ok()?
    };

    if !(1..=25).contains(&from) || to > 24 {
        return None;
    }
    Some(MovePart { from, to, hit })
}

/// Parse a whitespace-separated run of move tokens. Unknown tokens are
/// silently dropped; transcripts never carry shorthand.
pub fn parse_move_tokens(text: &str) -> Vec<MovePart> {
    text.split_whitespace().filter_map(parse_token).collect()
}

/// Expand engine shorthand: `8/5(2)` becomes two `8/5` tokens, `6/3*(2)`
/// becomes `6/3*` and `6/3` (the hit marker stays on the first copy only).
/// Tokens without a repeat count pass through unchanged.
pub fn expand_shorthand(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.split_whitespace() {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }
        match split_repeat(token) {
            Some((base, count)) => {
                let hit = base.ends_with('*');
                let plain = base.trim_end_matches('*');
                for i in 0..count {
                    if i == 0 && hit {
                        out.push(format!("{}*", plain));
                    } else {
                        out.push(plain.to_string());
                    }
                }
            }
            None => out.push(token.to_string()),
        }
    }
    out
}

/// Split `8/5(2)` into (`8/5`, 2); `None` when there is no `(n)` suffix.
fn split_repeat(token: &str) -> Option<(&str, usize)> {
    let open = token.rfind('(')?;
    let close = token.rfind(')')?;
    if close != token.len() - 1 || close <= open + 1 {
        return None;
    }
    let count = token[open + 1..close].parse::<usize>().ok()?;
    if count == 0 {
        return None;
    }
    Some((&token[..open], count))
}

/// Normalize one token to engine notation: `25/…` to `bar/…`, `…/0` to
/// `…/off`, keywords lowercased, hit marker preserved.
pub fn normalize_token(token: &str) -> String {
    let token = token.trim();
    let (body, hit) = match token.strip_suffix('*') {
        Some(rest) => (rest, "*"),
        None => (token, ""),
    };
    let Some((from, to)) = body.split_once('/') else {
        return token.to_string();
    };
    let from = if from.eq_ignore_ascii_case("bar") || from == "25" {
        "bar".to_string()
    } else {
        from.to_string()
    };
    let to = if to.eq_ignore_ascii_case("off") || to == "0" {
        "off".to_string()
    } else {
        to.to_string()
    };
    format!("{}/{}{}", from, to, hit)
}

/// Canonical form of a move text: shorthand expanded, each token
/// normalized, the hit marker kept only on the first instance of a repeated
/// capture token, then sorted.
pub fn canonical_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = expand_shorthand(text)
        .iter()
        .map(|t| normalize_token(t))
        .collect();

    // A capture can only happen once per destination; later duplicates of a
    // starred token lose the marker so reorderings compare equal.
    let mut seen_starred: Vec<String> = Vec::new();
    for token in tokens.iter_mut() {
        if let Some(plain) = token.strip_suffix('*') {
            let plain = plain.to_string();
            if seen_starred.contains(&plain) {
                *token = plain;
            } else {
                seen_starred.push(plain);
            }
        }
    }

    tokens.sort();
    tokens
}

/// Canonical key used for equality comparisons between a played move and
/// engine candidates.
pub fn canonical_key(text: &str) -> String {
    canonical_tokens(text).join(" ")
}

/// Convert parsed parts back into engine-notation tokens.
pub fn parts_to_tokens(parts: &[MovePart]) -> Vec<String> {
    parts
        .iter()
        .map(|p| {
            let from = if p.from == 25 {
                "bar".to_string()
            } else {
                p.from.to_string()
            };
            let to = if p.to == 0 {
                "off".to_string()
            } else {
                p.to.to_string()
            };
            format!("{}/{}{}", from, to, if p.hit { "*" } else { "" })
        })
        .collect()
}

/// Join parts into a single move text in engine notation.
pub fn parts_to_text(parts: &[MovePart]) -> String {
    parts_to_tokens(parts).join(" ")
}

/// Canonical key of a parsed part list.
pub fn parts_canonical_key(parts: &[MovePart]) -> String {
    canonical_key(&parts_to_text(parts))
}

/// Expand a move text fully into parts (shorthand included). Used for the
/// engine's candidate output.
pub fn parse_move_text(text: &str) -> Vec<MovePart> {
    canonical_tokens(text)
        .iter()
        .filter_map(|t| parse_token(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_dialects_parse_to_the_same_part() {
        let a = parse_token("bar/19*").unwrap();
        let b = parse_token("25/19*").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, MovePart { from: 25, to: 19, hit: true });

        let off = parse_token("6/off").unwrap();
        assert_eq!(off, MovePart { from: 6, to: 0, hit: false });
        assert_eq!(parse_token("6/0").unwrap(), off);
    }

    #[test]
    fn unknown_tokens_are_dropped() {
        let parts = parse_move_tokens("24/18 garbage 13/7");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], MovePart { from: 24, to: 18, hit: false });
        assert_eq!(parts[1], MovePart { from: 13, to: 7, hit: false });
    }

    #[test]
    fn shorthand_expands_with_hit_on_first_copy_only() {
        let tokens = canonical_tokens("8/5(2) 6/3*(2)");
        assert_eq!(tokens, vec!["6/3", "6/3*", "8/5", "8/5"]);
    }

    #[test]
    fn canonical_key_is_order_insensitive() {
        assert_eq!(canonical_key("13/7 8/7"), canonical_key("8/7 13/7"));
        assert_eq!(canonical_key("25/19* 24/18"), canonical_key("24/18 bar/19*"));
        assert_ne!(canonical_key("13/7 8/7"), canonical_key("13/7 8/6"));
    }

    #[test]
    fn played_parts_match_engine_shorthand() {
        let played = parse_move_tokens("8/5 8/5 6/3* 6/3");
        assert_eq!(parts_canonical_key(&played), canonical_key("8/5(2) 6/3*(2)"));
    }

    #[test]
    fn bearoff_tokens_normalize_to_off() {
        assert_eq!(canonical_key("6/0 5/0"), canonical_key("6/off 5/off"));
    }
}
