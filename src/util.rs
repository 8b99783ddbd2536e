// src/util.rs — Shared text utilities

use std::collections::HashSet;

/// Tokenize free text into mixed CJK-character and Latin-word tokens.
///
/// CJK codepoints are emitted as single-character tokens; runs of
/// alphanumerics become lowercased word tokens. Word tokens of length <= 1
/// are dropped as noise.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    fn flush(word: &mut String, tokens: &mut Vec<String>) {
        if word.chars().count() > 1 {
            tokens.push(std::mem::take(word));
        } else {
            word.clear();
        }
    }

    for ch in text.chars() {
        if is_cjk(ch) {
            flush(&mut word, &mut tokens);
            tokens.push(ch.to_string());
        } else if ch.is_alphanumeric() {
            word.extend(ch.to_lowercase());
        } else {
            flush(&mut word, &mut tokens);
        }
    }
    flush(&mut word, &mut tokens);

    tokens
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'   // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}' // Extension A
        | '\u{F900}'..='\u{FAFF}' // Compatibility Ideographs
    )
}

/// Jaccard similarity of two string sets, case-insensitive.
///
/// Defined as 0.0 when the union is empty (including both sides empty).
pub fn jaccard<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> f64 {
    let set_a: HashSet<String> = a.iter().map(|s| s.as_ref().to_lowercase()).collect();
    let set_b: HashSet<String> = b.iter().map(|s| s.as_ref().to_lowercase()).collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();

    intersection as f64 / union as f64
}

/// Jaccard similarity between the token sets of two free-text strings.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

/// Truncate a string for display/logging (UTF-8 safe).
///
/// Returns a substring of at most `max_len` bytes, ensuring the cut
/// point falls on a valid UTF-8 character boundary.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

/// Extract and parse the first balanced `{...}` JSON object embedded in text.
///
/// String literals and escapes are respected so braces inside strings don't
/// confuse the scanner. Returns `None` when no balanced object parses.
pub fn extract_json_block(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}
