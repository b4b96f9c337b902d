use std::borrow::Cow;

const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Prefixes of provider keys and tokens, and markers that precede a secret value.
const SECRET_MARKERS: [&str; 14] = [
    "sk-",
    "ghp_",
    "github_pat_",
    "glpat-",
    "AIza",
    "Authorization: Bearer ",
    "authorization: bearer ",
    "api_key=",
    "access_token=",
    "refresh_token=",
    "\"api_key\":\"",
    "\"access_token\":\"",
    "\"refresh_token\":\"",
    "\"token\":\"",
];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn redact_after(text: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find(marker) {
        let start = search_from + rel;
        let value_start = start + marker.len();
        let value_len: usize = text[value_start..]
            .chars()
            .take_while(|c| is_secret_char(*c))
            .map(char::len_utf8)
            .sum();

        if value_len == 0 {
            search_from = value_start;
            continue;
        }

        text.replace_range(start..value_start + value_len, REDACTED);
        search_from = start + REDACTED.len();
    }
}

/// Replace secret-looking tokens with `[REDACTED]`.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    if !SECRET_MARKERS.iter().any(|m| input.contains(m)) {
        return Cow::Borrowed(input);
    }
    let mut scrubbed = input.to_string();
    for marker in SECRET_MARKERS {
        redact_after(&mut scrubbed, marker);
    }
    Cow::Owned(scrubbed)
}

/// Scrub secrets from an API error body and cap its length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed.into_owned();
    }
    let truncated: String = scrubbed.chars().take(MAX_API_ERROR_CHARS).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_is_borrowed() {
        assert!(matches!(
            scrub_secret_patterns("nothing to see"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn redacts_prefix_tokens_and_markers() {
        let scrubbed = scrub_secret_patterns(
            "bad key sk-abc123XYZ and {\"access_token\":\"eyJhbGci\"} api_key=raw-secret",
        );
        assert!(!scrubbed.contains("abc123XYZ"));
        assert!(!scrubbed.contains("eyJhbGci"));
        assert!(!scrubbed.contains("raw-secret"));
        assert!(scrubbed.contains(REDACTED));
    }

    #[test]
    fn bare_marker_is_left_alone() {
        assert_eq!(scrub_secret_patterns("api_key= missing"), "api_key= missing");
    }

    #[test]
    fn long_errors_are_truncated() {
        let long = "x".repeat(500);
        let sanitized = sanitize_api_error(&long);
        assert!(sanitized.ends_with("..."));
        assert_eq!(sanitized.chars().count(), MAX_API_ERROR_CHARS + 3);
    }
}
