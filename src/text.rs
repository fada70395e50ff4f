//! Extraction of `#hashtags` and `@mentions` from captions and comments.

const MAX_TOKEN_LEN: usize = 64;

fn extract(text: &str, sigil: char) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut prev: Option<char> = None;

    while let Some((_, c)) = chars.next() {
        let at_boundary = prev.map_or(true, |p| !p.is_alphanumeric() && p != '_');
        prev = Some(c);
        if c != sigil || !at_boundary {
            continue;
        }

        let mut token = String::new();
        while let Some(&(_, next)) = chars.peek() {
            if next.is_alphanumeric() || next == '_' || (sigil == '@' && next == '.') {
                token.push(next);
                prev = Some(next);
                chars.next();
            } else {
                break;
            }
        }

        let token = token.trim_end_matches('.').to_lowercase();
        if !token.is_empty() && token.len() <= MAX_TOKEN_LEN && !found.contains(&token) {
            found.push(token);
        }
    }

    found
}

/// Lowercased, de-duplicated hashtags in order of first appearance.
pub fn hashtags(text: &str) -> Vec<String> {
    extract(text, '#')
}

/// Lowercased, de-duplicated usernames mentioned with `@`.
pub fn mentions(text: &str) -> Vec<String> {
    extract(text, '@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_hashtags_once_in_order() {
        assert_eq!(
            hashtags("Sunset at the #Beach! #sun #beach #golden_hour"),
            vec!["beach", "sun", "golden_hour"]
        );
    }

    #[test]
    fn ignores_sigils_inside_words() {
        assert!(hashtags("issue#12 and mail@example.com").is_empty());
        assert!(mentions("mail@example.com").is_empty());
    }

    #[test]
    fn mentions_allow_dots_but_not_trailing() {
        assert_eq!(mentions("thanks @jane.doe. and @Bob!"), vec!["jane.doe", "bob"]);
    }

    #[test]
    fn lone_sigil_is_not_a_token() {
        assert!(hashtags("# nothing").is_empty());
        assert!(mentions("@ ").is_empty());
    }
}
