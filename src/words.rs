//! Word counting over block markup, used to estimate reading time

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));

// Entities that render as whitespace separate words.
static SPACE_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&(nbsp|ensp|emsp|thinsp|#160|#xa0|#32|#x20);")
        .expect("entity regex is valid")
});

/// Count whitespace-delimited words in rich-text markup.
///
/// Tags are treated as separators so `<p>a</p><p>b</p>` counts two words.
/// Unterminated markup degrades to a lower count, never an error.
#[must_use]
pub fn count_words(markup: &str) -> usize {
    if markup.is_empty() {
        return 0;
    }
    let text = TAG_RE.replace_all(markup, " ");
    let text = SPACE_ENTITY_RE.replace_all(&text, " ");
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("   \n\t"), 0);
        assert_eq!(count_words("<p></p><br/>"), 0);
    }

    #[test]
    fn strips_tags() {
        assert_eq!(count_words("<p>The <b>quick</b> brown fox</p>"), 4);
        assert_eq!(count_words("<p>one</p><p>two</p>"), 2);
        assert_eq!(count_words(r#"<a href="x y z">link</a>"#), 1);
    }

    #[test]
    fn whitespace_entities_split_words() {
        assert_eq!(count_words("a&nbsp;b&#160;c"), 3);
        assert_eq!(count_words("salt &amp; pepper"), 3);
    }

    #[test]
    fn malformed_markup_degrades() {
        // The unterminated tag swallows nothing since it never closes
        assert_eq!(count_words("<p>alpha beta <span"), 3);
        assert!(count_words("<p>alpha <beta gamma delta") <= 4);
    }
}
