/// Prefix every followable article link starts with.
pub const CONTENT_PREFIX: &str = "/wiki/";

/// Namespaces that are never followed, even under the content prefix.
/// Most of these are also disallowed by robots.txt.
pub const EXCLUDED_PREFIXES: &[&str] = &[
    "/wiki/Category:",
    "/wiki/Special:",
    "/wiki/Help:",
    "/wiki/Wikipedia:",
    "/wiki/Template:",
    "/wiki/Template_talk:",
    "/wiki/File:",
    "#cite",
];

/// Decide whether a raw href points at a crawlable article.
///
/// Matching is case-sensitive and done on the raw attribute value, without
/// trimming or decoding. Exclusions win over the content prefix.
pub fn is_eligible(href: &str) -> bool {
    href.starts_with(CONTENT_PREFIX)
        && !EXCLUDED_PREFIXES
            .iter()
            .any(|prefix| href.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_namespaces() {
        for href in [
            "/wiki/Category:Test",
            "/wiki/Special:Test",
            "/wiki/Help:Test",
            "/wiki/Wikipedia:Test",
            "/wiki/Template:Test",
            "/wiki/Template_talk:Test",
            "/wiki/File:Test.png",
        ] {
            assert!(!is_eligible(href), "{href} should be excluded");
        }
    }

    #[test]
    fn test_citation_fragment() {
        assert!(!is_eligible("#cite_note-37"));
        assert!(!is_eligible("#cite_note-12"));
    }

    #[test]
    fn test_articles_pass() {
        assert!(is_eligible("/wiki/Kingman_Reef"));
        assert!(is_eligible("/wiki/San_Diego"));
        assert!(is_eligible("/wiki/Idaho"));
    }

    #[test]
    fn test_requires_content_prefix() {
        assert!(!is_eligible(""));
        assert!(!is_eligible("https://en.wikipedia.org/wiki/Idaho"));
        assert!(!is_eligible("/w/index.php?title=Idaho"));
        assert!(!is_eligible(" /wiki/Idaho"));
        assert!(!is_eligible("/WIKI/Idaho"));
    }

    #[test]
    fn test_bare_content_prefix_is_eligible() {
        assert!(is_eligible("/wiki/"));
    }

    #[test]
    fn test_exclusion_is_case_sensitive() {
        // Lower-case namespace is a different article title on the raw string
        assert!(is_eligible("/wiki/category:Physics"));
        assert!(!is_eligible("/wiki/Category:Physics"));
    }
}
