//! Script reference extraction from fetched markup.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::config::MAX_SCRIPT_CONTENT_SIZE;
use crate::error_handling::ParseError;
use crate::models::ScriptRef;

static SCRIPT_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("script").ok());

/// Scripts found in a document plus any markup problems met on the way.
#[derive(Debug, Default)]
pub struct ExtractedScripts {
    pub scripts: Vec<ScriptRef>,
    pub parse_errors: Vec<ParseError>,
}

fn truncate_content(content: &str) -> String {
    if content.len() <= MAX_SCRIPT_CONTENT_SIZE {
        return content.to_string();
    }
    let mut cut = MAX_SCRIPT_CONTENT_SIZE;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content[..cut].to_string()
}

/// Lists every `<script>` element in document order. Nothing is executed.
///
/// `src` values are resolved against `base_url`; a value that cannot be resolved is
/// kept verbatim and reported as a [`ParseError::ScriptReference`]. The parser
/// recovers from malformed markup; its complaints are summarized as one
/// [`ParseError::Markup`].
pub fn extract_scripts(html: &str, base_url: &str) -> ExtractedScripts {
    let document = Html::parse_document(html);
    let base = url::Url::parse(base_url).ok();
    let mut extracted = ExtractedScripts::default();

    if let Some(first) = document.errors.first() {
        extracted.parse_errors.push(ParseError::Markup(format!(
            "{} parser error(s), first: {}",
            document.errors.len(),
            first
        )));
    }

    let Some(selector) = SCRIPT_SELECTOR.as_ref() else {
        return extracted;
    };

    for element in document.select(selector) {
        let src = element.value().attr("src").map(str::trim).filter(|s| !s.is_empty());
        let src = src.map(|raw| match base.as_ref().map(|b| b.join(raw)) {
            Some(Ok(resolved)) => resolved.to_string(),
            _ => {
                extracted
                    .parse_errors
                    .push(ParseError::ScriptReference(raw.to_string()));
                raw.to_string()
            }
        });
        let content: String = element.text().collect();
        extracted.scripts.push(ScriptRef {
            src,
            content: truncate_content(&content),
        });
    }

    extracted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_external_and_inline_scripts() {
        let html = r#"<html><head>
            <script src="/static/app.js"></script>
            <script>window.dataLayer = window.dataLayer || [];</script>
            </head><body></body></html>"#;
        let extracted = extract_scripts(html, "https://example.com/page");
        assert_eq!(extracted.scripts.len(), 2);
        assert_eq!(
            extracted.scripts[0].src.as_deref(),
            Some("https://example.com/static/app.js")
        );
        assert!(extracted.scripts[1].src.is_none());
        assert!(extracted.scripts[1].content.contains("dataLayer"));
    }

    #[test]
    fn test_protocol_relative_src() {
        let html = r#"<script src="//connect.facebook.net/en_US/fbevents.js"></script>"#;
        let extracted = extract_scripts(html, "https://shop.example.com/");
        assert_eq!(
            extracted.scripts[0].src.as_deref(),
            Some("https://connect.facebook.net/en_US/fbevents.js")
        );
    }

    #[test]
    fn test_unresolvable_src_is_reported() {
        let html = r#"<script src="/relative.js"></script>"#;
        let extracted = extract_scripts(html, "not a base url");
        assert_eq!(extracted.scripts[0].src.as_deref(), Some("/relative.js"));
        assert!(extracted
            .parse_errors
            .contains(&ParseError::ScriptReference("/relative.js".into())));
    }

    #[test]
    fn test_inline_content_truncated() {
        let body = "a".repeat(MAX_SCRIPT_CONTENT_SIZE + 10);
        let html = format!("<script>{body}</script>");
        let extracted = extract_scripts(&html, "https://example.com/");
        assert_eq!(extracted.scripts[0].content.len(), MAX_SCRIPT_CONTENT_SIZE);
    }

    #[test]
    fn test_malformed_markup_still_yields_scripts() {
        let html = "<div><script>ttq.load('C123')</script></span></p><<<";
        let extracted = extract_scripts(html, "https://example.com/");
        assert_eq!(extracted.scripts.len(), 1);
        assert!(extracted
            .parse_errors
            .iter()
            .any(|e| matches!(e, ParseError::Markup(_))));
    }
}
