//! Page-level signals that explain or qualify verdicts.

use std::sync::LazyLock;

use regex::Regex;

use crate::error_handling::WarningType;
use crate::registry::compile_regex_unsafe;

static CONSENT_MANAGERS: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex_unsafe(
        r"(?i)cookiebot|onetrust|usercentrics|trustarc|iubenda",
        "CONSENT_MANAGERS",
    )
});

static LAZY_LOADING: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex_unsafe(
        r#"(?i)intersectionobserver|requestidlecallback|loading\s*=\s*["']lazy["']"#,
        "LAZY_LOADING",
    )
});

static SPA_FRAMEWORKS: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex_unsafe(
        r"(?i)\b(?:react|angular|vue|next\.js|nuxt|gatsby|svelte)\b|__NEXT_DATA__",
        "SPA_FRAMEWORKS",
    )
});

/// What the fetched markup says about how the page loads its tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSignals {
    pub consent_manager: bool,
    pub lazy_loading: bool,
    /// Also asks the dynamic analyzer for one simulated interaction.
    pub spa_framework: bool,
}

impl PageSignals {
    pub fn detect(html: &str) -> Self {
        Self {
            consent_manager: CONSENT_MANAGERS.is_match(html),
            lazy_loading: LAZY_LOADING.is_match(html),
            spa_framework: SPA_FRAMEWORKS.is_match(html),
        }
    }

    /// Page warnings, in a fixed order.
    pub fn warnings(&self) -> Vec<(WarningType, &'static str)> {
        let mut warnings = Vec::new();
        if self.consent_manager {
            warnings.push((
                WarningType::ConsentManager,
                "Consent management detected - tags may load after user interaction",
            ));
        }
        if self.lazy_loading {
            warnings.push((
                WarningType::LazyLoading,
                "Lazy loading detected - some tags may load after viewport interaction",
            ));
        }
        if self.spa_framework {
            warnings.push((
                WarningType::SpaFramework,
                "SPA framework detected - tags may load after route changes",
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_each_signal() {
        let signals = PageSignals::detect(
            r#"<script src="https://cdn.cookiebot.com/uc.js"></script>
               <img loading="lazy" src="a.png">
               <script src="https://unpkg.com/react@17/umd/react.production.min.js"></script>"#,
        );
        assert!(signals.consent_manager);
        assert!(signals.lazy_loading);
        assert!(signals.spa_framework);
        assert_eq!(signals.warnings().len(), 3);
        assert_eq!(signals.warnings()[0].0, WarningType::ConsentManager);
    }

    #[test]
    fn test_plain_page_has_no_signals() {
        let signals = PageSignals::detect("<html><body><p>Hello</p></body></html>");
        assert_eq!(signals, PageSignals::default());
        assert!(signals.warnings().is_empty());
    }

    #[test]
    fn test_next_data_marks_spa() {
        let signals = PageSignals::detect(r#"<script id="__NEXT_DATA__" type="application/json">{}</script>"#);
        assert!(signals.spa_framework);
    }
}
