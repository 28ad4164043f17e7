//! Built-in tag catalogue.
//!
//! Eight tag types ship with the crate. Each is a [`SignaturePlugin`] paired with
//! its own pattern bundle, registered under a stable key.

use std::sync::Arc;

use crate::config::MethodWeights;
use crate::error_handling::ConfigurationError;
use crate::registry::pattern::TagPattern;
use crate::registry::plugin::{DetectorPlugin, SignaturePlugin};

pub const BUILTIN_VERSION: &str = "3.0.0";

/// A built-in entry: registry key, plugin, and pattern bundle.
pub struct BuiltinTag {
    pub key: &'static str,
    pub plugin: Arc<dyn DetectorPlugin>,
    pub pattern: TagPattern,
}

fn entry(
    key: &'static str,
    name: &str,
    pattern: Result<TagPattern, ConfigurationError>,
) -> Result<BuiltinTag, ConfigurationError> {
    Ok(BuiltinTag {
        key,
        plugin: Arc::new(SignaturePlugin::new(name, BUILTIN_VERSION)),
        pattern: pattern?,
    })
}

/// Builds the eight built-in tags with the given method weights.
pub fn builtin_tags(weights: &MethodWeights) -> Result<Vec<BuiltinTag>, ConfigurationError> {
    let w = || weights.clone();

    Ok(vec![
        entry(
            "gtm",
            "Google Tag Manager",
            TagPattern::builder("gtm")
                .container_id(r"(?i)\bGTM-[A-Z0-9]{4,}\b")
                .script_url(r#"(?i)googletagmanager\.com/gtm\.js\?id=([^&"'\s]+)"#)
                .inline_call(r#"(?is)gtm\.start["']?\s*:\s*new\s+Date\(\)\.getTime\(\)"#)
                .inline_call(r"(?i)\bdataLayer\s*=\s*\[|\bdataLayer\.push\s*\(")
                .dynamic_insertion(r#"(?is)createElement\s*\(\s*["']script["'][\s\S]{0,200}?googletagmanager\.com/gtm\.js"#)
                .noscript(r#"(?is)<noscript\b[^>]*>.*?<iframe[^>]*src=["']https://www\.googletagmanager\.com/ns\.html\?id=([^"'&]+)"#)
                .request_hosts(["googletagmanager.com/gtm.js", "googletagmanager.com/ns.html"])
                .request_id(r"(?i)\bGTM-[A-Z0-9]{4,}\b")
                .globals(["google_tag_manager"])
                .console_keywords(["google tag manager", "gtm.js"])
                .dom_marker(r"(?i)\bGTM-[A-Z0-9]{4,}\b")
                .uppercase_ids()
                .weights(w())
                .build(),
        )?,
        entry(
            "tealium",
            "Tealium",
            TagPattern::builder("tealium")
                .script_url(r"(?i)tags\.tiqcdn\.com/utag/([^/]+)/([^/]+)/([^/]+)/utag(?:\.sync)?\.js")
                .inline_call(r"(?i)\butag_data\s*=\s*\{")
                .inline_call(r"(?i)\butag\.(?:link|view|track|sync)\s*\(")
                .dynamic_insertion(r#"(?is)createElement\s*\(\s*["']script["'][\s\S]{0,300}?tags\.tiqcdn\.com"#)
                .async_loader(r"(?is)\(function\s*\([a-z,\s]*\)\s*\{[^}]*tags\.tiqcdn\.com[^}]*\}\s*\)\s*\(\s*\)")
                .request_hosts(["tags.tiqcdn.com", "tealiumiq.com"])
                .request_id(r"(?i)tags\.tiqcdn\.com/utag/([^/]+)/([^/]+)/([^/]+)/")
                .globals(["utag", "utag_data"])
                .console_keywords(["tealium", "utag"])
                .dom_marker(r"(?i)tags\.tiqcdn\.com/utag/([^/]+)/([^/]+)/([^/]+)/utag")
                .weights(w())
                .build(),
        )?,
        entry(
            "gtag",
            "Google tag (GA4)",
            TagPattern::builder("gtag")
                .container_id(r"\bG-[A-Z0-9]{10}\b")
                .script_url(r#"(?i)googletagmanager\.com/gtag/js\?id=([^&"'\s]+)"#)
                .inline_call(r#"(?i)\bgtag\s*\(\s*["'](?:config|event)["']"#)
                .dynamic_insertion(r#"(?is)createElement\s*\(\s*["']script["'][\s\S]{0,200}?googletagmanager\.com/gtag/js"#)
                .request_hosts([
                    "googletagmanager.com/gtag/js",
                    "google-analytics.com/g/collect",
                    "analytics.google.com/g/collect",
                ])
                .request_id(r"(?i)\b(?:id|tid)=(G-[A-Z0-9]{10})\b")
                .globals(["gtag"])
                .console_keywords(["gtag", "google analytics 4"])
                .dom_marker(r"\bG-[A-Z0-9]{10}\b")
                .uppercase_ids()
                .weights(w())
                .build(),
        )?,
        entry(
            "meta_pixel",
            "Meta Pixel",
            TagPattern::builder("meta_pixel")
                .container_id(r#"(?i)\bfbq\s*\(\s*["']init["']\s*,\s*["'](\d{15,16})["']"#)
                .script_url(r"(?i)connect\.facebook\.net/[^/]+/fbevents\.js")
                .inline_call(r#"(?i)\bfbq\s*\(\s*["']track["']\s*,"#)
                .dynamic_insertion(r#"(?is)createElement\s*\(\s*["']script["'][\s\S]{0,200}?connect\.facebook\.net"#)
                .noscript(r#"(?is)<noscript\b[^>]*>.*?<img[^>]*src=["']https://www\.facebook\.com/tr\?id=(\d{15,16})"#)
                .request_hosts(["connect.facebook.net", "facebook.com/tr"])
                .request_id(r"[?&]id=(\d{15,16})\b")
                .globals(["fbq"])
                .console_keywords(["fbq", "facebook pixel", "meta pixel"])
                .dom_marker(r#"(?i)\bfbq\s*\(\s*["']init["']\s*,\s*["'](\d{15,16})["']"#)
                .weights(w())
                .build(),
        )?,
        entry(
            "tiktok_pixel",
            "TikTok Pixel",
            TagPattern::builder("tiktok_pixel")
                .container_id(r#"(?i)\bttq\.load\s*\(\s*["']([^"']+)["']"#)
                .script_url(r"(?i)analytics\.tiktok\.com/i18n/pixel/events\.js(?:\?sdkid=([A-Za-z0-9]+))?")
                .inline_call(r#"(?i)\bttq\.(?:track|page)\s*\("#)
                .dynamic_insertion(r#"(?is)createElement\s*\(\s*["']script["'][\s\S]{0,200}?analytics\.tiktok\.com"#)
                .noscript(r#"(?is)<noscript\b[^>]*>.*?<img[^>]*src=["']https://analytics\.tiktok\.com/i18n/pixel/pixel\.gif\?id=([^"'&]+)"#)
                .request_hosts(["analytics.tiktok.com"])
                .request_id(r"(?i)sdkid=([A-Za-z0-9]+)")
                .globals(["ttq"])
                .console_keywords(["tiktok", "ttq"])
                .dom_marker(r#"(?i)\bttq\.load\s*\(\s*["']([^"']+)["']"#)
                .uppercase_ids()
                .weights(w())
                .build(),
        )?,
        entry(
            "linkedin_insight",
            "LinkedIn Insight Tag",
            TagPattern::builder("linkedin_insight")
                .container_id(r#"(?i)_linkedin_(?:data_)?partner_id\s*=\s*["']?(\d+)"#)
                .script_url(r"(?i)snap\.licdn\.com/li\.lms-analytics/insight\.min\.js")
                .inline_call(r"(?i)\blintrk\s*\(")
                .dynamic_insertion(r#"(?is)createElement\s*\(\s*["']script["'][\s\S]{0,200}?snap\.licdn\.com"#)
                .noscript(r#"(?is)<noscript\b[^>]*>.*?<img[^>]*src=["']https://px\.ads\.linkedin\.com/collect/?\?pid=(\d+)"#)
                .request_hosts(["snap.licdn.com/li.lms-analytics", "px.ads.linkedin.com"])
                .request_id(r"(?i)\bpid=(\d+)")
                .globals(["lintrk", "_linkedin_data_partner_ids"])
                .console_keywords(["linkedin insight", "lintrk"])
                .dom_marker(r#"(?i)_linkedin_(?:data_)?partner_id\s*=\s*["']?(\d+)"#)
                .weights(w())
                .build(),
        )?,
        entry(
            "snap_pixel",
            "Snap Pixel",
            TagPattern::builder("snap_pixel")
                .container_id(r#"(?i)\bsnaptr\s*\(\s*["']init["']\s*,\s*["']([^"']+)["']"#)
                .script_url(r"(?i)sc-static\.net/scevent\.min\.js")
                .inline_call(r#"(?i)\bsnaptr\s*\(\s*["']track["']\s*,"#)
                .dynamic_insertion(r#"(?is)createElement\s*\(\s*["']script["'][\s\S]{0,200}?sc-static\.net"#)
                .noscript(r#"(?is)<noscript\b[^>]*>.*?<img[^>]*src=["']https://sc-static\.net/scevent\.gif\?id=([^"'&]+)"#)
                .request_hosts(["sc-static.net/scevent", "tr.snapchat.com"])
                .globals(["snaptr"])
                .console_keywords(["snaptr", "snapchat"])
                .dom_marker(r#"(?i)\bsnaptr\s*\(\s*["']init["']\s*,\s*["']([^"']+)["']"#)
                .weights(w())
                .build(),
        )?,
        entry(
            "universal_analytics",
            "Universal Analytics",
            TagPattern::builder("universal_analytics")
                .container_id(r"(?i)\bUA-\d{4,10}-\d{1,4}\b")
                .script_url(r"(?i)google-analytics\.com/analytics\.js")
                .inline_call(r#"(?i)\bga\s*\(\s*["'](?:create|send)["']"#)
                .dynamic_insertion(r#"(?is)createElement\s*\(\s*["']script["'][\s\S]{0,200}?google-analytics\.com/analytics\.js"#)
                .request_hosts([
                    "google-analytics.com/analytics.js",
                    "google-analytics.com/collect",
                    "google-analytics.com/r/collect",
                ])
                .request_id(r"(?i)\btid=(UA-\d{4,10}-\d{1,4})\b")
                .globals(["ga", "GoogleAnalyticsObject"])
                .console_keywords(["universal analytics", "analytics.js"])
                .dom_marker(r"(?i)\bUA-\d{4,10}-\d{1,4}\b")
                .uppercase_ids()
                .weights(w())
                .build(),
        )?,
    ])
}
