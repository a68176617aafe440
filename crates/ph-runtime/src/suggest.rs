//! Rule suggestion sources
//!
//! Free-text requests ("get rid of the cookie stuff") are turned into rule
//! candidates by a [`RuleSuggestionSource`]. A real backend lives outside
//! the page; when none is configured or the backend fails, the runtime
//! falls back to [`StaticSuggestions`], a keyword-to-pattern table that
//! also supplies the one-click clean-page preset.
//!
//! Sources see a [`PageSketch`] - a summarized view of the document - never
//! the document itself.

use crate::dom::{DomAdapter, ElementId};
use ph_core::types::{Rule, RuleType};

// =============================================================================
// Errors
// =============================================================================

/// Error type for suggestion backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuggestError {
    #[error("no suggestion backend configured")]
    NotConfigured,
    #[error("suggestion backend failed: {0}")]
    Backend(String),
}

// =============================================================================
// Page sketches
// =============================================================================

const SKETCH_MAX_LANDMARKS: usize = 40;
const SKETCH_TEXT_MAX: usize = 60;

/// Tags always worth sketching, whatever their attributes.
const LANDMARK_TAGS: &[&str] = &[
    "nav", "aside", "header", "footer", "section", "article", "main", "video", "iframe", "dialog",
];

/// A summarized view of the page for suggestion backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSketch {
    pub host: String,
    pub path: String,
    pub landmarks: Vec<Landmark>,
}

/// One notable element in the sketch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmark {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub role: Option<String>,
    pub text: Option<String>,
}

impl PageSketch {
    /// Capture landmark elements: structural tags plus anything carrying a
    /// role or an id, capped to keep the sketch small.
    pub fn capture<D: DomAdapter + ?Sized>(dom: &D, host: &str, path: &str) -> Self {
        let mut landmarks = Vec::new();
        if let Some(body) = dom.body() {
            Self::walk(dom, body, &mut landmarks);
        }
        Self {
            host: host.to_string(),
            path: path.to_string(),
            landmarks,
        }
    }

    fn walk<D: DomAdapter + ?Sized>(dom: &D, el: ElementId, out: &mut Vec<Landmark>) {
        if out.len() >= SKETCH_MAX_LANDMARKS {
            return;
        }
        if dom.attribute(el, crate::dom::UI_MARKER_ATTR).is_none() {
            let tag = dom.tag_name(el);
            let role = dom.attribute(el, "role");
            let id = dom.attribute(el, "id");
            if LANDMARK_TAGS.contains(&tag.as_str()) || role.is_some() || id.is_some() {
                let text = dom.text_content(el);
                let text = text.trim();
                out.push(Landmark {
                    tag,
                    id,
                    classes: dom.classes(el),
                    role,
                    text: (!text.is_empty())
                        .then(|| text.chars().take(SKETCH_TEXT_MAX).collect()),
                });
            }
            for child in dom.children(el) {
                Self::walk(dom, child, out);
            }
        }
    }
}

// =============================================================================
// The source contract
// =============================================================================

/// One rule proposed by a suggestion source.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCandidate {
    pub rule: Rule,
    /// Where the candidate came from, for logging and toasts.
    pub source: &'static str,
}

/// Turns a free-text prompt plus a page sketch into rule candidates.
pub trait RuleSuggestionSource {
    fn generate(
        &mut self,
        prompt: &str,
        sketch: &PageSketch,
    ) -> Result<Vec<RuleCandidate>, SuggestError>;
}

/// The "no backend" source; always defers to the static fallback.
#[derive(Debug, Default)]
pub struct NullSuggestions;

impl RuleSuggestionSource for NullSuggestions {
    fn generate(
        &mut self,
        _prompt: &str,
        _sketch: &PageSketch,
    ) -> Result<Vec<RuleCandidate>, SuggestError> {
        Err(SuggestError::NotConfigured)
    }
}

// =============================================================================
// Static heuristics
// =============================================================================

/// keywords -> (selector, type, description)
type PatternRow = (&'static [&'static str], &'static [PatternRule]);
type PatternRule = (&'static str, RuleType, &'static str);

const PATTERNS: &[PatternRow] = &[
    (
        &["ad", "ads", "advert", "sponsor", "banner", "promo"],
        &[
            (".ad", RuleType::Hide, "Ad containers"),
            (".ads", RuleType::Hide, "Ad containers"),
            (".advertisement", RuleType::Hide, "Advertisements"),
            (".sponsored", RuleType::Hide, "Sponsored content"),
            (".promo", RuleType::Hide, "Promotional blocks"),
        ],
    ),
    (
        &["cookie", "consent", "gdpr", "privacy"],
        &[
            (".cookie-banner", RuleType::Hide, "Cookie banner"),
            (".cookie-notice", RuleType::Hide, "Cookie notice"),
            ("#cookie-consent", RuleType::Hide, "Cookie consent"),
            (".consent-banner", RuleType::Hide, "Consent banner"),
        ],
    ),
    (
        &["popup", "modal", "overlay", "dialog"],
        &[
            (".modal-overlay", RuleType::Hide, "Modal overlay"),
            (".popup", RuleType::Hide, "Popups"),
            ("[role=\"dialog\"]", RuleType::Hide, "Dialogs"),
        ],
    ),
    (
        &["sidebar", "widget"],
        &[
            ("#secondary", RuleType::Hide, "Sidebar"),
            (".sidebar", RuleType::Hide, "Sidebar"),
            ("aside", RuleType::Hide, "Aside content"),
        ],
    ),
    (
        &["comment", "comments"],
        &[
            ("#comments", RuleType::Hide, "Comments"),
            (".comments", RuleType::Hide, "Comments"),
            (".comment-section", RuleType::Hide, "Comment section"),
        ],
    ),
    (
        &["newsletter", "subscribe", "signup"],
        &[
            (".newsletter", RuleType::Hide, "Newsletter prompt"),
            (".newsletter-signup", RuleType::Hide, "Newsletter signup"),
            (".subscribe-banner", RuleType::Hide, "Subscribe banner"),
        ],
    ),
    (
        &["video", "autoplay", "sound", "mute", "animation"],
        &[
            ("video[autoplay]", RuleType::Mute, "Autoplaying video"),
            ("video", RuleType::Mute, "Video players"),
        ],
    ),
];

/// The one-click clean-page preset: the least controversial rows of the
/// pattern table.
pub fn clean_preset() -> Vec<Rule> {
    let mut rules = Vec::new();
    for (selector, rule_type, description) in [
        (".ad", RuleType::Hide, "Ad containers"),
        (".ads", RuleType::Hide, "Ad containers"),
        (".advertisement", RuleType::Hide, "Advertisements"),
        (".sponsored", RuleType::Hide, "Sponsored content"),
        (".cookie-banner", RuleType::Hide, "Cookie banner"),
        (".cookie-notice", RuleType::Hide, "Cookie notice"),
        (".newsletter-signup", RuleType::Hide, "Newsletter signup"),
        ("video[autoplay]", RuleType::Mute, "Autoplaying video"),
    ] {
        rules.push(Rule::new(rule_type, selector, description));
    }
    rules
}

/// Keyword-table fallback used when no backend is configured.
#[derive(Debug, Default)]
pub struct StaticSuggestions;

impl RuleSuggestionSource for StaticSuggestions {
    fn generate(
        &mut self,
        prompt: &str,
        _sketch: &PageSketch,
    ) -> Result<Vec<RuleCandidate>, SuggestError> {
        let prompt = prompt.to_ascii_lowercase();
        let words: Vec<&str> = prompt
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut candidates: Vec<RuleCandidate> = Vec::new();
        for (keywords, rules) in PATTERNS {
            if !keywords.iter().any(|k| words.contains(k)) {
                continue;
            }
            for (selector, rule_type, description) in *rules {
                if candidates.iter().any(|c| c.rule.selector == *selector) {
                    continue;
                }
                candidates.push(RuleCandidate {
                    rule: Rule::new(*rule_type, selector, description),
                    source: "static-pattern",
                });
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memdom::MemDom;

    #[test]
    fn test_sketch_captures_landmarks() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let nav = dom.append(body, "nav");
        dom.set_text(nav, "Home News About");
        let div = dom.append(body, "div");
        dom.set_attribute(div, "role", "complementary");
        let plain = dom.append(body, "p");
        dom.set_text(plain, "just text");
        let _toolbar = dom.create_ui_element("div");

        let sketch = PageSketch::capture(&dom, "example.com", "/news");
        assert_eq!(sketch.host, "example.com");
        let tags: Vec<&str> = sketch.landmarks.iter().map(|l| l.tag.as_str()).collect();
        assert!(tags.contains(&"nav"));
        assert!(tags.contains(&"div"));
        // Plain paragraphs and engine chrome are not landmarks.
        assert!(!tags.contains(&"p"));
        assert_eq!(sketch.landmarks.iter().filter(|l| l.tag == "div").count(), 1);
    }

    #[test]
    fn test_static_keyword_matching() {
        let mut source = StaticSuggestions;
        let sketch = PageSketch {
            host: String::new(),
            path: String::new(),
            landmarks: Vec::new(),
        };

        let candidates = source
            .generate("please remove the cookie consent popup", &sketch)
            .unwrap();
        let selectors: Vec<&str> = candidates.iter().map(|c| c.rule.selector.as_str()).collect();
        assert!(selectors.contains(&".cookie-banner"));
        assert!(selectors.contains(&".popup"));

        let none = source.generate("make it pink", &sketch).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_static_candidates_are_deduped() {
        let mut source = StaticSuggestions;
        let sketch = PageSketch {
            host: String::new(),
            path: String::new(),
            landmarks: Vec::new(),
        };
        let candidates = source.generate("ads ads ads banner", &sketch).unwrap();
        let mut selectors: Vec<&str> =
            candidates.iter().map(|c| c.rule.selector.as_str()).collect();
        let before = selectors.len();
        selectors.dedup();
        assert_eq!(before, selectors.len());
    }

    #[test]
    fn test_clean_preset_selectors_parse_and_avoid_protected() {
        for rule in clean_preset() {
            let list = ph_core::selector::SelectorList::parse(&rule.selector).unwrap();
            assert_eq!(list.targets_protected(), None, "{}", rule.selector);
        }
    }

    #[test]
    fn test_null_source_defers() {
        let sketch = PageSketch {
            host: String::new(),
            path: String::new(),
            landmarks: Vec::new(),
        };
        assert_eq!(
            NullSuggestions.generate("anything", &sketch),
            Err(SuggestError::NotConfigured)
        );
    }
}
