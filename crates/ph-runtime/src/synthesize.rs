//! Stable selector synthesis
//!
//! Given a picked element, produce a selector that can re-identify it after
//! a re-render, plus anchor metadata and ranked fallbacks. Candidates are
//! tried from most to least semantic: role and aria-label survive re-renders
//! because they carry meaning; ids and classes only count when they do not
//! look machine-generated; position is the last resort before a bare tag.
//!
//! Synthesis never fails - a bare tag name always comes out - and never
//! queries the document. Soundness (the selector actually matching the
//! source element) is the caller's check, via [`is_sound`].

use ph_core::types::{AnchorSet, ANCHOR_TEXT_MAX};

use crate::dom::{nth_of_type_index, DomAdapter, ElementId};

/// Result of selector synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    /// The best candidate.
    pub selector: String,
    /// Metadata for humans and suggestion backends; never used to match.
    pub anchors: AnchorSet,
    /// Remaining candidates, most specific first.
    pub alternatives: Vec<String>,
}

const HASH_TOKEN_MIN: usize = 32;
const DESCRIPTION_TEXT_MAX: usize = 50;

/// Synthesize a selector for an element.
pub fn synthesize<D: DomAdapter + ?Sized>(dom: &D, el: ElementId) -> Synthesized {
    let tag = dom.tag_name(el);
    let mut candidates: Vec<String> = Vec::new();

    if let Some(role) = dom.attribute(el, "role") {
        if let Some(selector) = attr_selector("role", &role) {
            candidates.push(selector);
        }
    }

    if let Some(label) = dom.attribute(el, "aria-label") {
        if let Some(selector) = attr_selector("aria-label", &label) {
            candidates.push(selector);
        }
    }

    if let Some(id) = dom.attribute(el, "id") {
        if !is_volatile_id(&id) {
            candidates.push(format!("#{id}"));
        }
    }

    let stable_classes: Vec<String> = dom
        .classes(el)
        .into_iter()
        .filter(|c| is_stable_class(c))
        .collect();
    if !stable_classes.is_empty() {
        candidates.push(format!("{tag}.{}", stable_classes.join(".")));
    }

    if let Some(selector) = positional_selector(dom, el, &tag) {
        candidates.push(selector);
    }

    candidates.push(tag.clone());
    candidates.dedup();

    let selector = candidates.remove(0);
    Synthesized {
        selector,
        anchors: capture_anchors(dom, el, &tag),
        alternatives: candidates,
    }
}

/// Does the selector re-identify the element right now?
pub fn is_sound<D: DomAdapter + ?Sized>(dom: &D, el: ElementId, selector: &str) -> bool {
    dom.query_selector_all(selector)
        .map(|matches| matches.contains(&el))
        .unwrap_or(false)
}

/// Human-readable description of an element, for rule labels and toasts:
/// aria-label, then title, then short text, then role, then the tag.
pub fn describe_element<D: DomAdapter + ?Sized>(dom: &D, el: ElementId) -> String {
    if let Some(label) = non_empty(dom.attribute(el, "aria-label")) {
        return label;
    }
    if let Some(title) = non_empty(dom.attribute(el, "title")) {
        return title;
    }
    let text = dom.text_content(el);
    let text = text.trim();
    if !text.is_empty() && text.chars().count() <= DESCRIPTION_TEXT_MAX {
        return text.to_string();
    }
    if let Some(role) = non_empty(dom.attribute(el, "role")) {
        return role;
    }
    dom.tag_name(el)
}

fn capture_anchors<D: DomAdapter + ?Sized>(dom: &D, el: ElementId, tag: &str) -> AnchorSet {
    let text = dom.text_content(el);
    let text = text.trim();
    AnchorSet {
        role: non_empty(dom.attribute(el, "role")),
        aria_label: non_empty(dom.attribute(el, "aria-label")),
        test_id: non_empty(dom.attribute(el, "data-testid")),
        tag: Some(tag.to_string()),
        id: non_empty(dom.attribute(el, "id")),
        text: (!text.is_empty() && text.chars().count() < ANCHOR_TEXT_MAX)
            .then(|| text.to_string()),
    }
}

fn positional_selector<D: DomAdapter + ?Sized>(
    dom: &D,
    el: ElementId,
    tag: &str,
) -> Option<String> {
    let parent = dom.parent(el)?;
    let parent_tag = dom.tag_name(parent);
    // Anchoring to the document root container would make the selector
    // protected (and worthless after any top-level reshuffle).
    if matches!(parent_tag.as_str(), "body" | "html") {
        return None;
    }
    let index = nth_of_type_index(dom, el)?;
    Some(format!("{parent_tag} > {tag}:nth-of-type({index})"))
}

/// `[name="value"]`, unless the value cannot be quoted in our grammar.
fn attr_selector(name: &str, value: &str) -> Option<String> {
    if value.is_empty() || value.contains('"') {
        return None;
    }
    Some(format!("[{name}=\"{value}\"]"))
}

/// Generated/dynamic-looking ids are useless across re-renders. Accepted
/// ids are lowercase-letter-led and composed of lowercase letters, digits
/// and hyphens only; long hex blobs are rejected even when they fit that
/// alphabet.
fn is_volatile_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_lowercase() => {}
        _ => return true,
    }
    if !bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
    {
        return true;
    }
    bytes.len() >= HASH_TOKEN_MIN && bytes.iter().all(|b| b.is_ascii_hexdigit())
}

/// CSS-module style hashes are single long alphanumeric tokens; anything
/// our selector grammar cannot express (utility-class colons etc.) is
/// equally unusable.
fn is_stable_class(class: &str) -> bool {
    let bytes = class.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    match bytes[0] {
        b if b.is_ascii_alphabetic() || b == b'_' || b == b'-' => {}
        _ => return false,
    }
    if !bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_')
    {
        return false;
    }
    !(bytes.len() >= HASH_TOKEN_MIN && bytes.iter().all(|b| b.is_ascii_alphanumeric()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memdom::MemDom;

    #[test]
    fn test_role_outranks_everything() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let banner = dom.append(body, "div");
        dom.set_attribute(banner, "role", "banner");
        dom.set_attribute(banner, "id", "top");
        dom.set_text(banner, "Ad");

        let out = synthesize(&dom, banner);
        assert_eq!(out.selector, "[role=\"banner\"]");
        assert!(out.alternatives.contains(&"#top".to_string()));
        assert!(is_sound(&dom, banner, &out.selector));
    }

    #[test]
    fn test_aria_label_beats_id() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let nav = dom.append(body, "nav");
        dom.set_attribute(nav, "aria-label", "Primary");
        dom.set_attribute(nav, "id", "nav-root");

        let out = synthesize(&dom, nav);
        assert_eq!(out.selector, "[aria-label=\"Primary\"]");
        assert_eq!(out.alternatives[0], "#nav-root");
    }

    #[test]
    fn test_volatile_ids_are_rejected() {
        assert!(!is_volatile_id("sidebar"));
        assert!(!is_volatile_id("main-nav-2"));
        assert!(is_volatile_id("Sidebar"));
        assert!(is_volatile_id("side_bar"));
        assert!(is_volatile_id("3col"));
        assert!(is_volatile_id(&"deadbeef".repeat(4)));
        assert!(is_volatile_id(""));
    }

    #[test]
    fn test_generated_classes_are_dropped() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let widget = dom.append(body, "div");
        let hash = "a1B2".repeat(8);
        dom.set_attribute(widget, "class", format!("widget {hash} md:flex").as_str());

        let out = synthesize(&dom, widget);
        assert_eq!(out.selector, "div.widget");
    }

    #[test]
    fn test_positional_fallback() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let section = dom.append(body, "section");
        let _first = dom.append(section, "div");
        let second = dom.append(section, "div");

        let out = synthesize(&dom, second);
        assert_eq!(out.selector, "section > div:nth-of-type(2)");
        assert_eq!(out.alternatives, vec!["div".to_string()]);
        assert!(is_sound(&dom, second, &out.selector));
    }

    #[test]
    fn test_bare_tag_when_parent_is_body() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let plain = dom.append(body, "footer");

        let out = synthesize(&dom, plain);
        assert_eq!(out.selector, "footer");
        assert!(out.alternatives.is_empty());
    }

    #[test]
    fn test_anchor_capture() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let promo = dom.append(body, "div");
        dom.set_attribute(promo, "role", "complementary");
        dom.set_attribute(promo, "data-testid", "promo-box");
        dom.set_text(promo, "Subscribe now!");

        let out = synthesize(&dom, promo);
        assert_eq!(out.anchors.role.as_deref(), Some("complementary"));
        assert_eq!(out.anchors.test_id.as_deref(), Some("promo-box"));
        assert_eq!(out.anchors.tag.as_deref(), Some("div"));
        assert_eq!(out.anchors.text.as_deref(), Some("Subscribe now!"));

        // Long text is not anchored.
        let wall = dom.append(body, "article");
        dom.set_text(wall, &"lorem ".repeat(40));
        assert_eq!(synthesize(&dom, wall).anchors.text, None);
    }

    #[test]
    fn test_describe_priority() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let el = dom.append(body, "div");
        dom.set_text(el, "Breaking news ticker");
        assert_eq!(describe_element(&dom, el), "Breaking news ticker");

        dom.set_attribute(el, "role", "marquee");
        dom.set_text(el, &"x".repeat(200));
        assert_eq!(describe_element(&dom, el), "marquee");

        dom.set_attribute(el, "title", "Ticker");
        assert_eq!(describe_element(&dom, el), "Ticker");

        dom.set_attribute(el, "aria-label", "News ticker");
        assert_eq!(describe_element(&dom, el), "News ticker");
    }

    #[test]
    fn test_every_element_gets_a_sound_selector() {
        // Soundness holds for the primary or at least one fallback on a
        // messy document.
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let nav = dom.append(body, "nav");
        dom.set_attribute(nav, "role", "navigation");
        let list = dom.append(nav, "ul");
        for i in 0..4 {
            let li = dom.append(list, "li");
            if i == 2 {
                dom.set_attribute(li, "class", "active");
            }
        }
        let aside = dom.append(body, "aside");
        dom.set_attribute(aside, "id", "Secondary_1");

        for el in dom.query_selector_all("nav, ul, li, aside").unwrap() {
            let out = synthesize(&dom, el);
            let sound = is_sound(&dom, el, &out.selector)
                || out.alternatives.iter().any(|alt| is_sound(&dom, el, alt));
            assert!(sound, "no sound candidate for {}", dom.tag_name(el));
        }
    }
}
