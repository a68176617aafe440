//! Rule application and undo
//!
//! The applicator is the only component that mutates foreign page elements.
//! Every mutation is gated on an idempotency marker and recorded in the
//! applied-element registry with enough prior state to be exactly reversed:
//! a rule can always be undone, and applying it twice is a no-op.
//!
//! The registry is keyed by an engine-assigned id written onto the element
//! (`data-ph-id`), not by holding element handles alive: entries for
//! elements that leave the document are dropped by [`RuleApplicator::sweep`]
//! without pinning anything in memory.

use std::collections::HashMap;

use ph_core::selector::SelectorList;
use ph_core::types::{Rule, RuleType, ValidationError, MAX_MATCHED_ELEMENTS};

use crate::dom::{is_engine_ui, DomAdapter, DomError, ElementId, InlineStyle};

/// Marker attribute: space-separated tokens of the rules applied to an
/// element. The token for a rule is [`Rule::marker`].
pub const MARKER_ATTR: &str = "data-ph-mark";

/// Registry-key attribute assigned to affected elements.
pub const REGISTRY_ATTR: &str = "data-ph-id";

// =============================================================================
// Errors
// =============================================================================

/// Error type for apply-time failures. Callers running rule batches treat
/// these as skip-and-log, never as fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("document rejected selector: {0}")]
    Query(String),
}

impl From<DomError> for ApplyError {
    fn from(err: DomError) -> Self {
        Self::Query(err.to_string())
    }
}

// =============================================================================
// Applied-state bookkeeping
// =============================================================================

#[derive(Debug, Clone)]
struct SavedStyle {
    prop: String,
    prior: Option<InlineStyle>,
}

#[derive(Debug, Clone)]
struct SavedAttr {
    name: String,
    prior: Option<String>,
}

/// Everything one rule did to one element.
#[derive(Debug, Clone)]
struct AppliedEffect {
    fingerprint: u64,
    rule: Rule,
    saved_styles: Vec<SavedStyle>,
    saved_attrs: Vec<SavedAttr>,
}

/// Registry entry for one affected element.
#[derive(Debug, Clone)]
struct ElementEntry {
    element: ElementId,
    effects: Vec<AppliedEffect>,
}

// =============================================================================
// RuleApplicator
// =============================================================================

/// Applies and reverses rules against a live document.
#[derive(Default)]
pub struct RuleApplicator {
    registry: HashMap<String, ElementEntry>,
    next_key: u64,
}

impl RuleApplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject a rule before it touches the DOM: malformed selector,
    /// protected target, or too broad a match.
    pub fn validate<D: DomAdapter + ?Sized>(
        &self,
        dom: &D,
        rule: &Rule,
    ) -> Result<(), ValidationError> {
        let list = SelectorList::parse(&rule.selector)?;
        if let Some(entry) = list.targets_protected() {
            return Err(ValidationError::ProtectedTarget(entry.to_string()));
        }
        let matched = dom
            .query_selector_all(&rule.selector)
            .map_err(|e| ValidationError::QueryFailed(e.to_string()))?;
        if matched.len() > MAX_MATCHED_ELEMENTS {
            return Err(ValidationError::TooBroad(matched.len()));
        }
        Ok(())
    }

    /// Apply a rule to every current match it has not yet touched.
    /// Returns the count of newly-affected elements.
    pub fn apply<D: DomAdapter + ?Sized>(
        &mut self,
        dom: &mut D,
        rule: &Rule,
    ) -> Result<usize, ApplyError> {
        SelectorList::parse(&rule.selector).map_err(ValidationError::from)?;

        if rule.rule_type == RuleType::Style
            && rule.style_props.as_ref().map_or(true, |p| p.is_empty())
        {
            return Ok(0);
        }

        let marker = rule.marker();
        let fingerprint = rule.fingerprint();
        let matches = dom.query_selector_all(&rule.selector)?;
        let mut affected = 0usize;

        for el in matches {
            if is_engine_ui(dom, el) {
                continue;
            }
            if has_marker(dom, el, &marker) {
                continue;
            }

            let effect = self.run_effect(dom, el, rule, fingerprint);
            add_marker(dom, el, &marker);
            self.record(dom, el, effect);
            affected += 1;
        }

        Ok(affected)
    }

    /// Reverse everything a rule did to elements it is recorded against.
    /// Returns the number of elements restored.
    pub fn undo<D: DomAdapter + ?Sized>(&mut self, dom: &mut D, selector: &str) -> usize {
        let keys: Vec<String> = self
            .registry
            .iter()
            .filter(|(_, entry)| entry.effects.iter().any(|e| e.rule.selector == selector))
            .map(|(key, _)| key.clone())
            .collect();

        let mut restored = 0usize;
        for key in keys {
            let Some(entry) = self.registry.get_mut(&key) else {
                continue;
            };
            let element = entry.element;
            let mut removed: Vec<AppliedEffect> = Vec::new();
            // Reverse application order within the element.
            for i in (0..entry.effects.len()).rev() {
                if entry.effects[i].rule.selector == selector {
                    removed.push(entry.effects.remove(i));
                }
            }
            let emptied = entry.effects.is_empty();
            if dom.contains(element) {
                for effect in &removed {
                    restore_effect(dom, element, effect);
                    remove_marker(dom, element, &ph_core::fingerprint::hex_token(effect.fingerprint));
                }
                if emptied {
                    dom.remove_attribute(element, REGISTRY_ATTR);
                }
            }
            if emptied {
                self.registry.remove(&key);
            }
            restored += 1;
        }
        restored
    }

    /// Restore every tracked element and clear all bookkeeping.
    pub fn reset_all<D: DomAdapter + ?Sized>(&mut self, dom: &mut D) -> usize {
        let mut restored = 0usize;
        let entries: Vec<ElementEntry> = self.registry.drain().map(|(_, e)| e).collect();
        for entry in entries {
            if !dom.contains(entry.element) {
                continue;
            }
            for effect in entry.effects.iter().rev() {
                restore_effect(dom, entry.element, effect);
            }
            dom.remove_attribute(entry.element, MARKER_ATTR);
            dom.remove_attribute(entry.element, REGISTRY_ATTR);
            restored += 1;
        }
        restored
    }

    /// Drop registry entries whose element has left the document. Their
    /// state died with the element; holding the record would only leak.
    pub fn sweep<D: DomAdapter + ?Sized>(&mut self, dom: &D) -> usize {
        let before = self.registry.len();
        self.registry.retain(|_, entry| dom.contains(entry.element));
        before - self.registry.len()
    }

    /// Rules currently holding at least one element, with affected counts.
    /// Order is unspecified.
    pub fn active_rules(&self) -> Vec<(Rule, usize)> {
        let mut by_fp: HashMap<u64, (Rule, usize)> = HashMap::new();
        for entry in self.registry.values() {
            for effect in &entry.effects {
                by_fp
                    .entry(effect.fingerprint)
                    .or_insert_with(|| (effect.rule.clone(), 0))
                    .1 += 1;
            }
        }
        by_fp.into_values().collect()
    }

    /// Number of elements currently tracked.
    pub fn tracked_elements(&self) -> usize {
        self.registry.len()
    }

    // -------------------------------------------------------------------------
    // Effects
    // -------------------------------------------------------------------------

    fn run_effect<D: DomAdapter + ?Sized>(
        &mut self,
        dom: &mut D,
        el: ElementId,
        rule: &Rule,
        fingerprint: u64,
    ) -> AppliedEffect {
        let mut saved_styles = Vec::new();
        let mut saved_attrs = Vec::new();

        let mut set = |dom: &mut D, saved: &mut Vec<SavedStyle>, prop: &str, value: &str| {
            saved.push(SavedStyle {
                prop: prop.to_string(),
                prior: dom.style_value(el, prop),
            });
            dom.set_style(el, prop, value, true);
        };

        match rule.rule_type {
            RuleType::Hide => {
                set(dom, &mut saved_styles, "display", "none");
            }
            RuleType::Blank => {
                set(dom, &mut saved_styles, "visibility", "hidden");
            }
            RuleType::Mute => {
                saved_attrs.push(SavedAttr {
                    name: "autoplay".to_string(),
                    prior: dom.attribute(el, "autoplay"),
                });
                dom.remove_attribute(el, "autoplay");
                if dom.is_media(el) {
                    dom.pause_media(el);
                }
                set(dom, &mut saved_styles, "animation", "none");
                set(dom, &mut saved_styles, "transition", "none");
            }
            RuleType::Style => {
                if let Some(props) = &rule.style_props {
                    for (prop, value) in props.iter() {
                        set(dom, &mut saved_styles, prop.css_name(), value);
                    }
                }
            }
        }

        AppliedEffect {
            fingerprint,
            rule: rule.clone(),
            saved_styles,
            saved_attrs,
        }
    }

    fn record<D: DomAdapter + ?Sized>(
        &mut self,
        dom: &mut D,
        el: ElementId,
        effect: AppliedEffect,
    ) {
        let key = match dom.attribute(el, REGISTRY_ATTR) {
            Some(key) if self.registry.contains_key(&key) => key,
            _ => {
                self.next_key += 1;
                let key = format!("ph-{:x}", self.next_key);
                dom.set_attribute(el, REGISTRY_ATTR, &key);
                self.registry.insert(
                    key.clone(),
                    ElementEntry {
                        element: el,
                        effects: Vec::new(),
                    },
                );
                key
            }
        };
        if let Some(entry) = self.registry.get_mut(&key) {
            entry.element = el;
            entry.effects.push(effect);
        }
    }
}

fn restore_effect<D: DomAdapter + ?Sized>(dom: &mut D, el: ElementId, effect: &AppliedEffect) {
    for saved in effect.saved_styles.iter().rev() {
        match &saved.prior {
            Some(style) => dom.set_style(el, &saved.prop, &style.value, style.important),
            None => dom.remove_style(el, &saved.prop),
        }
    }
    for saved in effect.saved_attrs.iter().rev() {
        match &saved.prior {
            Some(value) => dom.set_attribute(el, &saved.name, value),
            None => dom.remove_attribute(el, &saved.name),
        }
    }
}

// =============================================================================
// Marker handling
// =============================================================================

fn has_marker<D: DomAdapter + ?Sized>(dom: &D, el: ElementId, token: &str) -> bool {
    dom.attribute(el, MARKER_ATTR)
        .is_some_and(|value| value.split_whitespace().any(|t| t == token))
}

fn add_marker<D: DomAdapter + ?Sized>(dom: &mut D, el: ElementId, token: &str) {
    match dom.attribute(el, MARKER_ATTR) {
        Some(value) if !value.is_empty() => {
            dom.set_attribute(el, MARKER_ATTR, &format!("{value} {token}"));
        }
        _ => dom.set_attribute(el, MARKER_ATTR, token),
    }
}

fn remove_marker<D: DomAdapter + ?Sized>(dom: &mut D, el: ElementId, token: &str) {
    let Some(value) = dom.attribute(el, MARKER_ATTR) else {
        return;
    };
    let remaining: Vec<&str> = value.split_whitespace().filter(|t| *t != token).collect();
    if remaining.is_empty() {
        dom.remove_attribute(el, MARKER_ATTR);
    } else {
        dom.set_attribute(el, MARKER_ATTR, &remaining.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memdom::MemDom;
    use ph_core::types::StyleProps;

    fn dom_with_sidebar() -> (MemDom, ElementId) {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let aside = dom.append(body, "aside");
        dom.set_attribute(aside, "id", "secondary");
        (dom, aside)
    }

    #[test]
    fn test_hide_apply_and_undo() {
        let (mut dom, aside) = dom_with_sidebar();
        let mut applicator = RuleApplicator::new();
        let rule = Rule::hide("#secondary", "sidebar");

        let count = applicator.apply(&mut dom, &rule).unwrap();
        assert_eq!(count, 1);
        let style = dom.style_value(aside, "display").unwrap();
        assert_eq!(style.value, "none");
        assert!(style.important);
        assert!(dom.attribute(aside, MARKER_ATTR).is_some());
        assert!(dom.attribute(aside, REGISTRY_ATTR).is_some());

        let restored = applicator.undo(&mut dom, "#secondary");
        assert_eq!(restored, 1);
        assert_eq!(dom.style_value(aside, "display"), None);
        assert_eq!(dom.attribute(aside, MARKER_ATTR), None);
        assert_eq!(dom.attribute(aside, REGISTRY_ATTR), None);
        assert_eq!(applicator.tracked_elements(), 0);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let (mut dom, aside) = dom_with_sidebar();
        let mut applicator = RuleApplicator::new();
        let rule = Rule::hide("#secondary", "sidebar");

        assert_eq!(applicator.apply(&mut dom, &rule).unwrap(), 1);
        let marker_before = dom.attribute(aside, MARKER_ATTR);
        assert_eq!(applicator.apply(&mut dom, &rule).unwrap(), 0);
        assert_eq!(dom.attribute(aside, MARKER_ATTR), marker_before);
        assert_eq!(applicator.tracked_elements(), 1);
    }

    #[test]
    fn test_validate_too_broad() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        for _ in 0..150 {
            dom.append(body, "div");
        }
        let applicator = RuleApplicator::new();
        let rule = Rule::hide("div", "everything");

        assert_eq!(
            applicator.validate(&dom, &rule),
            Err(ValidationError::TooBroad(150))
        );
        // No DOM mutation happened.
        assert!(dom.query_selector_all("[data-ph-mark]").unwrap().is_empty());
    }

    #[test]
    fn test_validate_protected_targets() {
        let (dom, _) = dom_with_sidebar();
        let applicator = RuleApplicator::new();
        let mut cases: Vec<&str> = ph_core::types::PROTECTED_SELECTORS.to_vec();
        cases.push("body > aside");
        for selector in cases {
            let err = applicator
                .validate(&dom, &Rule::hide(selector, "nope"))
                .unwrap_err();
            assert!(
                matches!(err, ValidationError::ProtectedTarget(_)),
                "{selector} should be protected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_malformed_selector_is_an_error_not_a_panic() {
        let (mut dom, _) = dom_with_sidebar();
        let mut applicator = RuleApplicator::new();
        let rule = Rule::hide("div {", "broken");
        assert!(applicator.apply(&mut dom, &rule).is_err());
    }

    #[test]
    fn test_blank_keeps_display() {
        let (mut dom, aside) = dom_with_sidebar();
        let mut applicator = RuleApplicator::new();
        applicator
            .apply(&mut dom, &Rule::blank("#secondary", "sidebar"))
            .unwrap();
        assert_eq!(dom.style_value(aside, "visibility").unwrap().value, "hidden");
        assert_eq!(dom.style_value(aside, "display"), None);
    }

    #[test]
    fn test_mute_media() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let video = dom.append(body, "video");
        dom.set_attribute(video, "id", "hero-video");
        dom.set_attribute(video, "autoplay", "");
        dom.set_media_playing(video, true);

        let mut applicator = RuleApplicator::new();
        applicator
            .apply(&mut dom, &Rule::mute("#hero-video", "hero video"))
            .unwrap();
        assert_eq!(dom.attribute(video, "autoplay"), None);
        assert_eq!(dom.media_playing(video), Some(false));
        assert_eq!(dom.style_value(video, "animation").unwrap().value, "none");
        assert_eq!(dom.style_value(video, "transition").unwrap().value, "none");

        applicator.undo(&mut dom, "#hero-video");
        // The autoplay attribute comes back; playback stays paused.
        assert_eq!(dom.attribute(video, "autoplay"), Some(String::new()));
        assert_eq!(dom.style_value(video, "animation"), None);
        assert_eq!(dom.media_playing(video), Some(false));
    }

    #[test]
    fn test_style_rule_restores_prior_inline_value() {
        let (mut dom, aside) = dom_with_sidebar();
        dom.set_style(aside, "opacity", "0.9", false);

        let mut applicator = RuleApplicator::new();
        let props = StyleProps::from_named([("opacity", "0.2"), ("max-height", "120px")]).unwrap();
        let rule = Rule::style("#secondary", "dim sidebar", props);
        applicator.apply(&mut dom, &rule).unwrap();

        let opacity = dom.style_value(aside, "opacity").unwrap();
        assert_eq!(opacity.value, "0.2");
        assert!(opacity.important);

        applicator.undo(&mut dom, "#secondary");
        let opacity = dom.style_value(aside, "opacity").unwrap();
        assert_eq!(opacity.value, "0.9");
        assert!(!opacity.important);
        assert_eq!(dom.style_value(aside, "max-height"), None);
    }

    #[test]
    fn test_style_rule_without_props_is_a_noop() {
        let (mut dom, aside) = dom_with_sidebar();
        let mut applicator = RuleApplicator::new();
        let rule = Rule::new(RuleType::Style, "#secondary", "empty");
        assert_eq!(applicator.apply(&mut dom, &rule).unwrap(), 0);
        assert_eq!(dom.attribute(aside, MARKER_ATTR), None);
    }

    #[test]
    fn test_engine_ui_is_never_touched() {
        let mut dom = MemDom::new();
        let toolbar = dom.create_ui_element("div");
        let button = dom.append(toolbar, "button");
        dom.set_attribute(button, "class", "ad");

        let mut applicator = RuleApplicator::new();
        let count = applicator
            .apply(&mut dom, &Rule::hide(".ad", "ads"))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(dom.style_value(button, "display"), None);
    }

    #[test]
    fn test_two_rules_share_an_element() {
        let (mut dom, aside) = dom_with_sidebar();
        let mut applicator = RuleApplicator::new();
        let blank = Rule::blank("#secondary", "blank it");
        let mut props = StyleProps::new();
        props.set(ph_core::types::StyleProperty::Opacity, "0.5");
        let dim = Rule::style("aside", "dim it", props);

        applicator.apply(&mut dom, &blank).unwrap();
        applicator.apply(&mut dom, &dim).unwrap();
        let markers = dom.attribute(aside, MARKER_ATTR).unwrap();
        assert_eq!(markers.split_whitespace().count(), 2);
        assert_eq!(applicator.tracked_elements(), 1);

        applicator.undo(&mut dom, "aside");
        assert_eq!(dom.style_value(aside, "opacity"), None);
        // The blank rule is still in force.
        assert_eq!(dom.style_value(aside, "visibility").unwrap().value, "hidden");
        assert_eq!(dom.attribute(aside, MARKER_ATTR).unwrap(), blank.marker());
    }

    #[test]
    fn test_reset_all() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let a = dom.append(body, "div");
        dom.set_attribute(a, "class", "ad");
        let b = dom.append(body, "div");
        dom.set_attribute(b, "class", "promo");

        let mut applicator = RuleApplicator::new();
        applicator.apply(&mut dom, &Rule::hide(".ad", "ads")).unwrap();
        applicator.apply(&mut dom, &Rule::hide(".promo", "promos")).unwrap();

        assert_eq!(applicator.reset_all(&mut dom), 2);
        for el in [a, b] {
            assert_eq!(dom.style_value(el, "display"), None);
            assert_eq!(dom.attribute(el, MARKER_ATTR), None);
        }
        assert_eq!(applicator.tracked_elements(), 0);
    }

    #[test]
    fn test_sweep_drops_departed_elements() {
        let (mut dom, aside) = dom_with_sidebar();
        let mut applicator = RuleApplicator::new();
        applicator
            .apply(&mut dom, &Rule::hide("#secondary", "sidebar"))
            .unwrap();
        dom.detach(aside);
        assert_eq!(applicator.sweep(&dom), 1);
        assert_eq!(applicator.tracked_elements(), 0);
    }

    #[test]
    fn test_round_trip_restores_baseline() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let target = dom.append(body, "section");
        dom.set_attribute(target, "id", "stack");
        dom.set_style(target, "max-width", "900px", false);

        let baseline = dom.style_snapshot(target);

        let mut applicator = RuleApplicator::new();
        let rules = [
            Rule::blank("#stack", "one"),
            Rule::style(
                "#stack",
                "two",
                StyleProps::from_named([("max-width", "10px"), ("opacity", "0")]).unwrap(),
            ),
            Rule::mute("#stack", "three"),
        ];
        for rule in &rules {
            applicator.apply(&mut dom, rule).unwrap();
        }
        for rule in rules.iter().rev() {
            applicator.undo(&mut dom, &rule.selector);
        }

        assert_eq!(dom.style_snapshot(target), baseline);
        assert_eq!(dom.attribute(target, MARKER_ATTR), None);
        assert_eq!(dom.attribute(target, REGISTRY_ATTR), None);
    }
}
