//! Rule value types for PageHush
//!
//! A `Rule` is an immutable instruction to suppress, blank, mute or restyle
//! the elements matching a selector. Rules are created once (by a user pick,
//! a preset, or a suggestion backend), persisted as JSON, and only ever
//! removed - never mutated in place.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::fingerprint;
use crate::selector::SelectorError;

// =============================================================================
// Limits and the protected denylist
// =============================================================================

/// A selector matching more than this many elements is rejected as too broad.
pub const MAX_MATCHED_ELEMENTS: usize = 100;

/// Selectors that may never be targeted: hiding these would take the whole
/// page down with them.
pub const PROTECTED_SELECTORS: &[&str] = &["body", "html", "[role=\"main\"]", "main"];

/// Anchor text is capped at this many characters at capture time.
pub const ANCHOR_TEXT_MAX: usize = 100;

// =============================================================================
// Rule types
// =============================================================================

/// The effect a rule has on its matched elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum RuleType {
    /// `display:none` - removes the element from layout entirely.
    Hide,
    /// `visibility:hidden` - keeps the layout box, avoids reflow.
    Blank,
    /// Stop autoplay, pause playback, freeze animations.
    Mute,
    /// Apply whitelisted style properties.
    Style,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hide => "hide",
            Self::Blank => "blank",
            Self::Mute => "mute",
            Self::Style => "style",
        }
    }
}

// =============================================================================
// Style whitelist
// =============================================================================

/// The closed set of CSS properties a Style rule may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum StyleProperty {
    Opacity,
    Filter,
    BackdropFilter,
    MaxWidth,
    MaxHeight,
    Transform,
}

impl StyleProperty {
    pub const ALL: &'static [StyleProperty] = &[
        Self::Opacity,
        Self::Filter,
        Self::BackdropFilter,
        Self::MaxWidth,
        Self::MaxHeight,
        Self::Transform,
    ];

    /// The CSS property name.
    pub fn css_name(&self) -> &'static str {
        match self {
            Self::Opacity => "opacity",
            Self::Filter => "filter",
            Self::BackdropFilter => "backdrop-filter",
            Self::MaxWidth => "max-width",
            Self::MaxHeight => "max-height",
            Self::Transform => "transform",
        }
    }

    /// Look up a whitelisted property by CSS name.
    pub fn from_css_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.css_name() == name)
    }
}

/// Error type for style-prop construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StyleError {
    #[error("'{0}' is not a whitelisted style property")]
    UnknownProperty(String),
}

/// Whitelisted property/value pairs carried by a Style rule.
///
/// Stored sorted by property so serialization is deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StyleProps(Vec<(StyleProperty, String)>);

impl StyleProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw CSS property names, rejecting anything off-whitelist.
    pub fn from_named<'a, I>(pairs: I) -> Result<Self, StyleError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut props = Self::new();
        for (name, value) in pairs {
            let prop = StyleProperty::from_css_name(name)
                .ok_or_else(|| StyleError::UnknownProperty(name.to_string()))?;
            props.set(prop, value);
        }
        Ok(props)
    }

    /// Set a property, replacing any existing value for it.
    pub fn set(&mut self, prop: StyleProperty, value: &str) {
        match self.0.binary_search_by_key(&prop, |(p, _)| *p) {
            Ok(idx) => self.0[idx].1 = value.to_string(),
            Err(idx) => self.0.insert(idx, (prop, value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (StyleProperty, &str)> {
        self.0.iter().map(|(p, v)| (*p, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// =============================================================================
// Anchors
// =============================================================================

/// Structured metadata captured when a rule is created, so a human (or a
/// suggestion backend) can recognize what the rule was aimed at. Anchors are
/// diagnostics only - matching always goes through the selector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct AnchorSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AnchorSet {
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.aria_label.is_none()
            && self.test_id.is_none()
            && self.tag.is_none()
            && self.id.is_none()
            && self.text.is_none()
    }
}

// =============================================================================
// Rule
// =============================================================================

/// A persisted instruction to suppress elements matching a selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Rule {
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub selector: String,
    #[serde(default, skip_serializing_if = "AnchorSet::is_empty")]
    pub anchors: AnchorSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_props: Option<StyleProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f32>,
}

impl Rule {
    pub fn new(rule_type: RuleType, selector: &str, description: &str) -> Self {
        Self {
            rule_type,
            selector: selector.to_string(),
            anchors: AnchorSet::default(),
            alternatives: Vec::new(),
            description: description.to_string(),
            style_props: None,
            amount: None,
        }
    }

    pub fn hide(selector: &str, description: &str) -> Self {
        Self::new(RuleType::Hide, selector, description)
    }

    pub fn blank(selector: &str, description: &str) -> Self {
        Self::new(RuleType::Blank, selector, description)
    }

    pub fn mute(selector: &str, description: &str) -> Self {
        Self::new(RuleType::Mute, selector, description)
    }

    pub fn style(selector: &str, description: &str, props: StyleProps) -> Self {
        let mut rule = Self::new(RuleType::Style, selector, description);
        rule.style_props = Some(props);
        rule
    }

    pub fn with_anchors(mut self, anchors: AnchorSet) -> Self {
        self.anchors = anchors;
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    /// Stable identity of this rule: the hash of its effect and selector.
    /// Anchors, alternatives and description never influence identity.
    pub fn fingerprint(&self) -> u64 {
        fingerprint::fingerprint(&format!("{}|{}", self.rule_type.as_str(), self.selector))
    }

    /// The marker token recorded on elements this rule has been applied to.
    pub fn marker(&self) -> String {
        fingerprint::hex_token(self.fingerprint())
    }
}

// =============================================================================
// Rule sets
// =============================================================================

/// The ordered rules persisted for one host + path pattern.
/// Insertion order is application order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RuleSet {
    pub host: String,
    pub path_pattern: String,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(host: &str, path_pattern: &str) -> Self {
        Self {
            host: host.to_string(),
            path_pattern: path_pattern.to_string(),
            rules: Vec::new(),
        }
    }

    /// Append a rule, keeping at most one rule per (type, selector) pair.
    /// A duplicate keeps its original position in the order.
    pub fn push(&mut self, rule: Rule) {
        let fp = rule.fingerprint();
        if !self.rules.iter().any(|r| r.fingerprint() == fp) {
            self.rules.push(rule);
        }
    }

    /// Drop every rule targeting the given selector.
    pub fn remove_selector(&mut self, selector: &str) {
        self.rules.retain(|r| r.selector != selector);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Why a candidate rule was rejected before any DOM mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("selector matches {0} elements (limit 100)")]
    TooBroad(usize),
    #[error("selector targets protected page structure: {0}")]
    ProtectedTarget(String),
    #[error(transparent)]
    BadSelector(#[from] SelectorError),
    #[error("document rejected selector: {0}")]
    QueryFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_type_round_trip() {
        let json = serde_json::to_string(&RuleType::Hide).unwrap();
        assert_eq!(json, "\"hide\"");
        assert_eq!(
            serde_json::from_str::<RuleType>("\"blank\"").unwrap(),
            RuleType::Blank
        );
    }

    #[test]
    fn test_style_whitelist() {
        assert_eq!(
            StyleProperty::from_css_name("backdrop-filter"),
            Some(StyleProperty::BackdropFilter)
        );
        assert_eq!(StyleProperty::from_css_name("position"), None);

        let props = StyleProps::from_named([("opacity", "0.2"), ("max-height", "40px")]).unwrap();
        assert_eq!(props.len(), 2);

        let err = StyleProps::from_named([("display", "none")]).unwrap_err();
        assert_eq!(err, StyleError::UnknownProperty("display".to_string()));
    }

    #[test]
    fn test_style_props_set_replaces() {
        let mut props = StyleProps::new();
        props.set(StyleProperty::Opacity, "0.5");
        props.set(StyleProperty::Opacity, "0.1");
        assert_eq!(props.len(), 1);
        assert_eq!(props.iter().next(), Some((StyleProperty::Opacity, "0.1")));
    }

    #[test]
    fn test_rule_fingerprint_stability() {
        let a = Rule::hide("#secondary", "sidebar");
        let mut b = Rule::hide("#secondary", "totally different description");
        b.alternatives.push("aside".to_string());
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = Rule::blank("#secondary", "sidebar");
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_rule_serde_shape() {
        let rule = Rule::hide("[role=\"banner\"]", "Top banner");
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "hide");
        assert_eq!(json["selector"], "[role=\"banner\"]");
        // Empty optional fields stay off the wire.
        assert!(json.get("anchors").is_none());
        assert!(json.get("styleProps").is_none());

        let back: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_ruleset_dedup_preserves_order() {
        let mut set = RuleSet::new("example.com", "/news/*");
        set.push(Rule::hide(".ad", "ads"));
        set.push(Rule::hide("#promo", "promo"));
        set.push(Rule::hide(".ad", "ads again"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.rules[0].selector, ".ad");
        assert_eq!(set.rules[1].selector, "#promo");

        set.remove_selector(".ad");
        assert_eq!(set.len(), 1);
        assert_eq!(set.rules[0].selector, "#promo");
    }
}
