//! Arena-backed in-memory DOM
//!
//! `MemDom` implements [`DomAdapter`] over a node arena with a selector
//! matcher driven by the `ph-core` AST. It exists so the whole engine can be
//! exercised without a browser: every test in this workspace and the CLI
//! `preview` command run against it.
//!
//! Semantics mirror the parts of a real document the engine relies on:
//! document-order queries, live nth-of-type positions, inline style
//! priority, and detachment (a removed subtree stops matching but its
//! handles stay resolvable for bookkeeping teardown).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ph_core::selector::{Combinator, ComplexSelector, CompoundSelector, SelectorList};

use crate::dom::{DomAdapter, DomError, ElementId, InlineStyle, UI_MARKER_ATTR};

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    /// Inline declarations in insertion order, like a style="" attribute.
    styles: Vec<(String, InlineStyle)>,
    parent: Option<usize>,
    children: Vec<usize>,
    text: String,
    /// Some for audio/video nodes.
    media: Option<MediaState>,
    detached: bool,
}

#[derive(Debug, Clone, Default)]
struct MediaState {
    playing: bool,
}

impl Node {
    fn new(tag: &str, parent: Option<usize>) -> Self {
        let tag = tag.to_ascii_lowercase();
        let media = matches!(tag.as_str(), "audio" | "video").then(MediaState::default);
        Self {
            tag,
            attrs: BTreeMap::new(),
            styles: Vec::new(),
            parent,
            children: Vec::new(),
            text: String::new(),
            media,
            detached: false,
        }
    }
}

// =============================================================================
// MemDom
// =============================================================================

/// In-memory document. Node 0 is `<html>`, node 1 is `<body>`.
pub struct MemDom {
    nodes: Vec<Node>,
}

const HTML: usize = 0;
const BODY: usize = 1;

impl Default for MemDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemDom {
    pub fn new() -> Self {
        let mut dom = Self { nodes: Vec::new() };
        dom.nodes.push(Node::new("html", None));
        dom.nodes.push(Node::new("body", Some(HTML)));
        dom.nodes[HTML].children.push(BODY);
        dom
    }

    /// Build a document from a serialized page description (CLI preview).
    /// A top-level `body` spec contributes its children; anything else is
    /// appended to the body as-is.
    pub fn from_spec(spec: &DomSpec) -> Self {
        let mut dom = Self::new();
        if spec.tag.eq_ignore_ascii_case("body") {
            for (name, value) in &spec.attrs {
                dom.nodes[BODY].attrs.insert(name.clone(), value.clone());
            }
            for child in &spec.children {
                dom.append_spec(ElementId::from_raw(BODY as u64), child);
            }
        } else {
            dom.append_spec(ElementId::from_raw(BODY as u64), spec);
        }
        dom
    }

    fn append_spec(&mut self, parent: ElementId, spec: &DomSpec) -> ElementId {
        let el = self.append(parent, &spec.tag);
        for (name, value) in &spec.attrs {
            self.set_attribute(el, name, value);
        }
        if let Some(text) = &spec.text {
            self.set_text(el, text);
        }
        for child in &spec.children {
            self.append_spec(el, child);
        }
        el
    }

    pub fn html(&self) -> ElementId {
        ElementId::from_raw(HTML as u64)
    }

    /// Append a new element under a parent.
    pub fn append(&mut self, parent: ElementId, tag: &str) -> ElementId {
        let parent_idx = self.index(parent);
        let idx = self.nodes.len();
        self.nodes.push(Node::new(tag, Some(parent_idx)));
        self.nodes[parent_idx].children.push(idx);
        ElementId::from_raw(idx as u64)
    }

    /// Detach a subtree. Handles into it stay resolvable but the subtree
    /// stops matching queries and `contains` reports false.
    pub fn detach(&mut self, el: ElementId) {
        let idx = self.index(el);
        if let Some(parent) = self.nodes[idx].parent {
            self.nodes[parent].children.retain(|&c| c != idx);
        }
        self.nodes[idx].parent = None;
        self.mark_detached(idx);
    }

    fn mark_detached(&mut self, idx: usize) {
        self.nodes[idx].detached = true;
        let children = self.nodes[idx].children.clone();
        for child in children {
            self.mark_detached(child);
        }
    }

    /// Test hook: put a media element into the "playing" state.
    pub fn set_media_playing(&mut self, el: ElementId, playing: bool) {
        let idx = self.index(el);
        if let Some(media) = &mut self.nodes[idx].media {
            media.playing = playing;
        }
    }

    /// Test hook: is the media element currently playing?
    pub fn media_playing(&self, el: ElementId) -> Option<bool> {
        self.nodes[self.index(el)].media.as_ref().map(|m| m.playing)
    }

    /// Snapshot of an element's inline declarations, for restore assertions.
    pub fn style_snapshot(&self, el: ElementId) -> Vec<(String, String, bool)> {
        self.nodes[self.index(el)]
            .styles
            .iter()
            .map(|(prop, style)| (prop.clone(), style.value.clone(), style.important))
            .collect()
    }

    fn index(&self, el: ElementId) -> usize {
        let idx = el.raw() as usize;
        assert!(idx < self.nodes.len(), "foreign element handle");
        idx
    }

    fn attached(&self, idx: usize) -> bool {
        !self.nodes[idx].detached
    }

    /// All attached element indices in document order.
    fn document_order(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![HTML];
        while let Some(idx) = stack.pop() {
            out.push(idx);
            for &child in self.nodes[idx].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    // -------------------------------------------------------------------------
    // Selector matching
    // -------------------------------------------------------------------------

    fn matches_list(&self, idx: usize, list: &SelectorList) -> bool {
        list.selectors.iter().any(|c| self.matches_complex(idx, c))
    }

    fn matches_complex(&self, idx: usize, complex: &ComplexSelector) -> bool {
        if !self.matches_compound(idx, complex.target()) {
            return false;
        }
        // Walk the remaining compounds right-to-left up the ancestor chain,
        // backtracking over descendant combinators.
        let compounds: Vec<&CompoundSelector> = complex.compounds().collect();
        let combinators: Vec<Combinator> = complex.rest.iter().map(|(c, _)| *c).collect();
        self.matches_upward(idx, &compounds, &combinators, compounds.len() - 1)
    }

    fn matches_upward(
        &self,
        idx: usize,
        compounds: &[&CompoundSelector],
        combinators: &[Combinator],
        pos: usize,
    ) -> bool {
        if pos == 0 {
            return true;
        }
        // combinators[pos - 1] links compounds[pos] to compounds[pos - 1].
        let needed = compounds[pos - 1];
        match combinators[pos - 1] {
            Combinator::Child => match self.nodes[idx].parent {
                Some(parent) => {
                    self.matches_compound(parent, needed)
                        && self.matches_upward(parent, compounds, combinators, pos - 1)
                }
                None => false,
            },
            Combinator::Descendant => {
                let mut current = self.nodes[idx].parent;
                while let Some(ancestor) = current {
                    if self.matches_compound(ancestor, needed)
                        && self.matches_upward(ancestor, compounds, combinators, pos - 1)
                    {
                        return true;
                    }
                    current = self.nodes[ancestor].parent;
                }
                false
            }
        }
    }

    fn matches_compound(&self, idx: usize, compound: &CompoundSelector) -> bool {
        let node = &self.nodes[idx];

        if let Some(tag) = &compound.tag {
            if node.tag != *tag {
                return false;
            }
        }
        if let Some(id) = &compound.id {
            if node.attrs.get("id") != Some(id) {
                return false;
            }
        }
        if !compound.classes.is_empty() {
            let classes = self.node_classes(idx);
            if !compound.classes.iter().all(|c| classes.iter().any(|n| n == c)) {
                return false;
            }
        }
        for attr in &compound.attrs {
            match node.attrs.get(&attr.name) {
                Some(value) => {
                    if let Some(expected) = &attr.value {
                        if value != expected {
                            return false;
                        }
                    }
                }
                None => return false,
            }
        }
        if let Some(n) = compound.nth_of_type {
            match self.type_position(idx) {
                Some(position) if position == n => {}
                _ => return false,
            }
        }
        true
    }

    fn node_classes(&self, idx: usize) -> Vec<String> {
        self.nodes[idx]
            .attrs
            .get("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn type_position(&self, idx: usize) -> Option<u32> {
        let parent = self.nodes[idx].parent?;
        let tag = &self.nodes[idx].tag;
        let mut position = 0u32;
        for &sibling in &self.nodes[parent].children {
            if self.nodes[sibling].tag == *tag {
                position += 1;
            }
            if sibling == idx {
                return Some(position);
            }
        }
        None
    }
}

// =============================================================================
// DomAdapter implementation
// =============================================================================

impl DomAdapter for MemDom {
    fn body(&self) -> Option<ElementId> {
        Some(ElementId::from_raw(BODY as u64))
    }

    fn contains(&self, el: ElementId) -> bool {
        let idx = el.raw() as usize;
        idx < self.nodes.len() && self.attached(idx)
    }

    fn parent(&self, el: ElementId) -> Option<ElementId> {
        self.nodes[self.index(el)]
            .parent
            .map(|idx| ElementId::from_raw(idx as u64))
    }

    fn children(&self, el: ElementId) -> Vec<ElementId> {
        self.nodes[self.index(el)]
            .children
            .iter()
            .map(|&idx| ElementId::from_raw(idx as u64))
            .collect()
    }

    fn tag_name(&self, el: ElementId) -> String {
        self.nodes[self.index(el)].tag.clone()
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>, DomError> {
        let list = SelectorList::parse(selector)
            .map_err(|e| DomError::InvalidSelector(e.to_string()))?;
        Ok(self
            .document_order()
            .into_iter()
            .filter(|&idx| self.matches_list(idx, &list))
            .map(|idx| ElementId::from_raw(idx as u64))
            .collect())
    }

    fn attribute(&self, el: ElementId, name: &str) -> Option<String> {
        self.nodes[self.index(el)].attrs.get(name).cloned()
    }

    fn set_attribute(&mut self, el: ElementId, name: &str, value: &str) {
        let idx = self.index(el);
        self.nodes[idx].attrs.insert(name.to_string(), value.to_string());
    }

    fn remove_attribute(&mut self, el: ElementId, name: &str) {
        let idx = self.index(el);
        self.nodes[idx].attrs.remove(name);
    }

    fn classes(&self, el: ElementId) -> Vec<String> {
        self.node_classes(self.index(el))
    }

    fn style_value(&self, el: ElementId, prop: &str) -> Option<InlineStyle> {
        self.nodes[self.index(el)]
            .styles
            .iter()
            .find(|(p, _)| p == prop)
            .map(|(_, style)| style.clone())
    }

    fn set_style(&mut self, el: ElementId, prop: &str, value: &str, important: bool) {
        let idx = self.index(el);
        let style = InlineStyle {
            value: value.to_string(),
            important,
        };
        match self.nodes[idx].styles.iter_mut().find(|(p, _)| p == prop) {
            Some((_, existing)) => *existing = style,
            None => self.nodes[idx].styles.push((prop.to_string(), style)),
        }
    }

    fn remove_style(&mut self, el: ElementId, prop: &str) {
        let idx = self.index(el);
        self.nodes[idx].styles.retain(|(p, _)| p != prop);
    }

    fn text_content(&self, el: ElementId) -> String {
        let idx = self.index(el);
        let mut out = String::new();
        self.collect_text(idx, &mut out);
        out
    }

    fn is_media(&self, el: ElementId) -> bool {
        self.nodes[self.index(el)].media.is_some()
    }

    fn pause_media(&mut self, el: ElementId) {
        let idx = self.index(el);
        if let Some(media) = &mut self.nodes[idx].media {
            media.playing = false;
        }
    }

    fn create_ui_element(&mut self, tag: &str) -> ElementId {
        let body = ElementId::from_raw(BODY as u64);
        let el = self.append(body, tag);
        self.set_attribute(el, UI_MARKER_ATTR, "");
        el
    }

    fn append_ui_child(&mut self, parent: ElementId, tag: &str) -> ElementId {
        let el = self.append(parent, tag);
        self.set_attribute(el, UI_MARKER_ATTR, "");
        el
    }

    fn set_text(&mut self, el: ElementId, text: &str) {
        let idx = self.index(el);
        self.nodes[idx].text = text.to_string();
    }

    fn remove_element(&mut self, el: ElementId) {
        self.detach(el);
    }
}

impl MemDom {
    fn collect_text(&self, idx: usize, out: &mut String) {
        out.push_str(&self.nodes[idx].text);
        for &child in &self.nodes[idx].children {
            self.collect_text(child, out);
        }
    }
}

// =============================================================================
// Serialized page descriptions
// =============================================================================

/// A JSON-friendly description of a page subtree, used as input to the CLI
/// `preview` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DomSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (MemDom, ElementId, ElementId, ElementId) {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let aside = dom.append(body, "aside");
        dom.set_attribute(aside, "id", "secondary");
        let ad = dom.append(aside, "div");
        dom.set_attribute(ad, "class", "ad banner");
        let article = dom.append(body, "article");
        (dom, aside, ad, article)
    }

    #[test]
    fn test_query_by_tag_and_id() {
        let (dom, aside, ad, article) = sample();
        assert_eq!(dom.query_selector_all("#secondary").unwrap(), vec![aside]);
        assert_eq!(dom.query_selector_all("div.ad").unwrap(), vec![ad]);
        assert_eq!(dom.query_selector_all("article").unwrap(), vec![article]);
        assert!(dom.query_selector_all(".missing").unwrap().is_empty());
    }

    #[test]
    fn test_query_invalid_selector() {
        let (dom, ..) = sample();
        assert!(matches!(
            dom.query_selector_all("div {"),
            Err(DomError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_combinator_matching() {
        let (dom, _, ad, _) = sample();
        assert_eq!(dom.query_selector_all("aside > .ad").unwrap(), vec![ad]);
        assert_eq!(dom.query_selector_all("body .banner").unwrap(), vec![ad]);
        assert!(dom.query_selector_all("article > .ad").unwrap().is_empty());
    }

    #[test]
    fn test_descendant_backtracking() {
        // section > div span must match through the *outer* div even when
        // the nearest div ancestor has no section parent.
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let section = dom.append(body, "section");
        let outer = dom.append(section, "div");
        let wrapper = dom.append(outer, "p");
        let inner = dom.append(wrapper, "span");
        assert_eq!(
            dom.query_selector_all("section div span").unwrap(),
            vec![inner]
        );
    }

    #[test]
    fn test_nth_of_type() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let section = dom.append(body, "section");
        let _first = dom.append(section, "div");
        let second = dom.append(section, "div");
        let _span = dom.append(section, "span");
        assert_eq!(
            dom.query_selector_all("section > div:nth-of-type(2)").unwrap(),
            vec![second]
        );
        assert!(dom
            .query_selector_all("section > div:nth-of-type(3)")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_attr_matching() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let banner = dom.append(body, "div");
        dom.set_attribute(banner, "role", "banner");
        assert_eq!(
            dom.query_selector_all("[role=\"banner\"]").unwrap(),
            vec![banner]
        );
        assert_eq!(dom.query_selector_all("[role]").unwrap(), vec![banner]);
        assert!(dom.query_selector_all("[role=\"main\"]").unwrap().is_empty());
    }

    #[test]
    fn test_detach_stops_matching() {
        let (mut dom, aside, ad, _) = sample();
        dom.detach(aside);
        assert!(dom.query_selector_all("#secondary").unwrap().is_empty());
        assert!(!dom.contains(aside));
        assert!(!dom.contains(ad));
        // The handle still resolves for teardown bookkeeping.
        assert_eq!(dom.tag_name(ad), "div");
    }

    #[test]
    fn test_document_order() {
        let (dom, aside, ad, article) = sample();
        let all = dom.query_selector_all("aside, article, .ad").unwrap();
        assert_eq!(all, vec![aside, ad, article]);
    }

    #[test]
    fn test_media_state() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let video = dom.append(body, "video");
        dom.set_media_playing(video, true);
        assert!(dom.is_media(video));
        dom.pause_media(video);
        assert_eq!(dom.media_playing(video), Some(false));
    }

    #[test]
    fn test_from_spec() {
        let json = r#"{
            "tag": "body",
            "children": [
                {"tag": "div", "attrs": {"class": "ad"}, "text": "Ad"},
                {"tag": "main", "children": [{"tag": "p", "text": "content"}]}
            ]
        }"#;
        let spec: DomSpec = serde_json::from_str(json).unwrap();
        let dom = MemDom::from_spec(&spec);
        assert_eq!(dom.query_selector_all(".ad").unwrap().len(), 1);
        let mains = dom.query_selector_all("main").unwrap();
        assert_eq!(mains.len(), 1);
        assert_eq!(dom.text_content(mains[0]), "content");
    }
}
