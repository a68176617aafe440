//! The platform DOM seam
//!
//! The engine addresses page elements through opaque [`ElementId`] handles
//! handed out by a [`DomAdapter`]. The adapter owns the mapping between
//! handles and whatever the platform calls an element; handles are ephemeral
//! and become dangling once an element leaves the document, which the engine
//! tolerates by re-checking [`DomAdapter::contains`] before acting.

// =============================================================================
// Handles
// =============================================================================

/// Opaque handle to one element, scoped to the adapter that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(u64);

impl ElementId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One inline style declaration as it exists on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineStyle {
    pub value: String,
    pub important: bool,
}

/// Marker attribute tagging elements that belong to the engine's own UI
/// (toolbar, toasts). Nothing inside such a subtree is ever matched,
/// highlighted or suppressed, which keeps the mutation observer from
/// feeding the engine its own chrome.
pub const UI_MARKER_ATTR: &str = "data-ph-ui";

// =============================================================================
// Errors
// =============================================================================

/// Error type for adapter operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("element is no longer attached to the document")]
    Detached,
}

// =============================================================================
// Adapter trait
// =============================================================================

/// Everything the engine needs from a live document.
///
/// `ph-wasm` implements this over `web-sys`; [`crate::memdom::MemDom`]
/// implements it in memory for tests and previews. Selector strings passed
/// to [`query_selector_all`](Self::query_selector_all) have already been
/// validated against the `ph-core` grammar by the time the engine calls it,
/// but adapters must still fail soft on anything they cannot evaluate.
pub trait DomAdapter {
    /// The `<body>` element, if the document has one.
    fn body(&self) -> Option<ElementId>;

    /// Is the element still attached to the document?
    fn contains(&self, el: ElementId) -> bool;

    fn parent(&self, el: ElementId) -> Option<ElementId>;

    fn children(&self, el: ElementId) -> Vec<ElementId>;

    /// Lowercased tag name.
    fn tag_name(&self, el: ElementId) -> String;

    /// All attached elements matching the selector, in document order.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>, DomError>;

    fn attribute(&self, el: ElementId, name: &str) -> Option<String>;

    fn set_attribute(&mut self, el: ElementId, name: &str, value: &str);

    fn remove_attribute(&mut self, el: ElementId, name: &str);

    /// Class tokens, in attribute order.
    fn classes(&self, el: ElementId) -> Vec<String>;

    /// The element's inline declaration for a property, if any.
    fn style_value(&self, el: ElementId, prop: &str) -> Option<InlineStyle>;

    fn set_style(&mut self, el: ElementId, prop: &str, value: &str, important: bool);

    fn remove_style(&mut self, el: ElementId, prop: &str);

    /// Concatenated text content of the subtree.
    fn text_content(&self, el: ElementId) -> String;

    /// Is this a media element (audio/video)?
    fn is_media(&self, el: ElementId) -> bool;

    /// Pause playback if the element is playing media; no-op otherwise.
    fn pause_media(&mut self, el: ElementId);

    /// Create an engine-UI element (tagged with [`UI_MARKER_ATTR`]) and
    /// append it to the body.
    fn create_ui_element(&mut self, tag: &str) -> ElementId;

    /// Create a child element inside an engine-UI subtree.
    fn append_ui_child(&mut self, parent: ElementId, tag: &str) -> ElementId;

    fn set_text(&mut self, el: ElementId, text: &str);

    /// Detach an element (engine UI teardown).
    fn remove_element(&mut self, el: ElementId);
}

// =============================================================================
// Shared helpers
// =============================================================================

/// 1-based position of an element among same-tag siblings, as
/// `:nth-of-type` counts them. None for detached elements.
pub fn nth_of_type_index<D: DomAdapter + ?Sized>(dom: &D, el: ElementId) -> Option<u32> {
    let parent = dom.parent(el)?;
    let tag = dom.tag_name(el);
    let mut index = 0u32;
    for sibling in dom.children(parent) {
        if dom.tag_name(sibling) == tag {
            index += 1;
        }
        if sibling == el {
            return Some(index);
        }
    }
    None
}

/// Is the element part of the engine's own UI (or inside it)?
pub fn is_engine_ui<D: DomAdapter + ?Sized>(dom: &D, el: ElementId) -> bool {
    let mut current = Some(el);
    while let Some(node) = current {
        if dom.attribute(node, UI_MARKER_ATTR).is_some() {
            return true;
        }
        current = dom.parent(node);
    }
    false
}
