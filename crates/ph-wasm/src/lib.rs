//! WebAssembly bindings for PageHush
//!
//! Binds the engine to a real browser document. The content script owns the
//! actual listeners (mutation observer, history hooks, pointer events) and
//! forwards raw signals into the exports here; deadlines returned from
//! `tick`/`notify_*` tell it when to call back.
//!
//! Persistence is the shell's job: `phStoreSave`/`phStoreRemove` globals are
//! called on writes, and the persisted rules for the page are passed into
//! [`init`] as JSON.

use std::cell::RefCell;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use ph_core::protocol::{Request, Response};
use ph_runtime::dom::{DomAdapter, DomError, ElementId, InlineStyle, UI_MARKER_ATTR};
use ph_runtime::persist::{
    ExportBundle, MaintenanceReport, PersistenceError, RuleStore, StoredRule,
};
use ph_runtime::scheduler::MutationKinds;
use ph_runtime::selection::PickOutcome;
use ph_runtime::suggest::NullSuggestions;
use ph_runtime::Runtime;

/// Attribute carrying the element-handle index on interned elements.
const EID_ATTR: &str = "data-ph-eid";

// =============================================================================
// Shell persistence globals
// =============================================================================

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_name = phStoreSave, catch)]
    fn ph_store_save(host: &str, path_pattern: &str, rule_json: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(js_name = phStoreRemove, catch)]
    fn ph_store_remove(host: &str, selector: &str) -> Result<(), JsValue>;
}

// =============================================================================
// WebDom: DomAdapter over web-sys
// =============================================================================

/// Adapter over the live browser document. Elements are interned into a
/// handle table on first contact and re-identified through the `data-ph-eid`
/// attribute.
pub struct WebDom {
    document: web_sys::Document,
    elements: RefCell<Vec<web_sys::Element>>,
}

impl WebDom {
    fn from_window() -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("No document available"))?;
        Ok(Self {
            document,
            elements: RefCell::new(Vec::new()),
        })
    }

    /// Intern a JS element, reusing its existing handle when it has one.
    pub fn intern(&self, el: &web_sys::Element) -> ElementId {
        if let Some(value) = el.get_attribute(EID_ATTR) {
            if let Ok(idx) = value.parse::<usize>() {
                let elements = self.elements.borrow();
                if elements.get(idx).is_some_and(|known| known == el) {
                    return ElementId::from_raw(idx as u64);
                }
            }
        }
        let mut elements = self.elements.borrow_mut();
        let idx = elements.len();
        elements.push(el.clone());
        let _ = el.set_attribute(EID_ATTR, &idx.to_string());
        ElementId::from_raw(idx as u64)
    }

    fn element(&self, id: ElementId) -> Option<web_sys::Element> {
        self.elements.borrow().get(id.raw() as usize).cloned()
    }

    fn style_of(&self, id: ElementId) -> Option<web_sys::CssStyleDeclaration> {
        self.element(id)?
            .dyn_ref::<web_sys::HtmlElement>()
            .map(|el| el.style())
    }
}

impl DomAdapter for WebDom {
    fn body(&self) -> Option<ElementId> {
        self.document.body().map(|body| self.intern(&body))
    }

    fn contains(&self, el: ElementId) -> bool {
        match self.element(el) {
            Some(element) => self.document.contains(Some(element.as_ref())),
            None => false,
        }
    }

    fn parent(&self, el: ElementId) -> Option<ElementId> {
        self.element(el)?
            .parent_element()
            .map(|parent| self.intern(&parent))
    }

    fn children(&self, el: ElementId) -> Vec<ElementId> {
        let Some(element) = self.element(el) else {
            return Vec::new();
        };
        let collection = element.children();
        let mut out = Vec::with_capacity(collection.length() as usize);
        for i in 0..collection.length() {
            if let Some(child) = collection.item(i) {
                out.push(self.intern(&child));
            }
        }
        out
    }

    fn tag_name(&self, el: ElementId) -> String {
        self.element(el)
            .map(|e| e.tag_name().to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>, DomError> {
        let list = self
            .document
            .query_selector_all(selector)
            .map_err(|_| DomError::InvalidSelector(selector.to_string()))?;
        let mut out = Vec::with_capacity(list.length() as usize);
        for i in 0..list.length() {
            if let Some(node) = list.get(i) {
                if let Some(element) = node.dyn_ref::<web_sys::Element>() {
                    out.push(self.intern(element));
                }
            }
        }
        Ok(out)
    }

    fn attribute(&self, el: ElementId, name: &str) -> Option<String> {
        self.element(el)?.get_attribute(name)
    }

    fn set_attribute(&mut self, el: ElementId, name: &str, value: &str) {
        if let Some(element) = self.element(el) {
            let _ = element.set_attribute(name, value);
        }
    }

    fn remove_attribute(&mut self, el: ElementId, name: &str) {
        if let Some(element) = self.element(el) {
            let _ = element.remove_attribute(name);
        }
    }

    fn classes(&self, el: ElementId) -> Vec<String> {
        let Some(element) = self.element(el) else {
            return Vec::new();
        };
        let list = element.class_list();
        let mut out = Vec::with_capacity(list.length() as usize);
        for i in 0..list.length() {
            if let Some(token) = list.item(i) {
                out.push(token);
            }
        }
        out
    }

    fn style_value(&self, el: ElementId, prop: &str) -> Option<InlineStyle> {
        let style = self.style_of(el)?;
        let value = style.get_property_value(prop).ok()?;
        if value.is_empty() {
            return None;
        }
        let important = style.get_property_priority(prop) == "important";
        Some(InlineStyle { value, important })
    }

    fn set_style(&mut self, el: ElementId, prop: &str, value: &str, important: bool) {
        if let Some(style) = self.style_of(el) {
            let priority = if important { "important" } else { "" };
            let _ = style.set_property_with_priority(prop, value, priority);
        }
    }

    fn remove_style(&mut self, el: ElementId, prop: &str) {
        if let Some(style) = self.style_of(el) {
            let _ = style.remove_property(prop);
        }
    }

    fn text_content(&self, el: ElementId) -> String {
        self.element(el)
            .and_then(|e| e.text_content())
            .unwrap_or_default()
    }

    fn is_media(&self, el: ElementId) -> bool {
        self.element(el)
            .is_some_and(|e| e.dyn_ref::<web_sys::HtmlMediaElement>().is_some())
    }

    fn pause_media(&mut self, el: ElementId) {
        if let Some(element) = self.element(el) {
            if let Some(media) = element.dyn_ref::<web_sys::HtmlMediaElement>() {
                let _ = media.pause();
            }
        }
    }

    fn create_ui_element(&mut self, tag: &str) -> ElementId {
        let element = match self.document.create_element(tag) {
            Ok(el) => el,
            Err(_) => return ElementId::from_raw(u64::MAX),
        };
        let _ = element.set_attribute(UI_MARKER_ATTR, "");
        if let Some(body) = self.document.body() {
            let _ = body.append_child(&element);
        }
        self.intern(&element)
    }

    fn append_ui_child(&mut self, parent: ElementId, tag: &str) -> ElementId {
        let element = match self.document.create_element(tag) {
            Ok(el) => el,
            Err(_) => return ElementId::from_raw(u64::MAX),
        };
        let _ = element.set_attribute(UI_MARKER_ATTR, "");
        if let Some(parent_el) = self.element(parent) {
            let _ = parent_el.append_child(&element);
        }
        self.intern(&element)
    }

    fn set_text(&mut self, el: ElementId, text: &str) {
        if let Some(element) = self.element(el) {
            element.set_text_content(Some(text));
        }
    }

    fn remove_element(&mut self, el: ElementId) {
        if let Some(element) = self.element(el) {
            element.remove();
        }
    }
}

// =============================================================================
// BridgeStore: persistence via shell globals
// =============================================================================

/// Store that caches in-page and forwards writes to the extension shell.
/// Maintenance, export and import run in the options shell, not here.
struct BridgeStore {
    cache: ph_runtime::persist::MemoryStore,
}

impl BridgeStore {
    fn seeded(rules: Vec<StoredRule>) -> Self {
        let mut cache = ph_runtime::persist::MemoryStore::new();
        let _ = cache.import_all(&ExportBundle {
            version: ph_runtime::persist::EXPORT_VERSION,
            stats: Default::default(),
            data: rules,
        });
        Self { cache }
    }
}

impl RuleStore for BridgeStore {
    fn save_rule(
        &mut self,
        host: &str,
        path_pattern: &str,
        rule: &ph_core::types::Rule,
    ) -> Result<(), PersistenceError> {
        self.cache.save_rule(host, path_pattern, rule)?;
        let json = serde_json::to_string(rule)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        ph_store_save(host, path_pattern, &json)
            .map_err(|e| PersistenceError::Unavailable(format!("{e:?}")))
    }

    fn remove_rule(&mut self, host: &str, selector: &str) -> Result<(), PersistenceError> {
        self.cache.remove_rule(host, selector)?;
        ph_store_remove(host, selector)
            .map_err(|e| PersistenceError::Unavailable(format!("{e:?}")))
    }

    fn load_rules(
        &self,
        host: &str,
        path: &str,
    ) -> Result<ph_core::types::RuleSet, PersistenceError> {
        self.cache.load_rules(host, path)
    }

    fn maintenance(&mut self) -> Result<MaintenanceReport, PersistenceError> {
        Err(PersistenceError::Unsupported)
    }

    fn export_all(&self) -> Result<ExportBundle, PersistenceError> {
        Err(PersistenceError::Unsupported)
    }

    fn import_all(&mut self, _bundle: &ExportBundle) -> Result<usize, PersistenceError> {
        Err(PersistenceError::Unsupported)
    }
}

// =============================================================================
// Runtime cell and exports
// =============================================================================

type PageRuntime = Runtime<WebDom, BridgeStore, NullSuggestions>;

thread_local! {
    static RUNTIME: RefCell<Option<PageRuntime>> = const { RefCell::new(None) };
}

fn with_runtime<T>(f: impl FnOnce(&mut PageRuntime) -> T) -> Option<T> {
    RUNTIME.with(|cell| cell.borrow_mut().as_mut().map(f))
}

/// Initialize the runtime for this page. `stored_rules_json` is the JSON
/// array of stored rules the shell loaded for this host.
#[wasm_bindgen]
pub fn init(host: &str, path: &str, stored_rules_json: &str) -> Result<(), JsValue> {
    RUNTIME.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_some() {
            return Err(JsValue::from_str(
                "Already initialized. Reload the page to reinitialize.",
            ));
        }

        let dom = WebDom::from_window()?;
        let rules: Vec<StoredRule> = if stored_rules_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(stored_rules_json)
                .map_err(|e| JsValue::from_str(&format!("Failed to parse stored rules: {e}")))?
        };
        let store = BridgeStore::seeded(rules);

        *slot = Some(Runtime::new(dom, store, NullSuggestions, host, path));
        Ok(())
    })
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    RUNTIME.with(|cell| cell.borrow().is_some())
}

/// Dispatch one shell request (JSON `Request`) and return the JSON
/// `Response`.
#[wasm_bindgen]
pub fn handle_message(request_json: &str, now_ms: f64) -> String {
    let response = match serde_json::from_str::<Request>(request_json) {
        Ok(request) => with_runtime(|runtime| runtime.handle(request, now_ms as u64))
            .unwrap_or_else(|| Response::error("Runtime not initialized")),
        Err(e) => Response::error(format!("Unrecognized request: {e}")),
    };
    serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"kind":"error","message":"serialization failed"}"#.to_string())
}

/// Drain pending outward events as a JSON array.
#[wasm_bindgen]
pub fn drain_events() -> String {
    let events = with_runtime(|runtime| runtime.take_events()).unwrap_or_default();
    serde_json::to_string(&events).unwrap_or_else(|_| "[]".to_string())
}

/// Forward a mutation batch. `added` holds the top added elements,
/// `kinds_mask` the observed record kinds (1 childList, 2 attributes,
/// 4 characterData). Returns a timer deadline if one was armed.
#[wasm_bindgen]
pub fn notify_mutations(
    added: js_sys::Array,
    kinds_mask: u32,
    current_path: &str,
    now_ms: f64,
) -> Option<f64> {
    with_runtime(|runtime| {
        let mut roots = Vec::with_capacity(added.length() as usize);
        for value in added.iter() {
            if let Some(element) = value.dyn_ref::<web_sys::Element>() {
                roots.push(runtime.dom_mut().intern(element));
            }
        }
        let kinds = MutationKinds::from_bits_truncate(kinds_mask as u8);
        runtime
            .note_mutations(kinds, &roots, current_path, now_ms as u64)
            .map(|d| d as f64)
    })
    .flatten()
}

/// Forward a navigation signal. `kind` is `push`, `replace`, `pop` or
/// `hash`. Returns a timer deadline if one was armed.
#[wasm_bindgen]
pub fn notify_navigation(path: &str, kind: &str, now_ms: f64) -> Option<f64> {
    with_runtime(|runtime| {
        let deadline = match kind {
            "pop" | "hash" => runtime.pop_or_hash(path, now_ms as u64),
            _ => runtime.history_updated(path, now_ms as u64),
        };
        deadline.map(|d| d as f64)
    })
    .flatten()
}

/// Drive due deadlines. Returns the next deadline, if any.
#[wasm_bindgen]
pub fn tick(now_ms: f64) -> Option<f64> {
    with_runtime(|runtime| runtime.tick(now_ms as u64).map(|d| d as f64)).flatten()
}

#[wasm_bindgen]
pub fn pointer_over(element: &web_sys::Element) {
    with_runtime(|runtime| {
        let el = runtime.dom_mut().intern(element);
        runtime.pointer_over(el);
    });
}

#[wasm_bindgen]
pub fn pointer_out(element: &web_sys::Element) {
    with_runtime(|runtime| {
        let el = runtime.dom_mut().intern(element);
        runtime.pointer_out(el);
    });
}

/// A click while selecting. Returns `{picked, selector?, count?, error?}`.
#[wasm_bindgen]
pub fn element_clicked(element: &web_sys::Element, now_ms: f64) -> JsValue {
    let result = js_sys::Object::new();
    let outcome = with_runtime(|runtime| {
        let el = runtime.dom_mut().intern(element);
        runtime.element_clicked(el, now_ms as u64)
    })
    .flatten();

    match outcome {
        Some(PickOutcome::Applied { rule, count }) => {
            let _ = js_sys::Reflect::set(&result, &"picked".into(), &JsValue::from(true));
            let _ = js_sys::Reflect::set(
                &result,
                &"selector".into(),
                &JsValue::from_str(&rule.selector),
            );
            let _ = js_sys::Reflect::set(&result, &"count".into(), &JsValue::from(count as u32));
        }
        Some(PickOutcome::Rejected { error }) => {
            let _ = js_sys::Reflect::set(&result, &"picked".into(), &JsValue::from(false));
            let _ = js_sys::Reflect::set(
                &result,
                &"error".into(),
                &JsValue::from_str(&error.to_string()),
            );
        }
        None => {
            let _ = js_sys::Reflect::set(&result, &"picked".into(), &JsValue::from(false));
        }
    }
    result.into()
}

#[wasm_bindgen]
pub fn escape_pressed() {
    with_runtime(|runtime| runtime.escape_pressed());
}

/// Runtime state summary for diagnostics.
#[wasm_bindgen]
pub fn get_runtime_info() -> JsValue {
    let result = js_sys::Object::new();
    let populated = with_runtime(|runtime| {
        let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(true));
        let _ = js_sys::Reflect::set(&result, &"host".into(), &JsValue::from_str(runtime.host()));
        let _ = js_sys::Reflect::set(
            &result,
            &"path".into(),
            &JsValue::from_str(runtime.current_path()),
        );
        let _ = js_sys::Reflect::set(
            &result,
            &"selecting".into(),
            &JsValue::from(runtime.is_selecting()),
        );
    });
    if populated.is_none() {
        let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(false));
    }
    result.into()
}
