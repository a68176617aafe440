//! PageHush Runtime
//!
//! The in-page engine: everything that happens between "the user clicked an
//! element" and "that element stays suppressed across reloads, mutations and
//! client-side navigation".
//!
//! The engine never touches a platform DOM directly. All page access goes
//! through the [`dom::DomAdapter`] seam; `ph-wasm` binds it to a real
//! browser document, [`memdom::MemDom`] backs tests and CLI previews. Time
//! is equally injected: components expose arm/poll deadlines in
//! milliseconds, and the host drives them from its own timers, so the whole
//! engine is deterministic under test.
//!
//! # Modules
//!
//! - `dom`: element handles and the platform adapter trait
//! - `memdom`: arena-backed in-memory DOM with a selector matcher
//! - `synthesize`: stable-selector synthesis with anchors and fallbacks
//! - `apply`: rule application/undo and the applied-element registry
//! - `scheduler`: debounced mutation coalescing for auto-apply passes
//! - `navigation`: client-side route-change detection
//! - `selection`: the pick-an-element state machine and overlay chrome
//! - `persist`: the external rule-store contract
//! - `suggest`: rule suggestion sources and static presets
//! - `runtime`: composition root and protocol dispatcher

pub mod apply;
pub mod dom;
pub mod memdom;
pub mod navigation;
pub mod persist;
pub mod runtime;
pub mod scheduler;
pub mod selection;
pub mod suggest;
pub mod synthesize;

// Re-export commonly used types
pub use apply::{ApplyError, RuleApplicator};
pub use dom::{DomAdapter, DomError, ElementId, InlineStyle};
pub use memdom::{DomSpec, MemDom};
pub use navigation::NavigationWatcher;
pub use persist::{ExportBundle, MemoryStore, PersistenceError, RuleStore};
pub use runtime::Runtime;
pub use scheduler::{AutoApplyScheduler, MutationKinds};
pub use selection::SelectionController;
pub use suggest::{PageSketch, RuleSuggestionSource, StaticSuggestions};
pub use synthesize::{describe_element, synthesize, Synthesized};
