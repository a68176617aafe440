//! PageHush Core Library
//!
//! This crate provides the data model shared by the PageHush element
//! suppressor: the rule value types, the selector grammar used to validate
//! and analyze rule selectors, path-pattern generalization, rule
//! fingerprinting, and the message protocol spoken between the in-page
//! runtime and the extension shell.
//!
//! The crate is deliberately DOM-free. Everything that touches a live page
//! lives in `ph-runtime` behind its `DomAdapter` seam; this crate only
//! describes *what* a rule is, never *how* it lands on a page.
//!
//! # Modules
//!
//! - `selector`: small CSS selector grammar (parse, display, protected-target analysis)
//! - `types`: rule value objects, style whitelist, validation errors
//! - `path`: route path generalization (`/user/123` -> `/user/*`)
//! - `fingerprint`: xxHash64 rule fingerprints and marker tokens
//! - `protocol`: tagged request/response/event unions for the extension shell

pub mod fingerprint;
pub mod path;
pub mod protocol;
pub mod selector;
pub mod types;

// Re-export commonly used types
pub use fingerprint::{fingerprint, marker_token};
pub use path::{generalize_path, path_matches};
pub use selector::{SelectorError, SelectorList};
pub use types::{
    AnchorSet, Rule, RuleSet, RuleType, StyleProps, StyleProperty, ValidationError,
    MAX_MATCHED_ELEMENTS, PROTECTED_SELECTORS,
};
