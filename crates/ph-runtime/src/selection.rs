//! Element selection mode
//!
//! The interactive half of the engine: a state machine that walks
//! `Idle -> Selecting -> Idle`, highlighting hover targets and turning a
//! click into a validated, applied, persistable Hide rule. While selecting,
//! a floating toolbar (Select / Undo / Done) and transient toasts live in
//! the document as engine-UI elements; everything is torn down synchronously
//! on Done, Escape or navigation so no chrome or highlight survives the
//! session.
//!
//! The host owns the actual event listeners. It forwards pointer-over,
//! pointer-out, click and Escape into this controller and tears listeners
//! down when [`SelectionController::exit`] reports the session ended.

use log::debug;

use ph_core::types::{Rule, ValidationError};

use crate::apply::{ApplyError, RuleApplicator};
use crate::dom::{is_engine_ui, DomAdapter, ElementId, InlineStyle};
use crate::synthesize::{describe_element, is_sound, synthesize};

/// Highlight drawn on the hovered element.
const HIGHLIGHT_OUTLINE: &str = "2px solid #3b82f6";

/// How long a toast stays up, in milliseconds.
pub const TOAST_TTL_MS: u64 = 5000;

/// Session undo depth.
pub const MAX_UNDO: usize = 32;

const TOOLBAR_LABELS: &[&str] = &["Select", "Undo", "Done"];

// =============================================================================
// Outcomes
// =============================================================================

/// What a click in selection mode produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PickOutcome {
    /// A rule was built, validated and applied; the caller persists it.
    Applied { rule: Rule, count: usize },
    /// The candidate rule was rejected before any DOM mutation.
    Rejected { error: ValidationError },
}

/// What an undo request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    /// The rule was reversed; the caller removes it from persistence.
    Undone { rule: Rule, restored: usize },
    Empty,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct Hovered {
    element: ElementId,
    saved_outline: Option<InlineStyle>,
}

#[derive(Debug)]
struct Session {
    toolbar: ElementId,
    toolbar_position: (i32, i32),
    hovered: Option<Hovered>,
    saved_cursor: Option<InlineStyle>,
}

#[derive(Debug)]
struct Toast {
    element: ElementId,
    expires_at: u64,
}

/// The selection-mode state machine.
#[derive(Debug, Default)]
pub struct SelectionController {
    session: Option<Session>,
    undo_stack: Vec<Rule>,
    toasts: Vec<Toast>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Elements of the session undo stack, oldest first.
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn toolbar_position(&self) -> Option<(i32, i32)> {
        self.session.as_ref().map(|s| s.toolbar_position)
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// `Idle -> Selecting`: build the toolbar, set the crosshair cursor.
    /// Returns false when already selecting.
    pub fn enter<D: DomAdapter + ?Sized>(&mut self, dom: &mut D) -> bool {
        if self.session.is_some() {
            return false;
        }

        let toolbar = dom.create_ui_element("div");
        for (prop, value) in [
            ("position", "fixed"),
            ("top", "16px"),
            ("right", "16px"),
            ("z-index", "2147483647"),
        ] {
            dom.set_style(toolbar, prop, value, false);
        }
        for label in TOOLBAR_LABELS {
            let button = dom.append_ui_child(toolbar, "button");
            dom.set_text(button, label);
        }

        let saved_cursor = dom
            .body()
            .map(|body| {
                let saved = dom.style_value(body, "cursor");
                dom.set_style(body, "cursor", "crosshair", true);
                saved
            })
            .unwrap_or(None);

        self.session = Some(Session {
            toolbar,
            toolbar_position: (16, 16),
            hovered: None,
            saved_cursor,
        });
        true
    }

    /// `Selecting -> Idle`: synchronous teardown of highlight, toolbar,
    /// cursor and toasts. Returns false when not selecting.
    pub fn exit<D: DomAdapter + ?Sized>(&mut self, dom: &mut D) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        Self::clear_highlight_of(dom, &mut session);
        if let Some(body) = dom.body() {
            match session.saved_cursor {
                Some(style) => dom.set_style(body, "cursor", &style.value, style.important),
                None => dom.remove_style(body, "cursor"),
            }
        }
        dom.remove_element(session.toolbar);
        for toast in self.toasts.drain(..) {
            dom.remove_element(toast.element);
        }
        true
    }

    /// Route-change teardown: the session undo stack does not outlive the
    /// page it was built on.
    pub fn clear_session(&mut self) {
        self.undo_stack.clear();
    }

    // -------------------------------------------------------------------------
    // Hover tracking
    // -------------------------------------------------------------------------

    pub fn pointer_over<D: DomAdapter + ?Sized>(&mut self, dom: &mut D, el: ElementId) {
        if is_engine_ui(dom, el) {
            return;
        }
        let Some(session) = &mut self.session else {
            return;
        };
        if session.hovered.as_ref().map(|h| h.element) == Some(el) {
            return;
        }
        Self::clear_highlight_of(dom, session);
        let saved_outline = dom.style_value(el, "outline");
        dom.set_style(el, "outline", HIGHLIGHT_OUTLINE, true);
        session.hovered = Some(Hovered {
            element: el,
            saved_outline,
        });
    }

    pub fn pointer_out<D: DomAdapter + ?Sized>(&mut self, dom: &mut D, el: ElementId) {
        let Some(session) = &mut self.session else {
            return;
        };
        if session.hovered.as_ref().map(|h| h.element) == Some(el) {
            Self::clear_highlight_of(dom, session);
        }
    }

    fn clear_highlight_of<D: DomAdapter + ?Sized>(dom: &mut D, session: &mut Session) {
        if let Some(hovered) = session.hovered.take() {
            if dom.contains(hovered.element) {
                match hovered.saved_outline {
                    Some(style) => {
                        dom.set_style(hovered.element, "outline", &style.value, style.important)
                    }
                    None => dom.remove_style(hovered.element, "outline"),
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Picking
    // -------------------------------------------------------------------------

    /// Turn a click on `el` (or the last hovered element) into a rule. The
    /// session stays in Selecting; the user keeps picking until Done.
    pub fn click<D: DomAdapter + ?Sized>(
        &mut self,
        dom: &mut D,
        applicator: &mut RuleApplicator,
        el: ElementId,
        now_ms: u64,
    ) -> Option<PickOutcome> {
        if is_engine_ui(dom, el) {
            return None;
        }
        let session = self.session.as_mut()?;
        let target = if dom.contains(el) {
            el
        } else {
            session.hovered.as_ref().map(|h| h.element)?
        };

        // The highlight is inline state on the target; restore it before
        // the applicator snapshots prior style.
        Self::clear_highlight_of(dom, session);

        let synth = synthesize(dom, target);
        let mut candidates = Vec::with_capacity(1 + synth.alternatives.len());
        candidates.push(synth.selector.clone());
        candidates.extend(synth.alternatives.iter().cloned());
        let selector = candidates
            .iter()
            .find(|c| is_sound(dom, target, c))
            .unwrap_or(&candidates[0])
            .clone();
        let alternatives: Vec<String> =
            candidates.into_iter().filter(|c| *c != selector).collect();

        let description = describe_element(dom, target);
        let rule = Rule::hide(&selector, &description)
            .with_anchors(synth.anchors)
            .with_alternatives(alternatives);

        if let Err(error) = applicator.validate(dom, &rule) {
            debug!("pick rejected: {error}");
            self.toast(dom, &format!("Not hidden: {error}"), now_ms);
            return Some(PickOutcome::Rejected { error });
        }

        match applicator.apply(dom, &rule) {
            Ok(count) => {
                self.push_undo(rule.clone());
                self.toast(dom, &format!("Hidden: {description} - Unhide"), now_ms);
                Some(PickOutcome::Applied { rule, count })
            }
            Err(ApplyError::Invalid(error)) => Some(PickOutcome::Rejected { error }),
            Err(ApplyError::Query(message)) => Some(PickOutcome::Rejected {
                error: ValidationError::QueryFailed(message),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Undo
    // -------------------------------------------------------------------------

    pub fn undo<D: DomAdapter + ?Sized>(
        &mut self,
        dom: &mut D,
        applicator: &mut RuleApplicator,
        now_ms: u64,
    ) -> UndoOutcome {
        match self.undo_stack.pop() {
            Some(rule) => {
                let restored = applicator.undo(dom, &rule.selector);
                self.toast(dom, &format!("Restored: {}", rule.description), now_ms);
                UndoOutcome::Undone { rule, restored }
            }
            None => {
                self.toast(dom, "Nothing to undo", now_ms);
                UndoOutcome::Empty
            }
        }
    }

    fn push_undo(&mut self, rule: Rule) {
        if self.undo_stack.len() == MAX_UNDO {
            self.undo_stack.remove(0);
        }
        self.undo_stack.push(rule);
    }

    // -------------------------------------------------------------------------
    // Toasts
    // -------------------------------------------------------------------------

    fn toast<D: DomAdapter + ?Sized>(&mut self, dom: &mut D, text: &str, now_ms: u64) {
        let el = dom.create_ui_element("div");
        dom.set_text(el, text);
        for (prop, value) in [
            ("position", "fixed"),
            ("bottom", "24px"),
            ("left", "24px"),
            ("z-index", "2147483647"),
        ] {
            dom.set_style(el, prop, value, false);
        }
        self.toasts.push(Toast {
            element: el,
            expires_at: now_ms + TOAST_TTL_MS,
        });
    }

    /// Expire toasts; returns the next toast deadline, if any.
    pub fn poll<D: DomAdapter + ?Sized>(&mut self, dom: &mut D, now_ms: u64) -> Option<u64> {
        let mut kept = Vec::with_capacity(self.toasts.len());
        for toast in self.toasts.drain(..) {
            if now_ms >= toast.expires_at {
                dom.remove_element(toast.element);
            } else {
                kept.push(toast);
            }
        }
        self.toasts = kept;
        self.toasts.iter().map(|t| t.expires_at).min()
    }

    /// Reposition the toolbar (drag).
    pub fn move_toolbar<D: DomAdapter + ?Sized>(&mut self, dom: &mut D, x: i32, y: i32) {
        if let Some(session) = &mut self.session {
            session.toolbar_position = (x, y);
            dom.set_style(session.toolbar, "left", &format!("{x}px"), false);
            dom.set_style(session.toolbar, "top", &format!("{y}px"), false);
            dom.remove_style(session.toolbar, "right");
        }
    }
}
