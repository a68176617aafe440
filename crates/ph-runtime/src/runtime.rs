//! Runtime composition and protocol dispatch
//!
//! One [`Runtime`] exists per content-script lifetime. It is built
//! explicitly from its collaborators - DOM adapter, rule store, suggestion
//! source - and owns the five engine components, the active rule set, and
//! the outward event queue. There are no ambient globals anywhere in the
//! engine; the bridge that embeds it owns the one instance.
//!
//! Shell messages arrive as `ph-core` [`Request`] values and are dispatched
//! by a single `match`; host signals (pointer events, mutation batches,
//! history updates, timer ticks) arrive as plain method calls.

use log::{debug, warn};

use ph_core::path::{generalize_path, MATCH_ALL};
use ph_core::protocol::{Chip, Event, Request, Response};
use ph_core::types::{Rule, RuleSet};

use crate::apply::RuleApplicator;
use crate::dom::{DomAdapter, ElementId};
use crate::navigation::{looks_like_content_swap, NavigationWatcher};
use crate::persist::RuleStore;
use crate::scheduler::{AutoApplyScheduler, MutationKinds};
use crate::selection::{PickOutcome, SelectionController, UndoOutcome};
use crate::suggest::{clean_preset, PageSketch, RuleSuggestionSource, StaticSuggestions};

/// The in-page engine, assembled.
pub struct Runtime<D, S, G>
where
    D: DomAdapter,
    S: RuleStore,
    G: RuleSuggestionSource,
{
    dom: D,
    store: S,
    suggestions: G,
    applicator: RuleApplicator,
    scheduler: AutoApplyScheduler,
    watcher: NavigationWatcher,
    selection: SelectionController,
    host: String,
    path: String,
    rules: RuleSet,
    always_apply: bool,
    events: Vec<Event>,
}

impl<D, S, G> Runtime<D, S, G>
where
    D: DomAdapter,
    S: RuleStore,
    G: RuleSuggestionSource,
{
    /// Assemble the runtime and bring the page into compliance with the
    /// rules persisted for this host + path.
    pub fn new(dom: D, store: S, suggestions: G, host: &str, path: &str) -> Self {
        let mut runtime = Self {
            dom,
            store,
            suggestions,
            applicator: RuleApplicator::new(),
            scheduler: AutoApplyScheduler::new(),
            watcher: NavigationWatcher::new(path),
            selection: SelectionController::new(),
            host: host.to_string(),
            path: path.to_string(),
            rules: RuleSet::new(host, &generalize_path(path)),
            always_apply: true,
            events: Vec::new(),
        };
        runtime.reload_rules();
        runtime.apply_all();
        runtime
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn current_path(&self) -> &str {
        &self.path
    }

    pub fn is_selecting(&self) -> bool {
        self.selection.is_active()
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    /// Drain the outward event queue.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // -------------------------------------------------------------------------
    // Protocol dispatch
    // -------------------------------------------------------------------------

    /// Answer one shell request.
    pub fn handle(&mut self, request: Request, now_ms: u64) -> Response {
        match request {
            Request::GetPageInfo => self.page_info(),
            Request::ApplyCleanPreset => self.apply_preset(),
            Request::StartTweak | Request::StartTweakMode => {
                if self.selection.enter(&mut self.dom) {
                    self.events.push(Event::TweakModeActive { active: true });
                }
                Response::Ack
            }
            Request::ExitTweakMode => {
                if self.selection.exit(&mut self.dom) {
                    self.events.push(Event::TweakModeActive { active: false });
                }
                Response::Ack
            }
            Request::AskAi { prompt } => self.ask(&prompt),
            Request::Undo => self.undo(now_ms),
            Request::ResetSite { temporary } => self.reset_site(temporary),
            Request::ToggleAlwaysApply { enabled } => {
                self.always_apply = enabled;
                if enabled {
                    self.apply_all();
                }
                Response::Ack
            }
            Request::SaveCurrentConfig => self.save_config(),
        }
    }

    fn page_info(&self) -> Response {
        let mut chips: Vec<Chip> = self
            .applicator
            .active_rules()
            .into_iter()
            .map(|(rule, count)| Chip {
                label: rule.description.clone(),
                selector: rule.selector.clone(),
                rule_type: rule.rule_type,
                count,
            })
            .collect();
        chips.sort_by(|a, b| a.selector.cmp(&b.selector));
        Response::PageInfo {
            active: !chips.is_empty() || !self.rules.is_empty(),
            preset_available: true,
            always_apply: self.always_apply,
            chips,
        }
    }

    fn apply_preset(&mut self) -> Response {
        let mut total = 0usize;
        for rule in clean_preset() {
            total += self.adopt_rule(&rule, MATCH_ALL);
        }
        Response::Applied { count: total }
    }

    fn ask(&mut self, prompt: &str) -> Response {
        let sketch = PageSketch::capture(&self.dom, &self.host, &self.path);
        let candidates = match self.suggestions.generate(prompt, &sketch) {
            Ok(candidates) => candidates,
            Err(err) => {
                debug!("suggestion backend unavailable ({err}), using static patterns");
                StaticSuggestions
                    .generate(prompt, &sketch)
                    .unwrap_or_default()
            }
        };

        let mut total = 0usize;
        for candidate in candidates {
            total += self.adopt_rule(&candidate.rule, MATCH_ALL);
        }
        Response::Applied { count: total }
    }

    /// Validate, apply, and - when the rule actually bit - persist and
    /// track it. Returns the newly-affected element count.
    fn adopt_rule(&mut self, rule: &Rule, pattern: &str) -> usize {
        if let Err(err) = self.applicator.validate(&self.dom, rule) {
            debug!("rule '{}' rejected: {err}", rule.selector);
            return 0;
        }
        match self.applicator.apply(&mut self.dom, rule) {
            Ok(0) => 0,
            Ok(count) => {
                self.rules.push(rule.clone());
                if let Err(err) = self.store.save_rule(&self.host, pattern, rule) {
                    self.persistence_trouble(err);
                }
                count
            }
            Err(err) => {
                warn!("rule '{}' skipped: {err}", rule.selector);
                0
            }
        }
    }

    fn undo(&mut self, now_ms: u64) -> Response {
        match self
            .selection
            .undo(&mut self.dom, &mut self.applicator, now_ms)
        {
            UndoOutcome::Undone { rule, .. } => {
                if let Err(err) = self.store.remove_rule(&self.host, &rule.selector) {
                    self.persistence_trouble(err);
                }
                self.rules.remove_selector(&rule.selector);
                self.events.push(Event::RuleUndone { rule: rule.clone() });
                Response::Undone { rule: Some(rule) }
            }
            UndoOutcome::Empty => Response::Undone { rule: None },
        }
    }

    fn reset_site(&mut self, temporary: bool) -> Response {
        if self.selection.exit(&mut self.dom) {
            self.events.push(Event::TweakModeActive { active: false });
        }
        self.selection.clear_session();
        let restored = self.applicator.reset_all(&mut self.dom);
        debug!("reset restored {restored} elements (temporary: {temporary})");

        if !temporary {
            let selectors: Vec<String> =
                self.rules.iter().map(|r| r.selector.clone()).collect();
            for selector in selectors {
                if let Err(err) = self.store.remove_rule(&self.host, &selector) {
                    self.persistence_trouble(err);
                }
            }
        }
        // Either way the active set empties: a reset page must stay reset
        // until reload, so auto-apply has nothing left to re-impose.
        self.rules.rules.clear();
        Response::Ack
    }

    fn save_config(&mut self) -> Response {
        let active = self.applicator.active_rules();
        let mut saved = 0usize;
        for (rule, _) in &active {
            match self.store.save_rule(&self.host, MATCH_ALL, rule) {
                Ok(()) => saved += 1,
                Err(err) => self.persistence_trouble(err),
            }
        }
        Response::Saved { rules: saved }
    }

    fn persistence_trouble(&mut self, err: crate::persist::PersistenceError) {
        warn!("persistence failure: {err}");
        self.events.push(Event::StatusMessage {
            text: format!("Rule stays applied, but saving failed: {err}"),
        });
    }

    // -------------------------------------------------------------------------
    // Host signals
    // -------------------------------------------------------------------------

    pub fn pointer_over(&mut self, el: ElementId) {
        self.selection.pointer_over(&mut self.dom, el);
    }

    pub fn pointer_out(&mut self, el: ElementId) {
        self.selection.pointer_out(&mut self.dom, el);
    }

    /// A click in selection mode. Applies and persists the picked rule.
    pub fn element_clicked(&mut self, el: ElementId, now_ms: u64) -> Option<PickOutcome> {
        let outcome = self
            .selection
            .click(&mut self.dom, &mut self.applicator, el, now_ms)?;
        match &outcome {
            PickOutcome::Applied { rule, count } => {
                self.rules.push(rule.clone());
                let pattern = generalize_path(&self.path);
                if let Err(err) = self.store.save_rule(&self.host, &pattern, rule) {
                    self.persistence_trouble(err);
                }
                self.events.push(Event::ElementHidden {
                    rule: rule.clone(),
                    count: *count,
                });
            }
            PickOutcome::Rejected { error } => {
                self.events.push(Event::StatusMessage {
                    text: error.to_string(),
                });
            }
        }
        Some(outcome)
    }

    pub fn escape_pressed(&mut self) {
        if self.selection.exit(&mut self.dom) {
            self.events.push(Event::TweakModeActive { active: false });
        }
    }

    /// A mutation batch from the host's observer. `current_path` is the
    /// location path at observation time, which catches routers that
    /// bypass the history API entirely. Returns a deadline the host should
    /// arm a timer for, if one was newly armed.
    pub fn note_mutations(
        &mut self,
        kinds: MutationKinds,
        added_roots: &[ElementId],
        current_path: &str,
        now_ms: u64,
    ) -> Option<u64> {
        let mut armed = self.scheduler.note_mutations(kinds, now_ms);
        if current_path != self.path || looks_like_content_swap(&self.dom, added_roots) {
            if let Some(deadline) = self.watcher.content_swapped(current_path, now_ms) {
                armed = Some(armed.map_or(deadline, |a| a.min(deadline)));
            }
        }
        armed
    }

    /// Programmatic history push/replace observed by the host.
    pub fn history_updated(&mut self, path: &str, now_ms: u64) -> Option<u64> {
        self.watcher.history_updated(path, now_ms)
    }

    /// popstate / hashchange observed by the host.
    pub fn pop_or_hash(&mut self, path: &str, now_ms: u64) -> Option<u64> {
        self.watcher.pop_or_hash(path, now_ms)
    }

    /// Drive all pending deadlines. Returns the next deadline the host
    /// should arm a timer for, if any.
    pub fn tick(&mut self, now_ms: u64) -> Option<u64> {
        if self.scheduler.poll(now_ms) && self.always_apply {
            let applied = self.apply_all();
            if applied > 0 {
                debug!("auto-apply pass affected {applied} elements");
            }
        }
        if let Some(new_path) = self.watcher.poll(now_ms) {
            self.route_changed(&new_path);
        }
        let toast_deadline = self.selection.poll(&mut self.dom, now_ms);

        [
            self.scheduler.pending_deadline(),
            self.watcher.pending_deadline(),
            toast_deadline,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // -------------------------------------------------------------------------
    // Passes
    // -------------------------------------------------------------------------

    /// Apply the active rule set in persisted order. Marker gating makes
    /// this idempotent; a malformed rule is skipped, the rest still apply.
    pub fn apply_all(&mut self) -> usize {
        let rules: Vec<Rule> = self.rules.rules.clone();
        let mut total = 0usize;
        for rule in &rules {
            match self.applicator.apply(&mut self.dom, rule) {
                Ok(count) => total += count,
                Err(err) => warn!("rule '{}' skipped: {err}", rule.selector),
            }
        }
        total
    }

    fn route_changed(&mut self, new_path: &str) {
        debug!("route change: {} -> {new_path}", self.path);
        if self.selection.exit(&mut self.dom) {
            self.events.push(Event::TweakModeActive { active: false });
        }
        self.selection.clear_session();
        self.scheduler.cancel();
        let swept = self.applicator.sweep(&self.dom);
        if swept > 0 {
            debug!("swept {swept} departed elements");
        }
        self.path = new_path.to_string();
        self.reload_rules();
        self.apply_all();
    }

    fn reload_rules(&mut self) {
        match self.store.load_rules(&self.host, &self.path) {
            Ok(rules) => self.rules = rules,
            Err(err) => {
                self.rules = RuleSet::new(&self.host, &generalize_path(&self.path));
                self.persistence_trouble(err);
            }
        }
    }
}
