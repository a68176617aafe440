//! Client-side navigation detection
//!
//! Persisted rules are path-scoped, so the engine needs to know when a
//! single-page app moves to a different route without a real page load.
//! The platform adapter forwards three kinds of raw signals - programmatic
//! history updates, back/forward/hash events, and a heuristic "the main
//! content just got replaced" hint - and the watcher distills them into at
//! most one route-change per distinct path transition, after a short settle
//! delay that lets the new view finish rendering.
//!
//! A signal for the path we are already on yields nothing: the re-apply
//! pass such a false positive would want is already covered by the mutation
//! scheduler, and marker gating makes it a no-op anyway.

use crate::dom::{DomAdapter, ElementId};

/// Default settle delay before a route change is reported, in milliseconds.
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Class fragments that mark an element as main-content-like.
const CONTENT_CLASS_HINTS: &[&str] = &["content", "main", "app", "page", "article"];

#[derive(Debug, Clone)]
struct PendingTransition {
    path: String,
    deadline: u64,
}

/// Distills raw navigation signals into per-transition callbacks.
#[derive(Debug)]
pub struct NavigationWatcher {
    settle_ms: u64,
    last_path: String,
    pending: Option<PendingTransition>,
    transitions: u64,
}

impl NavigationWatcher {
    pub fn new(initial_path: &str) -> Self {
        Self::with_settle(initial_path, DEFAULT_SETTLE_MS)
    }

    pub fn with_settle(initial_path: &str, settle_ms: u64) -> Self {
        Self {
            settle_ms,
            last_path: initial_path.to_string(),
            pending: None,
            transitions: 0,
        }
    }

    /// Programmatic history push/replace.
    pub fn history_updated(&mut self, path: &str, now_ms: u64) -> Option<u64> {
        self.signal(path, now_ms)
    }

    /// Back/forward or hash-change event.
    pub fn pop_or_hash(&mut self, path: &str, now_ms: u64) -> Option<u64> {
        self.signal(path, now_ms)
    }

    /// Heuristic content-swap hint, carrying the current location path.
    pub fn content_swapped(&mut self, path: &str, now_ms: u64) -> Option<u64> {
        self.signal(path, now_ms)
    }

    /// Record a navigation signal. Returns the settle deadline when the
    /// signal armed (or re-targeted) the pending transition; repeated
    /// signals for the same destination coalesce and return None.
    fn signal(&mut self, path: &str, now_ms: u64) -> Option<u64> {
        if let Some(pending) = &mut self.pending {
            if pending.path == path {
                return None;
            }
            // A newer destination supersedes the one still settling.
            pending.path = path.to_string();
            pending.deadline = now_ms + self.settle_ms;
            return Some(pending.deadline);
        }

        if path == self.last_path {
            return None;
        }

        let deadline = now_ms + self.settle_ms;
        self.pending = Some(PendingTransition {
            path: path.to_string(),
            deadline,
        });
        Some(deadline)
    }

    /// If a transition has settled, report the new path exactly once and
    /// make it current. Transitions that circled back to the current path
    /// dissolve silently.
    pub fn poll(&mut self, now_ms: u64) -> Option<String> {
        let pending = self.pending.as_ref()?;
        if now_ms < pending.deadline {
            return None;
        }
        let path = self.pending.take().map(|p| p.path)?;
        if path == self.last_path {
            return None;
        }
        self.last_path = path.clone();
        self.transitions += 1;
        Some(path)
    }

    pub fn pending_deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// The path of the last reported transition (or the initial path).
    pub fn current_path(&self) -> &str {
        &self.last_path
    }

    /// Drop any pending transition (teardown).
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}

/// Does a batch of freshly-added subtree roots look like a main-content
/// replacement? Frameworks that bypass the history API still swap out a
/// `main`-ish container on route changes.
pub fn looks_like_content_swap<D: DomAdapter + ?Sized>(dom: &D, roots: &[ElementId]) -> bool {
    roots.iter().any(|&el| {
        if !dom.contains(el) {
            return false;
        }
        if dom.tag_name(el) == "main" {
            return true;
        }
        if dom.attribute(el, "role").as_deref() == Some("main") {
            return true;
        }
        dom.classes(el).iter().any(|class| {
            let class = class.to_ascii_lowercase();
            CONTENT_CLASS_HINTS.iter().any(|hint| class.contains(hint))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memdom::MemDom;

    #[test]
    fn test_distinct_transition_fires_once() {
        let mut watcher = NavigationWatcher::new("/");
        assert_eq!(watcher.history_updated("/news", 1000), Some(1100));
        assert_eq!(watcher.poll(1050), None);
        assert_eq!(watcher.poll(1100), Some("/news".to_string()));
        assert_eq!(watcher.current_path(), "/news");
        // Settled means consumed.
        assert_eq!(watcher.poll(2000), None);
    }

    #[test]
    fn test_rapid_pushes_to_same_path_coalesce() {
        let mut watcher = NavigationWatcher::new("/");
        assert!(watcher.history_updated("/news", 0).is_some());
        for t in [10, 20, 30, 90] {
            assert_eq!(watcher.history_updated("/news", t), None);
        }
        assert_eq!(watcher.poll(100), Some("/news".to_string()));
        assert_eq!(watcher.transitions(), 1);
    }

    #[test]
    fn test_newer_destination_supersedes() {
        let mut watcher = NavigationWatcher::new("/");
        watcher.history_updated("/a", 0);
        assert_eq!(watcher.history_updated("/b", 50), Some(150));
        assert_eq!(watcher.poll(100), None);
        assert_eq!(watcher.poll(150), Some("/b".to_string()));
    }

    #[test]
    fn test_same_path_signal_is_ignored() {
        let mut watcher = NavigationWatcher::new("/news");
        assert_eq!(watcher.history_updated("/news", 0), None);
        assert_eq!(watcher.poll(1000), None);
        assert_eq!(watcher.transitions(), 0);
    }

    #[test]
    fn test_round_trip_inside_window_dissolves() {
        let mut watcher = NavigationWatcher::new("/a");
        watcher.history_updated("/b", 0);
        watcher.history_updated("/a", 50);
        assert_eq!(watcher.poll(200), None);
        assert_eq!(watcher.current_path(), "/a");
    }

    #[test]
    fn test_pop_and_hash_signals() {
        let mut watcher = NavigationWatcher::new("/a");
        assert!(watcher.pop_or_hash("/b", 0).is_some());
        assert_eq!(watcher.poll(100), Some("/b".to_string()));
        assert!(watcher.content_swapped("/c", 200).is_some());
        assert_eq!(watcher.poll(300), Some("/c".to_string()));
    }

    #[test]
    fn test_cancel_drops_pending() {
        let mut watcher = NavigationWatcher::new("/");
        watcher.history_updated("/gone", 0);
        watcher.cancel();
        assert_eq!(watcher.poll(1000), None);
        assert_eq!(watcher.current_path(), "/");
    }

    #[test]
    fn test_content_swap_classifier() {
        let mut dom = MemDom::new();
        let body = dom.body().unwrap();
        let main = dom.append(body, "main");
        let role_main = dom.append(body, "div");
        dom.set_attribute(role_main, "role", "main");
        let content = dom.append(body, "div");
        dom.set_attribute(content, "class", "page-content");
        let widget = dom.append(body, "div");
        dom.set_attribute(widget, "class", "weather-widget");

        assert!(looks_like_content_swap(&dom, &[main]));
        assert!(looks_like_content_swap(&dom, &[role_main]));
        assert!(looks_like_content_swap(&dom, &[widget, content]));
        assert!(!looks_like_content_swap(&dom, &[widget]));
        assert!(!looks_like_content_swap(&dom, &[]));
    }
}
