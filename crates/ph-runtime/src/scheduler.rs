//! Debounced auto-apply scheduling
//!
//! Mutation observers fire in bursts - an infinite-scroll insertion can
//! deliver hundreds of records in a second. The scheduler coalesces every
//! burst into a single re-apply pass: the first notification arms one
//! deadline, later notifications inside the window ride along, and the pass
//! runs when the host's timer comes back. Because applied elements are
//! marker-gated, a pass costs only the newly-matched elements.
//!
//! The scheduler holds no DOM reference and no timer of its own. The host
//! arms a real timer from the returned deadline and calls [`poll`] when it
//! fires; under test, time is just a number.
//!
//! [`poll`]: AutoApplyScheduler::poll

bitflags::bitflags! {
    /// Which kinds of mutation records were observed in a batch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MutationKinds: u8 {
        /// Nodes added or removed.
        const CHILD_LIST = 1 << 0;
        /// Attribute changes.
        const ATTRIBUTES = 1 << 1;
        /// Text changes.
        const CHARACTER_DATA = 1 << 2;
    }
}

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 180;

/// Coalesces mutation bursts into single re-apply passes.
#[derive(Debug)]
pub struct AutoApplyScheduler {
    debounce_ms: u64,
    deadline: Option<u64>,
    pending_kinds: MutationKinds,
    batches_seen: u64,
    passes_run: u64,
}

impl Default for AutoApplyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoApplyScheduler {
    pub fn new() -> Self {
        Self::with_debounce(DEFAULT_DEBOUNCE_MS)
    }

    pub fn with_debounce(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            deadline: None,
            pending_kinds: MutationKinds::empty(),
            batches_seen: 0,
            passes_run: 0,
        }
    }

    /// Record a mutation batch. Returns the pass deadline when this batch
    /// armed it; batches landing inside an already-armed window coalesce
    /// and return None.
    pub fn note_mutations(&mut self, kinds: MutationKinds, now_ms: u64) -> Option<u64> {
        self.batches_seen += 1;
        self.pending_kinds |= kinds;
        match self.deadline {
            Some(_) => None,
            None => {
                let deadline = now_ms + self.debounce_ms;
                self.deadline = Some(deadline);
                Some(deadline)
            }
        }
    }

    /// Is a pass due? A true result consumes the armed state; the caller
    /// runs the pass.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                self.pending_kinds = MutationKinds::empty();
                self.passes_run += 1;
                true
            }
            _ => false,
        }
    }

    /// The armed deadline, if any.
    pub fn pending_deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// Mutation kinds accumulated since the last pass.
    pub fn pending_kinds(&self) -> MutationKinds {
        self.pending_kinds
    }

    /// Disarm without running a pass (teardown).
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending_kinds = MutationKinds::empty();
    }

    pub fn passes_run(&self) -> u64 {
        self.passes_run
    }

    pub fn batches_seen(&self) -> u64 {
        self.batches_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_batch_arms_the_deadline() {
        let mut scheduler = AutoApplyScheduler::new();
        assert_eq!(
            scheduler.note_mutations(MutationKinds::CHILD_LIST, 1000),
            Some(1000 + DEFAULT_DEBOUNCE_MS)
        );
        assert_eq!(scheduler.pending_deadline(), Some(1180));
    }

    #[test]
    fn test_burst_coalesces_into_one_pass() {
        let mut scheduler = AutoApplyScheduler::with_debounce(150);
        assert!(scheduler.note_mutations(MutationKinds::CHILD_LIST, 0).is_some());
        for t in [10, 50, 100, 140] {
            assert_eq!(scheduler.note_mutations(MutationKinds::ATTRIBUTES, t), None);
        }
        assert!(!scheduler.poll(149));
        assert!(scheduler.poll(150));
        assert_eq!(scheduler.passes_run(), 1);
        // The window is consumed; nothing further is due.
        assert!(!scheduler.poll(1000));
    }

    #[test]
    fn test_kinds_accumulate_until_the_pass() {
        let mut scheduler = AutoApplyScheduler::with_debounce(100);
        scheduler.note_mutations(MutationKinds::CHILD_LIST, 0);
        scheduler.note_mutations(MutationKinds::CHARACTER_DATA, 10);
        assert_eq!(
            scheduler.pending_kinds(),
            MutationKinds::CHILD_LIST | MutationKinds::CHARACTER_DATA
        );
        scheduler.poll(100);
        assert_eq!(scheduler.pending_kinds(), MutationKinds::empty());
    }

    #[test]
    fn test_rearms_after_a_pass() {
        let mut scheduler = AutoApplyScheduler::with_debounce(100);
        scheduler.note_mutations(MutationKinds::CHILD_LIST, 0);
        assert!(scheduler.poll(100));
        assert_eq!(
            scheduler.note_mutations(MutationKinds::CHILD_LIST, 200),
            Some(300)
        );
        assert!(scheduler.poll(300));
        assert_eq!(scheduler.passes_run(), 2);
    }

    #[test]
    fn test_cancel_disarms() {
        let mut scheduler = AutoApplyScheduler::new();
        scheduler.note_mutations(MutationKinds::CHILD_LIST, 0);
        scheduler.cancel();
        assert!(!scheduler.poll(10_000));
        assert_eq!(scheduler.pending_deadline(), None);
    }
}
