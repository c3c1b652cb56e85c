//! Trace output collection
//!
//! When an executor has tracing enabled, every evaluation that changes its
//! input is recorded as an `(input, output)` pair. Pairs pile up while the
//! command runs and are sent in one burst when the outermost traced
//! evaluation finishes (or after every evaluation with top-down tracing off).

use mush_core::{Dbref, World};

/// One recorded evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub thing: Dbref,
    pub input: String,
    pub output: String,
}

/// Per-command trace buffer
#[derive(Debug, Clone)]
pub struct TraceCollector {
    entries: Vec<TraceEntry>,
    count: usize,
    top: bool,
}

impl Default for TraceCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceCollector {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
            top: true,
        }
    }

    /// Claim the outermost position
    ///
    /// # Returns
    /// `true` for the first traced evaluation since the last flush
    pub fn begin(&mut self) -> bool {
        if self.top {
            self.top = false;
            self.count = 0;
            return true;
        }
        false
    }

    /// Record an evaluation, ignoring ones that changed nothing
    pub fn add(&mut self, thing: Dbref, input: &str, output: &str, limit: usize) {
        if input == output {
            return;
        }
        self.count += 1;
        if self.count <= limit {
            self.entries.push(TraceEntry {
                thing,
                input: input.to_string(),
                output: output.to_string(),
            });
        }
    }

    /// Entries recorded so far that exceeded `limit`
    pub fn discarded(&self, limit: usize) -> usize {
        self.count.saturating_sub(limit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Send pending entries, newest first, and reset for the next command
    ///
    /// Each entry goes to the thing's redirect target when that is still a
    /// valid object, otherwise to the thing's owner.
    pub fn flush(&mut self, world: &dyn World) {
        while let Some(entry) = self.entries.pop() {
            let target = world
                .redirect_target(entry.thing)
                .filter(|&t| world.is_valid(t))
                .unwrap_or_else(|| world.owner(entry.thing));
            let line = format!(
                "{}({})}} '{}' -> '{}'",
                world.name(entry.thing),
                entry.thing,
                entry.input,
                entry.output
            );
            world.notify(target, &line);
        }
        self.top = true;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_claimed_once() {
        let mut trace = TraceCollector::new();
        assert!(trace.begin());
        assert!(!trace.begin());
    }

    #[test]
    fn test_identical_pairs_dropped() {
        let mut trace = TraceCollector::new();
        trace.begin();
        trace.add(Dbref(1), "abc", "abc", 10);
        assert!(trace.is_empty());
        trace.add(Dbref(1), "[add(1,2)]", "3", 10);
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn test_limit_counts_overflow() {
        let mut trace = TraceCollector::new();
        trace.begin();
        for i in 0..5 {
            trace.add(Dbref(1), &format!("in{}", i), "out", 3);
        }
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.discarded(3), 2);
    }
}
