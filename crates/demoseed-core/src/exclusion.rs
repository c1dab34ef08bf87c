use std::collections::HashSet;

use crate::types::KeyMatching;

/// Default number of recent keys listed in the prompt clause.
pub const DEFAULT_RENDER_LIMIT: usize = 200;

/// Natural keys already produced during one generation run.
///
/// Each generation call is stateless from the model's point of view, so the
/// tracker is the only place duplicates across batches are remembered. It
/// only grows; keys are never removed.
#[derive(Debug, Clone)]
pub struct ExclusionTracker {
    matching: KeyMatching,
    seen: HashSet<String>,
    /// Original spelling in insertion order, for prompt rendering.
    order: Vec<String>,
    render_limit: usize,
}

impl ExclusionTracker {
    pub fn new(matching: KeyMatching) -> Self {
        Self {
            matching,
            seen: HashSet::new(),
            order: Vec::new(),
            render_limit: DEFAULT_RENDER_LIMIT,
        }
    }

    pub fn with_render_limit(mut self, limit: usize) -> Self {
        self.render_limit = limit;
        self
    }

    pub fn matching(&self) -> KeyMatching {
        self.matching
    }

    /// Add a key. Returns `false` when an equivalent key was already present.
    pub fn register(&mut self, key: &str) -> bool {
        let normalized = self.matching.normalize(key);
        if normalized.is_empty() || !self.seen.insert(normalized) {
            return false;
        }
        self.order.push(key.to_string());
        true
    }

    /// Register all keys of one completed batch. Returns how many were new.
    pub fn register_batch<I, S>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter(|key| self.register(key.as_ref()))
            .count()
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.seen.contains(&self.matching.normalize(key))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// "Do not reuse" clause for the next generation request.
    pub fn render_for_prompt(&self) -> String {
        if self.order.is_empty() || self.render_limit == 0 {
            return String::new();
        }
        let start = self.order.len().saturating_sub(self.render_limit);
        let recent = &self.order[start..];
        let mut out = String::from("Do not reuse any of these values (already used): ");
        out.push_str(&recent.join(", "));
        if start > 0 {
            out.push_str(&format!(" (and {start} older values)"));
        }
        out.push('.');
        out
    }
}
