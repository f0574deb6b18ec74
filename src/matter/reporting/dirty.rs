//! Attribute paths changed since a report generation started.
//!
//! Every mark stamps the path with a new generation. Handlers remember the
//! generation their last report began at and ask whether a path changed
//! since then. The set is bounded; when it overflows it collapses into a
//! single full wildcard, which makes every subscription report everything.

use heapless::Vec;
use log::{debug, trace};

use super::super::path::{AttributePathParams, ConcreteAttributePath};

pub const DIRTY_SET_CAPACITY: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyPath {
    pub path: AttributePathParams,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct DirtySet {
    entries: Vec<DirtyPath, DIRTY_SET_CAPACITY>,
    generation: u64,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation stamped on the most recent mark.
    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    /// Record a change. Returns the generation assigned to it.
    pub fn mark_dirty(&mut self, path: AttributePathParams) -> u64 {
        self.generation += 1;
        let generation = self.generation;

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.path.is_superset_of(&path))
        {
            entry.generation = generation;
            trace!("Dirty {} folded into {}", path, entry.path);
            return generation;
        }

        self.entries.retain(|e| !path.is_superset_of(&e.path));
        if self.entries.push(DirtyPath { path, generation }).is_err() {
            debug!("Dirty set overflow, collapsing to full wildcard");
            self.entries.clear();
            let _ = self.entries.push(DirtyPath {
                path: AttributePathParams::wildcard(),
                generation,
            });
        }
        generation
    }

    /// The concrete path was marked after generation `since`.
    pub fn is_dirty(&self, path: &ConcreteAttributePath, since: u64) -> bool {
        self.entries
            .iter()
            .any(|e| e.generation > since && e.path.matches(path))
    }

    /// Some path matched by `pattern` was marked after generation `since`.
    pub fn intersects(&self, pattern: &AttributePathParams, since: u64) -> bool {
        self.entries
            .iter()
            .any(|e| e.generation > since && e.path.intersects(pattern))
    }

    /// Drop entries every handler has already reported past.
    pub fn garbage_collect(&mut self, min_generation: u64) {
        self.entries.retain(|e| e.generation > min_generation);
    }

    /// Empty the set, returning its patterns in insertion order.
    pub fn drain(&mut self) -> std::vec::Vec<AttributePathParams> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|e| e.path)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirtyPath> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_query() {
        let mut set = DirtySet::new();
        let g = set.mark_dirty(AttributePathParams::concrete(1, 6, 0));
        assert_eq!(g, 1);
        assert!(set.is_dirty(&ConcreteAttributePath::new(1, 6, 0), 0));
        assert!(!set.is_dirty(&ConcreteAttributePath::new(1, 6, 0), 1));
        assert!(!set.is_dirty(&ConcreteAttributePath::new(1, 6, 1), 0));
    }

    #[test]
    fn test_superset_absorbs_subset() {
        let mut set = DirtySet::new();
        set.mark_dirty(AttributePathParams::new(Some(1), Some(6), None));
        set.mark_dirty(AttributePathParams::concrete(1, 6, 0));
        assert_eq!(set.len(), 1);
        // The absorbing entry carries the newer generation
        assert!(set.is_dirty(&ConcreteAttributePath::new(1, 6, 5), 1));
    }

    #[test]
    fn test_wider_mark_replaces_subsets() {
        let mut set = DirtySet::new();
        set.mark_dirty(AttributePathParams::concrete(1, 6, 0));
        set.mark_dirty(AttributePathParams::concrete(1, 6, 1));
        set.mark_dirty(AttributePathParams::concrete(2, 6, 0));
        set.mark_dirty(AttributePathParams::new(Some(1), None, None));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_overflow_collapses_to_wildcard() {
        let mut set = DirtySet::new();
        for attribute in 0..=DIRTY_SET_CAPACITY as u32 {
            set.mark_dirty(AttributePathParams::concrete(1, 6, attribute));
        }
        assert_eq!(set.len(), 1);
        assert!(set.is_dirty(&ConcreteAttributePath::new(5, 0x0402, 0), 0));
    }

    #[test]
    fn test_garbage_collect() {
        let mut set = DirtySet::new();
        set.mark_dirty(AttributePathParams::concrete(1, 6, 0));
        let g = set.mark_dirty(AttributePathParams::concrete(1, 6, 1));
        set.garbage_collect(g - 1);
        assert_eq!(set.len(), 1);
        assert!(set.intersects(&AttributePathParams::new(Some(1), None, None), g - 1));
        set.garbage_collect(g);
        assert!(set.is_empty());
    }

    #[test]
    fn test_drain_returns_patterns_in_order() {
        let mut set = DirtySet::new();
        let light = AttributePathParams::new(Some(1), Some(6), None);
        let sensor = AttributePathParams::concrete(2, 0x0402, 0);
        set.mark_dirty(light);
        set.mark_dirty(sensor);
        set.mark_dirty(AttributePathParams::concrete(1, 6, 0));

        assert_eq!(set.drain(), vec![light, sensor]);
        assert!(set.is_empty());
        assert!(set.drain().is_empty());

        // Generations keep counting after a drain
        assert_eq!(set.mark_dirty(sensor), 4);
    }
}
