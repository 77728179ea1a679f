//! Entity store
//!
//! Bubbles are kept in insertion order (the order collision resolution
//! visits them) with an ID index for O(1) lookup. Nothing is ever removed.

use hashbrown::HashMap;

use crate::game::bubble::{Bubble, BubbleId};

#[derive(Debug, Clone, Default)]
pub struct BubbleStore {
    bubbles: Vec<Bubble>,
    index: HashMap<BubbleId, usize>,
}

impl BubbleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bubbles: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a stored bubble. Returns false (and leaves the store unchanged)
    /// for probes and for IDs already present.
    pub fn insert(&mut self, bubble: Bubble) -> bool {
        let Some(id) = bubble.id().cloned() else {
            return false;
        };
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, self.bubbles.len());
        self.bubbles.push(bubble);
        true
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[inline]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Bubble> {
        self.index_of(id).map(|i| &self.bubbles[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Bubble> {
        let i = self.index_of(id)?;
        Some(&mut self.bubbles[i])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.iter()
    }

    pub fn alive(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.iter().filter(|b| b.is_alive())
    }

    pub fn alive_count(&self) -> usize {
        self.alive().count()
    }

    /// Bubbles in insertion order
    pub fn as_slice(&self) -> &[Bubble] {
        &self.bubbles
    }

    /// Two distinct bubbles, mutably, by position
    ///
    /// # Panics
    /// If `a == b` or either index is out of range.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Bubble, &mut Bubble) {
        assert_ne!(a, b, "pair_mut requires distinct indices");
        if a < b {
            let (left, right) = self.bubbles.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.bubbles.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }
}
