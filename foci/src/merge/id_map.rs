//! Peak id translation with path compression.

/// Maps every original peak id to the id of the surviving peak that owns it.
///
/// Merged peaks point at the peak they were merged into, removed peaks point
/// at 0. Id 0 always resolves to 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMap {
    parent: Vec<u32>,
}

impl IdMap {
    /// Identity map for ids `1..=peaks`.
    pub fn new(peaks: usize) -> Self {
        Self {
            parent: (0..=peaks as u32).collect(),
        }
    }

    /// Number of ids managed (excluding 0).
    pub fn len(&self) -> usize {
        self.parent.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `id` to its current owner with two-pass path compression.
    #[inline]
    pub fn find(&mut self, id: u32) -> u32 {
        // First pass: find root (an alive id or 0)
        let mut root = id;
        loop {
            let parent = self.parent[root as usize];
            if parent == root {
                break;
            }
            root = parent;
        }

        // Second pass: compress path
        let mut current = id;
        while current != root {
            let next = self.parent[current as usize];
            self.parent[current as usize] = root;
            current = next;
        }

        root
    }

    /// True if `id` still owns its own region.
    #[inline]
    pub fn is_alive(&mut self, id: u32) -> bool {
        id != 0 && self.find(id) == id
    }

    /// Redirect the alive peak `from` to the alive peak `into`.
    pub fn merge(&mut self, from: u32, into: u32) {
        debug_assert!(self.parent[from as usize] == from && self.parent[into as usize] == into);
        debug_assert_ne!(from, into);
        self.parent[from as usize] = into;
    }

    /// Drop the alive peak `id`; it and everything merged into it resolve to 0.
    pub fn remove(&mut self, id: u32) {
        debug_assert_eq!(self.parent[id as usize], id);
        self.parent[id as usize] = 0;
    }

    /// Resolved owner of every id, indexed by id.
    pub fn table(&mut self) -> Vec<u32> {
        (0..self.parent.len() as u32).map(|id| self.find(id)).collect()
    }
}
