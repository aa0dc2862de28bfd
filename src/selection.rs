use std::hash::Hash;

use crate::FHashSet;

/// A selection over a large list, stored compactly as either "all except
/// these" or "none except these" so that toggling one item among thousands
/// stays O(1). Exactly one of the two senses is active at a time; switching
/// sense clears the exception set.
#[derive(Clone, Debug)]
pub(crate) struct QuantitySelection<T> {
    all: bool,
    exceptions: FHashSet<T>,
}

impl<T: Eq + Hash> QuantitySelection<T> {
    pub(crate) fn all_selected() -> Self {
        Self {
            all: true,
            exceptions: FHashSet::default(),
        }
    }

    pub(crate) fn none_selected() -> Self {
        Self {
            all: false,
            exceptions: FHashSet::default(),
        }
    }

    pub(crate) fn select_all(&mut self) {
        self.all = true;
        self.exceptions.clear();
    }

    pub(crate) fn clear(&mut self) {
        self.all = false;
        self.exceptions.clear();
    }

    /// Whether this is the untouched "everything" selection.
    pub(crate) fn is_all(&self) -> bool {
        self.all && self.exceptions.is_empty()
    }

    pub(crate) fn is_selected(&self, item: &T) -> bool {
        self.all != self.exceptions.contains(item)
    }

    pub(crate) fn set(&mut self, item: T, selected: bool) {
        if selected == self.all {
            self.exceptions.remove(&item);
        } else {
            self.exceptions.insert(item);
        }
    }

    pub(crate) fn toggle(&mut self, item: T) {
        if !self.exceptions.remove(&item) {
            self.exceptions.insert(item);
        }
    }

    /// Number of selected items out of a universe of `total`.
    pub(crate) fn selected_count(&self, total: usize) -> usize {
        if self.all {
            total - self.exceptions.len()
        } else {
            self.exceptions.len()
        }
    }

    pub(crate) fn is_empty(&self, total: usize) -> bool {
        self.selected_count(total) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::QuantitySelection;

    #[test]
    fn test_select_and_toggle() {
        let mut sel = QuantitySelection::<u32>::all_selected();
        assert!(sel.is_selected(&7));
        sel.set(7, false);
        assert!(!sel.is_selected(&7));
        assert_eq!(sel.selected_count(10), 9);
        sel.toggle(7);
        assert!(sel.is_selected(&7));
        assert_eq!(sel.selected_count(10), 10);

        sel.clear();
        assert!(sel.is_empty(10));
        sel.set(3, true);
        assert!(sel.is_selected(&3));
        assert!(!sel.is_selected(&4));
        assert_eq!(sel.selected_count(10), 1);

        sel.select_all();
        assert_eq!(sel.selected_count(10), 10);
    }

    #[test]
    fn test_large_selection_stays_small() {
        use rand::RngExt as _;

        // A million-revision list with a handful of toggles must not
        // materialize a million booleans.
        let mut sel = QuantitySelection::<u32>::all_selected();
        let mut rng = rand::rng();
        let mut dropped = std::collections::BTreeSet::new();
        for _ in 0..100 {
            let rev = rng.random_range(0..1_000_000u32);
            if dropped.insert(rev) {
                sel.set(rev, false);
            }
        }
        assert_eq!(sel.selected_count(1_000_000), 1_000_000 - dropped.len());
        assert!(sel.exceptions.len() <= 100);
        for rev in &dropped {
            assert!(!sel.is_selected(rev));
        }
    }
}
