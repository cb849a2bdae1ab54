use std::any::type_name;

/// Growable index-addressed storage for the nodes of the intrusive lists.
///
/// Works like a slab: inserting a node returns a stable index that remains valid until the node
/// is removed. Removed entries form an intrusive stack of vacant indexes (the most recently
/// vacated index is reused first), so indexes stay dense and the storage never shrinks.
#[derive(Debug)]
pub(crate) struct Arena<N> {
    entries: Vec<Entry<N>>,

    /// Index of the most recently vacated entry. Points at `entries.len()` if there are no
    /// vacant entries, in which case the next insert grows the storage.
    next_vacant_index: usize,

    count: usize,
}

#[derive(Debug)]
enum Entry<N> {
    Occupied { node: N },

    Vacant { next_vacant_index: usize },
}

impl<N> Arena<N> {
    #[must_use]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            next_vacant_index: 0,
            count: 0,
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    /// Stores the node and returns the index under which it can be found.
    pub(crate) fn insert(&mut self, node: N) -> usize {
        let index = self.next_vacant_index;

        if index == self.entries.len() {
            self.entries.push(Entry::Occupied { node });
            self.next_vacant_index = self.entries.len();
        } else {
            let entry = self
                .entries
                .get_mut(index)
                .expect("vacant index always points inside the storage or at its end");

            let Entry::Vacant { next_vacant_index } = *entry else {
                panic!(
                    "insert() found occupied entry {index} on the vacancy stack of arena of {}",
                    type_name::<N>()
                );
            };

            *entry = Entry::Occupied { node };
            self.next_vacant_index = next_vacant_index;
        }

        self.count = self
            .count
            .checked_add(1)
            .expect("arena cannot hold more than usize::MAX nodes");

        index
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or is not associated with a node.
    pub(crate) fn remove(&mut self, index: usize) -> N {
        let next_vacant_index = self.next_vacant_index;

        let entry = self.entries.get_mut(index).unwrap_or_else(|| {
            panic!(
                "remove({index}) index out of bounds in arena of {}",
                type_name::<N>()
            )
        });

        let previous = std::mem::replace(entry, Entry::Vacant { next_vacant_index });

        let Entry::Occupied { node } = previous else {
            panic!(
                "remove({index}) entry was vacant in arena of {}",
                type_name::<N>()
            );
        };

        self.next_vacant_index = index;
        self.count = self
            .count
            .checked_sub(1)
            .expect("we verified above that the entry was occupied so count must be non-zero");

        node
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or is not associated with a node.
    #[must_use]
    pub(crate) fn get(&self, index: usize) -> &N {
        match self.entries.get(index) {
            Some(Entry::Occupied { node }) => node,
            Some(Entry::Vacant { .. }) => panic!(
                "get({index}) entry was vacant in arena of {}",
                type_name::<N>()
            ),
            None => panic!(
                "get({index}) index out of bounds in arena of {}",
                type_name::<N>()
            ),
        }
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds or is not associated with a node.
    #[must_use]
    pub(crate) fn get_mut(&mut self, index: usize) -> &mut N {
        match self.entries.get_mut(index) {
            Some(Entry::Occupied { node }) => node,
            Some(Entry::Vacant { .. }) => panic!(
                "get_mut({index}) entry was vacant in arena of {}",
                type_name::<N>()
            ),
            None => panic!(
                "get_mut({index}) index out of bounds in arena of {}",
                type_name::<N>()
            ),
        }
    }

    /// Returns the node at the index if the index currently holds one.
    #[must_use]
    pub(crate) fn try_get(&self, index: usize) -> Option<&N> {
        match self.entries.get(index) {
            Some(Entry::Occupied { node }) => Some(node),
            _ => None,
        }
    }

    /// Iterates over `(index, node)` for every occupied entry, in index order.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &N)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Occupied { node } => Some((index, node)),
                Entry::Vacant { .. } => None,
            })
    }

    /// Iterates mutably over every occupied node, in index order.
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut N> {
        self.entries.iter_mut().filter_map(|entry| match entry {
            Entry::Occupied { node } => Some(node),
            Entry::Vacant { .. } => None,
        })
    }
}
