use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::arena::Arena;

/// One pair of link fields embedded in an arena node.
///
/// Both fields are `None` when the node is not a member of the list (or is its only member).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Links {
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
}

/// A node that embeds the `Links` of the list family `L`.
///
/// A node type implements this once per list family it can be a member of, with `L` being a
/// marker type naming the family. This is what lets one node be in several lists at once.
pub(crate) trait Linked<L> {
    fn links(&self) -> &Links;

    fn links_mut(&mut self) -> &mut Links;
}

/// A doubly linked list threaded through nodes stored in an [`Arena`].
///
/// The list itself only holds the head, the tail and the length. The links live in the nodes,
/// so membership changes never allocate and every operation except iteration is O(1).
///
/// The caller is responsible for only removing nodes that are members of this list.
pub(crate) struct IntrusiveList<N, L> {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,

    _family: PhantomData<fn(N, L)>,
}

impl<N, L> IntrusiveList<N, L>
where
    N: Linked<L>,
{
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _family: PhantomData,
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn push_front(&mut self, arena: &mut Arena<N>, index: usize) {
        let old_head = self.head;

        *arena.get_mut(index).links_mut() = Links {
            prev: None,
            next: old_head,
        };

        match old_head {
            Some(old_head) => arena.get_mut(old_head).links_mut().prev = Some(index),
            None => self.tail = Some(index),
        }

        self.head = Some(index);
        self.len = self
            .len
            .checked_add(1)
            .expect("list cannot hold more nodes than the arena can");
    }

    pub(crate) fn pop_front(&mut self, arena: &mut Arena<N>) -> Option<usize> {
        let index = self.head?;
        self.remove(arena, index);
        Some(index)
    }

    pub(crate) fn pop_back(&mut self, arena: &mut Arena<N>) -> Option<usize> {
        let index = self.tail?;
        self.remove(arena, index);
        Some(index)
    }

    /// Unlinks a member node from anywhere in the list.
    pub(crate) fn remove(&mut self, arena: &mut Arena<N>, index: usize) {
        let Links { prev, next } = std::mem::take(arena.get_mut(index).links_mut());

        match prev {
            Some(prev) => arena.get_mut(prev).links_mut().next = next,
            None => {
                assert_eq!(
                    self.head,
                    Some(index),
                    "node {index} without prev is not the head of list of {}",
                    type_name::<N>()
                );
                self.head = next;
            }
        }

        match next {
            Some(next) => arena.get_mut(next).links_mut().prev = prev,
            None => {
                assert_eq!(
                    self.tail,
                    Some(index),
                    "node {index} without next is not the tail of list of {}",
                    type_name::<N>()
                );
                self.tail = prev;
            }
        }

        self.len = self
            .len
            .checked_sub(1)
            .expect("removed a node from an empty list");
    }

    /// Iterates over the member indexes from head to tail.
    #[cfg(test)]
    pub(crate) fn iter<'a>(
        &self,
        arena: &'a Arena<N>,
    ) -> impl Iterator<Item = usize> + use<'a, N, L> {
        let mut cursor = self.head;

        std::iter::from_fn(move || {
            let index = cursor?;
            cursor = arena.get(index).links().next;
            Some(index)
        })
    }
}

impl<N, L> Default for IntrusiveList<N, L>
where
    N: Linked<L>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, L> fmt::Debug for IntrusiveList<N, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("len", &self.len)
            .finish()
    }
}
