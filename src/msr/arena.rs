//! Arena storage for MSR entities
//!
//! Entities live in per-kind vectors owned by the score and refer to each
//! other through typed indices. Owning edges are index lists in the parent;
//! back-links (voice to staff, staff to part, ...) are plain indices with no
//! ownership, so the tree has no reference cycles.
//!
//! Indices are only minted by [`Arena::alloc`], which the builder alone
//! calls, so a handle held by client code always refers to a live entity.

use serde::Serialize;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(usize);

        impl $name {
            /// Position in the owning arena
            pub fn index(&self) -> usize {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_index(index: usize) -> Self {
                $name(index)
            }

            fn index(&self) -> usize {
                self.0
            }
        }
    };
}

/// Conversion between a typed id and its arena slot
pub trait ArenaId: Copy {
    fn from_index(index: usize) -> Self;
    fn index(&self) -> usize;
}

entity_id!(
    /// Handle to a [`PartGroup`](crate::msr::PartGroup)
    PartGroupId
);
entity_id!(
    /// Handle to a [`Part`](crate::msr::Part)
    PartId
);
entity_id!(
    /// Handle to a [`Staff`](crate::msr::Staff)
    StaffId
);
entity_id!(
    /// Handle to a [`Voice`](crate::msr::Voice)
    VoiceId
);
entity_id!(
    /// Handle to a [`Measure`](crate::msr::Measure)
    MeasureId
);
entity_id!(
    /// Handle to a [`Repeat`](crate::msr::Repeat)
    RepeatId
);
entity_id!(
    /// Handle to a [`RestMeasures`](crate::msr::RestMeasures)
    RestMeasuresId
);

/// Append-only storage for one entity kind
#[derive(Debug, Clone)]
pub struct Arena<I: ArenaId, T> {
    items: Vec<T>,
    _id: PhantomData<I>,
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn new() -> Self {
        Arena {
            items: Vec::new(),
            _id: PhantomData,
        }
    }

    pub(crate) fn alloc(&mut self, item: T) -> I {
        self.items.push(item);
        I::from_index(self.items.len() - 1)
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.items.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (I::from_index(i), item))
    }
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Arena::new()
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        &self.items[id.index()]
    }
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        &mut self.items[id.index()]
    }
}
