//! A cursor pins the leaf block one lookup landed on and a position inside
//! it, so a caller can read (or, once [`crate::tree::BTree::dirty`] has run,
//! write) the value in place instead of copying it out and back in.
//!
//! The cursor owns its latch guard rather than borrowing it, which is the
//! entire reason [`crate::latch`] exists instead of `std::sync::RwLock`: a
//! guard has to survive the return from `lookup`/`dirty` and be handed back
//! whole to [`crate::tree::BTree::release`].

use crate::block::{Block, BlockRef};
use crate::key::TreeKey;
use crate::latch::{ReadGuard, WriteGuard};

pub(crate) enum Guard<K: TreeKey> {
    Read(ReadGuard<Block<K>>),
    Write(WriteGuard<Block<K>>),
}

impl<K: TreeKey> Guard<K> {
    fn block(&self) -> &Block<K> {
        match self {
            Guard::Read(g) => g,
            Guard::Write(g) => g,
        }
    }
}

/// A pinned position over one item in one leaf block.
pub struct Cursor<K: TreeKey> {
    guard: Guard<K>,
    leaf_ref: BlockRef,
    pos: usize,
}

impl<K: TreeKey> Cursor<K> {
    pub(crate) fn new_read(guard: ReadGuard<Block<K>>, leaf_ref: BlockRef, pos: usize) -> Self {
        Self {
            guard: Guard::Read(guard),
            leaf_ref,
            pos,
        }
    }

    pub(crate) fn new_write(guard: WriteGuard<Block<K>>, leaf_ref: BlockRef, pos: usize) -> Self {
        Self {
            guard: Guard::Write(guard),
            leaf_ref,
            pos,
        }
    }

    /// The block the cursor's item lives in.
    pub fn leaf_ref(&self) -> BlockRef {
        self.leaf_ref
    }

    pub fn key(&self) -> K {
        self.guard.block().item_key(self.pos)
    }

    pub fn seq(&self) -> u64 {
        self.guard.block().item_seq(self.pos)
    }

    pub fn value(&self) -> &[u8] {
        self.guard.block().item_val(self.pos)
    }

    /// The value, mutably, if this cursor was produced by
    /// [`crate::tree::BTree::dirty`]. `None` over a read-only cursor.
    pub fn value_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.guard {
            Guard::Write(g) => Some(g.item_val_mut(self.pos)),
            Guard::Read(_) => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.guard, Guard::Write(_))
    }

    /// Drop the pinned latch. Equivalent to letting the cursor go out of
    /// scope; spelled out because callers use it to mark intent.
    pub fn release(self) {}
}
