//! The public B-tree: a single-pass, top-down walker over [`Block`]s that
//! performs lock coupling (crabbing) during descent and dispatches
//! splitting, merging and compaction as it goes, so every mutation touches
//! each level at most once.
//!
//! Copy-on-write is driven entirely by the dirty sequence number: a
//! transaction calls [`BTree::next_seq`] once, then every block the descent
//! touches is hostage to [`BlockManager::dirty_ref`] — already at that seq,
//! mutate in place; older, clone first. Only one mutation runs at a time
//! (`root` is held locked for the duration), but reads (`lookup`, `next`,
//! `since`) snapshot the root and then proceed with their own block latches,
//! so they never block behind a writer's whole traversal.

use crate::block::{Block, BlockRef};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::key::TreeKey;
use crate::manager::BlockManager;
use crate::walker;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

/// Tunables governing when the walker reshapes the tree.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// A child below this many live bytes is a merge/rebalance candidate.
    pub merge_threshold: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            merge_threshold: crate::block::BLOCK_SIZE / 4,
        }
    }
}

struct Root {
    height: usize,
    block_ref: BlockRef,
}

/// A persistent, copy-on-write B-tree over fixed-size keys and
/// variable-length values, built on a [`BlockManager`].
pub struct BTree<K: TreeKey, M: BlockManager<K>> {
    manager: M,
    root: Mutex<Root>,
    seq: AtomicU64,
    limits: Limits,
}

impl<K: TreeKey, M: BlockManager<K>> BTree<K, M> {
    /// Create a new, empty tree: a single leaf root at seq 1.
    pub fn new(manager: M) -> Result<Self> {
        Self::with_limits(manager, Limits::default())
    }

    pub fn with_limits(manager: M, limits: Limits) -> Result<Self> {
        let (root_ref, _latch) = manager.alloc_dirty(1)?;
        Ok(Self {
            manager,
            root: Mutex::new(Root {
                height: 0,
                block_ref: root_ref,
            }),
            seq: AtomicU64::new(1),
            limits,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::Relaxed) + 1
    }

    /// The root's current dirty sequence number.
    pub fn root_seq(&self) -> u64 {
        self.root.lock().unwrap().block_ref.seq
    }

    // --- reads --------------------------------------------------------------

    /// Read-only lookup. Lock-coupled: each level's latch is acquired before
    /// its parent's is released.
    pub fn lookup(&self, key: &K) -> Result<Cursor<K>> {
        let (mut block_ref, mut height) = {
            let root = self.root.lock().unwrap();
            (root.block_ref, root.height)
        };

        let latch = self.manager.read_ref(block_ref)?;
        let mut guard = latch.read();
        loop {
            if height == 0 {
                let (pos, cmp) = guard.find_pos(key);
                if cmp != Ordering::Equal {
                    return Err(Error::NotFound);
                }
                return Ok(Cursor::new_read(guard, block_ref, pos));
            }

            let (pos, _) = guard.find_pos(key);
            let child_ref = guard.child_ref(pos);
            let child_latch = self.manager.read_ref(child_ref)?;
            let child_guard = child_latch.read();
            guard = child_guard;
            block_ref = child_ref;
            height -= 1;
        }
    }

    /// The first item with `first <= key <= last`, strictly after `after`
    /// (or from `first`, if `after` is `None`).
    pub fn next(&self, first: K, last: K, after: Option<K>) -> Result<Option<Cursor<K>>> {
        let floor = match after {
            None => first,
            Some(a) => match a.successor() {
                Some(s) => s,
                None => return Ok(None),
            },
        };
        if floor > last {
            return Ok(None);
        }

        let (root_ref, root_height) = {
            let root = self.root.lock().unwrap();
            (root.block_ref, root.height)
        };
        match self.first_at_or_after(root_ref, root_height, floor)? {
            Some(cursor) if cursor.key() <= last => Ok(Some(cursor)),
            Some(cursor) => {
                cursor.release();
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn first_at_or_after(&self, block_ref: BlockRef, height: usize, floor: K) -> Result<Option<Cursor<K>>> {
        let latch = self.manager.read_ref(block_ref)?;
        let guard = latch.read();

        if height == 0 {
            let (pos, _) = guard.find_pos(&floor);
            if pos < guard.nr_items() as usize {
                return Ok(Some(Cursor::new_read(guard, block_ref, pos)));
            }
            return Ok(None);
        }

        let start_pos = guard.find_pos(&floor).0;
        for pos in start_pos..guard.nr_items() as usize {
            let child_ref = guard.child_ref(pos);
            if let Some(cursor) = self.first_at_or_after(child_ref, height - 1, floor)? {
                return Ok(Some(cursor));
            }
        }
        Ok(None)
    }

    /// The first item with `first <= key <= last`, strictly after `after`,
    /// whose own sequence number is at least `since_seq`. Entire subtrees
    /// whose stamped ref predates `since_seq` are skipped without being read.
    pub fn since(&self, first: K, last: K, since_seq: u64, after: Option<K>) -> Result<Option<Cursor<K>>> {
        let floor = match after {
            None => first,
            Some(a) => match a.successor() {
                Some(s) => s,
                None => return Ok(None),
            },
        };
        if floor > last {
            return Ok(None);
        }

        let (root_ref, root_height) = {
            let root = self.root.lock().unwrap();
            (root.block_ref, root.height)
        };
        if root_ref.seq < since_seq {
            return Ok(None);
        }
        match self.first_since(root_ref, root_height, since_seq, floor)? {
            Some(cursor) if cursor.key() <= last => Ok(Some(cursor)),
            Some(cursor) => {
                cursor.release();
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn first_since(
        &self,
        block_ref: BlockRef,
        height: usize,
        since_seq: u64,
        floor: K,
    ) -> Result<Option<Cursor<K>>> {
        let latch = self.manager.read_ref(block_ref)?;
        let guard = latch.read();

        if height == 0 {
            let mut pos = guard.find_pos(&floor).0;
            while pos < guard.nr_items() as usize {
                if guard.item_seq(pos) >= since_seq {
                    return Ok(Some(Cursor::new_read(guard, block_ref, pos)));
                }
                pos += 1;
            }
            return Ok(None);
        }

        let start_pos = guard.find_pos(&floor).0;
        for pos in start_pos..guard.nr_items() as usize {
            let child_ref = guard.child_ref(pos);
            if child_ref.seq < since_seq {
                continue;
            }
            if let Some(cursor) = self.first_since(child_ref, height - 1, since_seq, floor)? {
                return Ok(Some(cursor));
            }
        }
        Ok(None)
    }

    /// The least key in `[first, last]` with no item in the tree.
    /// [`Error::NoSpace`] iff every key in `[first, last]` is present.
    pub fn hole(&self, first: K, last: K) -> Result<K> {
        let mut hole = first;
        let mut after = None;
        loop {
            match self.next(first, last, after)? {
                Some(cursor) => {
                    let k = cursor.key();
                    cursor.release();
                    if hole < k {
                        return Ok(hole);
                    }
                    after = Some(k);
                    hole = match k.successor() {
                        Some(s) => s,
                        None => break,
                    };
                }
                None => break,
            }
        }
        if hole <= last {
            Ok(hole)
        } else {
            Err(Error::NoSpace)
        }
    }

    /// Drop a cursor's latch. Equivalent to letting it go out of scope.
    pub fn release(&self, cursor: Cursor<K>) {
        cursor.release();
    }

    // --- writes ---------------------------------------------------------------

    /// CoW the leaf holding `key` and return a write-pinned cursor over it,
    /// for callers that want to edit a value in place without an
    /// insert/delete round trip.
    pub fn dirty(&self, key: &K) -> Result<Cursor<K>> {
        let seq = self.next_seq();
        let mut root = self.root.lock().unwrap();

        let (mut cur_ref, latch) = self.manager.dirty_ref(root.block_ref, seq)?;
        let mut cur = latch.write();
        if cur_ref != root.block_ref {
            self.manager.free(root.block_ref)?;
            root.block_ref = cur_ref;
        }

        let mut height = root.height;
        loop {
            if height == 0 {
                let (pos, cmp) = cur.find_pos(key);
                if cmp != Ordering::Equal {
                    return Err(Error::NotFound);
                }
                return Ok(Cursor::new_write(cur, cur_ref, pos));
            }

            let (pos, _) = cur.find_pos(key);
            let child_ref = cur.child_ref(pos);
            let (new_child_ref, child_latch) = self.manager.dirty_ref(child_ref, seq)?;
            let child = child_latch.write();
            if new_child_ref != child_ref {
                cur.set_child_ref(pos, new_child_ref);
                self.manager.free(child_ref)?;
            }
            cur = child;
            cur_ref = new_child_ref;
            height -= 1;
        }
    }

    /// Insert a new item. Fails with [`Error::AlreadyExists`] if `key` is
    /// already present.
    pub fn insert(&self, key: K, value: &[u8]) -> Result<()> {
        let seq = self.next_seq();
        let mut root = self.root.lock().unwrap();

        let (mut cur_ref, latch) = self.manager.dirty_ref(root.block_ref, seq)?;
        let mut cur = latch.write();
        if cur_ref != root.block_ref {
            self.manager.free(root.block_ref)?;
            root.block_ref = cur_ref;
        }

        let root_item_cost = if root.height == 0 {
            Block::<K>::all_val_bytes(value.len())
        } else {
            Block::<K>::all_val_bytes(BlockRef::ENCODED_LEN)
        };
        if !walker::fits_with_compaction(&cur, root_item_cost) {
            let (new_root_ref, new_root_guard) = self.grow_tree(&mut root, seq, &cur)?;
            cur_ref = new_root_ref;
            cur = new_root_guard;
        }

        let mut height = root.height;
        loop {
            if height == 0 {
                let (pos, cmp) = cur.find_pos(&key);
                if cmp == Ordering::Equal {
                    return Err(Error::AlreadyExists);
                }
                let need = Block::<K>::all_val_bytes(value.len());
                walker::compact_if_needed(&mut cur, need);
                if cur.contig_free() < need {
                    return Err(Error::NoSpace);
                }
                let (pos, _) = cur.find_pos(&key);
                cur.create_item(pos, key, value.len(), seq);
                cur.item_val_mut(pos).copy_from_slice(value);
                log::debug!("insert key={key:?} leaf={} seq={seq}", cur_ref.blkno);
                return Ok(());
            }

            let (pos, _) = cur.find_pos(&key);
            let child_ref = cur.child_ref(pos);
            let (new_child_ref, child_latch) = self.manager.dirty_ref(child_ref, seq)?;
            let mut child = child_latch.write();
            if new_child_ref != child_ref {
                cur.set_child_ref(pos, new_child_ref);
                self.manager.free(child_ref)?;
            }

            let child_item_cost = if height == 1 {
                Block::<K>::all_val_bytes(value.len())
            } else {
                Block::<K>::all_val_bytes(BlockRef::ENCODED_LEN)
            };

            let (chosen_ref, chosen) = if !walker::fits_with_compaction(&child, child_item_cost) {
                let (sib_ref, sib_latch) = self.manager.alloc_dirty(seq)?;
                let mut sibling = sib_latch.write();
                let (sibling_content, sib_ref, new_child_key) =
                    walker::split_and_link(&mut cur, pos, &mut child, new_child_ref, sib_ref.blkno, seq);
                *sibling = sibling_content;
                log::debug!("split blkno={} -> {}", new_child_ref.blkno, sib_ref.blkno);

                if key > new_child_key {
                    (sib_ref, sibling)
                } else {
                    (new_child_ref, child)
                }
            } else {
                (new_child_ref, child)
            };

            cur = chosen;
            cur_ref = chosen_ref;
            height -= 1;
        }
    }

    /// Replace an existing item's value. Fails with [`Error::NotFound`] if
    /// `key` is absent.
    pub fn update(&self, key: &K, value: &[u8]) -> Result<()> {
        let seq = self.next_seq();
        let mut root = self.root.lock().unwrap();

        let (mut cur_ref, latch) = self.manager.dirty_ref(root.block_ref, seq)?;
        let mut cur = latch.write();
        if cur_ref != root.block_ref {
            self.manager.free(root.block_ref)?;
            root.block_ref = cur_ref;
        }

        let mut height = root.height;
        loop {
            if height == 0 {
                let (pos, cmp) = cur.find_pos(key);
                if cmp != Ordering::Equal {
                    return Err(Error::NotFound);
                }
                let need = Block::<K>::all_val_bytes(value.len());
                let free_once_replaced = cur.reclaimable_free() + cur.all_item_bytes(pos);
                if free_once_replaced < need {
                    // `dirty(key)` only guarantees a writable path, not room for a
                    // larger value than the one already stored; growing the root
                    // mid-update is out of scope (see DESIGN.md).
                    return Err(Error::Integrity("update: replacement value does not fit in leaf"));
                }
                cur.delete_item(pos);
                walker::compact_if_needed(&mut cur, need);
                let (pos, _) = cur.find_pos(key);
                cur.create_item(pos, *key, value.len(), seq);
                cur.item_val_mut(pos).copy_from_slice(value);
                return Ok(());
            }

            let (pos, _) = cur.find_pos(key);
            let child_ref = cur.child_ref(pos);
            let (new_child_ref, child_latch) = self.manager.dirty_ref(child_ref, seq)?;
            let mut child = child_latch.write();
            if new_child_ref != child_ref {
                cur.set_child_ref(pos, new_child_ref);
                self.manager.free(child_ref)?;
            }

            let child_item_cost = if height == 1 {
                Block::<K>::all_val_bytes(value.len())
            } else {
                0
            };

            let (chosen_ref, chosen) = if child_item_cost > 0 && !walker::fits_with_compaction(&child, child_item_cost) {
                let (sib_ref, sib_latch) = self.manager.alloc_dirty(seq)?;
                let mut sibling = sib_latch.write();
                let (sibling_content, sib_ref, new_child_key) =
                    walker::split_and_link(&mut cur, pos, &mut child, new_child_ref, sib_ref.blkno, seq);
                *sibling = sibling_content;

                if *key > new_child_key {
                    (sib_ref, sibling)
                } else {
                    (new_child_ref, child)
                }
            } else {
                (new_child_ref, child)
            };

            cur = chosen;
            cur_ref = chosen_ref;
            height -= 1;
        }
    }

    /// Remove an item. Fails with [`Error::NotFound`] if `key` is absent.
    pub fn delete(&self, key: &K) -> Result<()> {
        let seq = self.next_seq();
        let mut root = self.root.lock().unwrap();

        let (mut cur_ref, latch) = self.manager.dirty_ref(root.block_ref, seq)?;
        let mut cur = latch.write();
        if cur_ref != root.block_ref {
            self.manager.free(root.block_ref)?;
            root.block_ref = cur_ref;
        }
        let (new_cur_ref, new_cur) = self.collapse_while_single_child(&mut root, cur_ref, cur, seq)?;
        cur_ref = new_cur_ref;
        cur = new_cur;

        let mut height = root.height;
        loop {
            if height == 0 {
                let (pos, cmp) = cur.find_pos(key);
                if cmp != Ordering::Equal {
                    return Err(Error::NotFound);
                }
                cur.delete_item(pos);
                log::debug!("delete key={key:?} leaf={} seq={seq}", cur_ref.blkno);
                return Ok(());
            }

            let (pos, _) = cur.find_pos(key);
            let child_ref = cur.child_ref(pos);
            let (new_child_ref, child_latch) = self.manager.dirty_ref(child_ref, seq)?;
            let mut child = child_latch.write();
            if new_child_ref != child_ref {
                cur.set_child_ref(pos, new_child_ref);
                self.manager.free(child_ref)?;
            }

            if walker::below_merge_threshold(&child, self.limits.merge_threshold) && cur.nr_items() > 1 {
                let is_rightmost = pos == cur.nr_items() as usize - 1;
                let sib_pos = if is_rightmost { pos - 1 } else { pos + 1 };
                let sib_ref = cur.child_ref(sib_pos);
                let (new_sib_ref, sib_latch) = self.manager.dirty_ref(sib_ref, seq)?;
                let mut sibling = sib_latch.write();
                if new_sib_ref != sib_ref {
                    cur.set_child_ref(sib_pos, new_sib_ref);
                    self.manager.free(sib_ref)?;
                }

                let (left_pos, mut left, left_ref, right_pos, mut right, right_ref) = if is_rightmost {
                    (sib_pos, sibling, new_sib_ref, pos, child, new_child_ref)
                } else {
                    (pos, child, new_child_ref, sib_pos, sibling, new_sib_ref)
                };

                let drained = walker::merge_and_relink(
                    &mut cur, left_pos, &mut left, left_ref, right_pos, &mut right, right_ref, seq,
                );
                if drained {
                    self.manager.free(right_ref)?;
                }

                let go_right = !drained && *key > left.greatest_key();
                if go_right {
                    cur_ref = right_ref;
                    cur = right;
                } else {
                    cur_ref = left_ref;
                    cur = left;
                }

                if height == root.height {
                    let (collapsed_ref, collapsed) =
                        self.collapse_while_single_child(&mut root, cur_ref, cur, seq)?;
                    cur_ref = collapsed_ref;
                    cur = collapsed;
                    height = root.height + 1; // compensate for the decrement below
                }
            } else {
                cur = child;
                cur_ref = new_child_ref;
            }
            height -= 1;
        }
    }

    fn grow_tree(
        &self,
        root: &mut Root,
        seq: u64,
        old_content: &Block<K>,
    ) -> Result<(BlockRef, crate::latch::WriteGuard<Block<K>>)> {
        let (child_ref, child_latch) = self.manager.alloc_dirty(seq)?;
        {
            let mut child = child_latch.write();
            *child = old_content.clone();
            child.set_blkno(child_ref.blkno);
            child.set_seq(seq);
        }

        let (new_root_ref, new_root_latch) = self.manager.alloc_dirty(seq)?;
        let mut new_root = new_root_latch.write();
        new_root.create_item(0, K::MAX, BlockRef::ENCODED_LEN, seq);
        new_root.set_child_ref(0, child_ref);

        self.manager.free(root.block_ref)?;
        root.block_ref = new_root_ref;
        root.height += 1;
        log::debug!("grow_tree new_root={} height={}", new_root_ref.blkno, root.height);
        Ok((new_root_ref, new_root))
    }

    /// Collapse a root whose single remaining child makes its own level
    /// pointless, possibly several times in a row.
    fn collapse_while_single_child(
        &self,
        root: &mut Root,
        mut cur_ref: BlockRef,
        mut cur: crate::latch::WriteGuard<Block<K>>,
        seq: u64,
    ) -> Result<(BlockRef, crate::latch::WriteGuard<Block<K>>)> {
        while root.height > 0 && cur.nr_items() == 1 {
            let only_ref = cur.child_ref(0);
            let (new_ref, child_latch) = self.manager.dirty_ref(only_ref, seq)?;
            if new_ref != only_ref {
                self.manager.free(only_ref)?;
            }
            self.manager.free(cur_ref)?;
            root.block_ref = new_ref;
            root.height -= 1;
            cur_ref = new_ref;
            cur = child_latch.write();
            log::debug!("collapse_root new_root={} height={}", new_ref.blkno, root.height);
        }
        Ok((cur_ref, cur))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key64;
    use crate::manager::MemBlockManager;

    fn tree() -> BTree<Key64, MemBlockManager<Key64>> {
        BTree::new(MemBlockManager::new()).unwrap()
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let t = tree();
        t.insert(Key64(1), b"hello").unwrap();
        let c = t.lookup(&Key64(1)).unwrap();
        assert_eq!(c.value(), b"hello");
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let t = tree();
        t.insert(Key64(1), b"a").unwrap();
        assert!(matches!(t.insert(Key64(1), b"b"), Err(Error::AlreadyExists)));
    }

    #[test]
    fn missing_lookup_is_not_found() {
        let t = tree();
        assert!(matches!(t.lookup(&Key64(9)), Err(Error::NotFound)));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let t = tree();
        assert!(matches!(t.delete(&Key64(9)), Err(Error::NotFound)));
    }

    #[test]
    fn update_replaces_value() {
        let t = tree();
        t.insert(Key64(1), b"a").unwrap();
        t.update(&Key64(1), b"longer value").unwrap();
        assert_eq!(t.lookup(&Key64(1)).unwrap().value(), b"longer value");
    }

    #[test]
    fn update_that_does_not_fit_leaves_the_old_value_intact() {
        let t = tree();
        t.insert(Key64(1), &[9u8]).unwrap();
        // Pack the leaf with a second item so there is no room left to grow
        // the first one, on a root that cannot split mid-`update`.
        t.insert(Key64(2), &vec![0u8; 4000]).unwrap();

        let oversized = vec![7u8; 1000];
        assert!(matches!(t.update(&Key64(1), &oversized), Err(Error::Integrity(_))));
        assert_eq!(t.lookup(&Key64(1)).unwrap().value(), &[9u8]);
    }

    #[test_log::test]
    fn tree_grows_under_many_inserts_and_collapses_back_down() {
        let t = tree();
        for i in 0..2000u64 {
            t.insert(Key64(i), &i.to_be_bytes()).unwrap();
        }
        assert!(t.root.lock().unwrap().height > 0, "tree should have grown a parent level");
        for i in 0..2000u64 {
            t.delete(&Key64(i)).unwrap();
        }
        assert_eq!(t.root.lock().unwrap().height, 0, "tree should collapse back to a bare leaf");
        for i in 0..2000u64 {
            assert!(matches!(t.lookup(&Key64(i)), Err(Error::NotFound)));
        }
    }

    #[test]
    fn next_walks_keys_in_order() {
        let t = tree();
        for i in [5u64, 1, 3, 9, 7] {
            t.insert(Key64(i), b"x").unwrap();
        }
        let mut seen = Vec::new();
        let mut after = None;
        while let Some(c) = t.next(Key64(0), Key64::MAX, after).unwrap() {
            seen.push(c.key());
            after = Some(c.key());
        }
        assert_eq!(seen, vec![Key64(1), Key64(3), Key64(5), Key64(7), Key64(9)]);
    }

    #[test]
    fn next_is_bounded_by_last() {
        let t = tree();
        for i in [1u64, 3, 5, 7, 9] {
            t.insert(Key64(i), b"x").unwrap();
        }
        let mut seen = Vec::new();
        let mut after = None;
        while let Some(c) = t.next(Key64(0), Key64(6), after).unwrap() {
            seen.push(c.key());
            after = Some(c.key());
        }
        assert_eq!(seen, vec![Key64(1), Key64(3), Key64(5)]);
    }

    #[test]
    fn since_only_yields_items_touched_after_the_watermark() {
        let t = tree();
        t.insert(Key64(1), b"x").unwrap();
        let watermark = t.root_seq();
        t.insert(Key64(2), b"y").unwrap();

        let mut seen = Vec::new();
        let mut after = None;
        while let Some(c) = t.since(Key64(0), Key64::MAX, watermark + 1, after).unwrap() {
            seen.push(c.key());
            after = Some(c.key());
        }
        assert_eq!(seen, vec![Key64(2)]);
    }

    #[test]
    fn hole_finds_the_first_gap() {
        let t = tree();
        for i in [2u64, 3, 5, 6] {
            t.insert(Key64(i), b"x").unwrap();
        }
        assert_eq!(t.hole(Key64(1), Key64(10)).unwrap(), Key64(1));
        assert_eq!(t.hole(Key64(2), Key64(10)).unwrap(), Key64(4));
    }

    #[test]
    fn hole_reports_no_space_when_range_is_full() {
        let t = tree();
        for i in [2u64, 3, 4, 5, 6, 7, 8, 9, 10] {
            t.insert(Key64(i), b"x").unwrap();
        }
        assert!(matches!(t.hole(Key64(2), Key64(10)), Err(Error::NoSpace)));
    }

    #[test]
    fn dirty_cursor_edits_value_in_place() {
        let t = tree();
        t.insert(Key64(1), &[0u8; 4]).unwrap();
        {
            let mut c = t.dirty(&Key64(1)).unwrap();
            c.value_mut().unwrap().copy_from_slice(&1u32.to_be_bytes());
        }
        assert_eq!(t.lookup(&Key64(1)).unwrap().value(), &1u32.to_be_bytes());
    }

    #[test]
    fn many_inserts_and_deletes_reclaim_blocks() {
        let manager = MemBlockManager::<Key64>::new();
        let t = BTree::new(manager).unwrap();
        for i in 0..500u64 {
            t.insert(Key64(i), &i.to_be_bytes()).unwrap();
        }
        for i in 0..500u64 {
            t.delete(&Key64(i)).unwrap();
        }
        assert_eq!(t.manager.live_blocks(), 1, "only the collapsed-back-to-leaf root should remain");
    }

    #[test]
    fn random_order_insert_and_delete_leaves_nothing_behind() {
        use rand::seq::SliceRandom;
        use rand::Rng;

        let t = tree();
        let mut rng = rand::rng();
        let mut keys: Vec<u64> = (0..800).collect();
        keys.shuffle(&mut rng);

        for &i in &keys {
            let len = rng.random_range(1..64);
            let value: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            t.insert(Key64(i), &value).unwrap();
        }
        for &i in &keys {
            assert!(t.lookup(&Key64(i)).is_ok());
        }

        keys.shuffle(&mut rng);
        for &i in &keys {
            t.delete(&Key64(i)).unwrap();
        }
        assert_eq!(t.root.lock().unwrap().height, 0);
        assert!(t.next(Key64(0), Key64::MAX, None).unwrap().is_none());
    }
}
