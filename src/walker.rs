//! Pure block-pair algorithms used during descent: splitting an overfull
//! block, merging or rebalancing two adjacent siblings, and the space
//! checks that decide between compaction and a split. None of these touch
//! the block manager; [`crate::tree::BTree`] drives them while it holds the
//! write latches on the blocks involved.

use crate::block::{Block, BlockRef, BLOCK_SIZE, HEADER_SIZE};
use crate::key::TreeKey;

/// Bytes available to items across the whole block, header excluded.
pub(crate) fn capacity() -> usize {
    BLOCK_SIZE - HEADER_SIZE
}

/// Whether `block` can take `incoming` more bytes, compaction included.
/// `false` means a split is unavoidable.
pub(crate) fn fits_with_compaction<K: TreeKey>(block: &Block<K>, incoming: usize) -> bool {
    block.reclaimable_free() >= incoming
}

/// Compact `block` in place if doing so would free enough contiguous space
/// for `incoming` bytes and a plain append would not. Returns whether the
/// block was compacted.
pub(crate) fn compact_if_needed<K: TreeKey>(block: &mut Block<K>, incoming: usize) -> bool {
    if block.contig_free() >= incoming {
        return false;
    }
    if block.reclaimable_free() >= incoming {
        block.compact_items();
        true
    } else {
        false
    }
}

/// Split `left` roughly in half, moving its upper half into a freshly
/// allocated `right` block. `left` must hold at least two items.
pub(crate) fn split_block<K: TreeKey>(left: &mut Block<K>, new_blkno: u64, seq: u64) -> Block<K> {
    let n = left.nr_items() as usize;
    debug_assert!(n >= 2, "cannot split a block with fewer than two items");
    let keep = n / 2;

    let budget: usize = (keep..n).map(|i| left.all_item_bytes(i)).sum();
    let mut right = Block::empty(new_blkno, seq);
    Block::move_items(&mut right, left, true, budget);
    debug_assert_eq!(left.nr_items() as usize, keep);
    debug_assert_eq!(right.nr_items() as usize, n - keep);
    right
}

/// A sibling pair is a merge candidate once either one's live payload drops
/// below this fraction of a block's capacity.
pub(crate) fn below_merge_threshold<K: TreeKey>(block: &Block<K>, threshold: usize) -> bool {
    block.used_total() < threshold
}

/// Try to fully merge `right` into `left`; if the combined payload does not
/// fit in one block, rebalance instead by moving just enough items from
/// `right`'s head into `left`'s tail to lift `left` back above par.
///
/// Returns `true` if `right` was fully drained (the caller must free it and
/// drop its separator from the parent), `false` if only rebalanced (the
/// caller must refresh the parent's separator key for `right`).
pub(crate) fn merge_or_rebalance<K: TreeKey>(left: &mut Block<K>, right: &mut Block<K>) -> bool {
    if left.used_total() + right.used_total() <= capacity() {
        Block::move_items(left, right, false, usize::MAX);
        debug_assert!(right.is_empty());
        true
    } else {
        let target = (left.used_total() + right.used_total()) / 2;
        if left.used_total() < target {
            let budget = target - left.used_total();
            Block::move_items(left, right, false, budget);
        }
        false
    }
}

/// Split an overfull `child` (a parent item at `pos` in `parent`) and patch
/// `parent`'s separators: `child`'s entry is rekeyed to its shrunk greatest
/// key, a new entry for the sibling is inserted beside it. The rightmost
/// separator at any non-leaf level always carries `K::MAX`, so if `pos` was
/// `parent`'s last item before the split, the sibling (now the new
/// rightmost child) inherits that sentinel instead of its real key.
///
/// Returns the sibling's content, its ref, and `child`'s new greatest key
/// (the last one needed by the caller to decide which half `key` belongs in).
pub(crate) fn split_and_link<K: TreeKey>(
    parent: &mut Block<K>,
    pos: usize,
    child: &mut Block<K>,
    new_child_ref: BlockRef,
    sibling_blkno: u64,
    seq: u64,
) -> (Block<K>, BlockRef, K) {
    let is_rightmost = pos == parent.nr_items() as usize - 1;
    let sibling = split_block(child, sibling_blkno, seq);
    let sibling_ref = BlockRef {
        blkno: sibling_blkno,
        seq,
    };

    let new_child_key = child.greatest_key();
    let sibling_key = if is_rightmost {
        K::MAX
    } else {
        sibling.greatest_key()
    };

    parent.delete_item(pos);
    compact_if_needed(parent, Block::<K>::all_val_bytes(BlockRef::ENCODED_LEN) * 2);
    let (p1, _) = parent.find_pos(&new_child_key);
    parent.create_item(p1, new_child_key, BlockRef::ENCODED_LEN, seq);
    parent.set_child_ref(p1, new_child_ref);
    let (p2, _) = parent.find_pos(&sibling_key);
    parent.create_item(p2, sibling_key, BlockRef::ENCODED_LEN, seq);
    parent.set_child_ref(p2, sibling_ref);

    (sibling, sibling_ref, new_child_key)
}

/// Merge or rebalance the adjacent, key-ordered siblings `left`/`right` and
/// patch their separator entries in `parent`. `left_pos`/`right_pos` are
/// their current positions in `parent` (`left_pos < right_pos`). Returns
/// `true` if `right` was fully drained — the caller must free `right_ref`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn merge_and_relink<K: TreeKey>(
    parent: &mut Block<K>,
    left_pos: usize,
    left: &mut Block<K>,
    left_ref: BlockRef,
    right_pos: usize,
    right: &mut Block<K>,
    right_ref: BlockRef,
    seq: u64,
) -> bool {
    debug_assert!(left_pos < right_pos);
    let right_was_rightmost = right_pos == parent.nr_items() as usize - 1;
    let drained = merge_or_rebalance(left, right);

    parent.delete_item(right_pos);
    if !drained {
        let right_key = if right_was_rightmost {
            K::MAX
        } else {
            right.greatest_key()
        };
        let (p, _) = parent.find_pos(&right_key);
        parent.create_item(p, right_key, BlockRef::ENCODED_LEN, seq);
        parent.set_child_ref(p, right_ref);
    }

    parent.delete_item(left_pos);
    let left_key = if drained && right_was_rightmost {
        K::MAX
    } else {
        left.greatest_key()
    };
    let (p, _) = parent.find_pos(&left_key);
    parent.create_item(p, left_key, BlockRef::ENCODED_LEN, seq);
    parent.set_child_ref(p, left_ref);

    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key64;

    fn filled(n: u64, val_len: usize, blkno: u64) -> Block<Key64> {
        let mut b = Block::<Key64>::empty(blkno, 1);
        for i in 0..n {
            let (pos, _) = b.find_pos(&Key64(i));
            b.create_item(pos, Key64(i), val_len, 1);
        }
        b
    }

    #[test]
    fn split_block_keeps_order_across_both_halves() {
        let mut left = filled(10, 32, 1);
        let right = split_block(&mut left, 2, 1);
        assert!(left.nr_items() < 10);
        assert_eq!(left.nr_items() as usize + right.nr_items() as usize, 10);
        assert!(left.greatest_key() < right.item_key(0));
    }

    #[test]
    fn merge_drains_right_when_it_fits() {
        let mut left = filled(2, 8, 1);
        let mut right = filled(2, 8, 2);
        // re-key right so it doesn't collide with left
        let mut shifted = Block::<Key64>::empty(2, 1);
        for i in 0..right.nr_items() as usize {
            let k = Key64(right.item_key(i).0 + 100);
            let (pos, _) = shifted.find_pos(&k);
            shifted.create_item(pos, k, right.item_val_len(i), 1);
        }
        right = shifted;
        let fully_merged = merge_or_rebalance(&mut left, &mut right);
        assert!(fully_merged);
        assert!(right.is_empty());
        assert_eq!(left.nr_items(), 4);
    }
}
