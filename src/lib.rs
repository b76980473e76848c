//! A persistent, copy-on-write B-tree for filesystem metadata: fixed-size
//! keys mapped to variable-length values, packed into fixed-size blocks
//! behind an offset array.
//!
//! [`tree::BTree`] is the entry point. It is generic over the key type
//! ([`key::TreeKey`]) and the block manager ([`manager::BlockManager`]) that
//! supplies allocation, copy-on-write and storage — this crate ships
//! [`manager::MemBlockManager`] as an in-memory reference implementation,
//! suitable for tests and for embedding above a real device-backed manager.
//!
//! ```
//! use fsmeta_btree::{key::Key64, manager::MemBlockManager, tree::BTree};
//!
//! let tree = BTree::new(MemBlockManager::<Key64>::new()).unwrap();
//! tree.insert(Key64::new(1), b"payload").unwrap();
//! assert_eq!(tree.lookup(&Key64::new(1)).unwrap().value(), b"payload");
//! ```

pub mod block;
pub mod cursor;
pub mod error;
pub mod key;
mod latch;
pub mod manager;
pub mod tree;
mod walker;

pub use cursor::Cursor;
pub use error::{Error, Result};
pub use tree::BTree;
