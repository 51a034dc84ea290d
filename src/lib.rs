//! # memhose - Region Allocation and Zero-Copy String Aggregation
//!
//! This crate provides a **region allocator** ([`Memhose`]) behind a pluggable
//! allocation interface ([`MemPool`]), and a set of string aggregation
//! primitives ([`Snippet`], [`StrBunch`], [`StrFinder`]) built to keep the
//! number of allocations down.
//!
//! ## Overview
//!
//! A memhose carves allocations out of large bulks by bumping a cursor:
//!
//! ```text
//!   Memhose:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │  bulks[0]   ┌─────┬─────┬───────┬─────────────────────────────────┐  │
//!   │             │ A1  │ A2  │  A3   │            unused               │  │
//!   │             └─────┴─────┴───────┴─────────────────────────────────┘  │
//!   │                                 ▲                                    │
//!   │                                 └── next allocation                  │
//!   │                                                                      │
//!   │  bulks[1]   ┌───────────────────────────┬──────────────────────────┐ │
//!   │             │            A0             │          unused          │ │
//!   │             └───────────────────────────┴──────────────────────────┘ │
//!   │  ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─  │
//!   │  bulks[2]   ┌──────────────────────────────────────────────────────┐ │
//!   │  exhausted  │                        full                          │ │
//!   │             └──────────────────────────────────────────────────────┘ │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   New bulks are added at the front; bulks that cannot serve another word
//!   are parked behind the dashed line and skipped by the search.
//! ```
//!
//! Allocation is a first-fit scan over the usable bulks followed by a bump.
//! Nothing is freed individually; [`Memhose::free_all`] rewinds every bulk in
//! O(bulks) and dropping the hose releases them.
//!
//! ## Crate Structure
//!
//! ```text
//!   memhose
//!   ├── align      - Word alignment macro (align!)
//!   ├── bulk       - Bulk region metadata (internal)
//!   ├── error      - Error, ErrorCode and the thread-local last-error channel
//!   ├── mempool    - MemPool trait, System pool, PoolBytes
//!   ├── hose       - Memhose region allocator
//!   ├── out        - Measure / fill / new-string output protocol
//!   ├── snippet    - Fixed-capacity span index and split()
//!   ├── bunch      - StrBunch string collection
//!   └── finder     - StrFinder substring scanner
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use memhose::{Memhose, Out, StrBunch, StrFinder};
//!
//! let hose = Memhose::new(0).unwrap();
//! let mut fields = StrBunch::new(&hose);
//! let mut finder = StrFinder::new(b"usr:local:bin");
//!
//! finder.find_n(b":", -1, false, Some(&mut fields), None).unwrap();
//! finder.find_last_component(false, &mut fields).unwrap();
//!
//! let path = fields.join_by(b"/", Out::New).unwrap().into_bytes().unwrap();
//! assert_eq!(path, *b"usr/local/bin");
//! ```
//!
//! ## Output Protocol
//!
//! Every operation that produces bytes takes an [`Out`]:
//!
//! ```text
//!   ┌──────────────┬───────────────────────────┬──────────────────────────┐
//!   │ mode         │ effect                    │ result                   │
//!   ├──────────────┼───────────────────────────┼──────────────────────────┤
//!   │ Measure      │ nothing written           │ Err(TryAgain{required})  │
//!   │ Fill{buf}    │ writes into caller buffer │ Ok(Written(n))           │
//!   │ New          │ one exact-size allocation │ Ok(New(PoolBytes))       │
//!   └──────────────┴───────────────────────────┴──────────────────────────┘
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives anywhere
//! - **No individual frees**: A memhose only rewinds or drops as a whole
//! - **No content-preserving realloc**: [`Memhose`] answers `reallocate` with
//!   a fresh, uncopied block
//! - **Bytes, not text**: No Unicode awareness
//!
//! ## Safety
//!
//! Pools hand out raw memory, so [`MemPool`] is an `unsafe` trait. The
//! string types wrap it behind lifetimes: a [`StrBunch`] cannot outlive its
//! pool or the bytes it references, and a memhose cannot be rewound while
//! anything still borrows it.

pub mod align;
mod bulk;
pub mod bunch;
pub mod error;
pub mod finder;
pub mod hose;
pub mod mempool;
pub mod out;
pub mod snippet;

pub use bunch::{BufferCursor, Buffers, BunchConfig, StrBunch};
pub use error::{Error, ErrorCode, Result, clear_error, last_error, set_error};
pub use finder::{Match, StrFinder};
pub use hose::{DEFAULT_BULK_SIZE, HoseConfig, Memhose};
pub use mempool::{EMPTY, MemPool, PoolBytes, System, duplicate, system};
pub use out::{Emitted, Out};
pub use snippet::{Snippet, split};
