//! Package implement versioned documentation deployments on a single git branch.
//!
//! Each version of a documentation site lives as a sub-tree inside one
//! long-lived branch, typically `gh-pages`. Updates are committed straight
//! into the object database, no working-tree is ever checked out:
//!
//! * [git::build_tree] computes a new tree from a base tree and a set of
//!   file additions and deletions, creating only the blobs and sub-trees that
//!   changed.
//! * [git::CommitBuilder] wraps the tree builder, writes a commit whose parent
//!   is the branch's current tip, and advances the branch ref with a
//!   compare-and-set.
//! * [git::Reconciler] fetches the remote tracking ref, classifies local
//!   versus remote as one of [git::Divergence], applies the configured
//!   [git::Policy] and pushes with a compare-and-set against the remote.
//! * [serve] serves files straight out of a branch's committed tree.
//!
//! All operations re-read ref state at the start of their run, nothing is
//! cached across calls. Concurrent writers against the same branch are
//! detected by the compare-and-set ref updates and reported as
//! [Error::RefRace].

mod error;

pub mod git;
pub mod serve;
pub mod util;

pub use crate::error::{Error, Result};
