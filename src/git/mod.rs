//! Module implement branch content engine over git's object database.
//!
//! Nothing in this module reads or writes a working tree or the index, all
//! state is in objects and refs.

pub const GIT_DIR: &str = ".git";

mod commit;
mod config;
mod repo;
mod sync;
mod tree;
mod trie;

pub use commit::{CommitBuilder, CommitOutcome, PendingCommit};
pub use config::{Config, Policy, TomlConfig, CONFIG_FILE, DEFAULT_BRANCH, DEFAULT_REMOTE};
pub use repo::{Entry, Kind, Repo, MODE_BLOB, MODE_EXEC, MODE_TREE};
pub use sync::{Divergence, Outcome, Reconciler};
pub use tree::{build_tree, validate_path, FileInfo};
