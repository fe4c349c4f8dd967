//! Commit builder, commit file mutations onto a branch without a checkout.
//!
//! A commit is done in two steps. [CommitBuilder::prepare] reads the branch
//! tip, builds the new tree and writes the commit object, without moving
//! any ref. [PendingCommit::apply] then advances the branch with a
//! compare-and-set against the tip observed by `prepare`. If some other
//! writer moved the branch in between, apply fails with [Error::RefRace] and
//! the caller must start over from `prepare`. The commit object written by
//! a losing `prepare` is left unreferenced.

use git2::Oid;
use log::{info, warn};

use crate::{
    git::{
        config::Config,
        repo::Repo,
        tree::{build_tree, FileInfo},
    },
    Error, Result,
};

/// Result of committing a mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Branch advanced to `commit`. `parent` is None for a branch's first
    /// commit.
    Committed {
        commit: Oid,
        parent: Option<Oid>,
        tree: Oid,
    },
    /// Mutation left the tree unchanged and empty commits are not allowed,
    /// branch is left at `tip`.
    Unchanged { tip: Option<Oid> },
}

impl CommitOutcome {
    /// Return the new commit, if any.
    pub fn to_commit(&self) -> Option<Oid> {
        match self {
            CommitOutcome::Committed { commit, .. } => Some(*commit),
            CommitOutcome::Unchanged { .. } => None,
        }
    }
}

/// Commit builder, refer to module documentation for details.
pub struct CommitBuilder<'a> {
    repo: &'a Repo,
    config: &'a Config,
    allow_empty: bool,
}

impl<'a> CommitBuilder<'a> {
    pub fn new(repo: &'a Repo, config: &'a Config) -> CommitBuilder<'a> {
        CommitBuilder {
            repo,
            config,
            allow_empty: config.allow_empty,
        }
    }

    /// Commit even when the mutation has no effect on the tree. Useful for
    /// keeping an audit trail, like recording that everything was removed.
    pub fn set_allow_empty(&mut self, allow_empty: bool) -> &mut Self {
        self.allow_empty = allow_empty;
        self
    }

    /// Build the tree for `adds` and `deletes` on top of `branch`'s tip and
    /// write the commit object. No ref is moved.
    pub fn prepare<S>(
        &self,
        branch: &str,
        message: &str,
        adds: &[FileInfo],
        deletes: &[S],
    ) -> Result<PendingCommit>
    where
        S: AsRef<str>,
    {
        let refname = Repo::branch_ref(branch)?;
        let parent = self.repo.read_ref(&refname)?;

        let base = match parent {
            Some(oid) => Some(self.repo.tree_of(oid)?.id()),
            None => None,
        };
        let tree = build_tree(self.repo, base, adds, deletes)?;
        let base_tree = match base {
            Some(base) => base,
            None => Repo::empty_tree_id()?,
        };

        let commit = match tree == base_tree && !self.allow_empty {
            true => None,
            false => {
                let sig = self.config.to_signature(self.repo.as_repo())?;
                Some(self.repo.write_commit(&sig, &sig, message, tree, parent)?)
            }
        };

        let pc = PendingCommit {
            branch: branch.to_string(),
            refname,
            parent,
            tree,
            commit,
        };
        Ok(pc)
    }

    /// Same as `prepare` followed by `apply`.
    pub fn commit<S>(
        &self,
        branch: &str,
        message: &str,
        adds: &[FileInfo],
        deletes: &[S],
    ) -> Result<CommitOutcome>
    where
        S: AsRef<str>,
    {
        self.prepare(branch, message, adds, deletes)?.apply(self.repo)
    }
}

/// Commit object written but not yet referenced by its branch.
#[derive(Clone, Debug)]
pub struct PendingCommit {
    branch: String,
    refname: String,
    parent: Option<Oid>,
    tree: Oid,
    commit: Option<Oid>,
}

impl PendingCommit {
    /// Branch tip observed while preparing this commit.
    pub fn to_parent(&self) -> Option<Oid> {
        self.parent
    }

    pub fn to_tree(&self) -> Oid {
        self.tree
    }

    /// None when the mutation had no effect and empty commits are not
    /// allowed.
    pub fn to_commit(&self) -> Option<Oid> {
        self.commit
    }

    /// Fast-forward the branch to this commit, fail with [Error::RefRace] if
    /// the branch moved since it was read.
    pub fn apply(self, repo: &Repo) -> Result<CommitOutcome> {
        let commit = match self.commit {
            Some(commit) => commit,
            None => {
                info!("{} unchanged at {:?}, nothing to commit", self.branch, self.parent);
                return Ok(CommitOutcome::Unchanged { tip: self.parent });
            }
        };

        let log_message = match self.parent {
            Some(_) => format!("commit: {}", commit),
            None => format!("commit (initial): {}", commit),
        };
        match repo.cas_ref(&self.refname, commit, self.parent, &log_message) {
            Ok(()) => (),
            Err(err @ Error::RefRace(_, _)) => {
                warn!("{} moved while committing {}", self.branch, commit);
                return Err(err);
            }
            Err(err) => return Err(err),
        }
        info!("{} advanced {:?} -> {}", self.branch, self.parent, commit);

        let outcome = CommitOutcome::Committed {
            commit,
            parent: self.parent,
            tree: self.tree,
        };
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "commit_test.rs"]
mod commit_test;
