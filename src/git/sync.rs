//! Sync reconciler, publish a branch to its remote.
//!
//! Reconciling a branch is a three step affair:
//!
//! * Fetch the remote's view of the branch into its tracking ref,
//!   `refs/remotes/<remote>/<branch>`.
//! * Classify local tip against the tracking tip, refer [Divergence].
//! * Apply [Policy] and push. The push is a compare-and-set against the
//!   remote, if the remote ref moved after the fetch the push is abandoned
//!   with [Error::RefRace].
//!
//! Network operations honor the timeout from [Config], an expired timeout
//! is reported as [Error::NetworkFailure].

use git2::{ErrorCode, FetchOptions, FetchPrune, Oid, PushOptions, RemoteCallbacks};
use log::{debug, info, warn};

use std::{cell::RefCell, collections::HashMap, fmt, result, time};

use crate::{
    err_at,
    git::{
        config::{Config, Policy},
        repo::{Repo, MODE_BLOB, MODE_EXEC},
        tree::{build_tree, FileInfo},
    },
    Error, Result,
};

/// Local branch tip compared with remote branch tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Divergence {
    /// Remote does not have the branch.
    RemoteAbsent,
    UpToDate,
    /// Remote tip is an ancestor of local tip.
    LocalAhead,
    /// Local tip is an ancestor of remote tip, or local branch is missing.
    LocalBehind,
    /// Neither tip is an ancestor of the other.
    Diverged,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Divergence::RemoteAbsent => write!(f, "remote-absent"),
            Divergence::UpToDate => write!(f, "up-to-date"),
            Divergence::LocalAhead => write!(f, "local-ahead"),
            Divergence::LocalBehind => write!(f, "local-behind"),
            Divergence::Diverged => write!(f, "diverged"),
        }
    }
}

/// Successful outcome of [Reconciler::reconcile], carries the remote tip
/// after the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to push.
    UpToDate(Option<Oid>),
    /// Fast-forward push, or the branch got created on the remote.
    Pushed(Oid),
    /// Diverged local tip pushed as is, remote-only commits are discarded.
    ForcePushed(Oid),
    /// Newest local commit re-parented onto the remote tip and pushed.
    Rebased(Oid),
}

impl Outcome {
    pub fn to_tip(&self) -> Option<Oid> {
        match self {
            Outcome::UpToDate(tip) => *tip,
            Outcome::Pushed(tip) => Some(*tip),
            Outcome::ForcePushed(tip) => Some(*tip),
            Outcome::Rebased(tip) => Some(*tip),
        }
    }
}

#[derive(Clone, Copy)]
struct Deadline(Option<time::Instant>);

impl Deadline {
    fn new(timeout: Option<time::Duration>) -> Deadline {
        Deadline(timeout.map(|timeout| time::Instant::now() + timeout))
    }

    fn is_expired(&self) -> bool {
        match self.0 {
            Some(deadline) => time::Instant::now() >= deadline,
            None => false,
        }
    }

    fn check(&self, op: &str) -> Result<()> {
        match self.is_expired() {
            true => err_at!(NetworkFailure, msg: "{} timed out", op),
            false => Ok(()),
        }
    }
}

/// Reconciler for a single repository and remote, remote name and timeout
/// are picked from [Config].
pub struct Reconciler<'a> {
    repo: &'a Repo,
    config: &'a Config,
}

impl<'a> Reconciler<'a> {
    pub fn new(repo: &'a Repo, config: &'a Config) -> Reconciler<'a> {
        Reconciler { repo, config }
    }

    /// Fetch `branch` from remote into its tracking ref and return the
    /// remote tip, None if the remote does not have the branch. A stale
    /// tracking ref for a branch that is gone from the remote is removed.
    pub fn fetch(&self, branch: &str) -> Result<Option<Oid>> {
        let refname = Repo::branch_ref(branch)?;
        let tracking = Repo::tracking_ref(&self.config.remote, branch)?;
        let deadline = Deadline::new(self.config.timeout);

        let mut remote = self.find_remote()?;
        let before = self.repo.read_ref(&tracking)?;
        deadline.check("fetch")?;

        // an explicit refspec whose source is not advertised fetches
        // nothing, pruning drops the tracking ref of a vanished branch.
        let refspec = format!("+{}:{}", refname, tracking);
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(self.callbacks(deadline))
            .prune(FetchPrune::On);
        if let Err(err) = remote.fetch(&[refspec.as_str()], Some(&mut opts), None) {
            return self.to_network_failure(deadline, "fetch", err);
        }

        let after = self.repo.read_ref(&tracking)?;
        match (before, after) {
            (_, Some(tip)) => info!("fetched {}/{} at {}", self.config.remote, branch, tip),
            (Some(stale), None) => {
                let name = self.config.remote.as_str();
                warn!("{} gone from {}, pruned {} at {}", branch, name, tracking, stale)
            }
            (None, None) => debug!("{} not on {}", branch, self.config.remote),
        }

        Ok(after)
    }

    /// Classify local `branch` against its tracking ref, as of the last
    /// fetch.
    pub fn classify(&self, branch: &str) -> Result<Divergence> {
        let local = self.repo.read_branch(branch)?;
        let remote = self.repo.read_tracking(&self.config.remote, branch)?;
        self.divergence(local, remote)
    }

    /// Fetch `branch` and bring the local branch up to the remote tip, if
    /// local branch is missing or behind. Meant to be called before
    /// committing, so that the new commit builds on remote history. Return
    /// the local tip after the call.
    pub fn update_from_remote(&self, branch: &str) -> Result<Option<Oid>> {
        let remote_tip = self.fetch(branch)?;
        let local_tip = self.repo.read_branch(branch)?;

        match (self.divergence(local_tip, remote_tip)?, remote_tip) {
            (Divergence::LocalBehind, Some(remote)) => {
                let refname = Repo::branch_ref(branch)?;
                let log_message = format!("update from {}/{}", self.config.remote, branch);
                self.repo.cas_ref(&refname, remote, local_tip, &log_message)?;
                info!("{} updated {:?} -> {}", branch, local_tip, remote);
                Ok(Some(remote))
            }
            _ => Ok(local_tip),
        }
    }

    /// Fetch, classify and push `branch` as per `policy`.
    ///
    /// On [Error::Diverged], [Error::LocalBehind] and
    /// [Error::UnsupportedRebase] neither local nor remote branch is touched.
    pub fn reconcile(&self, branch: &str, policy: Policy) -> Result<Outcome> {
        let remote_name = self.config.remote.as_str();

        let remote_tip = self.fetch(branch)?;
        let local_tip = self.repo.read_branch(branch)?;
        let div = self.divergence(local_tip, remote_tip)?;
        info!("{} is {} with {}/{}, policy {}", branch, div, remote_name, branch, policy);

        let local = match (local_tip, div) {
            (Some(local), _) => local,
            (None, Divergence::LocalBehind) => {
                return err_at!(LocalBehind, msg: "{} missing locally", branch);
            }
            (None, _) => return Ok(Outcome::UpToDate(None)),
        };

        match (div, policy, remote_tip) {
            (Divergence::UpToDate, _, _) => Ok(Outcome::UpToDate(Some(local))),
            (Divergence::RemoteAbsent, _, _) | (Divergence::LocalAhead, _, _) => {
                Ok(Outcome::Pushed(self.push(branch, remote_tip, false)?))
            }
            (Divergence::LocalBehind, _, _) => {
                let (r, b) = (remote_name, branch);
                err_at!(LocalBehind, msg: "{} is behind {}/{}, update first", b, r, b)
            }
            (Divergence::Diverged, Policy::Fail, _) => {
                let (r, b) = (remote_name, branch);
                err_at!(Diverged, msg: "{} has diverged from {}/{}", b, r, b)
            }
            (Divergence::Diverged, Policy::Ignore, _) => {
                warn!("{} overwrites {}/{} at {:?}", branch, remote_name, branch, remote_tip);
                Ok(Outcome::ForcePushed(self.push(branch, remote_tip, true)?))
            }
            (Divergence::Diverged, Policy::Rebase, Some(remote)) => {
                self.rebase(branch, local, remote)
            }
            (Divergence::Diverged, Policy::Rebase, None) => {
                err_at!(Fatal, msg: "{} diverged without remote tip", branch)
            }
        }
    }

    /// Push local `branch` to remote, if and only if the remote branch is
    /// still at `expected`. None for `expected` means the remote must not
    /// have the branch. With `force` the push need not be a fast-forward.
    /// On success the tracking ref is moved to the pushed commit, which is
    /// returned.
    pub fn push(&self, branch: &str, expected: Option<Oid>, force: bool) -> Result<Oid> {
        let remote_name = self.config.remote.as_str();
        let refname = Repo::branch_ref(branch)?;
        let tracking = Repo::tracking_ref(remote_name, branch)?;
        let local = match self.repo.read_ref(&refname)? {
            Some(local) => local,
            None => return err_at!(InvalidInput, msg: "branch {} not found", branch),
        };

        let deadline = Deadline::new(self.config.timeout);
        let mut remote = self.find_remote()?;
        deadline.check("push")?;

        let refspec = match force {
            true => format!("+{}:{}", refname, refname),
            false => format!("{}:{}", refname, refname),
        };
        let expected_oid = expected.unwrap_or_else(Oid::zero);
        let moved: RefCell<Option<Oid>> = RefCell::new(None);
        let rejected: RefCell<Option<String>> = RefCell::new(None);

        let res = {
            let mut callbacks = self.callbacks(deadline);
            callbacks.push_negotiation(|updates| {
                for update in updates.iter() {
                    if update.dst_refname() != Some(refname.as_str()) {
                        continue;
                    }
                    if update.src() != expected_oid {
                        *moved.borrow_mut() = Some(update.src());
                        return Err(git2::Error::from_str("remote ref moved since fetch"));
                    }
                }
                match deadline.is_expired() {
                    true => Err(git2::Error::from_str("push timed out")),
                    false => Ok(()),
                }
            });
            callbacks.push_update_reference(|_refname, status| {
                if let Some(msg) = status {
                    *rejected.borrow_mut() = Some(msg.to_string());
                }
                Ok(())
            });

            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            remote.push(&[refspec.as_str()], Some(&mut opts))
        };

        if let Some(actual) = moved.into_inner() {
            warn!("{}/{} moved to {} while pushing", remote_name, branch, actual);
            let (r, b) = (remote_name, branch);
            return err_at!(RefRace, msg: "{}/{} at {} expected {:?}", r, b, actual, expected);
        }
        match res {
            Ok(()) => (),
            Err(err) if is_race(err.code(), err.message()) => {
                warn!("{}/{} rejected push: {}", remote_name, branch, err);
                return err_at!(RefRace, msg: "{}/{}: {}", remote_name, branch, err);
            }
            Err(err) => return self.to_network_failure(deadline, "push", err),
        }
        match rejected.into_inner() {
            Some(msg) if is_race(ErrorCode::GenericError, &msg) => {
                warn!("{}/{} rejected push: {}", remote_name, branch, msg);
                return err_at!(RefRace, msg: "{}/{}: {}", remote_name, branch, msg);
            }
            Some(msg) => {
                return err_at!(NetworkFailure, msg: "{}/{} rejected: {}", remote_name, branch, msg);
            }
            None => (),
        }

        self.repo.set_ref(&tracking, local, "push")?;
        info!("pushed {} to {}/{} over {:?}", local, remote_name, branch, expected);

        Ok(local)
    }
}

impl<'a> Reconciler<'a> {
    fn divergence(&self, local: Option<Oid>, remote: Option<Oid>) -> Result<Divergence> {
        let (local, remote) = match (local, remote) {
            (_, None) => return Ok(Divergence::RemoteAbsent),
            (None, Some(_)) => return Ok(Divergence::LocalBehind),
            (Some(local), Some(remote)) if local == remote => {
                return Ok(Divergence::UpToDate);
            }
            (Some(local), Some(remote)) => (local, remote),
        };

        let (ahead, behind) = err_at!(
            FailGitapi,
            self.repo.as_repo().graph_ahead_behind(local, remote)
        )?;
        debug!("{} ahead:{} behind:{} of {}", local, ahead, behind, remote);

        let div = match (ahead, behind) {
            (0, 0) => Divergence::UpToDate,
            (_, 0) => Divergence::LocalAhead,
            (0, _) => Divergence::LocalBehind,
            (_, _) => Divergence::Diverged,
        };
        Ok(div)
    }

    // Replay newest local commit on top of `remote`. Local branch is moved
    // to the replayed commit only for the duration of the push, and moved
    // back if the push fails.
    fn rebase(&self, branch: &str, local: Oid, remote: Oid) -> Result<Outcome> {
        let remote_name = self.config.remote.as_str();

        let (ahead, _) = err_at!(
            FailGitapi,
            self.repo.as_repo().graph_ahead_behind(local, remote)
        )?;
        if ahead != 1 {
            let (r, b) = (remote_name, branch);
            return err_at!(
                UnsupportedRebase,
                msg: "{} is {} commits ahead of {}/{}, only one can be rebased", b, ahead, r, b
            );
        }

        let commit = self.repo.find_commit(local)?;
        let base = match commit.parent_count() {
            0 => None,
            1 => Some(self.repo.tree_of(err_at!(FailGitapi, commit.parent_id(0))?)?),
            n => return err_at!(UnsupportedRebase, msg: "{} has {} parents", local, n),
        };
        let tree = err_at!(FailGitapi, commit.tree())?;
        let (adds, deletes) = self.mutation_of(base.as_ref(), &tree)?;

        let remote_tree = self.repo.tree_of(remote)?.id();
        let new_tree = build_tree(self.repo, Some(remote_tree), &adds, &deletes)?;
        let message = String::from_utf8_lossy(commit.message_bytes()).to_string();
        let rebased = {
            let (author, committer) = (commit.author(), commit.committer());
            self.repo
                .write_commit(&author, &committer, &message, new_tree, Some(remote))?
        };
        info!(
            "rebased {} onto {}/{} as {}, adds:{} deletes:{}",
            local,
            remote_name,
            branch,
            rebased,
            adds.len(),
            deletes.len()
        );

        let refname = Repo::branch_ref(branch)?;
        let log_message = format!("rebase onto {}", remote);
        self.repo.cas_ref(&refname, rebased, Some(local), &log_message)?;

        match self.push(branch, Some(remote), false) {
            Ok(tip) => Ok(Outcome::Rebased(tip)),
            Err(err) => {
                let log_message = format!("rebase aborted: {}", local);
                if let Err(e) = self.repo.cas_ref(&refname, local, Some(rebased), &log_message) {
                    warn!("{} left at {}, restoring {} failed: {}", branch, rebased, local, e);
                }
                Err(err)
            }
        }
    }

    // Recover the file mutation that turns `old` into `new`. Blobs that are
    // new or changed, by content or by mode, are adds; blobs that are gone
    // are deletes. A mutation can only carry regular and executable files,
    // a changed symlink fails the rebase.
    fn mutation_of(
        &self,
        old: Option<&git2::Tree>,
        new: &git2::Tree,
    ) -> Result<(Vec<FileInfo>, Vec<String>)> {
        let old_entries = match old {
            Some(old) => self.repo.walk(old)?,
            None => vec![],
        };
        let new_entries = self.repo.walk(new)?;

        let olds: HashMap<&str, (Oid, i32)> = old_entries
            .iter()
            .map(|e| (e.as_key(), (e.to_oid(), e.to_mode())))
            .collect();
        let news: HashMap<&str, (Oid, i32)> = new_entries
            .iter()
            .map(|e| (e.as_key(), (e.to_oid(), e.to_mode())))
            .collect();

        let mut adds = vec![];
        for entry in new_entries.iter() {
            if olds.get(entry.as_key()) == Some(&(entry.to_oid(), entry.to_mode())) {
                continue;
            }
            let mode = entry.to_mode();
            if mode != MODE_BLOB && mode != MODE_EXEC {
                let key = entry.as_key();
                return err_at!(UnsupportedRebase, msg: "{} has mode {:o}", key, mode);
            }
            let data = self.repo.read_blob(entry.to_oid())?;
            adds.push(FileInfo::new(entry.as_key(), data)?.set_executable(entry.is_executable()));
        }

        let deletes = old_entries
            .iter()
            .filter(|e| !news.contains_key(e.as_key()))
            .map(|e| e.as_key().to_string())
            .collect();

        Ok((adds, deletes))
    }

    fn find_remote(&self) -> Result<git2::Remote<'a>> {
        let name = self.config.remote.as_str();
        match self.repo.as_repo().find_remote(name) {
            Ok(remote) => Ok(remote),
            Err(err) if err.code() == ErrorCode::NotFound => {
                err_at!(InvalidConfig, msg: "remote {:?} not configured", name)
            }
            Err(err) => err_at!(FailGitapi, Err(err), "remote {:?}", name),
        }
    }

    // Credentials are picked from ssh-agent or from git's credential helper.
    fn callbacks<'b>(&self, deadline: Deadline) -> RemoteCallbacks<'b> {
        let cfg = self.repo.as_repo().config().ok();

        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username_from_url, allowed| {
            if allowed.is_ssh_key() {
                if let Some(user) = username_from_url {
                    return git2::Cred::ssh_key_from_agent(user);
                }
            }
            if allowed.is_user_pass_plaintext() {
                if let Some(cfg) = cfg.as_ref() {
                    if let Ok(cred) = git2::Cred::credential_helper(cfg, url, username_from_url) {
                        return Ok(cred);
                    }
                }
            }
            git2::Cred::default()
        });
        callbacks.transfer_progress(move |_| !deadline.is_expired());
        callbacks.sideband_progress(move |_| !deadline.is_expired());
        callbacks
    }

    fn to_network_failure<T>(&self, deadline: Deadline, op: &str, err: git2::Error) -> Result<T> {
        let remote = self.config.remote.as_str();
        match deadline.is_expired() {
            true => err_at!(NetworkFailure, msg: "{} {} timed out: {}", op, remote, err),
            false => err_at!(NetworkFailure, msg: "{} {}: {}", op, remote, err),
        }
    }
}

fn is_race(code: ErrorCode, msg: &str) -> bool {
    code == ErrorCode::NotFastForward
        || msg.contains("non-fast-forward")
        || msg.contains("fetch first")
        || msg.contains("cannot lock ref")
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;
