//! Object store access, read and write blobs, trees, commits and refs
//! without touching any working directory.

use git2::{ErrorCode, ObjectType, Oid, RepositoryInitOptions, RepositoryOpenFlags};
use log::debug;

use std::{fmt, path, result};

use crate::{err_at, Error, Result};

pub const REFS_HEADS: &str = "refs/heads";
pub const REFS_REMOTES: &str = "refs/remotes";

/// File mode for regular blob.
pub const MODE_BLOB: i32 = 0o100644;
/// File mode for executable blob.
pub const MODE_EXEC: i32 = 0o100755;
/// File mode for sub-tree.
pub const MODE_TREE: i32 = 0o040000;

/// Kind of object referred by a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Blob,
    Tree,
}

/// Named child of a committed tree, `key` is the forward-slash path from
/// the root of the tree.
#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    key: String,
    kind: Kind,
    oid: Oid,
    mode: i32,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "Entry<{:?}>", self.key)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "Entry<{:?},{:?},{}>", self.key, self.kind, self.oid)
    }
}

impl Entry {
    fn from_tree_entry(key: String, te: &git2::TreeEntry) -> Option<Entry> {
        let kind = match te.kind()? {
            ObjectType::Blob => Kind::Blob,
            ObjectType::Tree => Kind::Tree,
            _ => return None, // submodule commits are not served
        };
        let entry = Entry {
            key,
            kind,
            oid: te.id(),
            mode: te.filemode(),
        };
        Some(entry)
    }

    pub fn as_key(&self) -> &str {
        &self.key
    }

    pub fn to_kind(&self) -> Kind {
        self.kind
    }

    pub fn to_oid(&self) -> Oid {
        self.oid
    }

    pub fn to_mode(&self) -> i32 {
        self.mode
    }

    pub fn is_executable(&self) -> bool {
        self.mode == MODE_EXEC
    }
}

/// Repo wraps a single git repository, it is a narrow abstraction over
/// libgit2 API covering objects and refs, nothing more.
pub struct Repo {
    loc: path::PathBuf,
    repo: git2::Repository,
}

impl Repo {
    fn work_flags() -> RepositoryOpenFlags {
        RepositoryOpenFlags::NO_SEARCH | RepositoryOpenFlags::CROSS_FS
    }

    fn bare_flags() -> RepositoryOpenFlags {
        RepositoryOpenFlags::NO_SEARCH
            | RepositoryOpenFlags::CROSS_FS
            | RepositoryOpenFlags::NO_DOTGIT
            | RepositoryOpenFlags::BARE
    }

    /// Open an existing repository at `loc`, either a working directory or a
    /// bare repository. Does not walk upward searching for one.
    pub fn open<P>(loc: P) -> Result<Repo>
    where
        P: AsRef<path::Path>,
    {
        let loc = loc.as_ref().to_path_buf();

        let ceildrs = Vec::<String>::default().into_iter();
        let repo1 = git2::Repository::open_ext(&loc, Self::work_flags(), ceildrs.clone());
        let repo = match repo1 {
            Ok(repo) => repo,
            Err(_) => match git2::Repository::open_ext(&loc, Self::bare_flags(), ceildrs) {
                Ok(repo) => repo,
                Err(err) if err.code() == ErrorCode::NotFound => {
                    return err_at!(InvalidInput, msg: "{:?} not a repo", loc);
                }
                Err(err) => return err_at!(FailGitapi, Err(err), "{:?}", loc),
            },
        };

        Ok(Repo { loc, repo })
    }

    /// Create a fresh repository at `loc`.
    pub fn init<P>(loc: P, bare: bool) -> Result<Repo>
    where
        P: AsRef<path::Path>,
    {
        let loc = loc.as_ref().to_path_buf();

        let mut options = RepositoryInitOptions::new();
        options
            .bare(bare)
            .no_reinit(true)
            .mkdir(true)
            .mkpath(true)
            .description("versioned documentation");

        let repo = err_at!(FailGitapi, git2::Repository::init_opts(&loc, &options))?;
        debug!("initialized repository {:?} bare:{}", loc, bare);

        Ok(Repo { loc, repo })
    }

    pub fn is_bare(&self) -> bool {
        self.repo.is_bare()
    }

    pub fn to_loc(&self) -> path::PathBuf {
        self.loc.clone()
    }

    pub fn as_repo(&self) -> &git2::Repository {
        &self.repo
    }
}

impl Repo {
    /// Return fully qualified ref for local `branch`.
    pub fn branch_ref(branch: &str) -> Result<String> {
        let refname = format!("{}/{}", REFS_HEADS, branch);
        match git2::Reference::is_valid_name(&refname) {
            true => Ok(refname),
            false => err_at!(InvalidInput, msg: "invalid branch name {:?}", branch),
        }
    }

    /// Return fully qualified tracking ref for `branch` on `remote`.
    pub fn tracking_ref(remote: &str, branch: &str) -> Result<String> {
        let refname = format!("{}/{}/{}", REFS_REMOTES, remote, branch);
        match git2::Reference::is_valid_name(&refname) {
            true => Ok(refname),
            false => err_at!(InvalidInput, msg: "invalid ref {}/{}", remote, branch),
        }
    }

    /// Read the commit `refname` points to, None if the ref does not exist.
    pub fn read_ref(&self, refname: &str) -> Result<Option<Oid>> {
        let refn = match self.repo.find_reference(refname) {
            Ok(refn) => refn,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(None),
            Err(err) => return err_at!(FailGitapi, Err(err), "{}", refname),
        };
        let refn = err_at!(FailGitapi, refn.resolve(), "{}", refname)?;
        let commit = err_at!(FailGitapi, refn.peel_to_commit(), "{}", refname)?;

        Ok(Some(commit.id()))
    }

    /// Read tip of local `branch`.
    pub fn read_branch(&self, branch: &str) -> Result<Option<Oid>> {
        self.read_ref(&Self::branch_ref(branch)?)
    }

    /// Read tip of `remote`'s `branch`, as of the last fetch.
    pub fn read_tracking(&self, remote: &str, branch: &str) -> Result<Option<Oid>> {
        self.read_ref(&Self::tracking_ref(remote, branch)?)
    }

    /// Point `refname` to `new` if and only if it currently points to
    /// `expected`. When `expected` is None, `refname` must not exist.
    ///
    /// The read-compare-write is done under libgit2's ref lock, a concurrent
    /// writer makes this call fail with [Error::RefRace].
    pub fn cas_ref(
        &self,
        refname: &str,
        new: Oid,
        expected: Option<Oid>,
        log_message: &str,
    ) -> Result<()> {
        let res = match expected {
            Some(current) => {
                self.repo
                    .reference_matching(refname, new, true, current, log_message)
            }
            None => self.repo.reference(refname, new, false, log_message),
        };

        match res {
            Ok(_) => {
                debug!("{} {:?} -> {}", refname, expected, new);
                Ok(())
            }
            Err(err) => match err.code() {
                ErrorCode::Modified
                | ErrorCode::Exists
                | ErrorCode::Locked
                | ErrorCode::NotFound => {
                    err_at!(RefRace, msg: "{} expected at {:?}: {}", refname, expected, err)
                }
                _ => err_at!(FailGitapi, Err(err), "{}", refname),
            },
        }
    }

    /// Point `refname` to `oid` unconditionally. Only meant for refs owned by
    /// this process's view of the remote, like tracking refs.
    pub fn set_ref(&self, refname: &str, oid: Oid, log_message: &str) -> Result<()> {
        err_at!(
            FailGitapi,
            self.repo.reference(refname, oid, true, log_message),
            "{}",
            refname
        )?;
        debug!("{} -> {}", refname, oid);
        Ok(())
    }

    /// Delete `refname` if it points to `expected`, no-op if it is missing.
    pub fn delete_ref(&self, refname: &str, expected: Oid) -> Result<()> {
        let mut refn = match self.repo.find_reference(refname) {
            Ok(refn) => refn,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(()),
            Err(err) => return err_at!(FailGitapi, Err(err), "{}", refname),
        };
        match refn.target() {
            Some(oid) if oid == expected => err_at!(FailGitapi, refn.delete()),
            actual => err_at!(RefRace, msg: "{} at {:?} not {}", refname, actual, expected),
        }
    }
}

impl Repo {
    pub fn find_commit(&self, oid: Oid) -> Result<git2::Commit> {
        err_at!(FailGitapi, self.repo.find_commit(oid), "commit {}", oid)
    }

    pub fn find_tree(&self, oid: Oid) -> Result<git2::Tree> {
        err_at!(FailGitapi, self.repo.find_tree(oid), "tree {}", oid)
    }

    /// Return the root tree of commit `oid`.
    pub fn tree_of(&self, oid: Oid) -> Result<git2::Tree> {
        let commit = self.find_commit(oid)?;
        err_at!(FailGitapi, commit.tree(), "tree of {}", oid)
    }

    /// Return the root tree of `branch`'s tip, None if branch is missing.
    pub fn branch_tree(&self, branch: &str) -> Result<Option<git2::Tree>> {
        match self.read_branch(branch)? {
            Some(oid) => Ok(Some(self.tree_of(oid)?)),
            None => Ok(None),
        }
    }

    pub fn write_blob(&self, data: &[u8]) -> Result<Oid> {
        err_at!(FailGitapi, self.repo.blob(data))
    }

    pub fn read_blob(&self, oid: Oid) -> Result<Vec<u8>> {
        let blob = err_at!(FailGitapi, self.repo.find_blob(oid), "blob {}", oid)?;
        Ok(blob.content().to_vec())
    }

    /// Write the empty tree object and return its identifier.
    pub fn empty_tree(&self) -> Result<Oid> {
        let builder = err_at!(FailGitapi, self.repo.treebuilder(None))?;
        err_at!(FailGitapi, builder.write())
    }

    /// Identifier of the empty tree, computed without writing it.
    pub fn empty_tree_id() -> Result<Oid> {
        err_at!(FailGitapi, Oid::hash_object(ObjectType::Tree, &[]))
    }

    /// Write a commit object, without moving any ref.
    pub fn write_commit(
        &self,
        author: &git2::Signature,
        committer: &git2::Signature,
        message: &str,
        tree: Oid,
        parent: Option<Oid>,
    ) -> Result<Oid> {
        let tree = self.find_tree(tree)?;
        let parents = match parent {
            Some(oid) => vec![self.find_commit(oid)?],
            None => vec![],
        };
        let parents: Vec<&git2::Commit> = parents.iter().collect();

        let oid = err_at!(
            FailGitapi,
            self.repo
                .commit(None, author, committer, message, &tree, &parents)
        )?;
        debug!("wrote commit {} tree:{} parent:{:?}", oid, tree.id(), parent);

        Ok(oid)
    }
}

impl Repo {
    /// Resolve forward-slash `key` under `tree`. None if any component is
    /// missing or passes through a blob.
    pub fn get_path(&self, tree: &git2::Tree, key: &str) -> Result<Option<Entry>> {
        let key = key.trim_matches('/');
        if key.is_empty() {
            return Ok(None);
        }

        match tree.get_path(path::Path::new(key)) {
            Ok(te) => Ok(Entry::from_tree_entry(key.to_string(), &te)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => err_at!(FailGitapi, Err(err), "{}", key),
        }
    }

    /// Return all blobs under `tree`, depth first, in tree order.
    pub fn walk(&self, tree: &git2::Tree) -> Result<Vec<Entry>> {
        let mut entries = vec![];
        err_at!(
            FailGitapi,
            tree.walk(git2::TreeWalkMode::PreOrder, |root, te| {
                let name = String::from_utf8_lossy(te.name_bytes());
                let key = format!("{}{}", root, name);
                match Entry::from_tree_entry(key, te) {
                    Some(entry) if entry.kind == Kind::Blob => entries.push(entry),
                    _ => (),
                }
                git2::TreeWalkResult::Ok
            })
        )?;

        Ok(entries)
    }

    /// Read file `key` from `branch`'s tip. Fails with [Error::NotFound]
    /// if the branch is missing, or `key` is not a file in its tip.
    pub fn read_file(&self, branch: &str, key: &str) -> Result<Vec<u8>> {
        let tree = match self.branch_tree(branch)? {
            Some(tree) => tree,
            None => return err_at!(NotFound, msg: "branch {} not found", branch),
        };
        match self.get_path(&tree, key)? {
            Some(entry) if entry.kind == Kind::Blob => self.read_blob(entry.oid),
            Some(_) => err_at!(NotFound, msg: "{}:{} not a file", branch, key),
            None => err_at!(NotFound, msg: "{}:{} not found", branch, key),
        }
    }

    /// List all files in `branch`'s tip, empty if branch is missing.
    pub fn list_files(&self, branch: &str) -> Result<Vec<Entry>> {
        match self.branch_tree(branch)? {
            Some(tree) => self.walk(&tree),
            None => Ok(vec![]),
        }
    }
}

#[cfg(test)]
#[path = "repo_test.rs"]
mod repo_test;
