//! Tree builder, compute a new tree from a base tree and a set of file
//! additions and deletions.
//!
//! Only the blobs and sub-trees named by the mutation are written. Every
//! other sub-tree is carried over by its object identifier, so the cost of a
//! build is proportional to the number of changed paths and not to the size
//! of the base tree. Identical `(base, adds, deletes)` always yield the same
//! tree identifier.

use git2::{ObjectType, Oid};
use log::debug;

use std::{fmt, result};

use crate::{
    err_at,
    git::{
        repo::{Repo, MODE_BLOB, MODE_EXEC, MODE_TREE},
        trie::{Node, Op, Trie},
    },
    Error, Result,
};

/// File to add. Identified by its path, a forward-slash path relative to
/// the root of the tree.
#[derive(Clone, PartialEq, Eq)]
pub struct FileInfo {
    path: String,
    data: Vec<u8>,
    executable: bool,
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "FileInfo<{}>", self.path)
    }
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        let exec = if self.executable { ",exec" } else { "" };
        write!(f, "FileInfo<{},{}{}>", self.path, self.data.len(), exec)
    }
}

impl FileInfo {
    /// Create a new file, fail if `path` is malformed, refer [validate_path].
    pub fn new<P, D>(path: P, data: D) -> Result<FileInfo>
    where
        P: AsRef<str>,
        D: Into<Vec<u8>>,
    {
        validate_path(path.as_ref())?;

        let val = FileInfo {
            path: path.as_ref().to_string(),
            data: data.into(),
            executable: false,
        };
        Ok(val)
    }

    pub fn set_executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    pub fn as_path(&self) -> &str {
        &self.path
    }

    pub fn as_data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }

    pub fn to_mode(&self) -> i32 {
        match self.executable {
            true => MODE_EXEC,
            false => MODE_BLOB,
        }
    }
}

/// Split `path` into its components. A valid path:
///
/// * is not empty, does not start or end with `/`.
/// * does not contain empty components, `.`, `..` or `.git`.
/// * does not contain NUL bytes.
pub fn validate_path(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return err_at!(InvalidMutation, msg: "empty path");
    } else if path.starts_with('/') || path.ends_with('/') {
        return err_at!(InvalidMutation, msg: "path {:?} starts/ends with /", path);
    } else if path.contains('\0') {
        return err_at!(InvalidMutation, msg: "path {:?} contains NUL", path);
    }

    let comps: Vec<&str> = path.split('/').collect();
    for comp in comps.iter() {
        match *comp {
            "" | "." | ".." | ".git" => {
                let (p, c) = (path, comp);
                return err_at!(InvalidMutation, msg: "path {:?} bad component {:?}", p, c);
            }
            _ => (),
        }
    }

    Ok(comps)
}

/// Build a tree by applying `adds` and `deletes` to `base`, or to an empty
/// tree when `base` is None.
///
/// * `adds` and `deletes` must not name the same path, a path must not be
///   added twice, and a path must not be added both as a file and as a
///   directory. Such mutations fail with [Error::InvalidMutation] before
///   any object is written.
/// * A path in `adds` overwrites any existing entry at that path, even
///   when the existing entry is a sub-tree.
/// * Deleting a path that does not exist is a no-op.
/// * Sub-trees that become empty are dropped from their parent. The root
///   tree itself can be empty.
pub fn build_tree<S>(
    repo: &Repo,
    base: Option<Oid>,
    adds: &[FileInfo],
    deletes: &[S],
) -> Result<Oid>
where
    S: AsRef<str>,
{
    let mut trie = Trie::new();
    for file in adds.iter() {
        let comps = validate_path(file.as_path())?;
        trie.insert(&comps, file.as_data(), file.to_mode())?;
    }
    for path in deletes.iter() {
        let comps = validate_path(path.as_ref())?;
        trie.remove(&comps)?;
    }

    let base_tree = match base {
        Some(oid) => Some(repo.find_tree(oid)?),
        None => None,
    };

    let oid = match build_level(repo, base_tree.as_ref(), trie.as_root())? {
        Some(oid) => oid,
        None => repo.empty_tree()?,
    };
    debug!(
        "built tree {} from {:?} adds:{} deletes:{}",
        oid,
        base,
        adds.len(),
        deletes.len()
    );

    Ok(oid)
}

// Return None if the resulting tree is empty.
fn build_level(
    repo: &Repo,
    base: Option<&git2::Tree>,
    node: &Node,
) -> Result<Option<Oid>> {
    let mut builder = err_at!(FailGitapi, repo.as_repo().treebuilder(base))?;

    // leafs first, so that a removed entry can be re-created as a sub-tree
    // by the children below, and an added blob is not descended into.
    for op in node.as_leafs().iter() {
        match op {
            Op::Rem { comp } => {
                if err_at!(FailGitapi, builder.get(comp.as_str()))?.is_some() {
                    err_at!(FailGitapi, builder.remove(comp.as_str()))?;
                }
            }
            Op::Ins { comp, data, mode } => {
                let oid = repo.write_blob(data)?;
                err_at!(FailGitapi, builder.insert(comp.as_str(), oid, *mode))?;
            }
        }
    }

    for child in node.as_children().iter() {
        let comp = child.as_comp();
        let existing = {
            let te = err_at!(FailGitapi, builder.get(comp))?;
            te.map(|te| (te.kind(), te.id()))
        };

        let subtree = match existing {
            Some((Some(ObjectType::Tree), oid)) => Some(repo.find_tree(oid)?),
            // nothing to add, and nothing below to remove.
            _ if !child.has_inserts() => continue,
            // missing, or a blob that gets replaced by a sub-tree.
            _ => None,
        };

        match build_level(repo, subtree.as_ref(), child)? {
            Some(oid) => {
                err_at!(FailGitapi, builder.insert(comp, oid, MODE_TREE))?;
            }
            None if existing.is_some() => err_at!(FailGitapi, builder.remove(comp))?,
            None => (),
        }
    }

    match builder.len() {
        0 => Ok(None),
        _ => Ok(Some(err_at!(FailGitapi, builder.write())?)),
    }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
