use std::{fs, path};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::{
    err_at,
    git::{FileInfo, GIT_DIR},
    Error, Result,
};

/// Returned by [walk] callback, to control the walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkRes {
    Ok,
    /// Don't descend into this entry, meaningful only for directories.
    SkipDir,
}

/// Breadth first directory walking.
///
/// `callb` arguments:
///
/// * _state_, as mutable reference, user supplied and exist for the duration of walk.
/// * _dir_entry_, for each entry in a sub-directory.
/// * _depth_, depth level at which _dir-entry_ is located, starts with ZERO.
///
/// Entries within a directory are visited in file-name order.
pub fn walk<P, S, F>(root: P, state: S, mut callb: F) -> Result<S>
where
    P: AsRef<path::Path>,
    F: FnMut(&mut S, &fs::DirEntry, usize) -> Result<WalkRes>,
{
    let depth = 0;
    do_walk(root, state, &mut callb, depth)
}

fn do_walk<P, S, F>(root: P, mut state: S, callb: &mut F, depth: usize) -> Result<S>
where
    P: AsRef<path::Path>,
    F: FnMut(&mut S, &fs::DirEntry, usize) -> Result<WalkRes>,
{
    let mut entries = vec![];
    for entry in err_at!(IOError, fs::read_dir(root.as_ref()), "{:?}", root.as_ref())? {
        entries.push(err_at!(IOError, entry)?);
    }
    entries.sort_by_key(|entry| entry.file_name());

    let mut subdirs = vec![];
    for entry in entries.into_iter() {
        let res = callb(&mut state, &entry, depth)?;
        if res == WalkRes::Ok && err_at!(IOError, entry.file_type())?.is_dir() {
            subdirs.push(entry)
        }
    }

    for subdir in subdirs.into_iter() {
        state = do_walk(subdir.path(), state, callb, depth + 1)?;
    }

    Ok(state)
}

/// Load every file under `dir` as [FileInfo], keyed by its path relative
/// to `dir` and placed under `prefix`. `.git` directories are skipped, and
/// so are symbolic links. Executable bit is carried over on unix.
pub fn load_dir<P>(dir: P, prefix: &str) -> Result<Vec<FileInfo>>
where
    P: AsRef<path::Path>,
{
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return err_at!(InvalidInput, msg: "{:?} not a directory", dir);
    }
    let prefix = prefix.trim_matches('/');

    let files = walk(dir, vec![], |files: &mut Vec<FileInfo>, entry, _depth| {
        let file_type = err_at!(IOError, entry.file_type())?;
        if file_type.is_dir() {
            return match entry.file_name() == GIT_DIR {
                true => Ok(WalkRes::SkipDir),
                false => Ok(WalkRes::Ok),
            };
        } else if !file_type.is_file() {
            return Ok(WalkRes::Ok);
        }

        let loc = entry.path();
        let key = to_key(dir, &loc, prefix)?;
        let data = err_at!(IOError, fs::read(&loc), "{:?}", loc)?;
        let executable = is_executable(&err_at!(IOError, entry.metadata())?);
        files.push(FileInfo::new(key, data)?.set_executable(executable));

        Ok(WalkRes::Ok)
    })?;

    Ok(files)
}

fn to_key(dir: &path::Path, loc: &path::Path, prefix: &str) -> Result<String> {
    let rel = err_at!(Fatal, loc.strip_prefix(dir))?;

    let mut comps: Vec<&str> = match prefix {
        "" => vec![],
        prefix => vec![prefix],
    };
    for comp in rel.components() {
        match comp.as_os_str().to_str() {
            Some(comp) => comps.push(comp),
            None => return err_at!(InvalidInput, msg: "{:?} not a utf8 path", loc),
        }
    }

    Ok(comps.join("/"))
}

#[cfg(unix)]
fn is_executable(md: &fs::Metadata) -> bool {
    md.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_md: &fs::Metadata) -> bool {
    false
}

#[cfg(test)]
#[path = "files_test.rs"]
mod files_test;
