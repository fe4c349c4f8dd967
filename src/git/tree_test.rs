use arbitrary::Unstructured;
use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::{env, fs, path};

use super::*;
use crate::git::repo::Kind;

fn scratch_repo(name: &str) -> (path::PathBuf, Repo) {
    let loc = env::temp_dir().join(format!("{}-{}", name, uuid::Uuid::new_v4()));
    let repo = Repo::init(&loc, true).unwrap();
    (loc, repo)
}

fn files(repo: &Repo, tree: Oid) -> Vec<(String, Vec<u8>)> {
    let tree = repo.find_tree(tree).unwrap();
    repo.walk(&tree)
        .unwrap()
        .into_iter()
        .map(|e| (e.as_key().to_string(), repo.read_blob(e.to_oid()).unwrap()))
        .collect()
}

fn file(path: &str, data: &str) -> FileInfo {
    FileInfo::new(path, data).unwrap()
}

const NO_DELETES: [&str; 0] = [];

#[test]
fn test_validate_path() {
    assert_eq!(validate_path("index.html").unwrap(), vec!["index.html"]);
    assert_eq!(validate_path("1.0/css/a.css").unwrap(), vec!["1.0", "css", "a.css"]);

    let bad = [
        "", "/index.html", "dir/", "a//b", "./a", "a/../b", "..", ".git/config", "a\0b",
    ];
    for path in bad.iter() {
        match validate_path(path) {
            Err(Error::InvalidMutation(_, _)) => (),
            res => panic!("{:?} {:?}", path, res),
        }
    }
}

#[test]
fn test_build_tree_fresh() {
    let (loc, repo) = scratch_repo("test-build-tree-fresh");

    let tree = build_tree(&repo, None, &[file("index.html", "v1")], &NO_DELETES).unwrap();
    assert_eq!(
        files(&repo, tree),
        vec![("index.html".to_string(), b"v1".to_vec())]
    );

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_build_tree_delete() {
    let (loc, repo) = scratch_repo("test-build-tree-delete");

    let adds = [file("a.html", "a"), file("b.html", "b")];
    let base = build_tree(&repo, None, &adds, &NO_DELETES).unwrap();

    let tree = build_tree(&repo, Some(base), &[], &["a.html"]).unwrap();
    assert_eq!(files(&repo, tree), vec![("b.html".to_string(), b"b".to_vec())]);

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_build_tree_delete_missing() {
    let (loc, repo) = scratch_repo("test-build-tree-delete-missing");

    let adds = [file("a.html", "a"), file("dir/b.html", "b")];
    let base = build_tree(&repo, None, &adds, &NO_DELETES).unwrap();

    let add = [file("c.html", "c")];
    let ref_tree = build_tree(&repo, Some(base), &add, &NO_DELETES).unwrap();

    let deletes = ["nope.html", "dir/nope.html", "nodir/x.html", "a.html/x"];
    let tree = build_tree(&repo, Some(base), &add, &deletes).unwrap();
    assert_eq!(tree, ref_tree);

    // deleting only missing paths leaves the base as is.
    let tree = build_tree(&repo, Some(base), &[], &deletes).unwrap();
    assert_eq!(tree, base);

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_build_tree_empty_subtree() {
    let (loc, repo) = scratch_repo("test-build-tree-empty-subtree");

    let adds = [file("1.0/index.html", "v1"), file("1.0/css/a.css", "css")];
    let base = build_tree(&repo, None, &adds, &["versions.json"]).unwrap();

    let tree = build_tree(&repo, Some(base), &[], &["1.0/css/a.css"]).unwrap();
    let t = repo.find_tree(tree).unwrap();
    assert!(repo.get_path(&t, "1.0/css").unwrap().is_none());
    assert!(repo.get_path(&t, "1.0/index.html").unwrap().is_some());

    let tree = build_tree(&repo, Some(tree), &[], &["1.0/index.html"]).unwrap();
    assert_eq!(tree, repo.empty_tree().unwrap());
    assert_eq!(repo.find_tree(tree).unwrap().len(), 0);

    // deleting a whole directory by its name.
    let tree = build_tree(&repo, Some(base), &[], &["1.0"]).unwrap();
    assert_eq!(tree, repo.empty_tree().unwrap());

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_build_tree_kind_change() {
    let (loc, repo) = scratch_repo("test-build-tree-kind-change");

    let base = build_tree(&repo, None, &[file("a/x.html", "x")], &NO_DELETES).unwrap();

    // blob replaces a sub-tree.
    let tree = build_tree(&repo, Some(base), &[file("a", "blob")], &NO_DELETES).unwrap();
    assert_eq!(files(&repo, tree), vec![("a".to_string(), b"blob".to_vec())]);

    // sub-tree replaces a blob.
    let tree2 = build_tree(&repo, Some(tree), &[file("a/y.html", "y")], &NO_DELETES).unwrap();
    assert_eq!(files(&repo, tree2), vec![("a/y.html".to_string(), b"y".to_vec())]);

    // removing below a blob is a no-op.
    let tree3 = build_tree(&repo, Some(tree), &[], &["a/y.html"]).unwrap();
    assert_eq!(tree3, tree);

    // remove a directory and add below the same name.
    let tree4 = build_tree(&repo, Some(base), &[file("a/z.html", "z")], &["a"]).unwrap();
    assert_eq!(files(&repo, tree4), vec![("a/z.html".to_string(), b"z".to_vec())]);

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_build_tree_sharing() {
    let (loc, repo) = scratch_repo("test-build-tree-sharing");

    let adds = [file("1.0/index.html", "v1"), file("2.0/index.html", "v2")];
    let base = build_tree(&repo, None, &adds, &NO_DELETES).unwrap();
    let tree = build_tree(&repo, Some(base), &[file("2.0/new.html", "n")], &NO_DELETES).unwrap();

    let (base, tree) = (repo.find_tree(base).unwrap(), repo.find_tree(tree).unwrap());
    let old = repo.get_path(&base, "1.0").unwrap().unwrap();
    let new = repo.get_path(&tree, "1.0").unwrap().unwrap();
    assert_eq!(old.to_kind(), Kind::Tree);
    assert_eq!(old.to_oid(), new.to_oid());

    let old = repo.get_path(&base, "2.0").unwrap().unwrap();
    let new = repo.get_path(&tree, "2.0").unwrap().unwrap();
    assert_ne!(old.to_oid(), new.to_oid());

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_build_tree_executable() {
    let (loc, repo) = scratch_repo("test-build-tree-executable");

    let adds = [
        file("run.sh", "#!/bin/sh").set_executable(true),
        file("index.html", "x"),
    ];
    let tree = build_tree(&repo, None, &adds, &NO_DELETES).unwrap();
    let tree = repo.find_tree(tree).unwrap();

    assert!(repo.get_path(&tree, "run.sh").unwrap().unwrap().is_executable());
    assert!(!repo.get_path(&tree, "index.html").unwrap().unwrap().is_executable());

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_build_tree_invalid() {
    let (loc, repo) = scratch_repo("test-build-tree-invalid");

    let res = build_tree(&repo, None, &[file("a.html", "a")], &["a.html"]);
    match res {
        Err(Error::InvalidMutation(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    let res = build_tree(&repo, None, &[file("a.html", "a"), file("a.html", "b")], &NO_DELETES);
    match res {
        Err(Error::InvalidMutation(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    let res = build_tree(&repo, None, &[], &["../a.html"]);
    match res {
        Err(Error::InvalidMutation(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_build_tree_deterministic() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_build_tree_deterministic {}", seed);

    let (loc, repo) = scratch_repo("test-build-tree-deterministic");

    let dirs = ["", "1.0/", "2.0/", "2.0/css/", "latest/js/"];
    let names = ["index.html", "a.css", "b.js", "search.json", "c.html"];

    let mut base = None;
    for _i in 0..20 {
        let mut adds: Vec<FileInfo> = vec![];
        let mut deletes: Vec<String> = vec![];
        for _j in 0..(rng.gen::<usize>() % 10) {
            let path = format!(
                "{}{}",
                dirs[rng.gen::<usize>() % dirs.len()],
                names[rng.gen::<usize>() % names.len()]
            );
            if adds.iter().any(|f| f.as_path() == path) || deletes.contains(&path) {
                continue;
            }
            match rng.gen::<u8>() % 3 {
                0 => deletes.push(path),
                _ => {
                    let data: Vec<u8> = {
                        let bytes = rng.gen::<[u8; 32]>();
                        let mut uns = Unstructured::new(&bytes);
                        uns.arbitrary().unwrap()
                    };
                    adds.push(FileInfo::new(path, data).unwrap());
                }
            }
        }

        let tree1 = build_tree(&repo, base, &adds, &deletes).unwrap();
        let tree2 = build_tree(&repo, base, &adds, &deletes).unwrap();
        assert_eq!(tree1, tree2, "seed {}", seed);

        // adds are all visible, deletes are all gone.
        let t = repo.find_tree(tree1).unwrap();
        for f in adds.iter() {
            let entry = repo.get_path(&t, f.as_path()).unwrap().unwrap();
            assert_eq!(repo.read_blob(entry.to_oid()).unwrap(), f.as_data());
        }
        for path in deletes.iter() {
            assert!(repo.get_path(&t, path).unwrap().is_none(), "{}", path);
        }

        base = Some(tree1);
    }

    fs::remove_dir_all(&loc).unwrap();
}
