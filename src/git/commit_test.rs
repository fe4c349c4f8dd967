use std::{env, fs, path, thread};

use super::*;

fn scratch_repo(name: &str) -> (path::PathBuf, Repo, Config) {
    let loc = env::temp_dir().join(format!("{}-{}", name, uuid::Uuid::new_v4()));
    let repo = Repo::init(&loc, true).unwrap();
    let mut config = Config::new(&loc);
    config.set_identity("docs bot", "docs@example.com");
    (loc, repo, config)
}

fn file(path: &str, data: &str) -> FileInfo {
    FileInfo::new(path, data).unwrap()
}

const NO_DELETES: [&str; 0] = [];

#[test]
fn test_commit_orphan() {
    let (loc, repo, config) = scratch_repo("test-commit-orphan");
    let cb = CommitBuilder::new(&repo, &config);

    let outcome = cb
        .commit("gh-pages", "first", &[file("index.html", "v1")], &NO_DELETES)
        .unwrap();
    let (commit, parent) = match outcome {
        CommitOutcome::Committed { commit, parent, .. } => (commit, parent),
        outcome => panic!("unexpected {:?}", outcome),
    };
    assert_eq!(parent, None);
    assert_eq!(repo.read_branch("gh-pages").unwrap(), Some(commit));

    let c = repo.find_commit(commit).unwrap();
    assert_eq!(c.parent_count(), 0);
    assert_eq!(c.message(), Some("first"));
    assert_eq!(c.author().name(), Some("docs bot"));
    assert_eq!(c.committer().email(), Some("docs@example.com"));

    let entries = repo.list_files("gh-pages").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].as_key(), "index.html");
    assert_eq!(repo.read_file("gh-pages", "index.html").unwrap(), b"v1".to_vec());

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_commit_parent() {
    let (loc, repo, config) = scratch_repo("test-commit-parent");
    let cb = CommitBuilder::new(&repo, &config);

    let adds = [file("a.html", "a"), file("b.html", "b")];
    let first = cb.commit("gh-pages", "add", &adds, &NO_DELETES).unwrap();
    let first = first.to_commit().unwrap();

    let second = cb.commit("gh-pages", "remove a", &[], &["a.html"]).unwrap();
    match second {
        CommitOutcome::Committed { parent, commit, .. } => {
            assert_eq!(parent, Some(first));
            assert_eq!(repo.read_branch("gh-pages").unwrap(), Some(commit));
        }
        outcome => panic!("unexpected {:?}", outcome),
    }

    let keys: Vec<String> = repo
        .list_files("gh-pages")
        .unwrap()
        .into_iter()
        .map(|e| e.as_key().to_string())
        .collect();
    assert_eq!(keys, vec!["b.html".to_string()]);

    // other branches are untouched.
    assert_eq!(repo.read_branch("other").unwrap(), None);

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_commit_unchanged() {
    let (loc, repo, config) = scratch_repo("test-commit-unchanged");
    let mut cb = CommitBuilder::new(&repo, &config);

    let tip = cb
        .commit("gh-pages", "add", &[file("a.html", "a")], &NO_DELETES)
        .unwrap()
        .to_commit();

    let outcome = cb.commit("gh-pages", "noop", &[], &["missing.html"]).unwrap();
    assert_eq!(outcome, CommitOutcome::Unchanged { tip });
    assert_eq!(repo.read_branch("gh-pages").unwrap(), tip);

    let outcome = cb
        .commit("gh-pages", "same", &[file("a.html", "a")], &NO_DELETES)
        .unwrap();
    assert_eq!(outcome, CommitOutcome::Unchanged { tip });

    // nothing to commit on a missing branch either.
    let outcome = cb.commit("fresh", "noop", &[], &["x.html"]).unwrap();
    assert_eq!(outcome, CommitOutcome::Unchanged { tip: None });
    assert_eq!(repo.read_branch("fresh").unwrap(), None);

    // audit trail, force the commit.
    cb.set_allow_empty(true);
    match cb.commit("gh-pages", "audit", &[], &["missing.html"]).unwrap() {
        CommitOutcome::Committed { parent, tree, .. } => {
            assert_eq!(parent, tip);
            assert_eq!(tree, repo.tree_of(tip.unwrap()).unwrap().id());
        }
        outcome => panic!("unexpected {:?}", outcome),
    }

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_commit_invalid() {
    let (loc, repo, config) = scratch_repo("test-commit-invalid");
    let cb = CommitBuilder::new(&repo, &config);

    let res = cb.commit("gh-pages", "bad", &[file("a.html", "a")], &["a.html"]);
    match res {
        Err(Error::InvalidMutation(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
    assert_eq!(repo.read_branch("gh-pages").unwrap(), None);

    let res = cb.commit("bad..branch", "bad", &[file("a.html", "a")], &NO_DELETES);
    match res {
        Err(Error::InvalidInput(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_commit_race() {
    let (loc, repo, config) = scratch_repo("test-commit-race");
    let cb = CommitBuilder::new(&repo, &config);

    let base = cb
        .commit("gh-pages", "base", &[file("index.html", "v0")], &NO_DELETES)
        .unwrap()
        .to_commit();

    let p1 = cb
        .prepare("gh-pages", "one", &[file("1.html", "1")], &NO_DELETES)
        .unwrap();
    let p2 = cb
        .prepare("gh-pages", "two", &[file("2.html", "2")], &NO_DELETES)
        .unwrap();
    assert_eq!(p1.to_parent(), base);
    assert_eq!(p2.to_parent(), base);

    let winner = p1.apply(&repo).unwrap().to_commit();
    match p2.apply(&repo) {
        Err(err @ Error::RefRace(_, _)) => assert!(err.is_retryable()),
        res => panic!("unexpected {:?}", res),
    }
    assert_eq!(repo.read_branch("gh-pages").unwrap(), winner);

    // retry re-reads the tip.
    let p2 = cb
        .prepare("gh-pages", "two", &[file("2.html", "2")], &NO_DELETES)
        .unwrap();
    assert_eq!(p2.to_parent(), winner);
    p2.apply(&repo).unwrap();
    assert_eq!(repo.list_files("gh-pages").unwrap().len(), 3);

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_commit_race_orphan() {
    let (loc, repo, config) = scratch_repo("test-commit-race-orphan");
    let cb = CommitBuilder::new(&repo, &config);

    let p1 = cb
        .prepare("gh-pages", "one", &[file("1.html", "1")], &NO_DELETES)
        .unwrap();
    let p2 = cb
        .prepare("gh-pages", "two", &[file("2.html", "2")], &NO_DELETES)
        .unwrap();

    p1.apply(&repo).unwrap();
    match p2.apply(&repo) {
        Err(Error::RefRace(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    fs::remove_dir_all(&loc).unwrap();
}

#[test]
fn test_commit_concurrent() {
    let (loc, _repo, config) = scratch_repo("test-commit-concurrent");

    let n_threads = 4;
    let n_commits = 5;

    let mut handles = vec![];
    for id in 0..n_threads {
        let (loc, config) = (loc.clone(), config.clone());
        handles.push(thread::spawn(move || {
            let repo = Repo::open(&loc).unwrap();
            let cb = CommitBuilder::new(&repo, &config);
            let mut races = 0;
            for i in 0..n_commits {
                let f = file(&format!("{}/{}.html", id, i), "x");
                loop {
                    match cb.commit("gh-pages", "concurrent", &[f.clone()], &NO_DELETES) {
                        Ok(_) => break,
                        Err(Error::RefRace(_, _)) => races += 1,
                        Err(err) => panic!("{}", err),
                    }
                }
            }
            races
        }));
    }

    let races: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    println!("test_commit_concurrent races:{}", races);

    let repo = Repo::open(&loc).unwrap();
    assert_eq!(repo.list_files("gh-pages").unwrap().len(), n_threads * n_commits);

    // history is linear, one commit per successful attempt.
    let mut walk = repo.as_repo().revwalk().unwrap();
    walk.push(repo.read_branch("gh-pages").unwrap().unwrap()).unwrap();
    let commits: Vec<Oid> = walk.map(|oid| oid.unwrap()).collect();
    assert_eq!(commits.len(), n_threads * n_commits);
    for oid in commits.iter() {
        assert!(repo.find_commit(*oid).unwrap().parent_count() <= 1);
    }

    fs::remove_dir_all(&loc).unwrap();
}
