use std::env;

use super::*;

fn scratch_dir(name: &str) -> path::PathBuf {
    let loc = env::temp_dir().join(format!("{}-{}", name, uuid::Uuid::new_v4()));
    fs::create_dir_all(&loc).unwrap();
    loc
}

fn write(dir: &path::Path, key: &str, data: &str) {
    let loc = dir.join(key);
    fs::create_dir_all(loc.parent().unwrap()).unwrap();
    fs::write(loc, data).unwrap();
}

#[test]
fn test_walk() {
    let dir = scratch_dir("test-walk");
    write(&dir, "b.txt", "b");
    write(&dir, "a/x.txt", "x");
    write(&dir, "a/y/z.txt", "z");
    write(&dir, "skip/w.txt", "w");

    let names = walk(&dir, vec![], |names: &mut Vec<(String, usize)>, entry, depth| {
        let name = entry.file_name().to_str().unwrap().to_string();
        let res = match name.as_str() {
            "skip" => WalkRes::SkipDir,
            _ => WalkRes::Ok,
        };
        names.push((name, depth));
        Ok(res)
    })
    .unwrap();

    let refval: Vec<(String, usize)> = vec![
        ("a".to_string(), 0),
        ("b.txt".to_string(), 0),
        ("skip".to_string(), 0),
        ("x.txt".to_string(), 1),
        ("y".to_string(), 1),
        ("z.txt".to_string(), 2),
    ];
    assert_eq!(names, refval);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_load_dir() {
    let dir = scratch_dir("test-load-dir");
    write(&dir, "index.html", "<h1>home</h1>");
    write(&dir, "css/a.css", "body {}");
    write(&dir, ".git/HEAD", "ref: refs/heads/main");
    write(&dir, "sub/.git/HEAD", "ref: refs/heads/main");

    let files = load_dir(&dir, "").unwrap();
    let keys: Vec<&str> = files.iter().map(|f| f.as_path()).collect();
    assert_eq!(keys, vec!["index.html", "css/a.css"]);
    assert_eq!(files[1].as_data(), b"body {}");
    assert!(!files[0].is_executable());

    let files = load_dir(&dir, "/1.0/").unwrap();
    let keys: Vec<&str> = files.iter().map(|f| f.as_path()).collect();
    assert_eq!(keys, vec!["1.0/index.html", "1.0/css/a.css"]);

    match load_dir(dir.join("index.html"), "") {
        Err(Error::InvalidInput(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    fs::remove_dir_all(&dir).unwrap();
}

#[cfg(unix)]
#[test]
fn test_load_dir_executable() {
    let dir = scratch_dir("test-load-dir-executable");
    write(&dir, "run.sh", "#!/bin/sh");
    let loc = dir.join("run.sh");
    fs::set_permissions(&loc, fs::Permissions::from_mode(0o755)).unwrap();

    let files = load_dir(&dir, "bin").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].as_path(), "bin/run.sh");
    assert!(files[0].is_executable());

    fs::remove_dir_all(&dir).unwrap();
}
