use colored::Colorize;

use verdocs::{
    git::{Config, Divergence, Reconciler, Repo},
    Result,
};

pub fn handle(cfg: Config) -> Result<()> {
    let repo = Repo::open(&cfg.loc_repo)?;
    let rc = Reconciler::new(&repo, &cfg);

    let remote_tip = rc.fetch(&cfg.branch)?;
    let local_tip = repo.read_branch(&cfg.branch)?;
    let div = rc.classify(&cfg.branch)?;

    let text = div.to_string();
    let text = match div {
        Divergence::UpToDate => text.as_str().green(),
        Divergence::LocalAhead | Divergence::RemoteAbsent => text.as_str().yellow(),
        Divergence::LocalBehind | Divergence::Diverged => text.as_str().red(),
    };
    println!("{} {} with {}/{}", cfg.branch, text, cfg.remote, cfg.branch);

    let to_string = |tip: Option<git2::Oid>| match tip {
        Some(tip) => tip.to_string(),
        None => "-".to_string(),
    };
    println!("  local  {}", to_string(local_tip));
    println!("  remote {}", to_string(remote_tip));

    Ok(())
}
