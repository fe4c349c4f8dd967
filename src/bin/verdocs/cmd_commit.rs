use std::{convert::TryFrom, path};

use verdocs::{
    git::{CommitBuilder, CommitOutcome, Config, Repo},
    util::files,
    Error, Result,
};

use crate::{SubCommand, VERSION};

#[derive(Clone)]
pub struct Handle {
    pub dir: path::PathBuf,
    pub prefix: String,
    pub message: Option<String>,
    pub deletes: Vec<String>,
    pub push: bool,
}

impl TryFrom<crate::SubCommand> for Handle {
    type Error = Error;

    fn try_from(subcmd: crate::SubCommand) -> Result<Handle> {
        let opt = match subcmd {
            SubCommand::Commit {
                dir,
                prefix,
                message,
                deletes,
                push,
            } => Handle {
                dir: dir.into(),
                prefix: prefix.trim_matches('/').to_string(),
                message,
                deletes,
                push,
            },
            _ => unreachable!(),
        };

        Ok(opt)
    }
}

impl Handle {
    fn to_message(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => {
                let dir = self.dir.as_os_str().to_string_lossy();
                let prefix = match self.prefix.as_str() {
                    "" => "/",
                    prefix => prefix,
                };
                format!("Deployed {} to {} with verdocs {}", dir, prefix, VERSION)
            }
        }
    }
}

pub fn handle(h: Handle, cfg: Config) -> Result<()> {
    let repo = Repo::open(&cfg.loc_repo)?;
    crate::update_from_remote(&repo, &cfg)?;

    let adds = files::load_dir(&h.dir, &h.prefix)?;
    let message = h.to_message();

    let cb = CommitBuilder::new(&repo, &cfg);
    match cb.commit(&cfg.branch, &message, &adds, &h.deletes)? {
        CommitOutcome::Committed { commit, .. } => {
            println!("{}: {} ({} files)", cfg.branch, message, adds.len());
            println!("  commit {}", commit);
        }
        CommitOutcome::Unchanged { .. } => {
            println!("{}: unchanged, nothing to commit", cfg.branch)
        }
    }

    match h.push {
        true => crate::push(&repo, &cfg),
        false => Ok(()),
    }
}
