use std::convert::TryFrom;

use verdocs::{
    git::{CommitBuilder, CommitOutcome, Config, Repo},
    Error, Result,
};

use crate::{SubCommand, VERSION};

#[derive(Clone)]
pub struct Handle {
    pub paths: Vec<String>,
    pub all: bool,
    pub message: Option<String>,
    pub push: bool,
}

impl TryFrom<crate::SubCommand> for Handle {
    type Error = Error;

    fn try_from(subcmd: crate::SubCommand) -> Result<Handle> {
        let opt = match subcmd {
            SubCommand::Delete {
                paths,
                all,
                message,
                push,
            } => Handle {
                paths: paths
                    .into_iter()
                    .map(|p| p.trim_matches('/').to_string())
                    .collect(),
                all,
                message,
                push,
            },
            _ => unreachable!(),
        };

        Ok(opt)
    }
}

impl Handle {
    fn to_message(&self) -> String {
        match (&self.message, self.all) {
            (Some(message), _) => message.clone(),
            (None, true) => format!("Removed everything with verdocs {}", VERSION),
            (None, false) => {
                let paths = self.paths.join(", ");
                format!("Removed {} with verdocs {}", paths, VERSION)
            }
        }
    }
}

pub fn handle(h: Handle, cfg: Config) -> Result<()> {
    let repo = Repo::open(&cfg.loc_repo)?;
    crate::update_from_remote(&repo, &cfg)?;

    // removing everything is always recorded, even on an empty branch.
    let deletes: Vec<String> = match h.all {
        true => repo
            .list_files(&cfg.branch)?
            .into_iter()
            .map(|e| e.as_key().to_string())
            .collect(),
        false => h.paths.clone(),
    };
    let message = h.to_message();

    let mut cb = CommitBuilder::new(&repo, &cfg);
    if h.all {
        cb.set_allow_empty(true);
    }
    match cb.commit(&cfg.branch, &message, &[], &deletes)? {
        CommitOutcome::Committed { commit, .. } => {
            println!("{}: {}", cfg.branch, message);
            println!("  commit {}", commit);
        }
        CommitOutcome::Unchanged { .. } => {
            println!("{}: nothing to remove", cfg.branch)
        }
    }

    match h.push {
        true => crate::push(&repo, &cfg),
        false => Ok(()),
    }
}
