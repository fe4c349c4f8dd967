use colored::Colorize;
use log::warn;
use structopt::StructOpt;

use std::{convert::TryFrom, env, ffi, path, process};

use verdocs::{
    err_at,
    git::{Config, Outcome, Policy, Reconciler, Repo, CONFIG_FILE},
    Error, Result,
};

mod cmd_commit;
mod cmd_delete;
mod cmd_ls;
mod cmd_serve;
mod cmd_status;
mod cmd_sync;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Options for cmd
#[derive(StructOpt)]
#[structopt(name = "verdocs", about = "Versioned documentation on a single git branch")]
pub struct Opt {
    #[structopt(long = "config", help = "Location of config file, default ./verdocs.toml")]
    config: Option<ffi::OsString>,

    #[structopt(short = "b", long = "branch", help = "Branch to deploy to, default gh-pages")]
    branch: Option<String>,

    #[structopt(short = "r", long = "remote", help = "Remote to push to, default origin")]
    remote: Option<String>,

    #[structopt(
        long = "ignore",
        conflicts_with = "rebase",
        help = "Push even if the branch has diverged from remote"
    )]
    ignore: bool,

    #[structopt(long = "rebase", help = "Rebase onto remote if the branch has diverged")]
    rebase: bool,

    #[structopt(subcommand)]
    subcmd: SubCommand,
}

#[derive(Clone, StructOpt)]
pub enum SubCommand {
    /// Commit files under <dir> into the branch, under <prefix>.
    Commit {
        #[structopt(help = "directory holding the built documentation")]
        dir: ffi::OsString,

        #[structopt(long = "prefix", default_value = "", help = "path within the branch")]
        prefix: String,

        #[structopt(short = "m", long = "message", help = "commit message")]
        message: Option<String>,

        #[structopt(long = "delete", help = "paths to remove in the same commit")]
        deletes: Vec<String>,

        #[structopt(long = "push", help = "push to remote after committing")]
        push: bool,
    },
    /// Remove paths from the branch.
    Delete {
        #[structopt(help = "paths to remove", required_unless = "all")]
        paths: Vec<String>,

        #[structopt(long = "all", help = "remove everything")]
        all: bool,

        #[structopt(short = "m", long = "message", help = "commit message")]
        message: Option<String>,

        #[structopt(long = "push", help = "push to remote after committing")]
        push: bool,
    },
    /// Push the branch to remote, resolving divergence as per policy.
    Sync,
    /// Fetch and show how the branch compares with remote.
    Status,
    /// List files in the branch.
    Ls {
        #[structopt(long = "long", short = "l", help = "show mode and object id")]
        long: bool,
    },
    /// Serve the branch over http.
    Serve {
        #[structopt(long = "addr", default_value = "127.0.0.1:8000")]
        addr: String,
    },
}

fn main() {
    env_logger::init();

    let opts = Opt::from_iter(env::args_os());

    match handle(opts) {
        Ok(()) => (),
        Err(Error::Diverged(_, msg)) => {
            eprintln!("{} {}", "error:".red(), msg);
            eprintln!("  Pass --ignore to ignore this or --rebase to rebase onto remote");
            process::exit(1);
        }
        Err(err) => {
            eprintln!("{} {}", "error:".red(), err);
            process::exit(1);
        }
    }
}

fn handle(opts: Opt) -> Result<()> {
    let cfg = load_config(&opts)?;

    match opts.subcmd.clone() {
        c @ SubCommand::Commit { .. } => {
            cmd_commit::handle(cmd_commit::Handle::try_from(c)?, cfg)
        }
        c @ SubCommand::Delete { .. } => {
            cmd_delete::handle(cmd_delete::Handle::try_from(c)?, cfg)
        }
        SubCommand::Sync => cmd_sync::handle(cfg),
        SubCommand::Status => cmd_status::handle(cfg),
        c @ SubCommand::Ls { .. } => cmd_ls::handle(cmd_ls::Handle::try_from(c)?, cfg),
        c @ SubCommand::Serve { .. } => {
            cmd_serve::handle(cmd_serve::Handle::try_from(c)?, cfg)
        }
    }
}

// Configuration is picked from `--config`, or from the project root, which
// is the current directory. Command line options override the file.
fn load_config(opts: &Opt) -> Result<Config> {
    let cwd = err_at!(IOError, env::current_dir())?;

    let mut cfg = match opts.config.as_ref() {
        Some(file) => Config::load(path::Path::new(file))?,
        None => match Config::discover(&cwd)? {
            Some(cfg) => cfg,
            None if opts.branch.is_some() || opts.remote.is_some() => Config::new(&cwd),
            None => {
                return err_at!(
                    InvalidInput,
                    msg: "{:?} is not a project root, {} not found", cwd, CONFIG_FILE
                )
            }
        },
    };

    if let Some(branch) = opts.branch.as_ref() {
        cfg.set_branch(branch);
    }
    if let Some(remote) = opts.remote.as_ref() {
        cfg.set_remote(remote);
    }
    if opts.ignore {
        cfg.set_policy(Policy::Ignore);
    } else if opts.rebase {
        cfg.set_policy(Policy::Rebase);
    }

    Ok(cfg)
}

/// Bring local branch up to its remote before committing. A repository
/// without the configured remote is committed to as is.
pub fn update_from_remote(repo: &Repo, cfg: &Config) -> Result<()> {
    match Reconciler::new(repo, cfg).update_from_remote(&cfg.branch) {
        Ok(_) => Ok(()),
        Err(Error::InvalidConfig(_, msg)) => {
            warn!("skip update from remote, {}", msg);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Push branch to remote as per configured policy, and report outcome.
pub fn push(repo: &Repo, cfg: &Config) -> Result<()> {
    let (branch, remote) = (cfg.branch.as_str(), cfg.remote.as_str());
    match Reconciler::new(repo, cfg).reconcile(branch, cfg.policy)? {
        Outcome::UpToDate(_) => println!("{}/{} is up to date", remote, branch),
        Outcome::Pushed(tip) => println!("pushed {} to {}/{}", tip, remote, branch),
        Outcome::ForcePushed(tip) => {
            println!("{} {} to {}/{}", "force pushed".yellow(), tip, remote, branch)
        }
        Outcome::Rebased(tip) => {
            println!("rebased onto {}/{} and pushed {}", remote, branch, tip)
        }
    }
    Ok(())
}
