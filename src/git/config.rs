//! Configuration for committing to, and publishing, a documentation branch.

use serde::Deserialize;

use std::{fmt, fs, path, result, str::FromStr, time};

use crate::{err_at, Error, Result};

/// Project configuration file, looked up in the project root.
pub const CONFIG_FILE: &str = "verdocs.toml";
/// Default branch holding all the deployed versions.
pub const DEFAULT_BRANCH: &str = "gh-pages";
/// Default remote to publish the branch to.
pub const DEFAULT_REMOTE: &str = "origin";
/// Identity used when neither configuration nor git config supply one.
pub const DEFAULT_USER_NAME: &str = "verdocs";
pub const DEFAULT_USER_EMAIL: &str = "verdocs@localhost";

/// Resolution policy when local branch and remote branch have diverged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Policy {
    /// Abort before pushing, leave both refs untouched.
    Fail,
    /// Push local tip as is, discarding remote-only commits.
    Ignore,
    /// Re-home the newest local commit onto the remote tip, then push.
    Rebase,
}

impl Default for Policy {
    fn default() -> Policy {
        Policy::Fail
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Policy::Fail => write!(f, "fail"),
            Policy::Ignore => write!(f, "ignore"),
            Policy::Rebase => write!(f, "rebase"),
        }
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Policy> {
        match s {
            "fail" => Ok(Policy::Fail),
            "ignore" => Ok(Policy::Ignore),
            "rebase" => Ok(Policy::Rebase),
            _ => err_at!(InvalidInput, msg: "invalid policy {:?}", s),
        }
    }
}

/// Configuration describing where and how to commit and publish.
///
/// Identity is passed explicitly through this value instead of being picked
/// up from process-wide state, refer [Config::to_signature] for fallbacks.
#[derive(Clone, Debug)]
pub struct Config {
    /// location of repository, either its working directory or its git-dir.
    pub loc_repo: path::PathBuf,
    /// branch holding the documentation versions, ``DEFAULT: gh-pages``.
    pub branch: String,
    /// remote to publish to, ``DEFAULT: origin``.
    pub remote: String,
    /// committer identity.
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    /// Refer to [Policy], ``DEFAULT: fail``.
    pub policy: Policy,
    /// Timeout for network operations, fetch and push. ``DEFAULT: None``.
    ///
    /// Checked before each transfer starts and from within the transfer's
    /// progress and negotiation callbacks. Connecting to the remote does
    /// not call back, so a connect that hangs is bounded by the transport's
    /// own timeouts, not by this one.
    pub timeout: Option<time::Duration>,
    /// Commit even when the mutation leaves the tree unchanged,
    /// ``DEFAULT: false``.
    pub allow_empty: bool,
}

impl Config {
    pub fn new<P>(loc_repo: P) -> Config
    where
        P: AsRef<path::Path>,
    {
        Config {
            loc_repo: loc_repo.as_ref().to_path_buf(),
            branch: DEFAULT_BRANCH.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            user_name: None,
            user_email: None,
            policy: Policy::default(),
            timeout: None,
            allow_empty: false,
        }
    }

    pub fn set_branch(&mut self, branch: &str) -> &mut Self {
        self.branch = branch.to_string();
        self
    }

    pub fn set_remote(&mut self, remote: &str) -> &mut Self {
        self.remote = remote.to_string();
        self
    }

    pub fn set_identity(&mut self, name: &str, email: &str) -> &mut Self {
        self.user_name = Some(name.to_string());
        self.user_email = Some(email.to_string());
        self
    }

    pub fn set_policy(&mut self, policy: Policy) -> &mut Self {
        self.policy = policy;
        self
    }

    pub fn set_timeout(&mut self, timeout: Option<time::Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn set_allow_empty(&mut self, allow_empty: bool) -> &mut Self {
        self.allow_empty = allow_empty;
        self
    }
}

impl Config {
    /// Load configuration from toml `file`. Relative repository location,
    /// if any, is resolved against the directory containing `file`.
    pub fn load<P>(file: P) -> Result<Config>
    where
        P: AsRef<path::Path>,
    {
        let file = file.as_ref();
        let text = err_at!(IOError, fs::read_to_string(file), "{:?}", file)?;
        let toml_config: TomlConfig =
            err_at!(InvalidConfig, toml::from_str(&text), "{:?}", file)?;

        let root = match file.parent() {
            Some(p) if p.as_os_str().is_empty() => path::PathBuf::from("."),
            Some(p) => p.to_path_buf(),
            None => path::PathBuf::from("."),
        };

        toml_config.into_config(&root)
    }

    /// Look for [CONFIG_FILE] in `root`. Return None when `root` is not a
    /// project root.
    pub fn discover<P>(root: P) -> Result<Option<Config>>
    where
        P: AsRef<path::Path>,
    {
        let file = root.as_ref().join(CONFIG_FILE);
        match file.is_file() {
            true => Ok(Some(Config::load(file)?)),
            false => Ok(None),
        }
    }

    /// Return author/committer signature stamped with current time.
    ///
    /// Name and email fall back to `user.name` and `user.email` from
    /// repository's git-config, and then to [DEFAULT_USER_NAME] and
    /// [DEFAULT_USER_EMAIL].
    pub fn to_signature(&self, repo: &git2::Repository) -> Result<git2::Signature<'static>> {
        let cfg = repo.config().ok();
        let lookup = |key: &str| -> Option<String> {
            cfg.as_ref().and_then(|c| c.get_string(key).ok())
        };

        let name = match &self.user_name {
            Some(name) => name.clone(),
            None => lookup("user.name").unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
        };
        let email = match &self.user_email {
            Some(email) => email.clone(),
            None => {
                lookup("user.email").unwrap_or_else(|| DEFAULT_USER_EMAIL.to_string())
            }
        };

        err_at!(FailGitapi, git2::Signature::now(&name, &email))
    }
}

/// On-disk shape of [CONFIG_FILE], every field is optional.
#[derive(Clone, Default, Deserialize)]
pub struct TomlConfig {
    repo: Option<path::PathBuf>,
    branch: Option<String>,
    remote: Option<String>,
    policy: Option<String>,
    timeout: Option<u64>, // in seconds
    allow_empty: Option<bool>,
    user: Option<TomlUser>,
}

#[derive(Clone, Deserialize)]
pub struct TomlUser {
    name: Option<String>,
    email: Option<String>,
}

impl TomlConfig {
    fn into_config(self, root: &path::Path) -> Result<Config> {
        let loc_repo = match self.repo {
            Some(loc) if loc.is_absolute() => loc,
            Some(loc) => root.join(loc),
            None => root.to_path_buf(),
        };

        let mut config = Config::new(loc_repo);
        if let Some(branch) = self.branch {
            config.set_branch(&branch);
        }
        if let Some(remote) = self.remote {
            config.set_remote(&remote);
        }
        if let Some(policy) = self.policy {
            config.set_policy(policy.parse()?);
        }
        config.set_timeout(self.timeout.map(time::Duration::from_secs));
        config.set_allow_empty(self.allow_empty.unwrap_or(false));
        if let Some(user) = self.user {
            config.user_name = user.name;
            config.user_email = user.email;
        }

        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
