use std::{fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(InvalidInput, msg: "bad branch name {}", name);
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(FailGitapi, repo.find_commit(oid));
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(FailGitapi, repo.find_commit(oid), "reading tip of {}", branch);
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that are returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location, and a message describing the failure.
pub enum Error {
    Fatal(String, String),
    IOError(String, String),
    /// Underlying libgit2 call failed.
    FailGitapi(String, String),
    InvalidInput(String, String),
    InvalidConfig(String, String),
    /// Malformed path, or overlapping add/delete in the same mutation.
    /// Always returned before any object is written.
    InvalidMutation(String, String),
    /// Compare-and-set on a local branch ref, or on the remote ref during
    /// push, observed a value other than the expected one. Retryable.
    RefRace(String, String),
    /// Local and remote branch have diverged and the policy is `fail`.
    Diverged(String, String),
    /// Local branch tip is an ancestor of the remote tip at push time.
    LocalBehind(String, String),
    /// Rebase requested with more than one local-only commit.
    UnsupportedRebase(String, String),
    /// Fetch/push transport failure, timeout, or remote rejection.
    NetworkFailure(String, String),
    /// File readers, path missing from the branch or branch missing.
    NotFound(String, String),
}

impl Error {
    /// Retrying the operation, after re-reading ref state, may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RefRace(_, _))
    }

    pub fn to_message(&self) -> &str {
        use Error::*;

        match self {
            Fatal(_, m) | IOError(_, m) | FailGitapi(_, m) | InvalidInput(_, m) => m,
            InvalidConfig(_, m) | InvalidMutation(_, m) | RefRace(_, m) => m,
            Diverged(_, m) | LocalBehind(_, m) | UnsupportedRebase(_, m) => m,
            NetworkFailure(_, m) | NotFound(_, m) => m,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            FailGitapi(p, msg) => write!(f, "{} FailGitapi: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            InvalidConfig(p, msg) => write!(f, "{} InvalidConfig: {}", p, msg),
            InvalidMutation(p, msg) => write!(f, "{} InvalidMutation: {}", p, msg),
            RefRace(p, msg) => write!(f, "{} RefRace: {}", p, msg),
            Diverged(p, msg) => write!(f, "{} Diverged: {}", p, msg),
            LocalBehind(p, msg) => write!(f, "{} LocalBehind: {}", p, msg),
            UnsupportedRebase(p, msg) => write!(f, "{} UnsupportedRebase: {}", p, msg),
            NetworkFailure(p, msg) => write!(f, "{} NetworkFailure: {}", p, msg),
            NotFound(p, msg) => write!(f, "{} NotFound: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl std::error::Error for Error {}
