//! Module implement a read-only http server for a branch's committed tree.
//!
//! Files are served straight from the object database, nothing is checked
//! out. Every request resolves against the branch tip as of that request,
//! so a concurrent commit is observed either entirely or not at all.
//!
//! * `/path/to/file` is served with a content-type guessed from its
//!   extension.
//! * `/path/to/dir/` is served from `dir/index.html`.
//! * `/path/to/dir` is redirected to `/path/to/dir/`.

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Response, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use lazy_static::lazy_static;
use log::{debug, error, info};
use percent_encoding::percent_decode_str;

use std::{collections::HashMap, net, path, sync::Arc};

use crate::{
    err_at,
    git::{Kind, Repo},
    Error, Result,
};

pub const INDEX_FILE: &str = "index.html";

lazy_static! {
    static ref CONTENT_TYPES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("html", "text/html");
        m.insert("htm", "text/html");
        m.insert("css", "text/css");
        m.insert("js", "application/javascript");
        m.insert("json", "application/json");
        m.insert("xml", "application/xml");
        m.insert("svg", "image/svg+xml");
        m.insert("png", "image/png");
        m.insert("jpg", "image/jpeg");
        m.insert("jpeg", "image/jpeg");
        m.insert("gif", "image/gif");
        m.insert("ico", "image/x-icon");
        m.insert("txt", "text/plain");
        m.insert("woff", "font/woff");
        m.insert("woff2", "font/woff2");
        m.insert("ttf", "font/ttf");
        m.insert("pdf", "application/pdf");
        m.insert("map", "application/json");
        m
    };
}

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Guess content type from `key`'s extension.
pub fn content_type(key: &str) -> &'static str {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            CONTENT_TYPES
                .get(ext.as_str())
                .copied()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
        }
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Result of resolving a url path against a branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    File {
        data: Vec<u8>,
        content_type: &'static str,
    },
    /// Directory requested without trailing slash.
    Redirect { location: String },
    /// `root` is true when the branch root itself has nothing to serve,
    /// which typically means a misconfigured or empty branch.
    NotFound { root: bool },
}

/// Resolve `url_path` against `branch`'s tip, refer module documentation.
pub fn resolve(repo: &Repo, branch: &str, url_path: &str) -> Result<Resolved> {
    let path = match percent_decode_str(url_path).decode_utf8() {
        Ok(path) => path.to_string(),
        Err(_) => return Ok(Resolved::NotFound { root: false }),
    };
    let comps: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if comps.iter().any(|c| *c == "." || *c == ".." || c.contains('\0')) {
        return Ok(Resolved::NotFound { root: false });
    }
    let root = comps.is_empty();

    let tree = match repo.branch_tree(branch)? {
        Some(tree) => tree,
        None => return Ok(Resolved::NotFound { root }),
    };

    let key = comps.join("/");
    let key = match root {
        true => INDEX_FILE.to_string(),
        false => match repo.get_path(&tree, &key)? {
            Some(entry) if entry.to_kind() == Kind::Tree && path.ends_with('/') => {
                format!("{}/{}", key, INDEX_FILE)
            }
            Some(entry) if entry.to_kind() == Kind::Tree => {
                let location = format!("{}/", url_path);
                return Ok(Resolved::Redirect { location });
            }
            Some(_) if path.ends_with('/') => return Ok(Resolved::NotFound { root }),
            Some(_) => key,
            None => return Ok(Resolved::NotFound { root }),
        },
    };

    match repo.get_path(&tree, &key)? {
        Some(entry) if entry.to_kind() == Kind::Blob => {
            let data = repo.read_blob(entry.to_oid())?;
            let content_type = content_type(&key);
            Ok(Resolved::File { data, content_type })
        }
        _ => Ok(Resolved::NotFound { root }),
    }
}

#[derive(Clone)]
struct Site {
    loc: Arc<path::PathBuf>,
    branch: Arc<String>,
}

/// Return a router serving `branch` from repository at `loc`. Only GET and
/// HEAD are allowed.
pub fn router<P>(loc: P, branch: &str) -> Router
where
    P: AsRef<path::Path>,
{
    let site = Site {
        loc: Arc::new(loc.as_ref().to_path_buf()),
        branch: Arc::new(branch.to_string()),
    };
    Router::new().fallback(handle).with_state(site)
}

/// Serve `branch` from repository at `loc` on `addr`, until interrupted.
pub async fn run<P>(addr: net::SocketAddr, loc: P, branch: &str) -> Result<()>
where
    P: AsRef<path::Path>,
{
    let app = router(loc, branch);

    let listener = err_at!(IOError, tokio::net::TcpListener::bind(addr).await, "{}", addr)?;
    let local_addr = err_at!(IOError, listener.local_addr())?;
    info!("serving {} at http://{}/", branch, local_addr);

    err_at!(
        IOError,
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    )
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupted, shutting down"),
        Err(err) => error!("ctrl-c handler {}", err),
    }
}

async fn handle(State(site): State<Site>, method: Method, uri: Uri) -> Response<Body> {
    if method != Method::GET && method != Method::HEAD {
        debug!("{} {} not allowed", method, uri.path());
        let mut resp = (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
        resp.headers_mut()
            .insert(header::ALLOW, header::HeaderValue::from_static("GET, HEAD"));
        return resp;
    }

    let url_path = uri.path().to_string();
    let res = {
        let site = site.clone();
        let url_path = url_path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repo::open(site.loc.as_path())?;
            resolve(&repo, &site.branch, &url_path)
        })
        .await
    };

    let resolved = match res {
        Ok(Ok(resolved)) => resolved,
        Ok(Err(err)) => {
            error!("{} {} {}", method, url_path, err);
            return internal_error();
        }
        Err(err) => {
            error!("{} {} task {}", method, url_path, err);
            return internal_error();
        }
    };

    let head = method == Method::HEAD;
    let (status, builder, body) = match resolved {
        Resolved::File { data, content_type } => {
            let builder = Response::builder()
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, data.len());
            (StatusCode::OK, builder, data)
        }
        Resolved::Redirect { location } => {
            let builder = Response::builder().header(header::LOCATION, location);
            (StatusCode::MOVED_PERMANENTLY, builder, vec![])
        }
        Resolved::NotFound { root } => {
            let text = match root {
                true => format!(
                    "File not found. Did you mean to serve branch '{}'? \
                     It may not exist or may be empty.",
                    site.branch
                ),
                false => "File not found".to_string(),
            };
            let builder = Response::builder()
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .header(header::CONTENT_LENGTH, text.len());
            (StatusCode::NOT_FOUND, builder, text.into_bytes())
        }
    };
    info!("{} {} {}", method, url_path, status.as_u16());

    let body = match head {
        true => Body::empty(),
        false => Body::from(body),
    };
    let builder = builder
        .status(status)
        .header(header::SERVER, server_name())
        .header(header::DATE, http_date());
    match builder.body(body) {
        Ok(resp) => resp,
        Err(err) => {
            error!("{} {} response {}", method, url_path, err);
            internal_error()
        }
    }
}

fn internal_error() -> Response<Body> {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

fn server_name() -> String {
    format!("verdocs/{}", env!("CARGO_PKG_VERSION"))
}

fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
