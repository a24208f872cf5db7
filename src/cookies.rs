//! Session cookies for the remote tracking site.
//!
//! Logged-in pages behave differently from anonymous ones, so the request
//! layer loads a Netscape cookie export (as written by browser extensions)
//! into its cookie jar. Only unexpired cookies for the site's host are kept.

use crate::error::CookieError;
use reqwest::Url;
use reqwest::cookie::Jar;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// One line of a Netscape cookie file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NetscapeCookie {
    domain: String,
    include_subdomains: bool,
    path: String,
    secure: bool,
    expires_unix: Option<u64>,
    name: String,
    value: String,
    http_only: bool,
}

impl FromStr for NetscapeCookie {
    type Err = CookieError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (http_only, line) = match line.strip_prefix("#HttpOnly_") {
            Some(stripped) => (true, stripped),
            None => (false, line),
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        let [domain, subdomains, path, secure, expires, name, value] = fields.as_slice() else {
            return Err(CookieError::InvalidLine(line.to_string()));
        };

        Ok(Self {
            domain: domain.to_string(),
            include_subdomains: subdomains.eq_ignore_ascii_case("true"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("true"),
            expires_unix: expires.parse::<u64>().ok().filter(|ts| *ts != 0),
            name: name.to_string(),
            value: value.to_string(),
            http_only,
        })
    }
}

impl NetscapeCookie {
    fn is_expired(&self, now_unix: u64) -> bool {
        self.expires_unix.is_some_and(|ts| ts <= now_unix)
    }

    fn applies_to(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        host == domain || (self.include_subdomains && host.ends_with(&format!(".{}", domain)))
    }

    /// `Set-Cookie` style string understood by the reqwest jar.
    fn to_set_cookie(&self) -> String {
        let mut cookie = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            cookie.push_str(&format!("; Domain={}", self.domain));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        cookie
    }
}

fn parse_cookie_file(content: &str) -> Result<Vec<NetscapeCookie>, CookieError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| line.starts_with("#HttpOnly_") || !line.starts_with('#'))
        .map(NetscapeCookie::from_str)
        .collect()
}

/// Finds the newest `*.txt` file in `dir` whose name contains `token`.
fn find_cookie_file(dir: &Path, token: &str) -> Result<Option<PathBuf>, std::io::Error> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let token = token.to_ascii_lowercase();
    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };
        let file_name = file_name.to_ascii_lowercase();
        if !file_name.ends_with(".txt") || !file_name.contains(&token) {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

        if best.as_ref().is_none_or(|(_, time)| modified > *time) {
            best = Some((path, modified));
        }
    }

    Ok(best.map(|(path, _)| path))
}

/// Builds a cookie jar for `site`.
///
/// `explicit` wins when given; otherwise `search_dir` is searched for a
/// file named after the site's host (e.g. `novelupdates-cookies.txt`).
/// Returns the jar, the file used, and the number of cookies loaded.
pub fn load_site_cookies(
    site: &Url,
    explicit: Option<&Path>,
    search_dir: Option<&Path>,
) -> Result<(Arc<Jar>, Option<PathBuf>, usize), CookieError> {
    let jar = Arc::new(Jar::default());
    let host = site
        .host_str()
        .ok_or_else(|| CookieError::InvalidDomain(site.to_string()))?;

    let source = match (explicit, search_dir) {
        (Some(path), _) => Some(path.to_path_buf()),
        (None, Some(dir)) => find_cookie_file(dir, site_token(host))?,
        (None, None) => None,
    };

    let Some(path) = source else {
        return Ok((jar, None, 0));
    };

    let now_unix = chrono::Utc::now().timestamp().max(0) as u64;
    let cookies = parse_cookie_file(&std::fs::read_to_string(&path)?)?;
    let mut loaded = 0;

    for cookie in cookies
        .iter()
        .filter(|c| !c.is_expired(now_unix) && c.applies_to(host))
    {
        let domain = cookie.domain.trim_start_matches('.');
        let url = Url::parse(&format!("https://{}/", domain))
            .map_err(|_| CookieError::InvalidDomain(cookie.domain.clone()))?;
        jar.add_cookie_str(&cookie.to_set_cookie(), &url);
        loaded += 1;
    }

    Ok((jar, Some(path), loaded))
}

/// Second-level label of a host: `www.novelupdates.com` → `novelupdates`.
fn site_token(host: &str) -> &str {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2]
    } else {
        host
    }
}
