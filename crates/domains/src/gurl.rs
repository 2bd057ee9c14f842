//! Helpers over [`url::Url`] for the slicing operations the lawyer
//! needs: origins, paths with and without their leaf, and host:port
//! strings. Ports that match the scheme default are never printed,
//! matching what `Url::parse` already normalizes away.

use url::Url;

/// An http or https URL with a host. Other schemes are never mapped.
pub fn is_web_valid(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
}

/// "scheme://host[:port]" with no trailing slash.
pub fn origin_str(url: &Url) -> String {
    format!("{}://{}", url.scheme(), host_and_port(url))
}

/// "scheme://host[:port]/", the form domain names are stored in.
pub fn origin_with_slash(url: &Url) -> String {
    let mut origin = origin_str(url);
    origin.push('/');
    origin
}

/// "host[:port]", suitable for a Host request header.
pub fn host_and_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// The path through its final slash, dropping the leaf filename.
pub fn path_sans_leaf(url: &Url) -> &str {
    let path = url.path();
    match path.rfind('/') {
        Some(slash) => &path[..=slash],
        None => path,
    }
}

/// Everything but the leaf: origin plus the path through its final
/// slash. This is the key used for path-qualified domain lookups.
pub fn all_except_leaf(url: &Url) -> String {
    let mut spec = origin_str(url);
    spec.push_str(path_sans_leaf(url));
    spec
}

/// The path plus any query, relative to the origin.
pub fn path_and_leaf(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
