//! Rule set governing which domains may be rewritten, where their
//! resources are rewritten to, where they are fetched from, and how
//! they are sharded across equivalent hosts.
//!
//! Rules are declared at configuration time through the `add_*`
//! methods. After configuration the lawyer is immutable: every
//! resolution method takes `&self`, so a configured lawyer can be
//! shared freely across parser threads.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::{error, warn};
use url::Url;

use crate::gurl;
use crate::wildcard::Wildcard;

/// Arena handle; domains are never removed outside of `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DomainIdx(usize);

#[derive(Debug)]
struct Domain {
    wildcard: Wildcard,
    name: String,
    /// Where resources from this domain are rewritten to in served HTML,
    /// for moving them onto a CDN or cookieless domain. Shards also use
    /// this link to point back at the domain they were sharded from.
    rewrite_domain: Option<DomainIdx>,
    /// Where resources from this domain are fetched from, in lieu of the
    /// name that appears in the HTML.
    origin_domain: Option<DomainIdx>,
    /// Host header to send when fetching through the origin mapping.
    /// Empty means derive it from the URL being fetched.
    host_header: String,
    shards: Vec<DomainIdx>,
    authorized: bool,
    /// Cuts traversal of shard/rewrite cycles during origin propagation.
    cycle_breadcrumb: bool,
    /// Set on origin domains established through a proxy mapping; those
    /// fetches must not carry an overridden Host header.
    is_proxy: bool,
}

impl Domain {
    fn new(name: String) -> Self {
        Domain {
            wildcard: Wildcard::new(name.clone()),
            name,
            rewrite_domain: None,
            origin_domain: None,
            host_header: String::new(),
            shards: Vec::new(),
            authorized: false,
            cycle_breadcrumb: false,
            is_proxy: false,
        }
    }

    fn is_wildcarded(&self) -> bool {
        !self.wildcard.is_simple()
    }
}

/// Which per-domain link a mapping declaration establishes.
#[derive(Clone, Copy)]
enum Link {
    Rewrite,
    Origin,
    Proxy,
    ShardFrom,
}

/// Result of an origin lookup: the URL to fetch, the Host header to
/// fetch it with, and whether the mapping came from a proxy rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginMapping {
    pub url: String,
    pub host_header: String,
    pub is_proxy: bool,
}

/// Canonical form for a declared domain: scheme defaults to `http://`,
/// the name always ends in a slash, the scheme and host are lowercased
/// while any path keeps its case, and redundant default ports are
/// dropped. Distinct specifications of the same domain all normalize to
/// the same string.
pub fn normalize_domain_name(domain_name: &str) -> String {
    let (mut normalized, scheme_len) = match domain_name.find("://") {
        Some(pos) => (domain_name.to_string(), pos),
        None => (format!("http://{domain_name}"), 4),
    };
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let origin_start = scheme_len + 3;
    let slash = normalized[origin_start..]
        .find('/')
        .map(|i| i + origin_start)
        .unwrap_or(normalized.len());
    normalized[..slash].make_ascii_lowercase();
    let strip = {
        let scheme = &normalized[..scheme_len];
        let origin = &normalized[origin_start..slash];
        if scheme == "https" && origin.ends_with(":443") {
            4
        } else if scheme == "http" && origin.ends_with(":80") {
            3
        } else {
            0
        }
    };
    if strip > 0 {
        normalized.replace_range(slash - strip..slash, "");
    }
    normalized
}

fn is_scheme_safe_to_map_to(domain_name: &str, allow_https: bool) -> bool {
    // A missing scheme defaults to http, which is always safe.
    !domain_name.contains("://")
        || domain_name.starts_with("http://")
        || (allow_https && domain_name.starts_with("https://"))
}

#[derive(Default)]
pub struct DomainLawyer {
    domains: Vec<Domain>,
    /// Name-ordered so that iteration, and therefore `signature`, is
    /// deterministic across runs.
    domain_map: BTreeMap<String, DomainIdx>,
    /// Declaration order matters for wildcards: the first declared
    /// pattern that matches wins.
    wildcarded_domains: Vec<DomainIdx>,
    proxy_suffix: String,
    can_rewrite_domains: bool,
    authorize_all_domains: bool,
}

impl DomainLawyer {
    pub fn new() -> Self {
        DomainLawyer::default()
    }

    /// Declares a domain as authorized for rewriting. Wildcards (`*`,
    /// `?`) may be used; `add_domain("*")` authorizes every domain.
    pub fn add_domain(&mut self, domain_name: &str) -> bool {
        self.add_domain_helper(domain_name, true, true, false, false)
            .is_some()
    }

    /// Declares a domain as known (so fetchers may connect to it)
    /// without authorizing it for rewriting.
    pub fn add_known_domain(&mut self, domain_name: &str) -> bool {
        self.add_domain_helper(domain_name, false, false, false, false)
            .is_some()
    }

    /// Declares that resources on any of the comma-separated `from`
    /// domains should be rewritten to `to_domain` in served HTML. Both
    /// sides become authorized. Wildcards are allowed on the `from`
    /// side only.
    pub fn add_rewrite_domain_mapping(&mut self, to_domain: &str, from_domains_csv: &str) -> bool {
        let result = self.map_domain_helper(
            to_domain,
            from_domains_csv,
            "",
            Link::Rewrite,
            true,
            true,
            true,
            false,
        );
        self.can_rewrite_domains |= result;
        result
    }

    /// Declares that resources on the comma-separated `from` domains
    /// should be fetched from `to_domain` instead, e.g. from localhost
    /// or a load-balancer backend. The `from` domains become authorized;
    /// the fetch target does not. An empty `host_header` means fetches
    /// carry the host of the URL being fetched.
    pub fn add_origin_domain_mapping(
        &mut self,
        to_domain: &str,
        from_domains_csv: &str,
        host_header: &str,
    ) -> bool {
        self.map_domain_helper(
            to_domain,
            from_domains_csv,
            host_header,
            Link::Origin,
            true,
            true,
            false,
            false,
        )
    }

    /// Declares a proxy: resources on `origin_domain` (not under our
    /// control) are served from `proxy_domain`, fetched from the origin.
    /// With `to_domain` set, references are rewritten to it instead of
    /// the proxy, so a CDN can front the proxy.
    pub fn add_proxy_domain_mapping(
        &mut self,
        proxy_domain: &str,
        origin_domain: &str,
        to_domain: Option<&str>,
    ) -> bool {
        match to_domain {
            None => self.map_domain_helper(
                origin_domain,
                proxy_domain,
                "",
                Link::Proxy,
                false,
                true,
                true,
                false,
            ),
            Some(to_domain) => {
                let mut result = self.map_domain_helper(
                    origin_domain,
                    to_domain,
                    "",
                    Link::Proxy,
                    false,
                    true,
                    true,
                    false,
                );
                // The CDN will ask the proxy for resources under the
                // to_domain cache key.
                result &= self.map_domain_helper(
                    to_domain,
                    proxy_domain,
                    "",
                    Link::Rewrite,
                    false,
                    true,
                    true,
                    false,
                );
                // And the proxy reconstructs them by fetching from the
                // origin.
                result &= self.map_domain_helper(
                    origin_domain,
                    proxy_domain,
                    "",
                    Link::Origin,
                    false,
                    true,
                    true,
                    false,
                );
                result
            }
        }
    }

    /// Registers a rewrite mapping for both the http and https versions
    /// of `from_domain`. Neither side may carry a scheme, port, or
    /// wildcard.
    pub fn add_two_protocol_rewrite_domain_mapping(
        &mut self,
        to_domain: &str,
        from_domain: &str,
    ) -> bool {
        let result =
            self.two_protocol_domain_helper(to_domain, from_domain, "", Link::Rewrite, true);
        self.can_rewrite_domains |= result;
        result
    }

    /// Registers an origin mapping for both the http and https versions
    /// of `from_domain`.
    pub fn add_two_protocol_origin_domain_mapping(
        &mut self,
        to_domain: &str,
        from_domain: &str,
        host_header: &str,
    ) -> bool {
        self.two_protocol_domain_helper(to_domain, from_domain, host_header, Link::Origin, false)
    }

    /// Declares shards for `to_domain`, distributing its resources
    /// across equivalent hosts for download parallelism. Wildcards are
    /// not allowed on either side.
    pub fn add_shard(&mut self, to_domain: &str, shards_csv: &str) -> bool {
        let result = self.map_domain_helper(
            to_domain,
            shards_csv,
            "",
            Link::ShardFrom,
            false,
            true,
            true,
            false,
        );
        self.can_rewrite_domains |= result;
        result
    }

    /// Resolves `resource_url` against `original_request` and decides
    /// whether the result may be rewritten. On success returns the
    /// domain (always slash-terminated) the resource should be written
    /// to, with any rewrite mapping applied, and the mapped resource
    /// URL. Sharding is not applied here; see [`shard_domain`].
    ///
    /// [`shard_domain`]: DomainLawyer::shard_domain
    pub fn map_request_to_domain(
        &self,
        original_request: &Url,
        resource_url: &str,
    ) -> Option<(String, Url)> {
        let mut resolved = original_request.join(resource_url).ok()?;
        if !gurl::is_web_valid(&resolved) {
            return None;
        }
        let original_origin = gurl::origin_with_slash(original_request);
        let resolved_origin = gurl::origin_with_slash(&resolved);
        let resolved_domain = self.find_domain(&resolved);

        // The domain of the request being served is authorized
        // implicitly.
        let mut mapped_domain_name = if resolved_origin == original_origin {
            resolved_origin
        } else {
            let idx = resolved_domain?;
            let domain = &self.domains[idx.0];
            if !domain.authorized {
                return None;
            }
            if domain.is_wildcarded() {
                resolved_origin
            } else {
                domain.name.clone()
            }
        };

        if let Some(idx) = resolved_domain
            && let Some(mapped) = self.domains[idx.0].rewrite_domain
        {
            debug_assert!(!self.domains[mapped.0].is_wildcarded());
            debug_assert!(mapped != idx);
            mapped_domain_name = self.domains[mapped.0].name.clone();
            resolved = self.map_url_helper(idx, mapped, &resolved)?;
        }
        Some((mapped_domain_name, resolved))
    }

    /// Whether `domain_to_check` may be rewritten in the context of a
    /// request to `original_request`. The request's own origin is always
    /// authorized.
    pub fn is_domain_authorized(&self, original_request: &Url, domain_to_check: &Url) -> bool {
        if self.authorize_all_domains {
            return true;
        }
        if !gurl::is_web_valid(domain_to_check) {
            return false;
        }
        if gurl::is_web_valid(original_request)
            && gurl::origin_str(original_request) == gurl::origin_str(domain_to_check)
        {
            return true;
        }
        self.find_domain(domain_to_check)
            .is_some_and(|idx| self.domains[idx.0].authorized)
    }

    /// Whether the URL's domain was declared in any form. Callers must
    /// not substitute the Host header here: that would let a request
    /// authorize arbitrary external connections.
    pub fn is_origin_known(&self, domain_to_check: &Url) -> bool {
        gurl::is_web_valid(domain_to_check) && self.find_domain(domain_to_check).is_some()
    }

    /// Maps a resource URL to the location it should be fetched from,
    /// just prior to the fetch. Succeeds even when no mapping applies;
    /// compare the returned URL against the input to tell. Returns
    /// `None` only for URLs that are not fetchable http(s).
    pub fn map_origin(&self, input: &str) -> Option<OriginMapping> {
        let gurl = Url::parse(input).ok()?;
        self.map_origin_url(&gurl)
    }

    pub fn map_origin_url(&self, gurl: &Url) -> Option<OriginMapping> {
        if !gurl::is_web_valid(gurl) {
            return None;
        }
        let mut out = gurl.as_str().to_string();
        let mut host_header = String::new();
        let mut is_proxy = false;
        if let Some(domain) = self.find_domain(gurl)
            && let Some(origin) = self.domains[domain.0].origin_domain
        {
            if let Some(mapped) = self.map_url_helper(domain, origin, gurl) {
                out = mapped.into();
            }
            is_proxy = self.domains[origin.0].is_proxy;
            if !self.domains[origin.0].host_header.is_empty() {
                host_header = self.domains[origin.0].host_header.clone();
            }
        }
        if host_header.is_empty() {
            host_header = gurl::host_and_port(gurl);
        }
        Some(OriginMapping { url: out, host_header, is_proxy })
    }

    /// Picks a shard for `domain_name` from its declared shard list.
    /// The hash is an explicit `u32` so the same resource lands on the
    /// same shard regardless of platform word size. Returns `None` when
    /// the domain has no shards.
    pub fn shard_domain(&self, domain_name: &str, hash: u32) -> Option<String> {
        let gurl = Url::parse(&normalize_domain_name(domain_name)).ok()?;
        let domain = self.find_domain(&gurl)?;
        let shards = &self.domains[domain.0].shards;
        if shards.is_empty() {
            return None;
        }
        let shard = shards[hash as usize % shards.len()];
        Some(self.domains[shard.0].name.clone())
    }

    /// Whether rewriting will move this URL to a different domain, via
    /// a rewrite mapping or sharding. With more than one shard the
    /// answer is pessimistically true, since the shard index is not
    /// known here.
    pub fn will_domain_change(&self, gurl: &Url) -> bool {
        let Some(domain) = self.find_domain(gurl) else {
            return false;
        };
        let mapped = self.domains[domain.0].rewrite_domain.unwrap_or(domain);
        let mapped = match self.domains[mapped.0].shards.as_slice() {
            [] => Some(mapped),
            [only] => Some(*only),
            _ => None,
        };
        mapped != Some(domain)
    }

    /// Whether the URL's domain was established via a proxy mapping.
    pub fn is_proxy_mapped(&self, gurl: &Url) -> bool {
        self.find_domain(gurl).is_some_and(|domain| {
            self.domains[domain.0]
                .origin_domain
                .is_some_and(|origin| self.domains[origin.0].is_proxy)
        })
    }

    /// Whether the user has declared the two domains as serving the
    /// same content, through a rewrite or shard mapping.
    pub fn do_domains_serve_same_content(&self, domain1: &str, domain2: &str) -> bool {
        let find = |name: &str| {
            Url::parse(&normalize_domain_name(name))
                .ok()
                .and_then(|gurl| self.find_domain(&gurl))
        };
        let (Some(domain1), Some(domain2)) = (find(domain1), find(domain2)) else {
            return false;
        };
        if domain1 == domain2 {
            return true;
        }
        let rewrite1 = self.domains[domain1.0].rewrite_domain;
        let rewrite2 = self.domains[domain2.0].rewrite_domain;
        rewrite1 == Some(domain2)
            || rewrite2 == Some(domain1)
            || (rewrite1.is_some() && rewrite1 == rewrite2)
    }

    /// Lists the non-wildcarded domains with a rewrite mapping onto the
    /// given domain. Empty when there is no such mapping.
    pub fn find_domains_rewritten_to(&self, original: &Url) -> Vec<String> {
        if !gurl::is_web_valid(original) {
            error!(target: "domains.lawyer", "invalid url {original}");
            return Vec::new();
        }
        let domain_name = gurl::origin_with_slash(original);
        self.domain_map
            .values()
            .filter_map(|&idx| {
                let domain = &self.domains[idx.0];
                let rewritten = !domain.is_wildcarded()
                    && domain
                        .rewrite_domain
                        .is_some_and(|r| self.domains[r.0].name == domain_name);
                rewritten.then(|| domain.name.clone())
            })
            .collect()
    }

    /// Aggregates the declarations of `src` into this lawyer. When the
    /// same domain is linked differently in both, `src` wins silently.
    /// Wildcard patterns from `src` keep their declaration order,
    /// appended after our own.
    pub fn merge(&mut self, src: &DomainLawyer) {
        let num_existing_wildcards = self.wildcarded_domains.len();
        for &src_idx in src.domain_map.values() {
            let src_domain = &src.domains[src_idx.0];
            let Some(dst) = self.clone_and_add(src_domain) else {
                continue;
            };
            if let Some(rewrite) = src_domain.rewrite_domain
                && let Some(dst_rewrite) = self.clone_and_add(&src.domains[rewrite.0])
            {
                self.set_rewrite_domain(dst, dst_rewrite, true);
            }
            if let Some(origin) = src_domain.origin_domain
                && let Some(dst_origin) = self.clone_and_add(&src.domains[origin.0])
            {
                self.set_origin_domain(dst, dst_origin, true);
            }
            for &shard in &src_domain.shards {
                if let Some(dst_shard) = self.clone_and_add(&src.domains[shard.0]) {
                    self.set_shard_from(dst_shard, dst, true);
                }
            }
        }

        // clone_and_add appended src's wildcards in map order; redo that
        // segment in src's declaration order instead.
        self.wildcarded_domains.truncate(num_existing_wildcards);
        let mut seen: HashSet<DomainIdx> = self.wildcarded_domains.iter().copied().collect();
        for &src_idx in &src.wildcarded_domains {
            let name = &src.domains[src_idx.0].name;
            match self.domain_map.get(name) {
                None => error!(target: "domains.lawyer", "domain {name} not found after merge"),
                Some(&dst) => {
                    if seen.insert(dst) {
                        self.wildcarded_domains.push(dst);
                    }
                }
            }
        }

        self.can_rewrite_domains |= src.can_rewrite_domains;
        self.authorize_all_domains |= src.authorize_all_domains;
        if !src.proxy_suffix.is_empty() {
            if !self.proxy_suffix.is_empty() && self.proxy_suffix != src.proxy_suffix {
                warn!(
                    target: "domains.lawyer",
                    "merging incompatible proxy suffixes {} and {}",
                    self.proxy_suffix, src.proxy_suffix
                );
            }
            self.proxy_suffix = src.proxy_suffix.clone();
        }
    }

    pub fn clear(&mut self) {
        self.domains.clear();
        self.domain_map.clear();
        self.wildcarded_domains.clear();
        self.proxy_suffix.clear();
        self.can_rewrite_domains = false;
        self.authorize_all_domains = false;
    }

    pub fn is_empty(&self) -> bool {
        self.domain_map.is_empty() && self.proxy_suffix.is_empty()
    }

    /// Whether any resource might change domains, via a mapping, a
    /// shard, or a proxy suffix.
    pub fn can_rewrite_domains(&self) -> bool {
        self.can_rewrite_domains || !self.proxy_suffix.is_empty()
    }

    pub fn num_wildcarded_domains(&self) -> usize {
        self.wildcarded_domains.len()
    }

    /// With suffix ".suffix.net" configured, foo.com is served through
    /// foo.com.suffix.net; the proxy strips the suffix when fetching
    /// from origin and re-inserts it when rewriting hyperlinks.
    pub fn set_proxy_suffix(&mut self, suffix: impl Into<String>) {
        self.proxy_suffix = suffix.into();
    }

    pub fn proxy_suffix(&self) -> &str {
        &self.proxy_suffix
    }

    /// Strips the proxy suffix from `gurl`, returning the origin URL
    /// and origin host. `None` when no suffix is configured or the host
    /// does not carry it.
    pub fn strip_proxy_suffix(&self, gurl: &Url) -> Option<(String, String)> {
        if !gurl::is_web_valid(gurl) || self.proxy_suffix.is_empty() {
            return None;
        }
        let host_and_port = gurl::host_and_port(gurl);
        let host = host_and_port.strip_suffix(&self.proxy_suffix)?;
        let url = format!("{}://{}{}", gurl.scheme(), host, gurl::path_and_leaf(gurl));
        Some((url, host.to_string()))
    }

    /// Appends the proxy suffix to the host in `href` when it refers
    /// absolutely to the origin host of `base_url`, keeping navigation
    /// inside the proxied domain. Returns true when `href` was changed.
    pub fn add_proxy_suffix(&self, base_url: &Url, href: &mut String) -> bool {
        let base_host = base_url.host_str().unwrap_or("");
        if self.proxy_suffix.is_empty() || !base_host.ends_with(&self.proxy_suffix) {
            return false;
        }
        let base_host_no_suffix = &base_host[..base_host.len() - self.proxy_suffix.len()];
        let Ok(href_gurl) = base_url.join(href) else {
            return false;
        };
        // Schemes deliberately not compared, so http pages may link to
        // https and vice versa.
        if gurl::is_web_valid(&href_gurl)
            && gurl::is_web_valid(base_url)
            && href_gurl.host_str() == Some(base_host_no_suffix)
        {
            *href = format!(
                "{}://{}{}",
                href_gurl.scheme(),
                base_host,
                gurl::path_and_leaf(&href_gurl)
            );
            return true;
        }
        false
    }

    /// Deterministic fingerprint of the whole rule set, for cache keys.
    pub fn signature(&self) -> String {
        let mut signature = String::new();
        for &idx in self.domain_map.values() {
            signature.push_str("D:");
            signature.push_str(&self.domain_signature(idx));
            signature.push('-');
        }
        if !self.proxy_suffix.is_empty() {
            signature.push_str(",PS:");
            signature.push_str(&self.proxy_suffix);
        }
        signature
    }

    /// Debugging rendition, one domain per line, each line prefixed
    /// with `line_prefix`. The format is not stable.
    pub fn to_string_with_prefix(&self, line_prefix: &str) -> String {
        let mut output = String::new();
        for &idx in self.domain_map.values() {
            output.push_str(line_prefix);
            output.push_str(&self.describe_domain(idx));
            output.push('\n');
        }
        if !self.proxy_suffix.is_empty() {
            output.push_str("Proxy Suffix: ");
            output.push_str(&self.proxy_suffix);
        }
        output
    }

    fn domain_signature(&self, idx: DomainIdx) -> String {
        let domain = &self.domains[idx.0];
        let mut sig = format!(
            "{}_{}_",
            domain.name,
            if domain.authorized { "_a" } else { "_n" }
        );
        if let Some(rewrite) = domain.rewrite_domain {
            sig.push_str("R:");
            sig.push_str(&self.domains[rewrite.0].name);
            sig.push('_');
        }
        if !domain.host_header.is_empty() {
            sig.push_str("H:");
            sig.push_str(&domain.host_header);
            sig.push('|');
        }
        if let Some(origin) = domain.origin_domain {
            sig.push_str(if self.domains[origin.0].is_proxy { "P:" } else { "O:" });
            sig.push_str(&self.domains[origin.0].name);
            sig.push('_');
        }
        for &shard in &domain.shards {
            sig.push_str("S:");
            sig.push_str(&self.domains[shard.0].name);
            sig.push('_');
        }
        sig
    }

    fn describe_domain(&self, idx: DomainIdx) -> String {
        let domain = &self.domains[idx.0];
        let mut output = domain.name.clone();
        if domain.authorized {
            output.push_str(" Auth");
        }
        if let Some(rewrite) = domain.rewrite_domain {
            output.push_str(if domain.is_proxy { " ProxyDomain:" } else { " RewriteDomain:" });
            output.push_str(&self.domains[rewrite.0].name);
        }
        if let Some(origin) = domain.origin_domain {
            output.push_str(if self.domains[origin.0].is_proxy {
                " ProxyOriginDomain:"
            } else {
                " OriginDomain:"
            });
            output.push_str(&self.domains[origin.0].name);
        }
        if !domain.shards.is_empty() {
            output.push_str(" Shards:{");
            for (i, &shard) in domain.shards.iter().enumerate() {
                if i > 0 {
                    output.push_str(", ");
                }
                output.push_str(&self.domains[shard.0].name);
            }
            output.push('}');
        }
        if !domain.host_header.is_empty() {
            output.push_str(" HostHeader:");
            output.push_str(&domain.host_header);
        }
        output
    }

    /// `quiet` suppresses duplicate/conflict diagnostics; merges use it
    /// to let the incoming side win silently.
    fn add_domain_helper(
        &mut self,
        domain_name: &str,
        warn_on_duplicate: bool,
        authorize: bool,
        is_proxy: bool,
        quiet: bool,
    ) -> Option<DomainIdx> {
        if domain_name.is_empty() {
            if !quiet {
                warn!(target: "domains.lawyer", "empty domain declaration ignored");
            }
            return None;
        }
        if authorize && domain_name == "*" {
            self.authorize_all_domains = true;
        }
        let normalized = normalize_domain_name(domain_name);
        let idx = match self.domain_map.get(&normalized) {
            Some(&idx) => {
                if warn_on_duplicate && authorize == self.domains[idx.0].authorized {
                    warn!(
                        target: "domains.lawyer",
                        "domain already declared: {normalized}"
                    );
                    return None;
                }
                idx
            }
            None => {
                let idx = DomainIdx(self.domains.len());
                let domain = Domain::new(normalized.clone());
                let wildcarded = domain.is_wildcarded();
                self.domains.push(domain);
                self.domain_map.insert(normalized, idx);
                if wildcarded {
                    self.wildcarded_domains.push(idx);
                }
                idx
            }
        };
        if authorize {
            self.domains[idx.0].authorized = true;
        }
        if is_proxy {
            self.domains[idx.0].is_proxy = true;
        }
        Some(idx)
    }

    fn clone_and_add(&mut self, src: &Domain) -> Option<DomainIdx> {
        let idx = self.add_domain_helper(&src.name, false, src.authorized, src.is_proxy, true)?;
        self.domains[idx.0].host_header = src.host_header.clone();
        Some(idx)
    }

    /// Looks up the domain entry matching a URL. Entries may be
    /// path-qualified, so the longest declared prefix wins: the lookup
    /// starts from the URL's full origin+path and drops path components
    /// right to left until an exact entry matches. Only then are
    /// wildcard patterns tried, in declaration order.
    fn find_domain(&self, gurl: &Url) -> Option<DomainIdx> {
        let mut domain_path = gurl::all_except_leaf(gurl);
        let components: Vec<&str> = gurl::path_sans_leaf(gurl).split('/').collect();

        let mut found = None;
        // The path is "/a/b/" shaped, so splitting yields empty first
        // and last elements; anything else (about:blank) is skipped.
        if components.len() >= 2
            && components[0].is_empty()
            && components[components.len() - 1].is_empty()
        {
            let mut component_size = 0;
            for i in (1..components.len()).rev() {
                domain_path.truncate(domain_path.len() - component_size);
                debug_assert!(domain_path.ends_with('/'));
                if let Some(&idx) = self.domain_map.get(&domain_path) {
                    found = Some(idx);
                    break;
                }
                // Empty components from double slashes drop one at a
                // time, each removing just the slash.
                component_size = components[i - 1].len() + 1;
            }
        }

        found.or_else(|| {
            self.wildcarded_domains
                .iter()
                .copied()
                .find(|&idx| self.domains[idx.0].wildcard.matches(&domain_path))
        })
    }

    /// Rebases `gurl` from `from`'s directory onto `to`. The relative
    /// remainder is prefixed with "./" so a path that happens to parse
    /// as an absolute URL (e.g. "data:image/jpeg") cannot escape the
    /// target directory.
    fn map_url_helper(&self, from: DomainIdx, to: DomainIdx, gurl: &Url) -> Option<Url> {
        debug_assert!(!self.domains[to.0].is_wildcarded());
        let from_url = Url::parse(&self.domains[from.0].name).ok()?;
        let from_path = gurl::path_sans_leaf(&from_url);
        let path_and_leaf = gurl::path_and_leaf(gurl);
        debug_assert!(path_and_leaf.starts_with(from_path));
        let rel = format!(
            "./{}",
            &path_and_leaf[from_path.len().min(path_and_leaf.len())..]
        );
        let to_url = Url::parse(&self.domains[to.0].name).ok()?;
        let mapped = to_url.join(&rel).ok()?;
        gurl::is_web_valid(&mapped).then_some(mapped)
    }

    fn two_protocol_domain_helper(
        &mut self,
        to_domain: &str,
        from_domain: &str,
        host_header: &str,
        link: Link,
        authorize: bool,
    ) -> bool {
        let Some((http_to, https_to)) = domain_name_to_two_protocols(to_domain) else {
            return false;
        };
        let Some((http_from, https_from)) = domain_name_to_two_protocols(from_domain) else {
            return false;
        };
        if !self.map_domain_helper(
            &http_to, &http_from, host_header, link, false, false, authorize, false,
        ) {
            return false;
        }
        // On failure here the http mapping stays registered.
        self.map_domain_helper(
            &https_to, &https_from, host_header, link, false, true, authorize, false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn map_domain_helper(
        &mut self,
        to_domain_name: &str,
        from_domains_csv: &str,
        host_header: &str,
        link: Link,
        allow_wildcards: bool,
        allow_map_to_https: bool,
        authorize_to_domain: bool,
        quiet: bool,
    ) -> bool {
        if !is_scheme_safe_to_map_to(to_domain_name, allow_map_to_https) {
            return false;
        }
        let Some(to_domain) =
            self.add_domain_helper(to_domain_name, false, authorize_to_domain, false, quiet)
        else {
            return false;
        };
        if self.domains[to_domain.0].is_wildcarded() {
            if !quiet {
                error!(
                    target: "domains.lawyer",
                    "cannot map to a wildcarded domain: {to_domain_name}"
                );
            }
            return false;
        }

        let to_origin = Url::parse(&self.domains[to_domain.0].name)
            .ok()
            .map(|u| gurl::origin_str(&u));
        let mut ret = true;
        let mut mapped_a_domain = false;
        for from_name in from_domains_csv.split(',').filter(|s| !s.is_empty()) {
            let Some(from_domain) = self.add_domain_helper(from_name, false, true, false, quiet)
            else {
                continue;
            };
            let from_origin = Url::parse(&self.domains[from_domain.0].name)
                .ok()
                .map(|u| gurl::origin_str(&u));
            if from_origin.is_some() && from_origin == to_origin {
                // Mapping a domain onto its own scheme://host:port is a
                // no-op.
            } else if !allow_wildcards && self.domains[from_domain.0].is_wildcarded() {
                if !quiet {
                    error!(
                        target: "domains.lawyer",
                        "cannot map from a wildcarded domain: {from_name}"
                    );
                }
                ret = false;
            } else {
                let ok = match link {
                    Link::Rewrite => self.set_rewrite_domain(from_domain, to_domain, quiet),
                    Link::Origin => self.set_origin_domain(from_domain, to_domain, quiet),
                    Link::Proxy => self.set_proxy_domain(from_domain, to_domain, quiet),
                    Link::ShardFrom => self.set_shard_from(from_domain, to_domain, quiet),
                };
                ret &= ok;
                mapped_a_domain |= ok;
            }
        }
        debug_assert!(
            host_header.is_empty() || !self.domains[to_domain.0].is_proxy,
            "a proxy origin must not carry a host header override"
        );
        self.domains[to_domain.0].host_header = host_header.to_string();
        ret && mapped_a_domain
    }

    fn set_rewrite_domain(&mut self, domain: DomainIdx, rewrite: DomainIdx, quiet: bool) -> bool {
        if self.domains[domain.0].rewrite_domain == Some(rewrite) {
            return true;
        }
        // Two proxy directories mapped to one origin is a functional
        // problem; reject it. Plain rewrite conflicts are tolerated for
        // compatibility with old configurations.
        if self.domains[domain.0].is_proxy
            && let Some(old) = self.domains[domain.0].rewrite_domain
        {
            if !quiet {
                error!(
                    target: "domains.lawyer",
                    "proxy origin {} has conflicting proxies {} and {}",
                    self.domains[domain.0].name,
                    self.domains[old.0].name,
                    self.domains[rewrite.0].name
                );
            }
            return false;
        }
        self.domains[domain.0].rewrite_domain = Some(rewrite);
        let origin = self.domains[domain.0].origin_domain;
        self.merge_origin(rewrite, origin, quiet);
        true
    }

    fn set_origin_domain(&mut self, domain: DomainIdx, origin: DomainIdx, quiet: bool) -> bool {
        if self.domains[domain.0].origin_domain == Some(origin) {
            return true;
        }
        if let Some(old) = self.domains[domain.0].origin_domain
            && (self.domains[old.0].is_proxy || self.domains[origin.0].is_proxy)
        {
            if !quiet {
                error!(
                    target: "domains.lawyer",
                    "proxy {} has conflicting origins {} and {}",
                    self.domains[domain.0].name,
                    self.domains[old.0].name,
                    self.domains[origin.0].name
                );
            }
            return false;
        }
        self.merge_origin(domain, Some(origin), quiet);
        if let Some(rewrite) = self.domains[domain.0].rewrite_domain {
            let propagated = self.domains[domain.0].origin_domain;
            self.merge_origin(rewrite, propagated, quiet);
        }
        true
    }

    fn set_proxy_domain(&mut self, domain: DomainIdx, origin: DomainIdx, quiet: bool) -> bool {
        self.domains[origin.0].is_proxy = true;
        self.set_origin_domain(domain, origin, quiet)
            && self.set_rewrite_domain(origin, domain, quiet)
    }

    fn set_shard_from(&mut self, shard: DomainIdx, rewrite: DomainIdx, quiet: bool) -> bool {
        if let Some(old) = self.domains[shard.0].rewrite_domain
            && old != rewrite
            && !quiet
        {
            error!(
                target: "domains.lawyer",
                "shard {} has conflicting rewrite domains {} and {}",
                self.domains[shard.0].name,
                self.domains[old.0].name,
                self.domains[rewrite.0].name
            );
            return false;
        }
        let origin = self.domains[rewrite.0].origin_domain;
        self.merge_origin(shard, origin, quiet);
        self.domains[rewrite.0].shards.push(shard);
        self.domains[shard.0].rewrite_domain = Some(rewrite);
        true
    }

    /// Domains mapped to the same rewrite domain should have consistent
    /// origins. When they conflict we log and let the newcomer win
    /// rather than rejecting established configurations. The new origin
    /// propagates to shards and the rewrite target; the breadcrumb cuts
    /// the shard/rewrite cycles that propagation can otherwise spin on.
    fn merge_origin(&mut self, domain: DomainIdx, origin: Option<DomainIdx>, quiet: bool) {
        if self.domains[domain.0].cycle_breadcrumb {
            return;
        }
        let Some(origin) = origin else {
            return;
        };
        if self.domains[domain.0].origin_domain == Some(origin) {
            return;
        }
        self.domains[domain.0].cycle_breadcrumb = true;
        if let Some(old) = self.domains[domain.0].origin_domain
            && !quiet
        {
            error!(
                target: "domains.lawyer",
                "rewrite domain {} has conflicting origins {} and {}, overriding to {}",
                self.domains[domain.0].name,
                self.domains[old.0].name,
                self.domains[origin.0].name,
                self.domains[origin.0].name
            );
        }
        self.domains[domain.0].origin_domain = Some(origin);
        let shards = self.domains[domain.0].shards.clone();
        for shard in shards {
            self.merge_origin(shard, Some(origin), quiet);
        }
        if let Some(rewrite) = self.domains[domain.0].rewrite_domain {
            self.merge_origin(rewrite, Some(origin), quiet);
        }
        self.domains[domain.0].cycle_breadcrumb = false;
    }
}

impl fmt::Display for DomainLawyer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with_prefix(""))
    }
}

fn domain_name_to_two_protocols(domain_name: &str) -> Option<(String, String)> {
    let http = normalize_domain_name(domain_name);
    if !http.starts_with("http:") {
        return None;
    }
    let https = format!("https{}", &http[4..]);
    Some((http, https))
}
