use domains::DomainLawyer;
use url::Url;

fn parse(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn map_request(lawyer: &DomainLawyer, base: &str, resource: &str) -> Option<(String, String)> {
    lawyer
        .map_request_to_domain(&parse(base), resource)
        .map(|(domain, url)| (domain, url.to_string()))
}

// Origin-maps through a plain (non-proxy) mapping.
fn map_origin(lawyer: &DomainLawyer, input: &str) -> Option<String> {
    let mapping = lawyer.map_origin(input)?;
    (!mapping.is_proxy).then_some(mapping.url)
}

// Origin-maps through a proxy mapping.
fn map_proxy(lawyer: &DomainLawyer, input: &str) -> Option<String> {
    let mapping = lawyer.map_origin(input)?;
    mapping.is_proxy.then_some(mapping.url)
}

fn will_domain_change(lawyer: &DomainLawyer, spec: &str) -> bool {
    lawyer.will_domain_change(&parse(&domains::normalize_domain_name(spec)))
}

const CONTEXT: &str = "http://www.nytimes.com/index.html";

#[test]
fn same_domain_resources_are_implicitly_authorized() {
    let lawyer = DomainLawyer::new();
    assert_eq!(
        map_request(&lawyer, CONTEXT, "styles/style.css"),
        Some((
            "http://www.nytimes.com/".to_string(),
            "http://www.nytimes.com/styles/style.css".to_string()
        ))
    );
    assert_eq!(
        map_request(&lawyer, CONTEXT, "http://www.nytimes.com/styles/style.css"),
        Some((
            "http://www.nytimes.com/".to_string(),
            "http://www.nytimes.com/styles/style.css".to_string()
        ))
    );
    assert!(!lawyer.can_rewrite_domains());
}

#[test]
fn external_domains_require_declaration() {
    let mut lawyer = DomainLawyer::new();
    assert_eq!(map_request(&lawyer, CONTEXT, "http://graphics8.nytimes.com/x.css"), None);
    assert!(!lawyer.is_domain_authorized(&parse(CONTEXT), &parse("http://graphics8.nytimes.com/")));

    assert!(lawyer.add_domain("http://graphics8.nytimes.com/"));
    assert!(lawyer.is_domain_authorized(&parse(CONTEXT), &parse("http://graphics8.nytimes.com/")));
    assert_eq!(
        map_request(&lawyer, CONTEXT, "http://graphics8.nytimes.com/x.css"),
        Some((
            "http://graphics8.nytimes.com/".to_string(),
            "http://graphics8.nytimes.com/x.css".to_string()
        ))
    );

    // The declaration covers the default port only.
    assert_eq!(map_request(&lawyer, CONTEXT, "http://graphics8.nytimes.com:8080/x.css"), None);
    assert!(!lawyer.do_domains_serve_same_content(
        "graphics8.nytimes.com:8080",
        "graphics8.nytimes.com"
    ));
}

#[test]
fn declarations_normalize_case_scheme_and_default_ports() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_domain("WWW.CDN.com"));
    assert_eq!(
        map_request(&lawyer, CONTEXT, "http://www.cdn.com/a.css").map(|(d, _)| d),
        Some("http://www.cdn.com/".to_string())
    );

    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_domain("http://www.cdn.com:80"));
    assert_eq!(
        map_request(&lawyer, CONTEXT, "http://www.cdn.com/a.css").map(|(d, _)| d),
        Some("http://www.cdn.com/".to_string())
    );
}

#[test]
fn duplicate_declarations_are_rejected() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_domain("www.nytimes.com"));
    assert!(!lawyer.add_domain("www.nytimes.com"));
    assert!(lawyer.add_domain("*"));
    assert!(!lawyer.add_domain("*"));
}

#[test]
fn wildcard_declarations_cover_matching_hosts() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_domain("*.coolsite.com"));
    assert_eq!(
        map_request(&lawyer, CONTEXT, "http://www.coolsite.com/a.css").map(|(d, _)| d),
        Some("http://www.coolsite.com/".to_string())
    );

    // A trailing wildcard also covers explicit ports.
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_domain("www.example.com*"));
    assert!(map_request(&lawyer, CONTEXT, "http://www.example.com/styles.css").is_some());
    assert!(map_request(&lawyer, CONTEXT, "http://www.example.com:81/styles.css").is_some());
}

#[test]
fn authorization_is_monotonic() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_domain("cdn.com"));
    let context = parse(CONTEXT);
    assert!(lawyer.is_domain_authorized(&context, &parse("http://cdn.com/")));
    lawyer.add_domain("other1.com");
    lawyer.add_known_domain("other2.com");
    lawyer.add_rewrite_domain_mapping("cdn2.com", "origin2.com");
    assert!(lawyer.is_domain_authorized(&context, &parse("http://cdn.com/")));
}

#[test]
fn known_domains_are_not_authorized() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_known_domain("tracker.com"));
    assert!(lawyer.is_origin_known(&parse("http://tracker.com/")));
    assert!(!lawyer.is_domain_authorized(&parse(CONTEXT), &parse("http://tracker.com/")));
}

#[test]
fn rewrite_mapping_changes_the_written_domain() {
    let mut lawyer = DomainLawyer::new();
    let context = "http://www.origin.com/index.html";
    assert!(lawyer.add_domain("http://cdn.com/"));
    assert!(lawyer.add_domain("http://origin.com/"));
    assert!(!lawyer.do_domains_serve_same_content("cdn.com", "origin.com"));
    assert!(lawyer.add_rewrite_domain_mapping("http://cdn.com", "http://origin.com"));
    assert!(lawyer.do_domains_serve_same_content("cdn.com", "origin.com"));
    assert!(lawyer.can_rewrite_domains());

    assert_eq!(
        map_request(&lawyer, context, "http://origin.com/styles/blue.css").map(|(d, _)| d),
        Some("http://cdn.com/".to_string())
    );

    // A relative reference resolves to www.origin.com, which is not
    // mapped yet.
    assert_eq!(
        map_request(&lawyer, context, "styles/blue.css").map(|(d, _)| d),
        Some("http://www.origin.com/".to_string())
    );
    assert!(lawyer.add_rewrite_domain_mapping("http://cdn.com", "http://www.origin.com"));
    assert_eq!(
        map_request(&lawyer, context, "styles/blue.css").map(|(d, _)| d),
        Some("http://cdn.com/".to_string())
    );
}

#[test]
fn rewrite_mapping_carries_target_paths() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_rewrite_domain_mapping("http://cdn.com/origin", "http://origin.com"));
    assert_eq!(
        map_request(&lawyer, "http://www.origin.com/index.html", "http://origin.com/styles/blue.css"),
        Some((
            "http://cdn.com/origin/".to_string(),
            "http://cdn.com/origin/styles/blue.css".to_string()
        ))
    );

    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_rewrite_domain_mapping(
        "http://example.com/static/images/",
        "http://static.com/images/"
    ));
    assert_eq!(
        map_request(&lawyer, "http://example.com/index.html", "http://static.com/images/teapot.png"),
        Some((
            "http://example.com/static/images/".to_string(),
            "http://example.com/static/images/teapot.png".to_string()
        ))
    );
}

#[test]
fn origin_mapping_rebases_paths() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_origin_domain_mapping("http://origin.com/subdir/", "http://external.com", ""));
    assert_eq!(
        map_origin(&lawyer, "http://external.com/styles/main.css"),
        Some("http://origin.com/subdir/styles/main.css".to_string())
    );

    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_origin_domain_mapping(
        "http://origin.com/subdir/",
        "http://external.com/static/",
        ""
    ));
    assert_eq!(
        map_origin(&lawyer, "http://external.com/static/styles/main.css"),
        Some("http://origin.com/subdir/styles/main.css".to_string())
    );
    // Double slashes survive the rebase.
    assert_eq!(
        map_origin(&lawyer, "http://external.com/static/styles//main.css"),
        Some("http://origin.com/subdir/styles//main.css".to_string())
    );
}

#[test]
fn origin_mapping_is_path_scoped() {
    let mut lawyer = DomainLawyer::new();
    lawyer.add_domain("http://origin.com");
    lawyer.add_domain("http://origin.com/a/b");
    lawyer.add_domain("http://external.com");
    assert!(lawyer.add_origin_domain_mapping(
        "http://origin.com/a/",
        "http://external.com/static/",
        ""
    ));
    assert_eq!(
        map_origin(&lawyer, "http://external.com/static/styles/main.css"),
        Some("http://origin.com/a/styles/main.css".to_string())
    );
    // A top-level page on external.com is outside the mapped path and
    // passes through unchanged.
    assert_eq!(
        map_origin(&lawyer, "http://external.com/index.html"),
        Some("http://external.com/index.html".to_string())
    );
}

#[test]
fn path_scoped_declarations_limit_authorization() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_origin_domain_mapping(
        "http://origin.com/a/",
        "http://external.com/static/",
        ""
    ));
    let context = parse("http://origin.com/index.html");
    assert!(!lawyer.is_domain_authorized(&context, &parse("http://external.com")));
    assert!(lawyer.is_domain_authorized(&context, &parse("http://external.com/static/")));

    let mut permissive = DomainLawyer::new();
    permissive.add_domain("*");
    assert!(permissive.is_domain_authorized(&context, &parse("http://external.com")));
}

#[test]
fn origin_mapping_reports_host_header() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_origin_domain_mapping("origin", "*domain", "host"));
    let mapping = lawyer.map_origin("http://www.domain/foo.css").unwrap();
    assert_eq!(mapping.url, "http://origin/foo.css");
    assert_eq!(mapping.host_header, "host");
    assert!(!mapping.is_proxy);

    // Without an explicit header the fetched URL's host is used.
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_origin_domain_mapping("origin", "*domain", ""));
    let mapping = lawyer.map_origin("http://www.domain/foo.css").unwrap();
    assert_eq!(mapping.url, "http://origin/foo.css");
    assert_eq!(mapping.host_header, "www.domain");
}

#[test]
fn origin_mapping_preserves_query_and_port() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_origin_domain_mapping("http://localhost:8080", "http://origin.com:8080", ""));
    assert_eq!(
        map_origin(&lawyer, "http://origin.com:8080/a/b/c?d=f"),
        Some("http://localhost:8080/a/b/c?d=f".to_string())
    );

    // The fetch target is not authorized for rewriting.
    assert_eq!(
        map_request(&lawyer, "http://origin.com:8080/index.html", "http://localhost:8080/blue.css"),
        None
    );
}

#[test]
fn origin_follows_rewrites_and_shards() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_rewrite_domain_mapping("rewrite.com", "myhost.com"));
    assert!(lawyer.add_origin_domain_mapping("localhost", "myhost.com", ""));
    assert_eq!(
        map_origin(&lawyer, "http://rewrite.com/a/b/c?d=f"),
        Some("http://localhost/a/b/c?d=f".to_string())
    );

    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_rewrite_domain_mapping("cdn.myhost.com", "myhost.com"));
    assert!(lawyer.add_origin_domain_mapping("localhost", "myhost.com", ""));
    assert!(lawyer.add_shard("cdn.myhost.com", "s1.com,s2.com"));
    assert_eq!(
        map_origin(&lawyer, "http://s1.com/a/b/c?d=f"),
        Some("http://localhost/a/b/c?d=f".to_string())
    );
    assert_eq!(
        map_origin(&lawyer, "http://s2.com/a/b/c?d=f"),
        Some("http://localhost/a/b/c?d=f".to_string())
    );
}

#[test]
fn conflicting_origins_newest_wins() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_origin_domain_mapping("localhost", "myhost.com", ""));
    assert!(lawyer.add_origin_domain_mapping("other", "myhost.com", ""));
    assert_eq!(
        map_origin(&lawyer, "http://myhost.com/x"),
        Some("http://other/x".to_string())
    );
}

#[test]
fn rewrite_origin_cycle_terminates() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_shard("b.com", "a.com"));
    assert!(lawyer.add_rewrite_domain_mapping("b.com", "a.com"));
    // a.com and b.com are now in a shard/rewrite cycle; origin
    // propagation must not spin on it.
    assert!(lawyer.add_origin_domain_mapping("origin1.com", "a.com", ""));
    assert!(lawyer.add_origin_domain_mapping("origin2.com", "b.com", ""));
    assert_eq!(
        map_origin(&lawyer, "http://a.com/x"),
        Some("http://origin2.com/x".to_string())
    );
}

#[test]
fn sharding_is_deterministic() {
    let mut lawyer = DomainLawyer::new();
    assert!(!lawyer.can_rewrite_domains());
    assert!(lawyer.add_shard("foo.com", "bar1.com,bar2.com"));
    assert!(lawyer.can_rewrite_domains());
    assert_eq!(lawyer.shard_domain("http://foo.com/", 0), Some("http://bar1.com/".to_string()));
    assert_eq!(lawyer.shard_domain("http://foo.com/", 1), Some("http://bar2.com/".to_string()));
    assert_eq!(lawyer.shard_domain("http://foo.com/", 7), Some("http://bar2.com/".to_string()));
    assert_eq!(lawyer.shard_domain("http://other.com/", 0), None);
    for hash in [0u32, 1, 2, 1_000_003] {
        assert_eq!(
            lawyer.shard_domain("http://foo.com/", hash),
            lawyer.shard_domain("http://foo.com/", hash)
        );
    }

    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_shard("https://foo.com", "https://bar1.com,https://bar2.com"));
    assert_eq!(
        lawyer.shard_domain("https://foo.com/", 0),
        Some("https://bar1.com/".to_string())
    );
}

#[test]
fn shards_serve_same_content() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_shard("foo.com", "bar1.com,bar2.com"));
    for (a, b) in [
        ("foo.com", "bar1.com"),
        ("foo.com", "bar2.com"),
        ("bar1.com", "bar2.com"),
        ("bar2.com", "foo.com"),
    ] {
        assert!(lawyer.do_domains_serve_same_content(a, b), "{a} vs {b}");
    }
    assert!(!lawyer.do_domains_serve_same_content("foo.com", "other.com"));
}

#[test]
fn will_domain_change_considers_mappings_and_shards() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_shard("foo.com", "bar1.com,bar2.com"));
    assert!(lawyer.add_rewrite_domain_mapping("http://cdn.com", "http://origin.com"));
    assert!(will_domain_change(&lawyer, "http://foo.com/"));
    assert!(will_domain_change(&lawyer, "foo.com"));
    assert!(will_domain_change(&lawyer, "http://origin.com/"));
    assert!(will_domain_change(&lawyer, "http://bar1.com/"));
    assert!(!will_domain_change(&lawyer, "http://cdn.com/"));
    assert!(!will_domain_change(&lawyer, "http://other_domain.com/"));

    // A single shard is predictable, so the shard itself won't move.
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_shard("foo.com", "bar1.com"));
    assert!(will_domain_change(&lawyer, "http://foo.com/"));
    assert!(!will_domain_change(&lawyer, "http://bar1.com/"));
}

#[test]
fn will_domain_change_respects_subdirectories() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_rewrite_domain_mapping("http://cdn.com", "http://origin.com/subdir"));
    assert!(!will_domain_change(&lawyer, "http://origin.com/"));
    assert!(!will_domain_change(&lawyer, "http://origin.com/subdirx"));
    assert!(will_domain_change(&lawyer, "http://origin.com/subdir/x"));
}

#[test]
fn proxy_mapping_round_trips() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_proxy_domain_mapping(
        "http://origin.com/external",
        "http://external.com/static",
        None
    ));
    let context = "http://origin.com/index.html";
    assert_eq!(
        map_request(&lawyer, context, "http://external.com/static/images/proxy_this.png"),
        Some((
            "http://origin.com/external/".to_string(),
            "http://origin.com/external/images/proxy_this.png".to_string()
        ))
    );
    // Fetching the proxied URL goes back to the origin.
    assert_eq!(
        map_proxy(&lawyer, "http://origin.com/external/images/proxy_this.png"),
        Some("http://external.com/static/images/proxy_this.png".to_string())
    );
    assert!(lawyer.is_proxy_mapped(&parse("http://origin.com/external/images/proxy_this.png")));

    // Proxying external.com/static does not open up the rest of
    // external.com.
    assert_eq!(map_request(&lawyer, context, "http://external.com/evil/gifar.gif"), None);
    assert_eq!(map_request(&lawyer, context, "http://external.com/gifar.gif"), None);
}

#[test]
fn proxy_conflicts_are_rejected() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_proxy_domain_mapping("http://proxy.com/origin", "http://origin.com", None));
    assert_eq!(
        map_proxy(&lawyer, "http://proxy.com/origin/x"),
        Some("http://origin.com/x".to_string())
    );

    // proxy/proxy conflict.
    assert!(!lawyer.add_proxy_domain_mapping("http://proxy.com/origin", "http://ambiguous.com", None));
    assert_eq!(
        map_proxy(&lawyer, "http://proxy.com/origin/x"),
        Some("http://origin.com/x".to_string())
    );

    // origin/proxy conflict.
    assert!(!lawyer.add_origin_domain_mapping("http://ambiguous.com", "http://proxy.com/origin", ""));
    assert_eq!(
        map_proxy(&lawyer, "http://proxy.com/origin/x"),
        Some("http://origin.com/x".to_string())
    );

    // Mapping one origin behind two proxies is also rejected.
    assert!(!lawyer.add_proxy_domain_mapping("http://proxy2.com/origin", "http://origin.com", None));
}

#[test]
fn proxy_with_cdn_rewrites_to_the_cdn() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_proxy_domain_mapping(
        "http://proxy.com/external",
        "http://external.com/static",
        Some("http://cdn.com/external")
    ));
    assert_eq!(
        map_request(&lawyer, "http://proxy.com/index.html", "http://external.com/static/a.png"),
        Some((
            "http://cdn.com/external/".to_string(),
            "http://cdn.com/external/a.png".to_string()
        ))
    );
    // Both the proxy and CDN names fetch from the origin.
    assert_eq!(
        map_proxy(&lawyer, "http://proxy.com/external/a.png"),
        Some("http://external.com/static/a.png".to_string())
    );
    assert_eq!(
        map_proxy(&lawyer, "http://cdn.com/external/a.png"),
        Some("http://external.com/static/a.png".to_string())
    );
}

#[test]
fn two_protocol_origin_mapping_covers_both_schemes() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_two_protocol_origin_domain_mapping("ref.nytimes.com", "www.nytimes.com", ""));
    assert!(!lawyer.can_rewrite_domains());

    let mapping = lawyer.map_origin("http://www.nytimes.com/index.html").unwrap();
    assert_eq!(mapping.url, "http://ref.nytimes.com/index.html");
    assert_eq!(mapping.host_header, "www.nytimes.com");

    let mapping = lawyer.map_origin("https://www.nytimes.com/index.html").unwrap();
    assert_eq!(mapping.url, "https://ref.nytimes.com/index.html");
    assert_eq!(mapping.host_header, "www.nytimes.com");

    // Schemes and wildcards are rejected for two-protocol declarations.
    assert!(!lawyer.add_two_protocol_origin_domain_mapping("https://a.com", "b.com", ""));
    assert!(!lawyer.add_two_protocol_rewrite_domain_mapping("a.com", "*.b.com"));
}

#[test]
fn find_domains_rewritten_to_lists_sources_in_order() {
    let mut lawyer = DomainLawyer::new();
    let target = parse("http://www1.example.com/");
    assert!(lawyer.find_domains_rewritten_to(&target).is_empty());

    assert!(lawyer.add_two_protocol_rewrite_domain_mapping("www1.example.com", "www.example.com"));
    assert!(lawyer.add_two_protocol_rewrite_domain_mapping("www1.example.com", "xyz.example.com"));
    assert_eq!(
        lawyer.find_domains_rewritten_to(&target),
        vec!["http://www.example.com/".to_string(), "http://xyz.example.com/".to_string()]
    );
}

#[test]
fn merge_aggregates_and_src_wins() {
    let mut first = DomainLawyer::new();
    assert!(first.add_domain("http://d1.com/"));
    assert!(first.add_rewrite_domain_mapping("http://cdn1.com", "http://www.o1.com"));
    assert!(first.add_origin_domain_mapping("http://localhost:8080", "http://o1.com:8080", ""));
    assert!(first.add_proxy_domain_mapping("http://proxy.com/origin", "http://origin.com", None));
    assert!(first.add_origin_domain_mapping("http://dest1/", "http://common_src1", ""));
    assert!(first.add_shard("foo.com", "bar1.com,bar2.com"));

    let mut merged = DomainLawyer::new();
    assert!(merged.add_domain("http://d2.com/"));
    assert!(merged.add_rewrite_domain_mapping("http://cdn2.com", "http://www.o2.com"));
    // A different origin for the same source; the merged-in side wins.
    assert!(merged.add_origin_domain_mapping("http://dest3/", "http://common_src1", ""));

    merged.merge(&first);

    assert_eq!(
        map_request(&merged, "http://www.o1.com/index.html", "styles/blue.css").map(|(d, _)| d),
        Some("http://cdn1.com/".to_string())
    );
    assert_eq!(
        map_request(&merged, "http://www.o2.com/index.html", "styles/blue.css").map(|(d, _)| d),
        Some("http://cdn2.com/".to_string())
    );
    assert_eq!(
        map_origin(&merged, "http://o1.com:8080/x"),
        Some("http://localhost:8080/x".to_string())
    );
    assert_eq!(
        map_proxy(&merged, "http://proxy.com/origin/x"),
        Some("http://origin.com/x".to_string())
    );
    assert_eq!(map_origin(&merged, "http://common_src1/x"), Some("http://dest1/x".to_string()));
    assert_eq!(merged.shard_domain("http://foo.com/", 0), Some("http://bar1.com/".to_string()));
    assert!(merged.can_rewrite_domains());
    assert!(merged.is_domain_authorized(&parse(CONTEXT), &parse("http://d1.com/")));
    assert!(merged.is_domain_authorized(&parse(CONTEXT), &parse("http://d2.com/")));
}

#[test]
fn merge_preserves_wildcard_declaration_order() {
    let mut first = DomainLawyer::new();
    assert!(first.add_origin_domain_mapping("host1", "abc*.com", ""));
    assert!(first.add_origin_domain_mapping("host2", "*z.com", ""));
    assert_eq!(map_origin(&first, "http://abc.com/x"), Some("http://host1/x".to_string()));
    assert_eq!(map_origin(&first, "http://z.com/x"), Some("http://host2/x".to_string()));

    let mut second = DomainLawyer::new();
    assert!(second.add_origin_domain_mapping("host3", "*abc*.com", ""));
    assert!(second.add_origin_domain_mapping("host1", "abc*.com", ""));

    // In name order "*abc*.com" sorts before "abc*.com"; declaration
    // order must survive the merges anyway.
    let mut merged = DomainLawyer::new();
    merged.merge(&first);
    merged.merge(&second);
    assert_eq!(merged.num_wildcarded_domains(), 3);
    assert_eq!(map_origin(&merged, "http://abc.com/x"), Some("http://host1/x".to_string()));
    assert_eq!(map_origin(&merged, "http://xyz.com/x"), Some("http://host2/x".to_string()));
    assert_eq!(map_origin(&merged, "http://xabc.com/x"), Some("http://host3/x".to_string()));
}

#[test]
fn signature_is_complete_and_deterministic() {
    let mut first = DomainLawyer::new();
    assert!(first.add_origin_domain_mapping("host1", "*abc*.com", ""));
    assert!(first.add_origin_domain_mapping("host2", "*def*.com", "h2"));
    assert_eq!(
        first.signature(),
        "D:http://*abc*.com/__a_O:http://host1/_-\
         D:http://*def*.com/__a_O:http://host2/_-\
         D:http://host1/__n_-\
         D:http://host2/__n_H:h2|-"
    );

    let mut second = DomainLawyer::new();
    assert!(second.add_rewrite_domain_mapping("cdn.com", "myhost1.com,myhost2.com"));
    assert_eq!(
        second.signature(),
        "D:http://cdn.com/__a_-\
         D:http://myhost1.com/__a_R:http://cdn.com/_-\
         D:http://myhost2.com/__a_R:http://cdn.com/_-"
    );

    assert!(first.add_shard("domain1", "shard"));
    assert_eq!(
        first.signature(),
        "D:http://*abc*.com/__a_O:http://host1/_-\
         D:http://*def*.com/__a_O:http://host2/_-\
         D:http://domain1/__a_S:http://shard/_-\
         D:http://host1/__n_-\
         D:http://host2/__n_H:h2|-\
         D:http://shard/__a_R:http://domain1/_-"
    );
}

#[test]
fn debug_rendition_lists_domains_by_name() {
    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_domain("static.example.com"));
    assert!(lawyer.add_origin_domain_mapping("host1", "*abc*.com", ""));
    assert_eq!(
        lawyer.to_string(),
        "http://*abc*.com/ Auth OriginDomain:http://host1/\n\
         http://host1/\n\
         http://static.example.com/ Auth\n"
    );

    let mut lawyer = DomainLawyer::new();
    assert!(lawyer.add_rewrite_domain_mapping("myhost.cdn.com", "myhost1.com,myhost2.com"));
    assert!(lawyer.add_shard("domain1", "shard,shard2"));
    assert_eq!(
        lawyer.to_string_with_prefix("  "),
        "  http://domain1/ Auth Shards:{http://shard/, http://shard2/}\n\
         \x20 http://myhost.cdn.com/ Auth\n\
         \x20 http://myhost1.com/ Auth RewriteDomain:http://myhost.cdn.com/\n\
         \x20 http://myhost2.com/ Auth RewriteDomain:http://myhost.cdn.com/\n\
         \x20 http://shard/ Auth RewriteDomain:http://domain1/\n\
         \x20 http://shard2/ Auth RewriteDomain:http://domain1/\n"
    );
}

#[test]
fn origins_are_known_once_mentioned_anywhere() {
    let mut lawyer = DomainLawyer::new();
    lawyer.add_domain("a.com");
    lawyer.add_domain("a.com:42");
    lawyer.add_domain("https://a.com:43");
    lawyer.add_rewrite_domain_mapping("b.com", "c.com");
    lawyer.add_origin_domain_mapping("e.com", "d.com", "");
    lawyer.add_shard("f.com", "s1.f.com,s2.f.com");

    assert!(!lawyer.is_origin_known(&parse("http://z.com")));
    for known in [
        "http://a.com",
        "http://a.com:42/sardine",
        "https://a.com:43",
        "http://b.com",
        "http://c.com",
        "http://d.com",
        "http://e.com",
        "http://f.com",
        "http://s1.f.com",
        "http://s2.f.com",
    ] {
        assert!(lawyer.is_origin_known(&parse(known)), "{known}");
    }
    assert!(!lawyer.is_origin_known(&parse("http://a.com:43")));
}

#[test]
fn proxy_suffix_strips_for_fetching() {
    let mut lawyer = DomainLawyer::new();
    let gurl = parse("http://example.com.suffix/path");
    assert!(!lawyer.can_rewrite_domains());
    assert_eq!(lawyer.strip_proxy_suffix(&gurl), None);

    lawyer.set_proxy_suffix(".suffix");
    assert!(lawyer.can_rewrite_domains());
    assert_eq!(
        lawyer.strip_proxy_suffix(&gurl),
        Some(("http://example.com/path".to_string(), "example.com".to_string()))
    );

    // :80 is canonicalized away on http, so the suffix still matches;
    // an unexpected port breaks the match.
    assert_eq!(
        lawyer.strip_proxy_suffix(&parse("http://example.com.suffix:80/path")),
        Some(("http://example.com/path".to_string(), "example.com".to_string()))
    );
    assert_eq!(lawyer.strip_proxy_suffix(&parse("http://example.com.suffix:81/path")), None);
    assert_eq!(lawyer.strip_proxy_suffix(&parse("http://example.com.suffix:443/path")), None);
    assert_eq!(
        lawyer.strip_proxy_suffix(&parse("https://example.com.suffix:443/path")),
        Some(("https://example.com/path".to_string(), "example.com".to_string()))
    );
}

#[test]
fn proxy_suffix_extends_absolute_links() {
    let mut lawyer = DomainLawyer::new();
    lawyer.set_proxy_suffix(".suffix");
    let base = parse("http://www.example.com.suffix/dir/page.html");

    // Relative links need no help; the browser absolutifies them into
    // the proxied domain already.
    let mut href = "relative.html".to_string();
    assert!(!lawyer.add_proxy_suffix(&base, &mut href));
    assert_eq!(href, "relative.html");

    let mut href = "http://www.example.com/absolute.html".to_string();
    assert!(lawyer.add_proxy_suffix(&base, &mut href));
    assert_eq!(href, "http://www.example.com.suffix/absolute.html");

    // Scheme changes are fine.
    let mut href = "https://www.example.com/absolute.html".to_string();
    assert!(lawyer.add_proxy_suffix(&base, &mut href));
    assert_eq!(href, "https://www.example.com.suffix/absolute.html");

    // Unrelated hosts, including sibling subdomains, are left alone.
    let mut href = "http://other.com/x.html".to_string();
    assert!(!lawyer.add_proxy_suffix(&base, &mut href));
    let mut href = "http://other.example.com/x.html".to_string();
    assert!(!lawyer.add_proxy_suffix(&base, &mut href));
}

#[test]
fn merging_proxy_suffixes_prefers_the_source() {
    let mut first = DomainLawyer::new();
    first.set_proxy_suffix(".one");
    let mut second = DomainLawyer::new();
    second.set_proxy_suffix(".two");
    first.merge(&second);
    assert_eq!(first.proxy_suffix(), ".two");
}

#[test]
fn clear_resets_everything() {
    let mut lawyer = DomainLawyer::new();
    lawyer.add_domain("a.com");
    lawyer.add_rewrite_domain_mapping("cdn.com", "a.com");
    lawyer.set_proxy_suffix(".suffix");
    assert!(!lawyer.is_empty());
    lawyer.clear();
    assert!(lawyer.is_empty());
    assert!(!lawyer.can_rewrite_domains());
    assert_eq!(lawyer.signature(), "");
    assert!(!lawyer.is_domain_authorized(&parse(CONTEXT), &parse("http://a.com/")));
}
