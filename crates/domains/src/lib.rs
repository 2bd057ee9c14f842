//! Domain authorization and mapping rules for the HTML rewriter.
//!
//! [`DomainLawyer`] holds the configured relationships between domains:
//! which ones may be rewritten, rewrite mappings onto CDNs or cookieless
//! domains, origin mappings for fetching, sharding for download
//! parallelism, and proxying of external domains.

pub mod gurl;
mod lawyer;
mod wildcard;

pub use lawyer::{DomainLawyer, OriginMapping, normalize_domain_name};
pub use wildcard::Wildcard;
