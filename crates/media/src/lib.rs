//! Retrieval side of Blossom: which URLs to try for a blob, and which
//! servers actually have it.

pub mod availability;
pub mod cache;
pub mod resolver;

pub use availability::{
    AvailabilityChecker, AvailabilityConfig, AvailabilityStatus, AvailabilityUpdate,
    ServerAvailability, VariantAvailability,
};
pub use cache::TtlCache;
pub use resolver::{MediaUrlResolver, ProxySize, ResolvedUrl, ResolvedUrlList, UrlSource, resolve};
