//! Retrieval URL lists for one logical asset.
//!
//! For every original URL the candidates go, strictly in this order:
//!
//! 1. proxy URLs, one per proxy server not sharing the original's origin
//! 2. the original, when it is content-addressed
//! 3. one URL per mirror server, same hash and extension
//! 4. the original, when it is not content-addressed
//!
//! The list is deduplicated by exact string; the first occurrence wins.

use std::collections::HashSet;

use blossom_protocol::constants::{
    PROXY_PARAM_AUTHOR, PROXY_PARAM_HEIGHT, PROXY_PARAM_SERVER, PROXY_PARAM_WIDTH,
};
use blossom_protocol::{ContentAddress, ServerEndpoint, normalize_sha256};
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;
use url::Url;

/// Where a candidate URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlSource {
    Original,
    Mirror,
    Proxy,
    /// Found later, e.g. by availability probing.
    Discovered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUrl {
    pub url: String,
    pub source: UrlSource,
}

/// Ordered, duplicate-free candidate URLs. Order is priority.
#[derive(Debug, Clone, Default)]
pub struct ResolvedUrlList {
    entries: Vec<ResolvedUrl>,
    seen: HashSet<String>,
}

impl ResolvedUrlList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `url` unless it is already listed. Returns whether it was added.
    pub fn push(&mut self, url: impl Into<String>, source: UrlSource) -> bool {
        let url = url.into();
        if url.is_empty() || !self.seen.insert(url.clone()) {
            return false;
        }
        self.entries.push(ResolvedUrl { url, source });
        true
    }

    /// Appends URLs found after resolution, keeping the dedup rules.
    pub fn extend_discovered(&mut self, urls: impl IntoIterator<Item = String>) {
        for url in urls {
            self.push(url, UrlSource::Discovered);
        }
    }

    pub fn urls(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.url.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedUrl> {
        self.entries.iter()
    }

    pub fn first(&self) -> Option<&ResolvedUrl> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<ResolvedUrl> {
        self.entries
    }
}

impl Serialize for ResolvedUrlList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.entries)
    }
}

/// Transform size passed to proxies as `width` / `height`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Builds [`ResolvedUrlList`]s from a fixed mirror and proxy configuration.
#[derive(Debug, Clone, Default)]
pub struct MediaUrlResolver {
    mirrors: Vec<ServerEndpoint>,
    proxies: Vec<ServerEndpoint>,
    size: ProxySize,
}

impl MediaUrlResolver {
    pub fn new(mirrors: Vec<ServerEndpoint>, proxies: Vec<ServerEndpoint>) -> Self {
        Self {
            mirrors,
            proxies,
            size: ProxySize::default(),
        }
    }

    pub fn with_size(mut self, size: ProxySize) -> Self {
        self.size = size;
        self
    }

    /// Candidate URLs for an asset known by `original_urls`.
    ///
    /// `sha256` overrides the hash parsed from each original. Without either,
    /// no proxy or mirror URLs can be built and only the originals are kept.
    pub fn resolve<S: AsRef<str>>(
        &self,
        original_urls: &[S],
        sha256: Option<&str>,
        author: Option<&str>,
    ) -> ResolvedUrlList {
        let known_hash = sha256.and_then(|h| normalize_sha256(h).ok());
        let mut list = ResolvedUrlList::new();

        for original in original_urls {
            let original = original.as_ref().trim();
            if original.is_empty() {
                continue;
            }
            let address = ContentAddress::from_url(original);
            let sha = known_hash
                .clone()
                .or_else(|| address.as_ref().map(|a| a.sha256.clone()));
            let ext = address.as_ref().and_then(|a| a.ext.as_deref());

            if let Some(sha) = &sha {
                for proxy in &self.proxies {
                    if proxy.same_origin(original) {
                        debug!(proxy = %proxy, original, "skipping self-referential proxy");
                        continue;
                    }
                    if let Some(url) = self.proxy_url(proxy, original, sha, ext, author) {
                        list.push(url, UrlSource::Proxy);
                    }
                }
            }

            if address.is_some() {
                list.push(original, UrlSource::Original);
            }

            if let Some(sha) = &sha {
                for mirror in &self.mirrors {
                    list.push(mirror.blob_url(sha, ext), UrlSource::Mirror);
                }
            }

            if address.is_none() {
                list.push(original, UrlSource::Original);
            }
        }

        list
    }

    fn proxy_url(
        &self,
        proxy: &ServerEndpoint,
        original: &str,
        sha256: &str,
        ext: Option<&str>,
        author: Option<&str>,
    ) -> Option<String> {
        let mut url = Url::parse(&proxy.blob_url(sha256, ext)).ok()?;
        {
            let mut query = url.query_pairs_mut();
            for host in self.fallback_hosts(proxy, original) {
                query.append_pair(PROXY_PARAM_SERVER, &host);
            }
            if let Some(author) = author.filter(|a| !a.is_empty()) {
                query.append_pair(PROXY_PARAM_AUTHOR, &author.to_ascii_lowercase());
            }
            if let Some(width) = self.size.width {
                query.append_pair(PROXY_PARAM_WIDTH, &width.to_string());
            }
            if let Some(height) = self.size.height {
                query.append_pair(PROXY_PARAM_HEIGHT, &height.to_string());
            }
        }
        // An empty query leaves a bare `?` behind.
        if url.query() == Some("") {
            url.set_query(None);
        }
        Some(url.into())
    }

    /// Hosts the proxy may fall back to: the original's, then each mirror's.
    /// Never the proxy's own.
    fn fallback_hosts(&self, proxy: &ServerEndpoint, original: &str) -> Vec<String> {
        let original_host = Url::parse(original)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase));

        let mut hosts: Vec<String> = Vec::new();
        let candidates = original_host
            .into_iter()
            .chain(self.mirrors.iter().map(|m| m.host().to_string()));
        for host in candidates {
            if host != proxy.host() && !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        hosts
    }
}

/// One-shot form of [`MediaUrlResolver::resolve`].
pub fn resolve<S: AsRef<str>>(
    original_urls: &[S],
    mirror_servers: &[ServerEndpoint],
    proxy_servers: &[ServerEndpoint],
    sha256: Option<&str>,
    author: Option<&str>,
) -> ResolvedUrlList {
    MediaUrlResolver::new(mirror_servers.to_vec(), proxy_servers.to_vec()).resolve(
        original_urls,
        sha256,
        author,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use blossom_protocol::ServerRole;

    const HASH: &str = "b1674191a88ec5cdd733e4240a81803105dc412d6c6708d53ab94fc248f4f553";
    const AUTHOR: &str = "3BF0C63FCB93463407AF97A5E5EE64FA883D107EF9E558472C4EB9AAAEFA459D";

    fn ep(url: &str, role: ServerRole) -> ServerEndpoint {
        ServerEndpoint::parse(url, role).unwrap()
    }

    fn mirrors() -> Vec<ServerEndpoint> {
        vec![
            ep("https://a.example.com", ServerRole::Mirror),
            ep("https://b.example.com/", ServerRole::Mirror),
        ]
    }

    #[test]
    fn proxy_then_original_then_mirrors() {
        let original = format!("https://cdn.example.com/{HASH}.mp4");
        let proxies = vec![ep("https://proxy.example.com", ServerRole::Proxy)];

        let list = resolve(&[original.clone()], &mirrors(), &proxies, None, Some(AUTHOR));

        let sources: Vec<UrlSource> = list.iter().map(|r| r.source).collect();
        assert_eq!(
            sources,
            [
                UrlSource::Proxy,
                UrlSource::Original,
                UrlSource::Mirror,
                UrlSource::Mirror
            ]
        );
        assert_eq!(
            list.urls(),
            [
                format!(
                    "https://proxy.example.com/{HASH}.mp4?xs=cdn.example.com&xs=a.example.com&xs=b.example.com&as={}",
                    AUTHOR.to_ascii_lowercase()
                ),
                original,
                format!("https://a.example.com/{HASH}.mp4"),
                format!("https://b.example.com/{HASH}.mp4"),
            ]
        );
    }

    #[test]
    fn proxy_never_names_itself_as_fallback() {
        let mut mirrors = mirrors();
        mirrors.push(ep("https://proxy.example.com", ServerRole::Mirror));
        let proxies = vec![ep("https://proxy.example.com", ServerRole::Proxy)];
        let original = format!("https://cdn.example.com/{HASH}");

        let list = resolve(&[original], &mirrors, &proxies, None, None);
        let proxy = list.first().unwrap();
        assert_eq!(proxy.source, UrlSource::Proxy);

        let parsed = Url::parse(&proxy.url).unwrap();
        let xs: Vec<String> = parsed
            .query_pairs()
            .filter(|(k, _)| k == PROXY_PARAM_SERVER)
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(xs, ["cdn.example.com", "a.example.com", "b.example.com"]);
    }

    #[test]
    fn proxy_on_same_origin_is_skipped() {
        let proxies = vec![ep("https://cdn.example.com", ServerRole::Proxy)];
        let original = format!("https://cdn.example.com/{HASH}.jpg");

        let list = resolve(&[original.clone()], &[], &proxies, None, None);
        assert_eq!(list.urls(), [original]);
        assert_eq!(list.first().unwrap().source, UrlSource::Original);
    }

    #[test]
    fn duplicates_keep_first_position() {
        let a = format!("https://a.example.com/{HASH}.mp4");
        let cdn = format!("https://cdn.example.com/{HASH}.mp4");

        let list = resolve(&[a.clone(), cdn.clone()], &mirrors(), &[], None, None);
        assert_eq!(
            list.urls(),
            [a, format!("https://b.example.com/{HASH}.mp4"), cdn]
        );
        assert_eq!(list.first().unwrap().source, UrlSource::Original);
    }

    #[test]
    fn opaque_original_goes_last() {
        let original = "https://video.example.com/watch/clip-42".to_string();
        let proxies = vec![ep("https://proxy.example.com", ServerRole::Proxy)];

        let list = resolve(&[original.clone()], &mirrors(), &proxies, Some(HASH), None);
        let sources: Vec<UrlSource> = list.iter().map(|r| r.source).collect();
        assert_eq!(
            sources,
            [
                UrlSource::Proxy,
                UrlSource::Mirror,
                UrlSource::Mirror,
                UrlSource::Original
            ]
        );
        assert_eq!(list.urls()[1], format!("https://a.example.com/{HASH}"));
        assert_eq!(list.urls()[3], original);
    }

    #[test]
    fn without_hash_only_originals_remain() {
        let original = "https://video.example.com/watch/clip-42";
        let proxies = vec![ep("https://proxy.example.com", ServerRole::Proxy)];

        let list = resolve(&[original], &mirrors(), &proxies, Some("not-a-hash"), None);
        assert_eq!(list.urls(), [original]);
    }

    #[test]
    fn proxy_size_parameters() {
        let resolver = MediaUrlResolver::new(
            Vec::new(),
            vec![ep("https://proxy.example.com", ServerRole::Proxy)],
        )
        .with_size(ProxySize {
            width: Some(320),
            height: None,
        });

        let list = resolver.resolve(&[format!("https://cdn.example.com/{HASH}.png")], None, None);
        assert_eq!(
            list.urls()[0],
            format!("https://proxy.example.com/{HASH}.png?xs=cdn.example.com&width=320")
        );
    }

    #[test]
    fn discovered_urls_are_deduplicated() {
        let original = format!("https://cdn.example.com/{HASH}.mp4");
        let mut list = resolve(&[original.clone()], &mirrors(), &[], None, None);

        list.extend_discovered([
            format!("https://a.example.com/{HASH}.mp4"),
            format!("https://c.example.com/{HASH}.mp4"),
        ]);

        assert_eq!(list.len(), 4);
        let last = list.iter().last().unwrap();
        assert_eq!(last.url, format!("https://c.example.com/{HASH}.mp4"));
        assert_eq!(last.source, UrlSource::Discovered);
    }

    #[test]
    fn serializes_as_plain_array() {
        let list = resolve(&[format!("https://cdn.example.com/{HASH}")], &[], &[], None, None);
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "url": format!("https://cdn.example.com/{HASH}"), "source": "original" }])
        );
    }
}
