//! NuGet v3 feed protocol.
//!
//! A feed is addressed by its service index (`.../v3/index.json`). The index
//! is fetched lazily on first use and names the resources every other call
//! goes through:
//!
//! | resource                    | used for                          |
//! |-----------------------------|-----------------------------------|
//! | `PackageBaseAddress/3.0.0`  | versions, nuspec, nupkg download  |
//! | `SearchQueryService`        | search                            |
//! | `SearchAutocompleteService` | autocomplete                      |

use async_trait::async_trait;
use dexec_core::version::NuGetVersion;
use dexec_util::cancel::CancelToken;
use dexec_util::errors::{DexecError, DexecResult};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::download::HttpFetcher;
use crate::source_config::PackageSource;

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// Remote operations a package source supports.
#[async_trait]
pub trait PackageFeed: Send + Sync {
    /// Source name used in diagnostics and provenance.
    fn name(&self) -> &str;

    /// All published versions; empty when the feed doesn't know the id.
    async fn list_versions(&self, id: &str, cancel: &CancelToken) -> DexecResult<Vec<NuGetVersion>>;

    /// Raw nuspec XML, `None` when the version isn't on this feed.
    async fn nuspec(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<Option<String>>;

    /// Raw `.nupkg` bytes, `None` when the version isn't on this feed.
    async fn nupkg(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<Option<Vec<u8>>>;

    async fn autocomplete(
        &self,
        prefix: &str,
        include_prerelease: bool,
        take: usize,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<String>>;

    async fn search(
        &self,
        query: &str,
        include_prerelease: bool,
        take: usize,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<SearchHit>>;
}

#[derive(Debug, Deserialize)]
struct ServiceIndexDoc {
    resources: Vec<ServiceResource>,
}

#[derive(Debug, Deserialize)]
struct ServiceResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    kind: String,
}

/// Resource URLs resolved from a service index.
#[derive(Debug, Clone)]
pub struct ServiceIndex {
    pub package_base: String,
    pub search: Option<String>,
    pub autocomplete: Option<String>,
}

impl ServiceIndex {
    fn from_doc(doc: &ServiceIndexDoc) -> Option<Self> {
        let find = |prefix: &str| {
            doc.resources
                .iter()
                .find(|r| r.kind.starts_with(prefix))
                .map(|r| r.id.trim_end_matches('/').to_string())
        };
        Some(Self {
            package_base: find("PackageBaseAddress/3.0.0")?,
            search: find("SearchQueryService"),
            autocomplete: find("SearchAutocompleteService"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct VersionsDoc {
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DataDoc<T> {
    data: Vec<T>,
}

/// A v3 feed over HTTP.
pub struct V3Feed {
    source: PackageSource,
    http: HttpFetcher,
    index: OnceCell<ServiceIndex>,
}

impl V3Feed {
    pub fn new(source: PackageSource, http: HttpFetcher) -> Self {
        Self {
            source,
            http,
            index: OnceCell::new(),
        }
    }

    /// The service index, fetched once and memoized.
    pub async fn service_index(&self, cancel: &CancelToken) -> DexecResult<&ServiceIndex> {
        self.index
            .get_or_try_init(|| async {
                let unavailable = |message: String| DexecError::FeedUnavailable {
                    feed: self.source.url.clone(),
                    message,
                };
                let doc: ServiceIndexDoc = match self.http.get_json(&self.source.url, cancel).await {
                    Ok(Some(doc)) => doc,
                    Ok(None) => return Err(unavailable("service index not found".into())),
                    Err(e @ DexecError::OperationCancelled) => return Err(e),
                    Err(e) => return Err(unavailable(e.to_string())),
                };
                tracing::debug!("Loaded service index for {}", self.source.name);
                ServiceIndex::from_doc(&doc)
                    .ok_or_else(|| unavailable("no PackageBaseAddress resource".into()))
            })
            .await
    }

    fn package_url(base: &str, id: &str, version: &NuGetVersion, file: &str) -> String {
        format!(
            "{base}/{}/{}/{file}",
            id.to_ascii_lowercase(),
            version.normalized().to_ascii_lowercase()
        )
    }

    fn query_url(base: &str, query: &str, include_prerelease: bool, take: usize) -> String {
        format!(
            "{base}?q={}&prerelease={include_prerelease}&take={take}&semVerLevel=2.0.0",
            encode_query(query)
        )
    }
}

#[async_trait]
impl PackageFeed for V3Feed {
    fn name(&self) -> &str {
        &self.source.name
    }

    async fn list_versions(&self, id: &str, cancel: &CancelToken) -> DexecResult<Vec<NuGetVersion>> {
        let index = self.service_index(cancel).await?;
        let url = format!("{}/{}/index.json", index.package_base, id.to_ascii_lowercase());
        let Some(doc) = self.http.get_json::<VersionsDoc>(&url, cancel).await? else {
            return Ok(Vec::new());
        };
        Ok(doc
            .versions
            .iter()
            .filter_map(|v| NuGetVersion::parse(v).ok())
            .collect())
    }

    async fn nuspec(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<Option<String>> {
        let index = self.service_index(cancel).await?;
        let file = format!("{}.nuspec", id.to_ascii_lowercase());
        let url = Self::package_url(&index.package_base, id, version, &file);
        self.http.get_text(&url, cancel).await
    }

    async fn nupkg(
        &self,
        id: &str,
        version: &NuGetVersion,
        cancel: &CancelToken,
    ) -> DexecResult<Option<Vec<u8>>> {
        let index = self.service_index(cancel).await?;
        let file = format!(
            "{}.{}.nupkg",
            id.to_ascii_lowercase(),
            version.normalized().to_ascii_lowercase()
        );
        let url = Self::package_url(&index.package_base, id, version, &file);
        self.http.get_bytes(&url, cancel).await
    }

    async fn autocomplete(
        &self,
        prefix: &str,
        include_prerelease: bool,
        take: usize,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<String>> {
        let index = self.service_index(cancel).await?;
        let Some(base) = index.autocomplete.as_deref() else {
            return Ok(Vec::new());
        };
        let url = Self::query_url(base, prefix, include_prerelease, take);
        Ok(self
            .http
            .get_json::<DataDoc<String>>(&url, cancel)
            .await?
            .map(|d| d.data)
            .unwrap_or_default())
    }

    async fn search(
        &self,
        query: &str,
        include_prerelease: bool,
        take: usize,
        cancel: &CancelToken,
    ) -> DexecResult<Vec<SearchHit>> {
        let index = self.service_index(cancel).await?;
        let Some(base) = index.search.as_deref() else {
            return Ok(Vec::new());
        };
        let url = Self::query_url(base, query, include_prerelease, take);
        Ok(self
            .http
            .get_json::<DataDoc<SearchHit>>(&url, cancel)
            .await?
            .map(|d| d.data)
            .unwrap_or_default())
    }
}

/// Percent-encode a query value; ids are ASCII so this stays byte-oriented.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_index_resources() {
        let doc: ServiceIndexDoc = serde_json::from_str(
            r#"{"version":"3.0.0","resources":[
                {"@id":"https://api.example.test/v3-flatcontainer/","@type":"PackageBaseAddress/3.0.0"},
                {"@id":"https://search.example.test/query","@type":"SearchQueryService/3.5.0"},
                {"@id":"https://search.example.test/autocomplete","@type":"SearchAutocompleteService/3.5.0"}
            ]}"#,
        )
        .unwrap();
        let index = ServiceIndex::from_doc(&doc).unwrap();
        assert_eq!(index.package_base, "https://api.example.test/v3-flatcontainer");
        assert_eq!(index.search.as_deref(), Some("https://search.example.test/query"));
        assert_eq!(
            index.autocomplete.as_deref(),
            Some("https://search.example.test/autocomplete")
        );
    }

    #[test]
    fn service_index_requires_base_address() {
        let doc: ServiceIndexDoc = serde_json::from_str(
            r#"{"resources":[{"@id":"https://x.test/q","@type":"SearchQueryService"}]}"#,
        )
        .unwrap();
        assert!(ServiceIndex::from_doc(&doc).is_none());
    }

    #[test]
    fn flat_container_urls_are_lowercase() {
        let v = NuGetVersion::parse("13.0.3-Beta1").unwrap();
        assert_eq!(
            V3Feed::package_url("https://x.test/fc", "Newtonsoft.Json", &v, "newtonsoft.json.nuspec"),
            "https://x.test/fc/newtonsoft.json/13.0.3-beta1/newtonsoft.json.nuspec"
        );
    }

    #[test]
    fn query_is_encoded() {
        assert_eq!(
            V3Feed::query_url("https://x.test/q", "json net", false, 5),
            "https://x.test/q?q=json%20net&prerelease=false&take=5&semVerLevel=2.0.0"
        );
    }

    #[test]
    fn search_hit_tolerates_missing_description() {
        let doc: DataDoc<SearchHit> =
            serde_json::from_str(r#"{"data":[{"id":"Foo","version":"1.0.0","totalDownloads":3}]}"#)
                .unwrap();
        assert_eq!(doc.data[0].id, "Foo");
        assert!(doc.data[0].description.is_empty());
    }
}
