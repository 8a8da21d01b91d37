//! Pasted-URL resolution.
//!
//! A raw string is normalized to an http(s) URL, unwrapped through at most one
//! redirector, rewritten to an embeddable player for YouTube and Instagram, or
//! classified as direct media. The optional HEAD probe only adds metadata; its
//! failure is reported as a notice.

use std::sync::Arc;

use omniview_core::config::ViewerConfig;
use omniview_core::constants::FALLBACK_REMOTE_NAME;
use omniview_core::error::{ViewerError, ViewerResult};
use omniview_core::models::{
    Category, Classification, EmbedProvider, MediaRecord, RemoteResource,
};
use omniview_processing::classifier::{classify, expected_content_type};
use omniview_processing::traits::NetworkFetch;
use percent_encoding::percent_decode_str;
use reqwest::Url;

const YOUTUBE_ID_LEN: usize = 11;

/// Paths used by generic open-redirect endpoints.
const REDIRECT_PATHS: &[&str] = &["/url", "/l.php", "/redirect", "/out", "/away"];

/// Outcome of resolving a pasted URL.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    /// Final playable or embeddable URL
    pub url: String,
    pub name: String,
    pub classification: Classification,
    pub embed: Option<EmbedProvider>,
    /// Declared size; 0 when unknown
    pub size_bytes: u64,
    pub mime_type: String,
    pub probed: bool,
    /// Non-fatal probe failure
    pub notice: Option<ViewerError>,
}

impl ResolvedResource {
    pub fn category(&self) -> Category {
        self.classification.category
    }

    pub fn into_record(self) -> MediaRecord {
        MediaRecord::from_remote(
            self.name,
            self.size_bytes,
            self.mime_type,
            self.classification,
            RemoteResource {
                url: self.url,
                embed: self.embed,
                probed: self.probed,
            },
        )
    }
}

pub struct RemoteResourceResolver {
    fetch: Arc<dyn NetworkFetch>,
    probe: bool,
    redirector_hosts: Vec<String>,
}

impl RemoteResourceResolver {
    pub fn new(fetch: Arc<dyn NetworkFetch>, config: &ViewerConfig) -> Self {
        Self {
            fetch,
            probe: config.probe_remote,
            redirector_hosts: config
                .redirector_hosts
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, raw_url: &str) -> ViewerResult<ResolvedResource> {
        let parsed = parse_http_url(raw_url)?;

        let url = match self.redirect_target(&parsed) {
            Some(target) => {
                tracing::debug!(from = %parsed, to = %target, "Unwrapped redirector link");
                parse_http_url(&target)?
            }
            None => parsed,
        };

        let host = url
            .host_str()
            .map(|h| h.trim_start_matches("www.").to_lowercase())
            .unwrap_or_default();

        if is_youtube_host(&host) {
            return resolve_youtube(&url, &host);
        }

        if host == "instagram.com" {
            return resolve_instagram(&url);
        }

        self.resolve_direct(url).await
    }

    /// Target of a redirector link, if `url` is one.
    fn redirect_target(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?.to_lowercase();
        let known_host = self.redirector_hosts.iter().any(|h| *h == host);
        let redirect_path = REDIRECT_PATHS.contains(&url.path());

        if !known_host && !redirect_path {
            return None;
        }

        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let lookup = |key: &str| {
            params
                .iter()
                .find(|(k, v)| k == key && !v.trim().is_empty())
                .map(|(_, v)| v.trim().to_string())
        };

        // `q` doubles as a search query on these hosts.
        lookup("url").or_else(|| lookup("u")).or_else(|| {
            lookup("q").filter(|q| known_host && (redirect_path || is_absolute_http(q)))
        })
    }

    async fn resolve_direct(&self, url: Url) -> ViewerResult<ResolvedResource> {
        let name = display_name(&url);
        let mut classification = classify(&name, "");

        if let (true, Some(ext)) = (classification.danger_flag, classification.extension.as_deref()) {
            return Err(ViewerError::invalid_url(
                url.as_str(),
                format!("links to .{} files are blocked", ext),
            ));
        }

        let mut size_bytes = 0;
        let mut probed_type = None;
        let mut probed = false;
        let mut notice = None;

        if self.probe {
            match self.fetch.head(url.as_str()).await {
                Ok(response) if response.is_success() => {
                    probed = true;
                    size_bytes = response.content_length.unwrap_or(0);
                    probed_type = response.content_type;
                }
                Ok(response) => {
                    notice = Some(ViewerError::Probe {
                        url: url.to_string(),
                        reason: format!("status {}", response.status),
                    });
                }
                Err(e) => {
                    notice = Some(ViewerError::Probe {
                        url: url.to_string(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        if let Some(ref notice) = notice {
            tracing::debug!(notice = %notice, "Metadata probe failed; size unknown");
        }

        if classification.category == Category::Unsupported {
            if let Some(content_type) = probed_type.as_deref() {
                classification = classify(&name, content_type);
            }
        }

        if classification.category == Category::Unsupported {
            return Err(ViewerError::invalid_url(
                url.as_str(),
                "not a supported media type",
            ));
        }

        let mime_type = probed_type
            .or_else(|| {
                classification
                    .extension
                    .as_deref()
                    .and_then(expected_content_type)
                    .map(str::to_string)
            })
            .unwrap_or_default();

        Ok(ResolvedResource {
            url: url.to_string(),
            name,
            classification,
            embed: None,
            size_bytes,
            mime_type,
            probed,
            notice,
        })
    }
}

/// Normalize a pasted string into an http(s) URL with a host.
fn parse_http_url(raw: &str) -> ViewerResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ViewerError::invalid_url(raw, "URL is empty"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ViewerError::invalid_url(raw, "URL contains spaces"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ViewerError::invalid_url(raw, format!("invalid URL format: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ViewerError::invalid_url(
            raw,
            "only HTTP and HTTPS URLs are allowed",
        ));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ViewerError::invalid_url(raw, "URL must have a host")),
    }
}

fn is_absolute_http(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Last non-empty path segment, percent-decoded.
fn display_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_REMOTE_NAME.to_string())
}

fn is_youtube_host(host: &str) -> bool {
    matches!(
        host,
        "youtube.com"
            | "m.youtube.com"
            | "music.youtube.com"
            | "youtube-nocookie.com"
            | "youtu.be"
    )
}

pub fn is_valid_youtube_id(id: &str) -> bool {
    id.len() == YOUTUBE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract the video id from any supported YouTube link form.
fn youtube_video_id(url: &Url, host: &str) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let candidate = if host == "youtu.be" {
        segments.first().map(|s| s.to_string())
    } else {
        match segments.as_slice() {
            ["watch", ..] => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            ["shorts" | "embed" | "live" | "v", id, ..] => Some(id.to_string()),
            _ => None,
        }
    };

    candidate.filter(|id| is_valid_youtube_id(id))
}

fn resolve_youtube(url: &Url, host: &str) -> ViewerResult<ResolvedResource> {
    let video_id = youtube_video_id(url, host)
        .ok_or_else(|| ViewerError::invalid_url(url.as_str(), "no YouTube video id found"))?;

    Ok(ResolvedResource {
        url: format!("https://www.youtube.com/embed/{}", video_id),
        name: format!("YouTube video {}", video_id),
        classification: Classification {
            category: Category::Video,
            danger_flag: false,
            extension: None,
        },
        embed: Some(EmbedProvider::YouTube { video_id }),
        size_bytes: 0,
        mime_type: String::new(),
        probed: false,
        notice: None,
    })
}

fn resolve_instagram(url: &Url) -> ViewerResult<ResolvedResource> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let (kind, code) = match segments.as_slice() {
        ["p", code, ..] => ("p", *code),
        ["reel" | "reels", code, ..] => ("reel", *code),
        ["tv", code, ..] => ("tv", *code),
        _ => {
            return Err(ViewerError::invalid_url(
                url.as_str(),
                "not an Instagram post or reel",
            ))
        }
    };

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ViewerError::invalid_url(
            url.as_str(),
            "invalid Instagram post code",
        ));
    }

    let category = if kind == "p" {
        Category::Image
    } else {
        Category::Video
    };

    Ok(ResolvedResource {
        url: format!("https://www.instagram.com/{}/{}/embed", kind, code),
        name: format!("Instagram {} {}", kind, code),
        classification: Classification {
            category,
            danger_flag: false,
            extension: None,
        },
        embed: Some(EmbedProvider::Instagram {
            kind: kind.to_string(),
            code: code.to_string(),
        }),
        size_bytes: 0,
        mime_type: String::new(),
        probed: false,
        notice: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use omniview_processing::traits::ProbeResponse;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockFetch {
        response: Option<ProbeResponse>,
        heads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NetworkFetch for MockFetch {
        async fn head(&self, url: &str) -> anyhow::Result<ProbeResponse> {
            self.heads.lock().push(url.to_string());
            self.response
                .clone()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }

        async fn get(&self, _url: &str, _max_bytes: u64) -> anyhow::Result<Bytes> {
            Ok(Bytes::new())
        }
    }

    fn resolver_with(response: Option<ProbeResponse>) -> (RemoteResourceResolver, Arc<MockFetch>) {
        let fetch = Arc::new(MockFetch {
            response,
            ..Default::default()
        });
        (
            RemoteResourceResolver::new(fetch.clone(), &ViewerConfig::default()),
            fetch,
        )
    }

    fn resolver() -> RemoteResourceResolver {
        resolver_with(Some(ProbeResponse {
            status: 200,
            content_type: None,
            content_length: None,
        }))
        .0
    }

    #[tokio::test]
    async fn test_youtu_be_short_link() {
        let resolved = resolver().resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(resolved.url, "https://www.youtube.com/embed/dQw4w9WgXcQ");
        assert_eq!(resolved.category(), Category::Video);
        assert!(matches!(resolved.embed, Some(EmbedProvider::YouTube { .. })));
    }

    #[tokio::test]
    async fn test_watch_url_id_round_trip() {
        let resolver = resolver();
        for id in ["dQw4w9WgXcQ", "a-b_c-d_e-f", "00000000000", "ZZZZZZZZZZZ"] {
            let raw = format!("https://www.youtube.com/watch?feature=share&v={}&t=42", id);
            let resolved = resolver.resolve(&raw).await.unwrap();
            let embedded_id = resolved.url.rsplit('/').next().unwrap();
            assert_eq!(embedded_id, id);
        }
    }

    #[tokio::test]
    async fn test_youtube_variants() {
        let resolver = resolver();
        for raw in [
            "youtube.com/shorts/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1",
            "https://www.youtube.com/live/dQw4w9WgXcQ",
        ] {
            let resolved = resolver.resolve(raw).await.unwrap();
            assert_eq!(resolved.url, "https://www.youtube.com/embed/dQw4w9WgXcQ", "{}", raw);
        }
    }

    #[tokio::test]
    async fn test_youtube_without_id_fails() {
        let resolver = resolver();
        for raw in [
            "https://www.youtube.com/watch?v=short",
            "https://www.youtube.com/@channel",
            "https://youtu.be/",
        ] {
            let err = resolver.resolve(raw).await.unwrap_err();
            assert!(matches!(err, ViewerError::InvalidUrl { .. }), "{}", raw);
        }
    }

    #[tokio::test]
    async fn test_not_a_url() {
        let err = resolver().resolve("not a url").await.unwrap_err();
        assert!(matches!(err, ViewerError::InvalidUrl { .. }));

        let err = resolver().resolve("   ").await.unwrap_err();
        assert!(matches!(err, ViewerError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_disallowed_scheme() {
        for raw in ["ftp://example.com/a.mp4", "file:///etc/passwd", "javascript:alert(1)"] {
            let err = resolver().resolve(raw).await.unwrap_err();
            assert!(matches!(err, ViewerError::InvalidUrl { .. }), "{}", raw);
        }
    }

    #[tokio::test]
    async fn test_scheme_is_prepended() {
        let resolved = resolver().resolve("cdn.example.com/media/clip.mp4").await.unwrap();
        assert_eq!(resolved.url, "https://cdn.example.com/media/clip.mp4");
        assert_eq!(resolved.name, "clip.mp4");
        assert_eq!(resolved.category(), Category::Video);
        assert_eq!(resolved.mime_type, "video/mp4");
    }

    #[tokio::test]
    async fn test_redirector_unwrapped_once() {
        let resolved = resolver()
            .resolve("https://www.google.com/url?sa=t&url=https%3A%2F%2Fyoutu.be%2FdQw4w9WgXcQ")
            .await
            .unwrap();
        assert_eq!(resolved.url, "https://www.youtube.com/embed/dQw4w9WgXcQ");

        let generic = resolver()
            .resolve("https://links.example.net/redirect?u=https%3A%2F%2Fexample.com%2Fsong.mp3")
            .await
            .unwrap();
        assert_eq!(generic.url, "https://example.com/song.mp3");
        assert_eq!(generic.category(), Category::Audio);
    }

    #[test]
    fn test_search_query_is_not_a_redirect() {
        let resolver = resolver();
        let target = |raw: &str| resolver.redirect_target(&Url::parse(raw).unwrap());

        assert_eq!(target("https://www.google.com/search?q=cats"), None);
        assert_eq!(
            target("https://www.google.com/url?q=https://example.com/a.mp4"),
            Some("https://example.com/a.mp4".to_string())
        );
        assert_eq!(
            target("https://www.google.com/search?q=https%3A%2F%2Fexample.com%2Fa.mp4"),
            Some("https://example.com/a.mp4".to_string())
        );
        assert_eq!(target("https://links.example.net/out?q=cats"), None);
    }

    #[tokio::test]
    async fn test_nested_redirect_is_not_followed() {
        let inner = "https://l.facebook.com/l.php?u=https%3A%2F%2Fexample.com%2Fa.mp4";
        let outer = format!(
            "https://l.facebook.com/l.php?u={}",
            percent_encoding::utf8_percent_encode(inner, percent_encoding::NON_ALPHANUMERIC)
        );
        let err = resolver().resolve(&outer).await.unwrap_err();
        assert!(matches!(err, ViewerError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_instagram_embed() {
        let reel = resolver()
            .resolve("https://www.instagram.com/reel/Cxyz_123/?igsh=abc")
            .await
            .unwrap();
        assert_eq!(reel.url, "https://www.instagram.com/reel/Cxyz_123/embed");
        assert_eq!(reel.category(), Category::Video);

        let post = resolver()
            .resolve("instagram.com/p/AbC-9")
            .await
            .unwrap();
        assert_eq!(post.url, "https://www.instagram.com/p/AbC-9/embed");
        assert_eq!(post.category(), Category::Image);

        assert!(resolver()
            .resolve("https://www.instagram.com/someone/")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_dangerous_remote_extension_rejected() {
        let (resolver, fetch) = resolver_with(None);
        let err = resolver
            .resolve("https://example.com/download/setup.exe")
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::InvalidUrl { .. }));
        assert!(fetch.heads.lock().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_is_notice() {
        let (resolver, fetch) = resolver_with(None);
        let resolved = resolver
            .resolve("https://example.com/photo.jpg")
            .await
            .unwrap();

        assert_eq!(fetch.heads.lock().len(), 1);
        assert_eq!(resolved.size_bytes, 0);
        assert!(!resolved.probed);
        assert!(matches!(resolved.notice, Some(ViewerError::Probe { .. })));
        assert_eq!(resolved.category(), Category::Image);
    }

    #[tokio::test]
    async fn test_probe_supplies_size_and_type() {
        let (resolver, _) = resolver_with(Some(ProbeResponse {
            status: 200,
            content_type: Some("video/webm".to_string()),
            content_length: Some(2048),
        }));
        let resolved = resolver
            .resolve("https://example.com/stream?id=7")
            .await
            .unwrap();

        assert!(resolved.probed);
        assert_eq!(resolved.size_bytes, 2048);
        assert_eq!(resolved.category(), Category::Video);
        assert_eq!(resolved.name, "stream");
    }

    #[tokio::test]
    async fn test_unsupported_without_probe_type_rejected() {
        let err = resolver()
            .resolve("https://example.com/blob.qqq")
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_name_is_percent_decoded() {
        let resolved = resolver()
            .resolve("https://example.com/files/my%20clip.mp4")
            .await
            .unwrap();
        assert_eq!(resolved.name, "my clip.mp4");

        let root = resolver_with(Some(ProbeResponse {
            status: 200,
            content_type: Some("image/png".to_string()),
            content_length: None,
        }))
        .0
        .resolve("https://example.com/")
        .await
        .unwrap();
        assert_eq!(root.name, "media-file");
    }
}
