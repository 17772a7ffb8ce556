//! Static UI assets: embedded sets, an on-disk override and the serving handler.

use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use percent_encoding::percent_decode_str;
use tracing::{debug, info, warn};

use super::ROUTER_TARGET;

/// Looks up asset bytes by slash-separated relative path.
pub trait AssetSource: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> &str;

    /// Returns the asset at `path`, or `None` when this source lacks it.
    fn get(&self, path: &str) -> Option<Cow<'static, [u8]>>;
}

/// Assets compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedAssets {
    label: &'static str,
    files: &'static [(&'static str, &'static [u8])],
}

impl EmbeddedAssets {
    /// Wraps a static file table.
    #[must_use]
    pub const fn new(label: &'static str, files: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { label, files }
    }

    /// The UI served under `/staticx/`.
    #[must_use]
    pub const fn primary() -> Self {
        Self::new("staticx", PRIMARY_FILES)
    }

    /// Shared assets consulted after the primary set.
    #[must_use]
    pub const fn fallback() -> Self {
        Self::new("static", FALLBACK_FILES)
    }
}

impl AssetSource for EmbeddedAssets {
    fn label(&self) -> &str {
        self.label
    }

    fn get(&self, path: &str) -> Option<Cow<'static, [u8]>> {
        self.files
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, bytes)| Cow::Borrowed(*bytes))
    }
}

const PRIMARY_FILES: &[(&str, &[u8])] = &[
    (
        "index.html",
        include_bytes!("../../assets/staticx/index.html"),
    ),
    (
        "partials/index/list.html",
        include_bytes!("../../assets/staticx/partials/index/list.html"),
    ),
    (
        "css/quarry.css",
        include_bytes!("../../assets/staticx/css/quarry.css"),
    ),
];

const FALLBACK_FILES: &[(&str, &[u8])] = &[
    (
        "index.html",
        include_bytes!("../../assets/static/index.html"),
    ),
    (
        "js/quarry.js",
        include_bytes!("../../assets/static/js/quarry.js"),
    ),
    (
        "partials/node/list.html",
        include_bytes!("../../assets/static/partials/node/list.html"),
    ),
];

/// Assets read from a directory at request time.
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: Utf8PathBuf,
}

impl DirAssets {
    /// Serves files beneath `root`.
    #[must_use]
    pub const fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> Option<Utf8PathBuf> {
        let relative = Utf8Path::new(path);
        let safe = relative
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)));
        safe.then(|| self.root.join(relative))
    }
}

impl AssetSource for DirAssets {
    fn label(&self) -> &str {
        self.root.as_str()
    }

    fn get(&self, path: &str) -> Option<Cow<'static, [u8]>> {
        let resolved = self.resolve(path)?;
        match fs::read(&resolved) {
            Ok(bytes) => Some(Cow::Owned(bytes)),
            Err(error) => {
                debug!(
                    target: ROUTER_TARGET,
                    path = %resolved,
                    error = %error,
                    "static asset not readable"
                );
                None
            }
        }
    }
}

/// Ordered asset sources; the first source holding a path wins.
///
/// Hits answered by any source after the first are logged at `info`.
#[derive(Clone, Default)]
pub struct AssetChain {
    sources: Vec<Arc<dyn AssetSource>>,
}

impl AssetChain {
    /// Builds a chain consulted in the given order.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn AssetSource>>) -> Self {
        Self { sources }
    }

    /// Primary embedded assets, then the fallback set.
    #[must_use]
    pub fn embedded() -> Self {
        Self::new(vec![
            Arc::new(EmbeddedAssets::primary()),
            Arc::new(EmbeddedAssets::fallback()),
        ])
    }
}

impl fmt::Debug for AssetChain {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.sources.iter().map(|source| source.label()))
            .finish()
    }
}

impl AssetSource for AssetChain {
    fn label(&self) -> &str {
        "chain"
    }

    fn get(&self, path: &str) -> Option<Cow<'static, [u8]>> {
        self.sources
            .iter()
            .enumerate()
            .find_map(|(position, source)| {
                let bytes = source.get(path)?;
                if position > 0 {
                    info!(
                        target: ROUTER_TARGET,
                        source = source.label(),
                        position,
                        path,
                        "asset served from fallback source"
                    );
                }
                Some(bytes)
            })
    }
}

/// Serving state for one asset subtree.
#[derive(Clone)]
struct AssetRoute {
    prefix: String,
    source: Arc<dyn AssetSource>,
    etag: Option<HeaderValue>,
}

/// Builds a `GET` handler serving `source` under `prefix`.
///
/// A non-empty `etag` is attached to every hit and honoured in
/// `If-None-Match`. Directory paths resolve to their `index.html`.
pub fn asset_handler(prefix: &str, source: Arc<dyn AssetSource>, etag: &str) -> MethodRouter {
    let etag = if etag.is_empty() {
        None
    } else {
        HeaderValue::from_str(etag).ok()
    };
    get(serve_asset).with_state(AssetRoute {
        prefix: prefix.to_owned(),
        source,
        etag,
    })
}

async fn serve_asset(State(route): State<AssetRoute>, headers: HeaderMap, uri: Uri) -> Response {
    let raw = uri.path().strip_prefix(&route.prefix).unwrap_or_default();
    let mut path = percent_decode_str(raw).decode_utf8_lossy().into_owned();
    if path.is_empty() || path.ends_with('/') {
        path.push_str("index.html");
    }

    // Directory-backed sources read from disk.
    let source = Arc::clone(&route.source);
    let lookup = path.clone();
    let found = match tokio::task::spawn_blocking(move || source.get(&lookup)).await {
        Ok(found) => found,
        Err(error) => {
            warn!(target: ROUTER_TARGET, path = %path, error = %error, "asset lookup aborted");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let Some(bytes) = found else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(etag) = &route.etag
        && headers.get(header::IF_NONE_MATCH) == Some(etag)
    {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag.clone())]).into_response();
    }

    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type(&path)))],
        Body::from(bytes),
    )
        .into_response();
    if let Some(etag) = route.etag {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
}

fn content_type(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match extension {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;
    use crate::tests::support::SharedBuffer;

    #[rstest]
    fn fallback_hits_are_logged() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let chain = AssetChain::embedded();
        tracing::subscriber::with_default(subscriber, || {
            assert!(chain.get("css/quarry.css").is_some());
            assert!(chain.get("js/quarry.js").is_some());
            assert!(chain.get("missing.txt").is_none());
        });
        let logged = buffer.contents();
        assert_eq!(logged.lines().count(), 1, "only the fallback hit is logged: {logged}");
        assert!(logged.contains("asset served from fallback source"));
        assert!(logged.contains("js/quarry.js"));
    }

    #[rstest]
    fn first_source_wins_on_conflicting_names() {
        let chain = AssetChain::embedded();
        let index = chain.get("index.html").expect("index present");
        let primary = EmbeddedAssets::primary()
            .get("index.html")
            .expect("primary index");
        let fallback = EmbeddedAssets::fallback()
            .get("index.html")
            .expect("fallback index");
        assert_eq!(index, primary);
        assert_ne!(index, fallback);
    }

    #[rstest]
    fn chain_falls_through_to_later_sources() {
        let chain = AssetChain::embedded();
        assert!(chain.get("js/quarry.js").is_some());
        assert!(chain.get("css/quarry.css").is_some());
        assert!(chain.get("missing.txt").is_none());
    }

    #[rstest]
    #[case("../secret")]
    #[case("/etc/passwd")]
    #[case("a/../../b")]
    fn dir_assets_refuse_escaping_paths(#[case] path: &str) {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
        assert!(DirAssets::new(root).get(path).is_none());
    }

    #[rstest]
    fn dir_assets_read_nested_files() {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir_all(dir.path().join("css")).expect("mkdir");
        fs::write(dir.path().join("css/site.css"), b"body{}").expect("write");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
        let assets = DirAssets::new(root);
        assert_eq!(assets.get("css/site.css").as_deref(), Some(&b"body{}"[..]));
    }

    #[rstest]
    #[case("index.html", "text/html; charset=utf-8")]
    #[case("app.js", "application/javascript")]
    #[case("font.bin", "application/octet-stream")]
    #[case("README", "application/octet-stream")]
    fn content_types_follow_extensions(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(content_type(path), expected);
    }
}
