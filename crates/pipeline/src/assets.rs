//! Reference image resolution and preparation.
//!
//! A reference is one of:
//! - a `data:` URL carrying base64 image bytes,
//! - an `http(s)` URL fetched with [`reqwest`],
//! - a bare asset id looked up in a local asset directory.
//!
//! [`prepare_reference`] turns resolved bytes into a `data:` URL the
//! provider accepts, transcoding anything that is not PNG or JPEG to PNG.

use std::io::Cursor;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::AssetError;

/// MIME types the provider accepts without transcoding.
pub const ACCEPTED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg"];

/// Raw bytes of a resolved reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Looks up the bytes behind a reference string.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<ResolvedAsset, AssetError>;
}

/// Asset store backed by HTTP and an optional local directory.
pub struct HttpAssetStore {
    client: reqwest::Client,
    asset_dir: Option<PathBuf>,
}

impl HttpAssetStore {
    pub fn new(client: reqwest::Client, asset_dir: Option<PathBuf>) -> Self {
        Self { client, asset_dir }
    }

    async fn fetch_url(&self, url: &str) -> Result<ResolvedAsset, AssetError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AssetError::Fetch(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AssetError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(AssetError::Fetch(format!("{url} returned {status}")));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetError::Fetch(e.to_string()))?
            .to_vec();

        let mime_type = header_mime
            .filter(|m| m.starts_with("image/"))
            .or_else(|| sniff_mime(&bytes))
            .ok_or_else(|| AssetError::Fetch(format!("{url} is not an image")))?;

        Ok(ResolvedAsset { bytes, mime_type })
    }

    async fn read_local(&self, id: &str) -> Result<ResolvedAsset, AssetError> {
        let Some(dir) = &self.asset_dir else {
            return Err(AssetError::NotFound(id.to_string()));
        };
        if !is_safe_asset_id(id) {
            return Err(AssetError::InvalidReference(id.to_string()));
        }

        let bytes = match tokio::fs::read(dir.join(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AssetError::NotFound(id.to_string()));
            }
            Err(e) => return Err(AssetError::Fetch(format!("{id}: {e}"))),
        };

        let mime_type =
            sniff_mime(&bytes).ok_or_else(|| AssetError::Transcode(format!("{id} is not an image")))?;
        Ok(ResolvedAsset { bytes, mime_type })
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn resolve(&self, reference: &str) -> Result<ResolvedAsset, AssetError> {
        if reference.starts_with("data:") {
            decode_data_url(reference)
        } else if reference.starts_with("http://") || reference.starts_with("https://") {
            self.fetch_url(reference).await
        } else {
            self.read_local(reference).await
        }
    }
}

/// Decode a `data:<mime>;base64,<payload>` URL.
pub fn decode_data_url(url: &str) -> Result<ResolvedAsset, AssetError> {
    let invalid = || AssetError::InvalidReference(truncate(url));

    let rest = url.strip_prefix("data:").ok_or_else(invalid)?;
    let (meta, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime_type = meta.strip_suffix(";base64").ok_or_else(invalid)?;
    if !mime_type.starts_with("image/") {
        return Err(invalid());
    }

    let bytes = BASE64.decode(payload.trim()).map_err(|_| invalid())?;
    Ok(ResolvedAsset {
        bytes,
        mime_type: mime_type.to_string(),
    })
}

/// Encode bytes as a `data:` URL.
pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Make a resolved asset provider-ready, returning a `data:` URL.
///
/// PNG and JPEG pass through untouched; anything else is decoded and
/// re-encoded as PNG on the blocking pool.
pub async fn prepare_reference(asset: ResolvedAsset) -> Result<String, AssetError> {
    if ACCEPTED_MIME_TYPES.contains(&asset.mime_type.as_str()) {
        return Ok(encode_data_url(&asset.mime_type, &asset.bytes));
    }

    let from = asset.mime_type.clone();
    let png = tokio::task::spawn_blocking(move || transcode_to_png(&asset.bytes))
        .await
        .map_err(|e| AssetError::Transcode(format!("transcode task failed: {e}")))??;

    tracing::debug!(from = %from, bytes = png.len(), "Transcoded reference to PNG");
    Ok(encode_data_url("image/png", &png))
}

fn transcode_to_png(bytes: &[u8]) -> Result<Vec<u8>, AssetError> {
    let img = image::load_from_memory(bytes).map_err(|e| AssetError::Transcode(e.to_string()))?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| AssetError::Transcode(e.to_string()))?;
    Ok(out.into_inner())
}

fn sniff_mime(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|f| f.to_mime_type().to_string())
}

/// Asset ids are plain file names: no separators, no parent references.
fn is_safe_asset_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn truncate(s: &str) -> String {
    s.chars().take(48).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn data_url_decodes() {
        let png = tiny_png();
        let url = encode_data_url("image/png", &png);

        let asset = decode_data_url(&url).unwrap();
        assert_eq!(asset.mime_type, "image/png");
        assert_eq!(asset.bytes, png);
    }

    #[test]
    fn malformed_data_urls_are_rejected() {
        assert_matches!(decode_data_url("data:image/png,abc"), Err(AssetError::InvalidReference(_)));
        assert_matches!(decode_data_url("data:text/plain;base64,aGk="), Err(AssetError::InvalidReference(_)));
        assert_matches!(decode_data_url("data:image/png;base64,@@@"), Err(AssetError::InvalidReference(_)));
    }

    #[test]
    fn asset_ids_cannot_escape_the_directory() {
        assert!(is_safe_asset_id("fox-01.png"));
        assert!(!is_safe_asset_id("../secret.png"));
        assert!(!is_safe_asset_id("a/b.png"));
        assert!(!is_safe_asset_id(".hidden"));
        assert!(!is_safe_asset_id(""));
    }

    #[tokio::test]
    async fn png_passes_through_untouched() {
        let png = tiny_png();
        let url = prepare_reference(ResolvedAsset {
            bytes: png.clone(),
            mime_type: "image/png".into(),
        })
        .await
        .unwrap();

        assert_eq!(url, encode_data_url("image/png", &png));
    }

    #[tokio::test]
    async fn unsupported_mime_is_transcoded_to_png() {
        // Labelled as webp: not an accepted type, so it gets re-encoded.
        let url = prepare_reference(ResolvedAsset {
            bytes: tiny_png(),
            mime_type: "image/webp".into(),
        })
        .await
        .unwrap();

        let decoded = decode_data_url(&url).unwrap();
        assert_eq!(decoded.mime_type, "image/png");
        assert_eq!(image::guess_format(&decoded.bytes).unwrap(), image::ImageFormat::Png);
    }

    #[tokio::test]
    async fn undecodable_bytes_fail_to_transcode() {
        let result = prepare_reference(ResolvedAsset {
            bytes: b"definitely not an image".to_vec(),
            mime_type: "image/gif".into(),
        })
        .await;

        assert_matches!(result, Err(AssetError::Transcode(_)));
    }

    #[tokio::test]
    async fn bare_id_without_asset_dir_is_not_found() {
        let store = HttpAssetStore::new(reqwest::Client::new(), None);
        assert_matches!(store.resolve("fox.png").await, Err(AssetError::NotFound(id)) if id == "fox.png");
    }

    #[tokio::test]
    async fn bare_id_reads_from_asset_dir() {
        let dir = std::env::temp_dir().join(format!("atelier-assets-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("fox.png"), tiny_png()).await.unwrap();

        let store = HttpAssetStore::new(reqwest::Client::new(), Some(dir.clone()));
        let asset = store.resolve("fox.png").await.unwrap();
        assert_eq!(asset.mime_type, "image/png");

        assert_matches!(store.resolve("../fox.png").await, Err(AssetError::InvalidReference(_)));
        assert_matches!(store.resolve("missing.png").await, Err(AssetError::NotFound(_)));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
