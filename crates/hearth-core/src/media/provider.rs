//! External blob service providers.
//!
//! Each provider exposes a single `upload` over HTTP, gated by its own
//! daily/monthly quota that this system does not enforce itself -- it only
//! reacts to failure by falling through to the next candidate.

use std::env;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::util::compact_text;

const ENV_IMGBB_API_KEY: &str = "IMGBB_API_KEY";
const ENV_CLOUDINARY_CLOUD_NAME: &str = "CLOUDINARY_CLOUD_NAME";
const ENV_CLOUDINARY_UPLOAD_PRESET: &str = "CLOUDINARY_UPLOAD_PRESET";

/// Result of a successful external upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    /// Retrievable object URL.
    pub url: String,
    /// Provider-specific deletion handle, when the provider issues one.
    pub delete_handle: Option<String>,
}

/// A single external blob service in the fallback chain.
#[async_trait]
pub trait BlobProvider: Send + Sync {
    /// Provider name used in logs and stored references.
    fn name(&self) -> &'static str;

    /// Upload attachment bytes, returning the hosted object handle.
    async fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<BlobHandle>;
}

/// ImgBB image hosting (primary external service).
#[derive(Debug, Clone)]
pub struct ImgbbProvider {
    api_key: String,
    client: reqwest::Client,
}

impl ImgbbProvider {
    /// Build a provider from an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(Error::InvalidInput(
                "ImgBB API key cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            api_key,
            client: reqwest::Client::new(),
        })
    }

    /// Load provider configuration from `IMGBB_API_KEY`.
    ///
    /// Returns `Ok(None)` when the variable is unset, so an unconfigured
    /// provider is skipped rather than failing the chain.
    pub fn from_env() -> Result<Option<Self>> {
        match env::var(ENV_IMGBB_API_KEY).ok().map(|v| v.trim().to_string()) {
            Some(key) if !key.is_empty() => Ok(Some(Self::new(key)?)),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImgbbResponse {
    data: ImgbbData,
}

#[derive(Debug, Deserialize)]
struct ImgbbData {
    url: String,
    delete_url: Option<String>,
}

#[async_trait]
impl BlobProvider for ImgbbProvider {
    fn name(&self) -> &'static str {
        "imgbb"
    }

    async fn upload(&self, bytes: &[u8], _mime_type: &str) -> Result<BlobHandle> {
        let response = self
            .client
            .post("https://api.imgbb.com/1/upload")
            .form(&[
                ("key", self.api_key.as_str()),
                ("image", &BASE64.encode(bytes)),
            ])
            .send()
            .await
            .map_err(|error| Error::Remote(format!("ImgBB upload request failed: {error}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!(
                "ImgBB upload failed with HTTP {status}: {}",
                compact_text(&body)
            )));
        }

        let payload = response
            .json::<ImgbbResponse>()
            .await
            .map_err(|error| Error::Remote(format!("Invalid ImgBB response: {error}")))?;

        Ok(BlobHandle {
            url: payload.data.url,
            delete_handle: payload.data.delete_url,
        })
    }
}

/// Cloudinary unsigned upload (secondary external service).
#[derive(Debug, Clone)]
pub struct CloudinaryProvider {
    cloud_name: String,
    upload_preset: String,
    client: reqwest::Client,
}

impl CloudinaryProvider {
    /// Build a provider from an explicit cloud name and unsigned preset.
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Result<Self> {
        let cloud_name = cloud_name.into().trim().to_string();
        let upload_preset = upload_preset.into().trim().to_string();
        if cloud_name.is_empty() || upload_preset.is_empty() {
            return Err(Error::InvalidInput(
                "Cloudinary cloud name and upload preset cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            cloud_name,
            upload_preset,
            client: reqwest::Client::new(),
        })
    }

    /// Load provider configuration from `CLOUDINARY_CLOUD_NAME` and
    /// `CLOUDINARY_UPLOAD_PRESET`.
    ///
    /// Returns `Ok(None)` when neither variable is set; a partial
    /// configuration is an error.
    pub fn from_env() -> Result<Option<Self>> {
        Self::parse_config(|key| env::var(key).ok())
    }

    fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let cloud_name = lookup(ENV_CLOUDINARY_CLOUD_NAME)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let upload_preset = lookup(ENV_CLOUDINARY_UPLOAD_PRESET)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        match (cloud_name, upload_preset) {
            (None, None) => Ok(None),
            (Some(cloud_name), Some(upload_preset)) => {
                Ok(Some(Self::new(cloud_name, upload_preset)?))
            }
            (Some(_), None) => Err(Error::InvalidInput(format!(
                "Cloudinary configuration is incomplete. Missing: {ENV_CLOUDINARY_UPLOAD_PRESET}"
            ))),
            (None, Some(_)) => Err(Error::InvalidInput(format!(
                "Cloudinary configuration is incomplete. Missing: {ENV_CLOUDINARY_CLOUD_NAME}"
            ))),
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        )
    }
}

#[derive(Debug, Deserialize)]
struct CloudinaryResponse {
    secure_url: String,
    delete_token: Option<String>,
}

#[async_trait]
impl BlobProvider for CloudinaryProvider {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<BlobHandle> {
        let data_uri = format!("data:{mime_type};base64,{}", BASE64.encode(bytes));
        let response = self
            .client
            .post(self.upload_url())
            .form(&[
                ("file", data_uri.as_str()),
                ("upload_preset", self.upload_preset.as_str()),
            ])
            .send()
            .await
            .map_err(|error| Error::Remote(format!("Cloudinary upload request failed: {error}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!(
                "Cloudinary upload failed with HTTP {status}: {}",
                compact_text(&body)
            )));
        }

        let payload = response
            .json::<CloudinaryResponse>()
            .await
            .map_err(|error| Error::Remote(format!("Invalid Cloudinary response: {error}")))?;

        Ok(BlobHandle {
            url: payload.secure_url,
            delete_handle: payload.delete_token,
        })
    }
}

/// Build the provider fallback chain from the process environment, in fixed
/// priority order: ImgBB first, then Cloudinary. Unconfigured providers are
/// simply absent from the chain.
pub fn providers_from_env() -> Vec<Box<dyn BlobProvider>> {
    let mut chain: Vec<Box<dyn BlobProvider>> = Vec::new();

    match ImgbbProvider::from_env() {
        Ok(Some(provider)) => chain.push(Box::new(provider)),
        Ok(None) => {}
        Err(error) => tracing::warn!("Skipping ImgBB provider: {error}"),
    }
    match CloudinaryProvider::from_env() {
        Ok(Some(provider)) => chain.push(Box::new(provider)),
        Ok(None) => {}
        Err(error) => tracing::warn!("Skipping Cloudinary provider: {error}"),
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn imgbb_rejects_empty_api_key() {
        assert!(ImgbbProvider::new("   ").is_err());
    }

    #[test]
    fn cloudinary_parse_config_none_returns_none() {
        let map: HashMap<&str, &str> = HashMap::new();
        let parsed =
            CloudinaryProvider::parse_config(|key| map.get(key).map(|v| (*v).to_string()));
        assert!(parsed.unwrap().is_none());
    }

    #[test]
    fn cloudinary_parse_config_rejects_partial_configuration() {
        let mut map = HashMap::new();
        map.insert(ENV_CLOUDINARY_CLOUD_NAME, "demo");

        let err = CloudinaryProvider::parse_config(|key| map.get(key).map(|v| (*v).to_string()))
            .unwrap_err();
        match err {
            Error::InvalidInput(message) => {
                assert!(message.contains(ENV_CLOUDINARY_UPLOAD_PRESET));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cloudinary_builds_upload_url_from_cloud_name() {
        let provider = CloudinaryProvider::new("demo", "unsigned").unwrap();
        assert_eq!(
            provider.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
    }
}
