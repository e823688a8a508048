//! Tiered media resolver.
//!
//! Given a binary attachment, compresses it and decides whether to
//! inline-encode it or upload it to one of several external blob services,
//! with ordered fallback. External failures are absorbed; the caller always
//! receives a [`MediaObject`] unless the final inline fallback itself fails.

mod compress;
mod provider;

pub use compress::{compress_image, CompressedImage, CompressionOptions};
pub use provider::{
    providers_from_env, BlobHandle, BlobProvider, CloudinaryProvider, ImgbbProvider,
};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Error, Result};
use crate::models::{MediaObject, StorageTier, StoredPayload};

/// An attachment handed in by the CRUD layer for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSource {
    /// Original file name.
    pub file_name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

/// Decides placement for attachment bytes: inline vs. external blob service.
pub struct MediaResolver {
    providers: Vec<Box<dyn BlobProvider>>,
    options: CompressionOptions,
    inline_threshold: u64,
}

impl MediaResolver {
    /// Build a resolver over an explicit provider chain.
    #[must_use]
    pub fn new(
        providers: Vec<Box<dyn BlobProvider>>,
        options: CompressionOptions,
        inline_threshold: u64,
    ) -> Self {
        Self {
            providers,
            options,
            inline_threshold,
        }
    }

    /// Build a resolver with the provider chain read from the environment.
    #[must_use]
    pub fn from_env(options: CompressionOptions, inline_threshold: u64) -> Self {
        Self::new(providers_from_env(), options, inline_threshold)
    }

    /// Resolve an attachment into a stored [`MediaObject`].
    ///
    /// Files at or under the inline threshold (measured on the original
    /// size) are compressed and inline-encoded. Larger files go through the
    /// external provider chain; if every provider fails or none is
    /// configured, the compressed bytes are inline-encoded anyway.
    pub async fn resolve(&self, source: &AttachmentSource) -> Result<MediaObject> {
        if source.bytes.is_empty() {
            return Err(Error::InvalidInput(
                "Attachment bytes cannot be empty".to_string(),
            ));
        }

        let original_size = source.bytes.len() as u64;
        let (stored_bytes, stored_mime) = self.prepare(source).await;
        let stored_size = stored_bytes.len() as u64;

        if original_size <= self.inline_threshold {
            return Ok(Self::inline_object(
                &stored_bytes,
                stored_size,
                original_size,
                stored_mime,
            ));
        }

        for provider in &self.providers {
            match provider.upload(&stored_bytes, &stored_mime).await {
                Ok(handle) => {
                    tracing::debug!(
                        "Attachment '{}' uploaded to {} ({stored_size} bytes)",
                        source.file_name,
                        provider.name()
                    );
                    return Ok(MediaObject {
                        payload: StoredPayload::External {
                            url: handle.url,
                            delete_handle: handle.delete_handle,
                            provider: provider.name().to_string(),
                        },
                        size: stored_size,
                        original_size,
                        mime_type: stored_mime,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        "Blob provider {} failed for '{}', trying next: {error}",
                        provider.name(),
                        source.file_name
                    );
                }
            }
        }

        tracing::warn!(
            "All external providers unavailable for '{}', falling back to inline storage",
            source.file_name
        );
        Ok(Self::inline_object(
            &stored_bytes,
            stored_size,
            original_size,
            stored_mime,
        ))
    }

    /// Flag inline objects whose stored size still exceeds the inline
    /// threshold (e.g. because compression under-performed). Detection only;
    /// no automatic migration.
    #[must_use]
    pub fn find_oversized_inline(&self, objects: &[MediaObject]) -> Vec<usize> {
        objects
            .iter()
            .enumerate()
            .filter(|(_, object)| {
                object.storage_tier() == StorageTier::Inline && object.size > self.inline_threshold
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Run the compression step ahead of both the inline and external paths.
    ///
    /// Non-image payloads pass through unchanged. A failed compression is
    /// absorbed (the original bytes are stored); compression output larger
    /// than the source is discarded.
    async fn prepare(&self, source: &AttachmentSource) -> (Vec<u8>, String) {
        if !source.mime_type.starts_with("image/") {
            return (source.bytes.clone(), source.mime_type.clone());
        }

        let bytes = source.bytes.clone();
        let options = self.options;
        let compressed =
            tokio::task::spawn_blocking(move || compress_image(&bytes, options)).await;

        match compressed {
            Ok(Ok(image)) if image.bytes.len() < source.bytes.len() => {
                (image.bytes, "image/jpeg".to_string())
            }
            Ok(Ok(_)) => {
                tracing::debug!(
                    "Compression did not shrink '{}', keeping original bytes",
                    source.file_name
                );
                (source.bytes.clone(), source.mime_type.clone())
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    "Compression failed for '{}', storing original bytes: {error}",
                    source.file_name
                );
                (source.bytes.clone(), source.mime_type.clone())
            }
            Err(join_error) => {
                tracing::warn!(
                    "Compression task failed for '{}', storing original bytes: {join_error}",
                    source.file_name
                );
                (source.bytes.clone(), source.mime_type.clone())
            }
        }
    }

    fn inline_object(
        bytes: &[u8],
        size: u64,
        original_size: u64,
        mime_type: String,
    ) -> MediaObject {
        MediaObject {
            payload: StoredPayload::Inline {
                data: BASE64.encode(bytes),
            },
            size,
            original_size,
            mime_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use pretty_assertions::assert_eq;

    use super::*;

    struct FailingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BlobProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn upload(&self, _bytes: &[u8], _mime_type: &str) -> crate::Result<BlobHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Remote("provider quota exhausted".to_string()))
        }
    }

    struct StaticProvider {
        name: &'static str,
    }

    #[async_trait]
    impl BlobProvider for StaticProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn upload(&self, _bytes: &[u8], _mime_type: &str) -> crate::Result<BlobHandle> {
            Ok(BlobHandle {
                url: format!("https://{}.example.com/object", self.name),
                delete_handle: Some("token".to_string()),
            })
        }
    }

    fn source_png(width: u32, height: u32) -> Vec<u8> {
        let image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, 80, 255])
        });
        let mut cursor = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn png_source(width: u32, height: u32) -> AttachmentSource {
        AttachmentSource {
            file_name: "photo.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: source_png(width, height),
        }
    }

    #[tokio::test]
    async fn small_files_are_inlined_without_touching_providers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = MediaResolver::new(
            vec![Box::new(FailingProvider {
                calls: Arc::clone(&calls),
            })],
            CompressionOptions::default(),
            500_000,
        );

        let object = resolver.resolve(&png_source(200, 100)).await.unwrap();
        assert_eq!(object.storage_tier(), StorageTier::Inline);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn large_files_use_the_first_working_provider() {
        let resolver = MediaResolver::new(
            vec![
                Box::new(FailingProvider {
                    calls: Arc::new(AtomicUsize::new(0)),
                }),
                Box::new(StaticProvider { name: "secondary" }),
            ],
            CompressionOptions::default(),
            // Tiny threshold forces the external path without a 500 KB fixture.
            64,
        );

        let object = resolver.resolve(&png_source(400, 300)).await.unwrap();
        match object.payload {
            StoredPayload::External { url, provider, .. } => {
                assert_eq!(provider, "secondary");
                assert_eq!(url, "https://secondary.example.com/object");
            }
            StoredPayload::Inline { .. } => panic!("expected external placement"),
        }
    }

    #[tokio::test]
    async fn all_providers_failing_falls_back_to_inline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = MediaResolver::new(
            vec![
                Box::new(FailingProvider {
                    calls: Arc::clone(&calls),
                }),
                Box::new(FailingProvider {
                    calls: Arc::clone(&calls),
                }),
            ],
            CompressionOptions::default(),
            64,
        );

        let source = png_source(800, 600);
        let original_size = source.bytes.len() as u64;
        let object = resolver.resolve(&source).await.unwrap();

        assert_eq!(object.storage_tier(), StorageTier::Inline);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(object.size <= original_size);
        assert_eq!(object.original_size, original_size);
    }

    #[tokio::test]
    async fn empty_provider_chain_inlines_large_files() {
        let resolver = MediaResolver::new(vec![], CompressionOptions::default(), 64);
        let object = resolver.resolve(&png_source(400, 300)).await.unwrap();
        assert_eq!(object.storage_tier(), StorageTier::Inline);
    }

    #[tokio::test]
    async fn non_image_payloads_pass_through_uncompressed() {
        let resolver = MediaResolver::new(vec![], CompressionOptions::default(), 500_000);
        let source = AttachmentSource {
            file_name: "warranty.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            bytes: b"%PDF-1.4 fake".to_vec(),
        };

        let object = resolver.resolve(&source).await.unwrap();
        assert_eq!(object.mime_type, "application/pdf");
        match object.payload {
            StoredPayload::Inline { data } => {
                assert_eq!(BASE64.decode(data).unwrap(), source.bytes);
            }
            StoredPayload::External { .. } => panic!("expected inline placement"),
        }
    }

    #[tokio::test]
    async fn undecodable_image_is_stored_uncompressed_not_failed() {
        let resolver = MediaResolver::new(vec![], CompressionOptions::default(), 500_000);
        let source = AttachmentSource {
            file_name: "corrupt.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![0xde, 0xad, 0xbe, 0xef],
        };

        let object = resolver.resolve(&source).await.unwrap();
        assert_eq!(object.storage_tier(), StorageTier::Inline);
        assert_eq!(object.size, 4);
    }

    #[tokio::test]
    async fn empty_attachment_is_rejected() {
        let resolver = MediaResolver::new(vec![], CompressionOptions::default(), 500_000);
        let source = AttachmentSource {
            file_name: "empty".to_string(),
            mime_type: "image/png".to_string(),
            bytes: vec![],
        };
        assert!(resolver.resolve(&source).await.is_err());
    }

    #[test]
    fn oversized_inline_sweep_flags_only_inline_objects_over_threshold() {
        let resolver = MediaResolver::new(vec![], CompressionOptions::default(), 100);

        let objects = vec![
            MediaObject {
                payload: StoredPayload::Inline {
                    data: "small".to_string(),
                },
                size: 50,
                original_size: 50,
                mime_type: "image/jpeg".to_string(),
            },
            MediaObject {
                payload: StoredPayload::Inline {
                    data: "big".to_string(),
                },
                size: 900,
                original_size: 1200,
                mime_type: "image/jpeg".to_string(),
            },
            MediaObject {
                payload: StoredPayload::External {
                    url: "https://cdn.example.com/x".to_string(),
                    delete_handle: None,
                    provider: "imgbb".to_string(),
                },
                size: 5000,
                original_size: 5000,
                mime_type: "image/jpeg".to_string(),
            },
        ];

        assert_eq!(resolver.find_oversized_inline(&objects), vec![1]);
    }
}
