//! Resolved media attachment model

use serde::{Deserialize, Serialize};

/// Where an attachment's bytes physically live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    /// Encoded directly inside the owning document
    Inline,
    /// Hosted by an external blob service, referenced by URL
    External,
}

/// Tier-specific stored payload of a resolved attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum StoredPayload {
    /// Base64-encoded bytes embedded in the owning document
    Inline {
        /// Encoded attachment bytes
        data: String,
    },
    /// Reference to an external blob service object
    External {
        /// Retrievable object URL
        url: String,
        /// Provider-specific deletion handle, when the provider issues one
        delete_handle: Option<String>,
        /// Name of the provider that accepted the upload
        provider: String,
    },
}

/// Result of resolving a binary attachment.
///
/// The storage tier is decided once, at creation, and is never migrated
/// automatically. Referenced by owning inventory/recipe/expense records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaObject {
    /// Stored bytes or external reference
    pub payload: StoredPayload,
    /// Size actually stored, in bytes (post-compression)
    pub size: u64,
    /// Size of the source file before compression, in bytes
    pub original_size: u64,
    /// MIME type of the stored payload
    pub mime_type: String,
}

impl MediaObject {
    /// The tier this object was placed in.
    #[must_use]
    pub const fn storage_tier(&self) -> StorageTier {
        match self.payload {
            StoredPayload::Inline { .. } => StorageTier::Inline,
            StoredPayload::External { .. } => StorageTier::External,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_tier_matches_payload_variant() {
        let inline = MediaObject {
            payload: StoredPayload::Inline {
                data: "aGk=".to_string(),
            },
            size: 2,
            original_size: 2,
            mime_type: "image/jpeg".to_string(),
        };
        assert_eq!(inline.storage_tier(), StorageTier::Inline);

        let external = MediaObject {
            payload: StoredPayload::External {
                url: "https://cdn.example.com/a.jpg".to_string(),
                delete_handle: None,
                provider: "imgbb".to_string(),
            },
            size: 900_000,
            original_size: 1_200_000,
            mime_type: "image/jpeg".to_string(),
        };
        assert_eq!(external.storage_tier(), StorageTier::External);
    }
}
