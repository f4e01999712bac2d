use flagfinder_store::StoreError;

use crate::FlagData;

/// Everything that can go wrong while resolving a flag. Each variant is
/// recoverable by calling `resolve` again; cache-integrity problems never
/// show up here, they are normalized to a miss and drive a refetch.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("metadata request timed out")]
    MetadataTimeout,
    #[error("could not reach the metadata endpoint: {0}")]
    MetadataTransport(#[source] reqwest::Error),
    #[error("metadata endpoint returned {status} {reason}")]
    MetadataHttp { status: u16, reason: String },
    #[error("metadata response for {country:?} did not contain a flag thumbnail")]
    MetadataMalformed { country: String },
    #[error("image download timed out")]
    ImageTimeout,
    #[error("could not reach the image host: {0}")]
    ImageTransport(#[source] reqwest::Error),
    #[error("image host returned {status} {reason}")]
    ImageHttp { status: u16, reason: String },
    /// The fetch itself succeeded; `flag` carries the result so the caller
    /// can still render it even though it was not cached.
    #[error("flag fetched but could not be cached: {source}")]
    StorageFailure { flag: FlagData, source: StoreError },
}
