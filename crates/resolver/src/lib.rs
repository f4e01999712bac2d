//! Cache-aside flag resolution.
//!
//! `resolve(country)` first consults the on-disk store; on a miss it runs
//! the two-stage Commons fetch (metadata, then thumbnail bytes), writes the
//! result back, and returns the image with its attribution filename.

mod countries;
mod error;
mod wikimedia;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use flagfinder_store::FlagStore;

pub use crate::countries::{is_known, COUNTRIES};
pub use crate::error::ResolveError;
pub use crate::wikimedia::{
    commons_file_page, commons_filename, ClientConfig, CommonsClient, FlagDescriptor,
    COMMONS_API_URL, DEFAULT_THUMB_WIDTH, DEFAULT_TIMEOUT, USER_AGENT,
};

pub type Result<T> = std::result::Result<T, ResolveError>;

/// A resolved flag: the PNG bytes and the Commons filename to credit.
#[derive(Clone, PartialEq, Eq)]
pub struct FlagData {
    pub image: Vec<u8>,
    pub attribution: String,
}

impl fmt::Debug for FlagData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagData")
            .field("image", &format_args!("{} bytes", self.image.len()))
            .field("attribution", &self.attribution)
            .finish()
    }
}

pub struct FlagResolver {
    store: FlagStore,
    client: CommonsClient,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FlagResolver {
    pub fn new(store: FlagStore, client: CommonsClient) -> Self {
        Self {
            store,
            client,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a country to its flag.
    ///
    /// Cache hit: returns the stored bytes with the attribution derived
    /// from the country name; no network traffic. Miss, corruption, or
    /// expiry: runs the two-stage fetch and repopulates the cache. Stage 2
    /// only starts after stage 1 succeeds, and the cache write only after
    /// stage 2; a failed stage leaves the store untouched.
    ///
    /// Concurrent calls for the same country serialize on a per-key guard,
    /// so at most one fetch per key is in flight and the waiters are served
    /// from the cache it fills. Calls for different countries do not block
    /// each other.
    pub async fn resolve(&self, country: &str) -> Result<FlagData> {
        let guard = self.key_lock(country);
        let _held = guard.lock().await;

        if let Some((image, _)) = self.store.get(country).await {
            tracing::debug!(country, "serving flag from cache");
            return Ok(FlagData {
                image,
                attribution: commons_filename(country),
            });
        }

        tracing::info!(country, "flag not cached, fetching from commons");
        let descriptor = self.client.fetch_flag_descriptor(country).await?;
        let image = self.client.fetch_image(&descriptor.thumbnail_url).await?;

        let flag = FlagData {
            image,
            attribution: descriptor.filename,
        };
        if let Err(e) = self.store.put(country, &flag.image).await {
            return Err(ResolveError::StorageFailure { flag, source: e });
        }
        Ok(flag)
    }

    fn key_lock(&self, country: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut keys = self.in_flight.lock().expect("in-flight key map poisoned");
        keys.entry(country.to_string()).or_default().clone()
    }
}
