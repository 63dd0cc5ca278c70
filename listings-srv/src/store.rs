use crate::listing::Listing;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use object_store::{ObjectStore, path::Path};
use std::sync::Arc;
use tracing::debug;

/// Persistence of listings, keyed by id
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Every stored listing, in no particular order
    async fn scan(&self) -> Result<Vec<Listing>>;
    async fn get(&self, id: &str) -> Result<Option<Listing>>;
    /// Insert or replace
    async fn put(&self, listing: &Listing) -> Result<()>;
    /// Deleting an unknown id is not an error
    async fn delete(&self, id: &str) -> Result<()>;
}

const LISTING_EXTENSION: &str = "json";
const SCAN_CONCURRENCY: usize = 16;

/// One JSON document per listing under a root path of any object store
pub struct BlobListingStore {
    blob_store: Arc<dyn ObjectStore>,
    blob_store_root: Path,
}

impl BlobListingStore {
    /// Open the store behind an object store URL
    /// (`s3://bucket/listings`, `file:///var/lib/hearth`, `memory:///listings`, ...)
    pub fn connect(object_store_url: &str) -> Result<Self> {
        let url = url::Url::parse(object_store_url)
            .with_context(|| format!("invalid listings store url '{object_store_url}'"))?;
        let (blob_store, blob_store_root) = object_store::parse_url(&url)
            .with_context(|| format!("opening listings store '{object_store_url}'"))?;
        Ok(Self::new(blob_store.into(), blob_store_root))
    }

    pub fn new(blob_store: Arc<dyn ObjectStore>, blob_store_root: Path) -> Self {
        Self {
            blob_store,
            blob_store_root,
        }
    }

    fn listing_path(&self, id: &str) -> Path {
        self.blob_store_root
            .child(format!("{id}.{LISTING_EXTENSION}"))
    }

    async fn read(&self, path: &Path) -> Result<Option<Listing>> {
        let get_result = match self.blob_store.get(path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {path}")),
        };
        let bytes = get_result
            .bytes()
            .await
            .with_context(|| format!("reading {path}"))?;
        let listing = serde_json::from_slice(&bytes).with_context(|| format!("parsing {path}"))?;
        Ok(Some(listing))
    }
}

#[async_trait]
impl ListingStore for BlobListingStore {
    async fn scan(&self) -> Result<Vec<Listing>> {
        let paths: Vec<Path> = self
            .blob_store
            .list(Some(&self.blob_store_root))
            .map_ok(|meta| meta.location)
            .try_filter(|location| {
                futures::future::ready(location.extension() == Some(LISTING_EXTENSION))
            })
            .try_collect()
            .await
            .context("listing stored listings")?;
        debug!("scanning {} listing(s)", paths.len());

        let listings: Vec<Option<Listing>> = futures::stream::iter(paths)
            .map(|path| async move { self.read(&path).await })
            .buffer_unordered(SCAN_CONCURRENCY)
            .try_collect()
            .await?;
        // A listing deleted between list and get is simply skipped
        Ok(listings.into_iter().flatten().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Listing>> {
        self.read(&self.listing_path(id)).await
    }

    async fn put(&self, listing: &Listing) -> Result<()> {
        let path = self.listing_path(&listing.id);
        let buffer = bytes::Bytes::from(serde_json::to_vec(listing)?);
        self.blob_store
            .put(&path, buffer.into())
            .await
            .with_context(|| format!("writing {path}"))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.listing_path(id);
        match self.blob_store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting {path}")),
        }
    }
}
