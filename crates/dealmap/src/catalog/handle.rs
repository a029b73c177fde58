use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::domain::CatalogDocument;
use super::snapshot::CatalogSnapshot;
use super::source::{CatalogLoadError, CatalogSource};

/// Single-writer, multi-reader pointer to the current catalog snapshot.
///
/// Readers clone the inner `Arc`, so a request keeps the snapshot it started with even when a
/// refresh swaps in a newer one.
#[derive(Debug, Default)]
pub struct CatalogHandle {
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
    versions: AtomicU64,
}

impl CatalogHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: CatalogDocument) -> Self {
        let handle = Self::new();
        handle.install(document);
        handle
    }

    /// Current snapshot, or `None` when nothing has been loaded yet.
    pub fn snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Build a snapshot from `document` and publish it atomically.
    pub fn install(&self, document: CatalogDocument) -> Arc<CatalogSnapshot> {
        let version = self.versions.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(CatalogSnapshot::from_document(document, version));

        for warning in snapshot.warnings() {
            warn!(catalog_version = version, %warning, "catalog integrity warning");
        }

        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());

        info!(
            catalog_version = version,
            programs = snapshot.programs().len(),
            warnings = snapshot.warnings().len(),
            "catalog snapshot installed"
        );

        snapshot
    }

    /// Load from `source` and publish; the previous snapshot stays live on failure.
    pub fn refresh_from(
        &self,
        source: &dyn CatalogSource,
    ) -> Result<Arc<CatalogSnapshot>, CatalogLoadError> {
        let document = source.load()?;
        Ok(self.install(document))
    }
}

/// Periodically reload the catalog in the background.
///
/// The first reload happens one `every` after spawning; callers load the initial snapshot
/// themselves so startup can fail fast when no catalog is available.
pub fn spawn_refresh(
    handle: Arc<CatalogHandle>,
    source: Arc<dyn CatalogSource>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let loader = source.clone();
            let loaded = tokio::task::spawn_blocking(move || loader.load()).await;

            match loaded {
                Ok(Ok(document)) => {
                    handle.install(document);
                }
                Ok(Err(err)) => {
                    warn!(source = %source.describe(), error = %err, "catalog refresh failed; keeping previous snapshot");
                }
                Err(err) => {
                    warn!(source = %source.describe(), error = %err, "catalog refresh task aborted");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::domain::Brand;
    use crate::catalog::domain::BrandId;
    use crate::catalog::source::StaticCatalogSource;
    use std::sync::Mutex;

    fn document(label: &str) -> CatalogDocument {
        CatalogDocument {
            label: Some(label.to_string()),
            brands: vec![Brand {
                id: BrandId(1),
                name: "Bean Roasters".to_string(),
                owner: None,
                is_franchise: true,
            }],
            ..CatalogDocument::default()
        }
    }

    struct FlakySource {
        responses: Mutex<Vec<Result<CatalogDocument, CatalogLoadError>>>,
    }

    impl CatalogSource for FlakySource {
        fn describe(&self) -> String {
            "flaky".to_string()
        }

        fn load(&self) -> Result<CatalogDocument, CatalogLoadError> {
            self.responses
                .lock()
                .expect("source mutex poisoned")
                .pop()
                .unwrap_or_else(|| Err(CatalogLoadError::Unavailable("drained".to_string())))
        }
    }

    #[test]
    fn empty_handle_has_no_snapshot() {
        let handle = CatalogHandle::new();
        assert!(handle.snapshot().is_none());
        assert!(!handle.is_loaded());
    }

    #[test]
    fn in_flight_readers_keep_their_snapshot_across_a_swap() {
        let handle = CatalogHandle::with_document(document("first"));
        let held = handle.snapshot().expect("first snapshot");

        handle.install(document("second"));

        assert_eq!(held.label(), Some("first"));
        assert_eq!(held.version(), 1);
        let current = handle.snapshot().expect("second snapshot");
        assert_eq!(current.label(), Some("second"));
        assert_eq!(current.version(), 2);
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let handle = CatalogHandle::with_document(document("stable"));
        let source = FlakySource {
            responses: Mutex::new(vec![Err(CatalogLoadError::Unavailable(
                "store offline".to_string(),
            ))]),
        };

        assert!(handle.refresh_from(&source).is_err());
        let current = handle.snapshot().expect("snapshot retained");
        assert_eq!(current.label(), Some("stable"));
    }

    #[tokio::test]
    async fn background_refresh_swaps_in_new_documents() {
        let handle = Arc::new(CatalogHandle::with_document(document("boot")));
        let source: Arc<dyn CatalogSource> =
            Arc::new(StaticCatalogSource::new(document("refreshed")));

        let task = spawn_refresh(handle.clone(), source, Duration::from_millis(20));

        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if handle.snapshot().and_then(|s| s.label().map(str::to_owned))
                == Some("refreshed".to_string())
            {
                break;
            }
        }

        let current = handle.snapshot().expect("snapshot present");
        assert_eq!(current.label(), Some("refreshed"));
        assert!(current.version() >= 2);
        task.abort();
    }
}
