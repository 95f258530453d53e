//! Acquisition step — pull new bulletin ids and contents into the inbox.
//!
//! Two sub-steps per cycle, mirroring the feed's two operations:
//! 1. List ids published since the resume anchor (the last recorded batch
//!    time) and insert an inbox row per new id.
//! 2. Fetch content for every inbox row that has none yet.
//!
//! A transport failure aborts the step without advancing the anchor, so the
//! next cycle retries the same window. A per-bulletin empty or malformed
//! payload is terminal for that bulletin only.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::FeedError;
use crate::feed::client::RegistryFeed;
use crate::store::Database;

/// Run one acquisition pass. Returns the number of newly fetched contents.
pub async fn acquire_once(
    feed: &dyn RegistryFeed,
    db: &dyn Database,
    initial_lookback: Duration,
) -> Result<usize, FeedError> {
    let now = Utc::now();
    let since = match db.latest_acquisition_time().await {
        Ok(Some(anchor)) => anchor,
        Ok(None) => now - chrono::Duration::from_std(initial_lookback).unwrap_or_default(),
        Err(e) => {
            error!(error = %e, "Could not read acquisition anchor");
            return Err(FeedError::Request(e.to_string()));
        }
    };

    // Step 1: list new ids. Any failure here aborts the whole step.
    let ids = feed.list_ids(since, now).await?;
    if !ids.is_empty() {
        match db.record_acquisition(now, &ids).await {
            Ok(inserted) => {
                info!(listed = ids.len(), inserted, "Recorded acquisition batch");
            }
            Err(e) => {
                // Anchor not advanced; the same window is retried next cycle.
                error!(error = %e, "Failed to persist acquisition batch");
            }
        }
    } else {
        debug!(since = %since, "Feed returned no new bulletin ids");
    }

    // Step 2: fetch contents for rows that still lack them.
    let pending = match db.bulletins_missing_content().await {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "Could not list bulletins missing content");
            return Err(FeedError::Request(e.to_string()));
        }
    };

    let mut fetched = 0usize;
    for bulletin in pending {
        match feed.fetch_content(&bulletin.external_id).await {
            Ok(content) => {
                if let Err(e) = db.store_bulletin_content(&bulletin.id, &content).await {
                    error!(
                        external_id = %bulletin.external_id,
                        error = %e,
                        "Failed to store bulletin content"
                    );
                    continue;
                }
                fetched += 1;
            }
            // Terminal for this bulletin: the feed answered, but with nothing
            // usable. Recorded and never retried.
            Err(e @ (FeedError::EmptyPayload | FeedError::MalformedResponse(_))) => {
                warn!(external_id = %bulletin.external_id, error = %e, "Bulletin content unusable");
                mark_failed(db, &bulletin.id, &e.to_string()).await;
            }
            // Transport-level failure: leave this and the remaining rows for
            // the next cycle.
            Err(e) => {
                error!(external_id = %bulletin.external_id, error = %e, "Content fetch aborted");
                return Err(e);
            }
        }
    }

    if fetched > 0 {
        info!(fetched, "Fetched bulletin contents");
    }
    Ok(fetched)
}

async fn mark_failed(db: &dyn Database, bulletin_id: &str, diagnostic: &str) {
    if let Err(e) = db.mark_bulletin_failed(bulletin_id, diagnostic).await {
        error!(bulletin_id, error = %e, "Failed to mark bulletin failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::store::LibSqlBackend;

    /// Scriptable stub feed.
    #[derive(Default)]
    struct StubFeed {
        ids: Mutex<Vec<Result<Vec<String>, FeedError>>>,
        contents: Mutex<Vec<(String, Result<String, FeedError>)>>,
    }

    impl StubFeed {
        fn with_ids(self, ids: &[&str]) -> Self {
            self.ids
                .lock()
                .unwrap()
                .push(Ok(ids.iter().map(|s| s.to_string()).collect()));
            self
        }

        fn with_listing_error(self, error: FeedError) -> Self {
            self.ids.lock().unwrap().push(Err(error));
            self
        }

        fn with_content(self, id: &str, content: Result<String, FeedError>) -> Self {
            self.contents.lock().unwrap().push((id.to_string(), content));
            self
        }
    }

    #[async_trait]
    impl RegistryFeed for StubFeed {
        async fn list_ids(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<String>, FeedError> {
            let mut ids = self.ids.lock().unwrap();
            if ids.is_empty() {
                Ok(Vec::new())
            } else {
                ids.remove(0)
            }
        }

        async fn fetch_content(&self, external_id: &str) -> Result<String, FeedError> {
            let mut contents = self.contents.lock().unwrap();
            let position = contents
                .iter()
                .position(|(id, _)| id == external_id)
                .unwrap_or_else(|| panic!("unexpected fetch for {external_id}"));
            contents.remove(position).1
        }
    }

    #[tokio::test]
    async fn first_acquisition_lists_fetches_and_anchors() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let feed = StubFeed::default()
            .with_ids(&["100", "101"])
            .with_content("100", Ok("<MessageData><Id>100</Id></MessageData>".into()))
            .with_content("101", Ok("<MessageData><Id>101</Id></MessageData>".into()));

        let fetched = acquire_once(&feed, &db, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(fetched, 2);

        assert!(db.latest_acquisition_time().await.unwrap().is_some());
        assert_eq!(db.open_bulletins().await.unwrap().len(), 2);
        assert!(db.bulletins_missing_content().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_failure_aborts_without_advancing_anchor() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let feed = StubFeed::default().with_listing_error(FeedError::AuthRejected);

        let result = acquire_once(&feed, &db, Duration::from_secs(3600)).await;
        assert!(matches!(result, Err(FeedError::AuthRejected)));
        assert!(db.latest_acquisition_time().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_payload_marks_that_bulletin_failed() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let feed = StubFeed::default()
            .with_ids(&["200", "201"])
            .with_content("200", Err(FeedError::EmptyPayload))
            .with_content("201", Ok("<MessageData><Id>201</Id></MessageData>".into()));

        let fetched = acquire_once(&feed, &db, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(fetched, 1);

        // The empty one is terminally failed with the fault text.
        let open = db.open_bulletins().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].external_id, "201");

        let failed_rows = db.bulletins_missing_content().await.unwrap();
        assert!(failed_rows.is_empty(), "failed bulletin must not be refetched");
    }

    #[tokio::test]
    async fn transport_failure_mid_fetch_leaves_rest_for_next_cycle() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let feed = StubFeed::default()
            .with_ids(&["300", "301"])
            .with_content("300", Err(FeedError::Request("connection reset".into())));

        let result = acquire_once(&feed, &db, Duration::from_secs(3600)).await;
        assert!(result.is_err());

        // Both rows still awaiting content; nothing marked failed.
        assert_eq!(db.bulletins_missing_content().await.unwrap().len(), 2);
    }
}
