use std::sync::Arc;

use async_trait::async_trait;
use engine::external::{Fetch, QuestionSource, SourceConnector, SourceError};
use http_body_util::BodyExt;
use hyper::Uri;
use model::{Record, UserId};
use rand::seq::SliceRandom;

use crate::gateway::{HttpsClient, https_client};

/// Question source backed by a published sheet export: a JSON array of
/// records behind a plain GET.
pub struct SheetSource {
    client: HttpsClient,
    uri: Uri,
}

impl SheetSource {
    async fn fetch_all(&self) -> Result<Vec<Record>, SourceError> {
        let response = self.client.get(self.uri.clone()).await.map_err(|err| {
            log::warn!("sheet fetch failed: {err}");
            SourceError::Unavailable
        })?;
        if !response.status().is_success() {
            log::warn!("sheet fetch returned {}", response.status());
            return Err(SourceError::Unavailable);
        }
        let bytes =
            response.into_body().collect().await.map_err(|_| SourceError::Unavailable)?.to_bytes();
        serde_json::from_slice(&bytes).map_err(|err| {
            log::warn!("sheet is not a JSON array of records: {err}");
            SourceError::Unavailable
        })
    }
}

#[async_trait]
impl QuestionSource for SheetSource {
    async fn fetch_random(&self, user: UserId) -> Result<Fetch, SourceError> {
        let records = self.fetch_all().await?;
        Ok(match records.choose(&mut rand::thread_rng()) {
            Some(record) => Fetch::Record(record.clone()),
            None => {
                log::info!("{user}: question sheet has no rows");
                Fetch::Empty
            }
        })
    }
}

pub struct SheetConnector {
    client: HttpsClient,
}

impl SheetConnector {
    pub fn new() -> Self {
        Self { client: https_client() }
    }
}

#[async_trait]
impl SourceConnector for SheetConnector {
    /// Linking probes the URL once so a bad address is rejected while the
    /// user is still in the setup flow.
    async fn connect(&self, url: &str) -> Result<Arc<dyn QuestionSource>, SourceError> {
        let uri: Uri = url.parse().map_err(|_| SourceError::Unavailable)?;
        let source = SheetSource { client: self.client.clone(), uri };
        source.fetch_all().await?;
        Ok(Arc::new(source))
    }
}
