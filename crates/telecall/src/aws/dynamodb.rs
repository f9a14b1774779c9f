//! DynamoDB session garbage collection.
//!
//! Session tables store one item per session, keyed by `hash_key`, with a
//! numeric epoch-seconds expiry in `expires_attribute`. Collecting garbage
//! scans for expired sessions and deletes them in `BatchWriteItem` batches.
use std::{
    collections::HashMap,
    future::Future,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use aws_config::SdkConfig;
use aws_sdk_dynamodb::{
    config::Region,
    types::{AttributeValue, DeleteRequest, WriteRequest},
    Client,
};
use snafu::prelude::*;

use super::service_error;
use crate::{
    ApiRequest, ApiResponse, BuildRequestSnafu, ClientConfig, ClientFactory, ConfigInvalidSnafu,
    Discovery, InvalidArgumentSnafu, Result, ServiceClient,
};

/// Deletes every expired session in the table named by the identifier.
pub const COLLECT_GARBAGE: &str = "collect-garbage";

pub const DEFAULT_REGION: &str = "us-west-2";

/// `BatchWriteItem` accepts at most this many requests.
pub const MAX_BATCH_SIZE: usize = 25;

/// A session item, or a session's primary key.
pub type Item = HashMap<String, AttributeValue>;

/// How session items are laid out and how fast they are deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub hash_key: String,
    pub expires_attribute: String,
    pub batch_size: usize,
    /// Pause before each batch write.
    pub batch_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            hash_key: "id".into(),
            expires_attribute: "expires".into(),
            batch_size: MAX_BATCH_SIZE,
            batch_delay: Duration::ZERO,
        }
    }
}

impl SessionSettings {
    pub fn validate(self) -> Result<Self> {
        ensure!(
            (1..=MAX_BATCH_SIZE).contains(&self.batch_size),
            ConfigInvalidSnafu {
                reason: format!(
                    "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                    self.batch_size
                )
            }
        );
        ensure!(
            !self.hash_key.is_empty() && !self.expires_attribute.is_empty(),
            ConfigInvalidSnafu {
                reason: "hash_key and expires_attribute must not be empty"
            }
        );
        Ok(self)
    }
}

#[derive(Clone, Debug)]
pub struct SessionGc {
    sdk: SdkConfig,
    settings: SessionSettings,
}

impl SessionGc {
    pub fn new(sdk: SdkConfig, settings: SessionSettings) -> Self {
        SessionGc { sdk, settings }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}

impl ClientFactory for SessionGc {
    type Client = SessionGcClient;

    fn service_name(&self) -> &str {
        "DynamoDB"
    }

    fn discovery(&self) -> Discovery {
        Discovery::Static
    }

    fn operations(&self) -> &[&'static str] {
        &[COLLECT_GARBAGE]
    }

    fn connect(&self, config: &ClientConfig) -> SessionGcClient {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&self.sdk)
            .region(Region::new(config.region().to_owned()));
        if let Some(url) = config.endpoint_url() {
            builder = builder.endpoint_url(url);
        }
        SessionGcClient::new(Client::from_conf(builder.build()), self.settings.clone())
    }

    fn report(&self, identifier: &str, response: &ApiResponse) -> String {
        gc_report(identifier, response)
    }
}

/// `Deleted <n> expired sessions from <table>.`
pub fn gc_report(identifier: &str, response: &ApiResponse) -> String {
    let table = response.primary_identifier().unwrap_or(identifier);
    let deleted = response.raw_payload()["deleted"].as_u64().unwrap_or_default();
    format!("Deleted {deleted} expired sessions from {table}.")
}

/// One page of a scan for expired sessions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Where the next page starts, `None` on the last page.
    pub last_evaluated_key: Option<Item>,
}

/// The table operations garbage collection is built from.
pub trait SessionTable {
    /// Scans one page of sessions that expired at or before `now`.
    fn scan_expired(
        &self,
        table: &str,
        settings: &SessionSettings,
        now: u64,
        start_key: Option<Item>,
    ) -> impl Future<Output = Result<ScanPage>>;

    /// Deletes one batch, returning how many deletions were left unprocessed.
    fn delete_batch(&self, table: &str, keys: &[Item]) -> impl Future<Output = Result<usize>>;
}

impl SessionTable for Client {
    async fn scan_expired(
        &self,
        table: &str,
        settings: &SessionSettings,
        now: u64,
        start_key: Option<Item>,
    ) -> Result<ScanPage> {
        let out = self
            .scan()
            .table_name(table)
            .filter_expression("#expires <= :now")
            .projection_expression("#key")
            .expression_attribute_names("#expires", &settings.expires_attribute)
            .expression_attribute_names("#key", &settings.hash_key)
            .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(service_error)?;
        Ok(ScanPage {
            items: out.items().to_vec(),
            last_evaluated_key: out.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }

    async fn delete_batch(&self, table: &str, keys: &[Item]) -> Result<usize> {
        let requests = delete_requests(keys)?;
        let out = self
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(service_error)?;
        Ok(out
            .unprocessed_items()
            .and_then(|items| items.get(table))
            .map_or(0, Vec::len))
    }
}

pub struct SessionGcClient<T = Client> {
    store: T,
    settings: SessionSettings,
}

impl<T> SessionGcClient<T> {
    pub fn new(store: T, settings: SessionSettings) -> Self {
        SessionGcClient { store, settings }
    }
}

impl<T: SessionTable> ServiceClient for SessionGcClient<T> {
    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse> {
        match request.operation_name() {
            COLLECT_GARBAGE => self.collect_garbage(request.str_param("id")?).await,
            operation => InvalidArgumentSnafu {
                reason: format!("DynamoDB does not support the operation '{operation}'"),
            }
            .fail(),
        }
    }
}

/// Running totals of one garbage collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcTally {
    pub expired: usize,
    pub deleted: usize,
    pub unprocessed: usize,
    pub batches: usize,
}

impl GcTally {
    fn record_batch(&mut self, size: usize, unprocessed: usize) {
        self.batches += 1;
        self.unprocessed += unprocessed;
        self.deleted += size.saturating_sub(unprocessed);
    }

    fn payload(&self, table: &str) -> serde_json::Value {
        serde_json::json!({
            "table": table,
            "expired": self.expired,
            "deleted": self.deleted,
            "unprocessed": self.unprocessed,
            "batches": self.batches,
        })
    }
}

impl<T: SessionTable> SessionGcClient<T> {
    async fn collect_garbage(&self, table: &str) -> Result<ApiResponse> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let keys = self.expired_keys(table, now).await?;
        let mut tally = GcTally {
            expired: keys.len(),
            ..Default::default()
        };
        log::info!("found {} expired sessions in {table}", keys.len());

        for batch in keys.chunks(self.settings.batch_size) {
            if !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
            let unprocessed = match self.store.delete_batch(table, batch).await {
                Ok(unprocessed) => unprocessed,
                Err(e) => {
                    log::warn!("garbage collection of {table} stopped early, {tally:?}: {e}");
                    return Err(e);
                }
            };
            if unprocessed > 0 {
                log::warn!("{unprocessed} deletions in {table} were left unprocessed");
            }
            tally.record_batch(batch.len(), unprocessed);
        }

        Ok(ApiResponse::new(Some(table.to_owned()), tally.payload(table)))
    }

    /// Collects the keys of every expired session, following pagination
    /// until the table is exhausted.
    async fn expired_keys(&self, table: &str, now: u64) -> Result<Vec<Item>> {
        let mut keys = vec![];
        let mut start_key = None;
        loop {
            let page = self
                .store
                .scan_expired(table, &self.settings, now, start_key.take())
                .await?;
            keys.extend(session_keys(&page.items, &self.settings.hash_key));
            match page.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }
        Ok(keys)
    }
}

/// Reduces scanned items to their primary keys. Items missing the hash key
/// cannot be deleted and are skipped.
pub fn session_keys(items: &[Item], hash_key: &str) -> Vec<Item> {
    items
        .iter()
        .filter_map(|item| {
            let value = item.get(hash_key)?;
            Some(HashMap::from([(hash_key.to_owned(), value.clone())]))
        })
        .collect()
}

fn delete_requests(keys: &[Item]) -> Result<Vec<WriteRequest>> {
    keys.iter()
        .map(|key| {
            let delete = DeleteRequest::builder()
                .set_key(Some(key.clone()))
                .build()
                .map_err(|e| {
                    BuildRequestSnafu {
                        service: "DynamoDB",
                        message: e.to_string(),
                    }
                    .build()
                })?;
            Ok(WriteRequest::builder().delete_request(delete).build())
        })
        .collect()
}
