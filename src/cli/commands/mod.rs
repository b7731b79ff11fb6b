use anyhow::Result;
use std::sync::Arc;

use docflow::{
    DocflowConfig, FsBlobStore, HttpDocumentFetcher, OfficeConverter, Services,
    SqliteActivityStore, SystemClock,
};

pub mod drain;
pub mod list;
pub mod logs;
pub mod reset;
pub mod run;
pub mod submit;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

pub async fn open_store(config: &DocflowConfig) -> Result<Arc<SqliteActivityStore>> {
    let store = SqliteActivityStore::connect(&config.database).await?;
    Ok(Arc::new(store))
}

/// Production wiring: SQLite store, filesystem blobs, HTTP fetcher and the
/// office converter
pub fn services(config: &DocflowConfig, store: Arc<SqliteActivityStore>) -> Services {
    Services {
        store,
        blobs: Arc::new(FsBlobStore::from_config(&config.storage)),
        fetcher: Arc::new(HttpDocumentFetcher::default()),
        converter: Arc::new(OfficeConverter::new(&config.conversion)),
        clock: Arc::new(SystemClock),
    }
}
