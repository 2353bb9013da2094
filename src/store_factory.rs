use std::sync::Arc;

use crate::config;
use crate::memstore;
use crate::prelude;

pub async fn create_store(cfg: &config::StoreConfig)
    -> std::io::Result<Arc<dyn prelude::Database>>
{
    match cfg.name.as_str() {
        "mem" => memstore::build_store_mem(cfg),
        #[cfg(feature = "rocks")]
        "rocks" => crate::rocksstore::build_store_rocks(cfg),
        #[cfg(feature = "mongo")]
        "mongo" => crate::mongostore::build_store_mongo(cfg).await,
        unsupported_store_name => {
            Err(std::io::Error::new(std::io::ErrorKind::InvalidInput,
                    std::format!("Unsupported store name {}",
                                 unsupported_store_name)))
        }
    }
}
