// src/ingest/providers/mod.rs
pub mod json_feed;

use std::sync::Arc;

use crate::ingest::config::ProviderCfg;
use crate::ingest::DynAdapter;

/// Build one HTTP adapter per configured provider.
pub fn build_adapters(cfgs: &[ProviderCfg]) -> anyhow::Result<Vec<DynAdapter>> {
    cfgs.iter()
        .map(|c| {
            let p = json_feed::JsonFeedProvider::from_cfg(c)?;
            Ok(Arc::new(p) as DynAdapter)
        })
        .collect()
}
