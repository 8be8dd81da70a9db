//! Supplier simulator: generates random deliveries from the bakery catalog
//! and runs them through the restock service, once or on an interval.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info};

use quitute_inventory::{Catalog, RestockEntry};

use crate::error::ServiceError;
use crate::services::{RestockService, RestockSummary};
use crate::store::StockLedger;

/// Simulator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// How many distinct items a random delivery contains (inclusive range).
    pub min_items: usize,
    pub max_items: usize,
    /// Units per delivered item (inclusive range).
    pub min_quantity: i64,
    pub max_quantity: i64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_items: 1,
            max_items: 10,
            min_quantity: 2,
            max_quantity: 15,
        }
    }
}

impl SimulatorConfig {
    pub fn with_items(mut self, min: usize, max: usize) -> Self {
        self.min_items = min;
        self.max_items = max.max(min);
        self
    }

    pub fn with_quantities(mut self, min: i64, max: i64) -> Self {
        self.min_quantity = min.max(1);
        self.max_quantity = max.max(self.min_quantity);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub entries: Vec<RestockEntry>,
    pub summary: RestockSummary,
}

pub struct SupplierSimulator<S: ?Sized> {
    restock: Arc<RestockService<S>>,
    catalog: Catalog,
    config: SimulatorConfig,
}

impl<S> SupplierSimulator<S>
where
    S: StockLedger + ?Sized + 'static,
{
    pub fn new(restock: Arc<RestockService<S>>, catalog: Catalog, config: SimulatorConfig) -> Self {
        Self {
            restock,
            catalog,
            config,
        }
    }

    /// Pick distinct catalog items with random quantities.
    ///
    /// `num_items` overrides the random count and is capped at the catalog size.
    pub fn generate(&self, num_items: Option<usize>) -> Vec<RestockEntry> {
        let mut rng = rand::thread_rng();
        let available = self.catalog.len();
        let count = match num_items {
            Some(n) => n,
            None => rng.gen_range(self.config.min_items..=self.config.max_items),
        }
        .min(available);

        let picked: Vec<_> = self
            .catalog
            .entries()
            .choose_multiple(&mut rng, count)
            .collect();
        picked
            .into_iter()
            .map(|entry| RestockEntry {
                item_id: entry.item_id,
                name: entry.name.clone(),
                quantity: rng.gen_range(self.config.min_quantity..=self.config.max_quantity),
            })
            .collect()
    }

    /// Generate one random delivery and restock it.
    pub async fn simulate(&self, num_items: Option<usize>) -> Result<SimulationOutcome, ServiceError> {
        let entries = self.generate(num_items);
        if entries.is_empty() {
            return Err(ServiceError::Validation(
                "delivery must contain at least one item".to_string(),
            ));
        }
        info!(items = entries.len(), "simulated supplier delivery");
        let summary = self.restock.restock(entries.clone()).await?;
        Ok(SimulationOutcome { entries, summary })
    }

    /// Restock every catalog item with its standard quantity.
    pub async fn standard_delivery(&self) -> Result<RestockSummary, ServiceError> {
        let entries = self.catalog.standard_delivery()?;
        info!(items = entries.len(), "standard supplier delivery");
        self.restock.restock(entries).await
    }

    /// Run [`Self::simulate`] every `interval` until the task is aborted.
    pub fn run_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()>
    where
        S: Send + Sync,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = self.simulate(None).await {
                    error!(error = %err, "periodic supplier delivery failed");
                }
            }
        })
    }
}
