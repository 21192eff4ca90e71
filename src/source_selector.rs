//! Source Selector
//!
//! Ranks inventory descriptors against an intent and keeps the best three.

use crate::intent::{Intent, MetricTag, QueryType};
use crate::inventory::{DatasetCategory, GeoGranularity, Inventory, SourceDescriptor};
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, warn};

pub const MAX_SOURCES: usize = 3;

pub struct SourceSelector {
    inventory: Arc<Inventory>,
}

impl SourceSelector {
    pub fn new(inventory: Arc<Inventory>) -> Self {
        Self { inventory }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Select at most three descriptors, best first. Empty only when the
    /// inventory itself is empty.
    pub fn select(&self, intent: &Intent) -> Vec<SourceDescriptor> {
        let categories = wanted_categories(intent);

        let mut candidates: Vec<SourceDescriptor> = categories
            .iter()
            .flat_map(|category| self.inventory.by_category(*category))
            .filter(|source| !(source.category == DatasetCategory::Climate && source.is_registration_gated()))
            .cloned()
            .collect();

        if candidates.is_empty() {
            warn!("No dataset matched the question, falling back to agriculture datasets");
            candidates = self
                .inventory
                .by_category(DatasetCategory::Agriculture)
                .cloned()
                .collect();
        }
        if candidates.is_empty() {
            candidates = self.inventory.sources().to_vec();
        }

        for source in candidates.iter_mut() {
            source.priority = priority_for(intent, source);
        }
        // sort_by_key is stable, so inventory order breaks ties
        candidates.sort_by_key(|source| source.priority);

        let selected: Vec<SourceDescriptor> = candidates
            .into_iter()
            .unique_by(|source| source.dataset_id.clone())
            .take(MAX_SOURCES)
            .collect();

        debug!(
            "Selected sources: {:?}",
            selected.iter().map(|s| s.dataset_id.as_str()).collect::<Vec<_>>()
        );
        selected
    }
}

/// Dataset families implied by the metric tags, in metric order.
fn wanted_categories(intent: &Intent) -> Vec<DatasetCategory> {
    let mut categories = Vec::new();
    let mut add = |category: DatasetCategory| {
        if !categories.contains(&category) {
            categories.push(category);
        }
    };

    for metric in &intent.metrics {
        match metric {
            MetricTag::Price => add(DatasetCategory::Live),
            MetricTag::Production | MetricTag::Area => add(DatasetCategory::Agriculture),
            MetricTag::Rainfall | MetricTag::Temperature => add(DatasetCategory::Climate),
            MetricTag::Correlation => {}
        }
    }
    if intent.query_type == QueryType::Current {
        add(DatasetCategory::Live);
    }
    if intent.query_type == QueryType::Correlation {
        add(DatasetCategory::Agriculture);
        add(DatasetCategory::Climate);
    }
    categories
}

fn priority_for(intent: &Intent, source: &SourceDescriptor) -> u8 {
    let granularity = source.geo_granularity;
    if !intent.districts.is_empty() && granularity == GeoGranularity::District {
        1
    } else if !intent.states.is_empty()
        && matches!(granularity, GeoGranularity::State | GeoGranularity::District)
    {
        2
    } else {
        3
    }
}
