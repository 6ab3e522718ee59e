//! Ordered source registry with atomically swapped priority lists.
//!
//! Readers take a consistent snapshot of the current order; the single
//! writer (the reorder task) publishes a new list per adjustment. A source
//! moves at most one position per evaluation cycle.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use kehai_core::fetcher::QuoteFetcher;
use kehai_types::DataType;

struct TypedSources {
    fetchers: HashMap<&'static str, Arc<dyn QuoteFetcher>>,
    order: ArcSwap<Vec<&'static str>>,
}

/// Registry of upstream fetchers, ordered per data type.
pub struct SourceRegistry {
    by_type: HashMap<DataType, TypedSources>,
}

impl SourceRegistry {
    /// Build the registry, ordering each data type's sources by their
    /// default priority (ties keep registration order).
    #[must_use]
    pub fn new(fetchers: Vec<Arc<dyn QuoteFetcher>>) -> Self {
        let mut grouped: HashMap<DataType, Vec<Arc<dyn QuoteFetcher>>> = HashMap::new();
        for f in fetchers {
            grouped.entry(f.data_type()).or_default().push(f);
        }

        let by_type = grouped
            .into_iter()
            .map(|(data_type, mut sources)| {
                sources.sort_by_key(|f| f.default_priority());
                let order: Vec<&'static str> = sources.iter().map(|f| f.id()).collect();
                let fetchers = sources.into_iter().map(|f| (f.id(), f)).collect();
                (
                    data_type,
                    TypedSources {
                        fetchers,
                        order: ArcSwap::from_pointee(order),
                    },
                )
            })
            .collect();

        Self { by_type }
    }

    /// Data types with at least one registered source.
    #[must_use]
    pub fn data_types(&self) -> Vec<DataType> {
        DataType::ALL
            .into_iter()
            .filter(|dt| self.by_type.contains_key(dt))
            .collect()
    }

    /// Snapshot of the current source order for one data type.
    #[must_use]
    pub fn order_for(&self, data_type: DataType) -> Vec<&'static str> {
        self.by_type
            .get(&data_type)
            .map(|t| t.order.load().as_ref().clone())
            .unwrap_or_default()
    }

    /// Fetchers for one data type, in current priority order.
    #[must_use]
    pub fn sources_for(&self, data_type: DataType) -> Vec<Arc<dyn QuoteFetcher>> {
        let Some(typed) = self.by_type.get(&data_type) else {
            return Vec::new();
        };
        let order = typed.order.load();
        order
            .iter()
            .filter_map(|id| typed.fetchers.get(id).cloned())
            .collect()
    }

    /// Move one source by one position: `+1` promotes (towards the front),
    /// `-1` demotes. Out-of-range moves and unknown ids are no-ops.
    pub fn reorder(&self, data_type: DataType, source_id: &str, delta: i32) {
        let Some(typed) = self.by_type.get(&data_type) else {
            return;
        };
        let current = typed.order.load_full();
        let Some(idx) = current.iter().position(|id| *id == source_id) else {
            return;
        };
        let swapped_with = match delta {
            1 if idx > 0 => idx - 1,
            -1 if idx + 1 < current.len() => idx + 1,
            _ => return,
        };

        let mut next = current.as_ref().clone();
        next.swap(idx, swapped_with);
        info!(
            target = "kehai::registry",
            event = "reorder",
            data_type = %data_type,
            source = source_id,
            from = idx,
            to = swapped_with,
            "priority list updated"
        );
        typed.order.store(Arc::new(next));
    }
}
