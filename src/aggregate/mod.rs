//! Aggregation subsystem for airrdb
//!
//! Builds count/facet pipelines from compiled predicates, runs them on a
//! `DocumentStore` and folds facet groups into per-value counts.

mod folder;
mod pipeline;

use serde_json::Value;

use crate::observability::{log_event_with_fields, Event};
use crate::store::{DocumentStore, StoreResult};

pub use folder::{fold_facets, FacetEntry};
pub use pipeline::{build_count, build_facets, TOTAL_RECORDS_FIELD};

/// Run a facet pipeline and fold its groups
pub fn execute_facets(
    store: &dyn DocumentStore,
    collection: &str,
    pipeline: &[Value],
    field: &str,
) -> StoreResult<Vec<FacetEntry>> {
    let records = store.aggregate(collection, pipeline)?;
    let entries = fold_facets(&records);
    log_event_with_fields(
        Event::FacetsComplete,
        &[
            ("field", field),
            ("groups", &records.len().to_string()),
            ("values", &entries.len().to_string()),
        ],
    );
    Ok(entries)
}

/// Run a count pipeline. An empty result counts as zero.
pub fn execute_count(store: &dyn DocumentStore, collection: &str, pipeline: &[Value]) -> StoreResult<u64> {
    let records = store.aggregate(collection, pipeline)?;
    let total = records
        .first()
        .and_then(|r| r.get(TOTAL_RECORDS_FIELD))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    log_event_with_fields(Event::CountComplete, &[("total_records", &total.to_string())]);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::CompiledPredicate;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_many(
                "rearrangement",
                vec![
                    json!({"locus": "TRB", "v_call": ["TRBV1", "TRBV2", "TRBV1"]}),
                    json!({"locus": "TRB", "v_call": ["TRBV1", "TRBV2", "TRBV1"]}),
                    json!({"locus": "TRB", "v_call": ["TRBV1", "TRBV2", "TRBV1"]}),
                    json!({"locus": "TRB", "v_call": "TRBV1"}),
                    json!({"locus": "TRB", "v_call": "TRBV1"}),
                    json!({"locus": "TRA", "v_call": "TRAV1"}),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_execute_facets_folds_groups() {
        let store = store();
        let predicate = CompiledPredicate::new(json!({"locus": "TRB"}));
        let pipeline = build_facets(Some(&predicate), "v_call");
        let entries = execute_facets(&store, "rearrangement", &pipeline, "v_call").unwrap();
        assert_eq!(
            entries,
            vec![
                FacetEntry { value: json!("TRBV1"), count: 5 },
                FacetEntry { value: json!("TRBV2"), count: 3 },
            ]
        );
    }

    #[test]
    fn test_execute_count() {
        let store = store();
        let predicate = CompiledPredicate::new(json!({"locus": "TRB"}));
        assert_eq!(execute_count(&store, "rearrangement", &build_count(Some(&predicate), None)).unwrap(), 5);
        assert_eq!(execute_count(&store, "rearrangement", &build_count(Some(&predicate), Some(2.0))).unwrap(), 3);

        let none = CompiledPredicate::new(json!({"locus": "IGH"}));
        assert_eq!(execute_count(&store, "rearrangement", &build_count(Some(&none), None)).unwrap(), 0);
    }
}
