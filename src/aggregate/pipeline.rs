//! Count and facet pipeline builders

use serde_json::{json, Map, Value};

use crate::filter::CompiledPredicate;

/// Output field of the count stage
pub const TOTAL_RECORDS_FIELD: &str = "total_records";

fn match_stage(predicate: Option<&CompiledPredicate>) -> Value {
    let filter = predicate
        .map(|p| p.document().clone())
        .unwrap_or_else(|| Value::Object(Map::new()));
    json!({ "$match": filter })
}

/// `$match` → optional `$skip` → `$count`.
///
/// `from` is floored; a non-positive or non-finite offset adds no skip stage.
pub fn build_count(predicate: Option<&CompiledPredicate>, from: Option<f64>) -> Vec<Value> {
    let mut pipeline = vec![match_stage(predicate)];
    if let Some(from) = from.filter(|f| f.is_finite()) {
        let skip = from.floor();
        if skip > 0.0 {
            pipeline.push(json!({ "$skip": skip as u64 }));
        }
    }
    pipeline.push(json!({ "$count": TOTAL_RECORDS_FIELD }));
    pipeline
}

/// Optional `$match` → `$group` on the facet field with a per-group count
pub fn build_facets(predicate: Option<&CompiledPredicate>, field: &str) -> Vec<Value> {
    let mut pipeline = Vec::with_capacity(2);
    if predicate.is_some() {
        pipeline.push(match_stage(predicate));
    }
    pipeline.push(json!({
        "$group": {
            "_id": format!("${}", field),
            "count": { "$sum": 1 }
        }
    }));
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate() -> CompiledPredicate {
        CompiledPredicate::new(json!({"locus": "TRB"}))
    }

    #[test]
    fn test_count_without_predicate_matches_all() {
        let pipeline = build_count(None, None);
        assert_eq!(
            pipeline,
            vec![json!({"$match": {}}), json!({"$count": "total_records"})]
        );
    }

    #[test]
    fn test_count_skip_is_floored() {
        let p = predicate();
        let pipeline = build_count(Some(&p), Some(10.7));
        assert_eq!(pipeline[0], json!({"$match": {"locus": "TRB"}}));
        assert_eq!(pipeline[1], json!({"$skip": 10}));
        assert_eq!(pipeline.len(), 3);
    }

    #[test]
    fn test_count_zero_or_negative_offset_has_no_skip() {
        assert_eq!(build_count(None, Some(0.4)).len(), 2);
        assert_eq!(build_count(None, Some(-3.0)).len(), 2);
        assert_eq!(build_count(None, Some(f64::NAN)).len(), 2);
    }

    #[test]
    fn test_facets_pipeline() {
        assert_eq!(
            build_facets(None, "v_call"),
            vec![json!({"$group": {"_id": "$v_call", "count": {"$sum": 1}}})]
        );
        let p = predicate();
        let pipeline = build_facets(Some(&p), "v_call");
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[0], json!({"$match": {"locus": "TRB"}}));
    }
}
