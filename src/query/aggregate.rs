//! Result aggregation.
//!
//! Builds the response envelope from a backend's per-sub-query results in one pass.
//!
//! Policy, kept for existing callers:
//! - the envelope message is the message of the LAST errored result, in result order;
//! - the batch status is 400 when ANY result carries an error, even if the others
//!   succeeded;
//! - results sharing a ref id replace each other, and the status still counts the
//!   replaced ones.

use crate::query::model::{BatchStatus, QueryBatchResponse, QueryResult, ResultMap};

/// Fold per-sub-query results into the response envelope.
pub fn aggregate(results: Vec<QueryResult>) -> QueryBatchResponse {
    let (results, message, any_error) = results.into_iter().map(stringify_error).fold(
        (ResultMap::new(), None, false),
        |(mut results, message, any_error), result| {
            let message = result.error_string.clone().or(message);
            let any_error = any_error || result.error_string.is_some();
            results.insert(result);
            (results, message, any_error)
        },
    );

    QueryBatchResponse {
        results,
        message,
        status: if any_error { BatchStatus::BadRequest } else { BatchStatus::Ok },
    }
}

fn stringify_error(result: QueryResult) -> QueryResult {
    let error_string = result.error.as_ref().map(ToString::to_string);
    QueryResult { error_string, ..result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::model::SubQueryError;

    #[test]
    fn test_all_ok() {
        let resp = aggregate(vec![QueryResult::new("A"), QueryResult::new("B")]);
        assert_eq!(resp.status, BatchStatus::Ok);
        assert_eq!(resp.message, None);
        assert_eq!(resp.results.len(), 2);
    }

    #[test]
    fn test_empty_backend_response() {
        let resp = aggregate(Vec::new());
        assert_eq!(resp.status, BatchStatus::Ok);
        assert!(resp.results.is_empty());
    }

    #[test]
    fn test_last_error_wins() {
        let resp = aggregate(vec![
            QueryResult::new("A").with_error(SubQueryError::query("first")),
            QueryResult::new("B"),
            QueryResult::new("C").with_error(SubQueryError::query("second")),
        ]);
        assert_eq!(resp.status, BatchStatus::BadRequest);
        assert_eq!(resp.message.as_deref(), Some("second"));
        assert_eq!(resp.results.get("A").unwrap().error_string.as_deref(), Some("first"));
        assert_eq!(resp.results.get("B").unwrap().error_string, None);
        assert_eq!(resp.results.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_replaced_error_still_degrades_status() {
        let resp = aggregate(vec![
            QueryResult::new("A").with_error(SubQueryError::query("lost")),
            QueryResult::new("A"),
        ]);
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results.get("A").unwrap().error_string, None);
        assert_eq!(resp.status, BatchStatus::BadRequest);
        assert_eq!(resp.message.as_deref(), Some("lost"));
    }
}
