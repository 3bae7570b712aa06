use std::cmp::Ordering;

use bstock_client::types::{CheckResult, ResultMap, TrackedItem};
use serde::Serialize;

pub mod poller;
pub mod scheduler;

/// A stored result joined with its item, as shown in listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub result: CheckResult,
}

/// Available results first, then newest first.
pub fn sorted_results(results: &ResultMap, items: &[TrackedItem]) -> Vec<ResultRow> {
    let mut rows: Vec<ResultRow> = results
        .iter()
        .map(|(id, result)| {
            let item = items.iter().find(|item| &item.id == id);
            ResultRow {
                id: id.clone(),
                name: item.and_then(|item| item.name.clone()),
                url: item.map(|item| item.url.clone()),
                result: result.clone(),
            }
        })
        .collect();
    rows.sort_by(|a, b| match (a.result.is_available(), b.result.is_available()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => b.result.timestamp.cmp(&a.result.timestamp),
    });
    rows
}

/// Badge count: results currently reporting secondary stock.
pub fn available_count(results: &ResultMap) -> usize {
    results.values().filter(|result| result.is_available()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstock_client::types::CheckStatus;
    use time::{Duration, OffsetDateTime};

    fn result_at(status: CheckStatus, minutes_ago: i64) -> CheckResult {
        let mut result = CheckResult::new(status, "");
        result.timestamp = OffsetDateTime::UNIX_EPOCH + Duration::days(1) - Duration::minutes(minutes_ago);
        result
    }

    #[test]
    fn available_rows_sort_first_then_newest() {
        let results: ResultMap = [
            ("old".to_string(), result_at(CheckStatus::Unavailable, 30)),
            ("new".to_string(), result_at(CheckStatus::Unavailable, 1)),
            ("hit".to_string(), result_at(CheckStatus::Available, 60)),
        ]
        .into_iter()
        .collect();

        let order: Vec<_> = sorted_results(&results, &[])
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(order, ["hit", "new", "old"]);
        assert_eq!(available_count(&results), 1);
    }
}
