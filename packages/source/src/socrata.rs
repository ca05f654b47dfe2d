//! Shared Socrata SODA API fetcher.
//!
//! Handles paginated fetching from any Socrata dataset using the `$limit`,
//! `$offset`, `$order`, and `$where` query parameters.

use crate::SourceError;

/// Configuration for a Socrata fetch operation.
pub struct SocrataConfig<'a> {
    /// Base API URL (e.g., `"https://data.cityofnewyork.us/resource/h9gi-nx95.json"`).
    pub api_url: &'a str,
    /// The date column used for ordering.
    pub date_column: &'a str,
    /// Optional `$select` column list.
    pub select: Option<&'a str>,
    /// Optional `$where` clause restricting the rows returned.
    pub where_clause: Option<&'a str>,
    /// Label for log messages (e.g., `"nyc"`).
    pub label: &'a str,
    /// Page size for pagination.
    pub page_size: u64,
}

/// Fetches up to `limit` raw records from a Socrata dataset, newest first.
///
/// # Errors
///
/// Returns [`SourceError`] if any page request fails, returns a non-success
/// status, or does not decode as a JSON array.
pub async fn fetch_socrata(
    client: &reqwest::Client,
    config: &SocrataConfig<'_>,
    limit: u64,
) -> Result<Vec<serde_json::Value>, SourceError> {
    let mut all_records: Vec<serde_json::Value> = Vec::new();
    let mut offset: u64 = 0;
    let order = format!("{} DESC", config.date_column);
    let page_size = config.page_size.max(1);

    loop {
        let remaining = limit.saturating_sub(offset);
        if remaining == 0 {
            break;
        }
        let page_limit = remaining.min(page_size);

        let mut query: Vec<(&str, String)> = vec![
            ("$limit", page_limit.to_string()),
            ("$offset", offset.to_string()),
            ("$order", order.clone()),
        ];
        if let Some(select) = config.select {
            query.push(("$select", select.to_string()));
        }
        if let Some(where_clause) = config.where_clause {
            query.push(("$where", where_clause.to_string()));
        }

        log::info!(
            "Fetching {} data: offset={offset}, limit={page_limit}",
            config.label
        );
        let response = client
            .get(config.api_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        let records: Vec<serde_json::Value> = response.json().await?;

        let count = records.len() as u64;
        if count == 0 {
            break;
        }

        all_records.extend(records);
        offset += count;

        if count < page_limit {
            break;
        }
    }

    log::info!(
        "Downloaded {} {} records total",
        all_records.len(),
        config.label
    );

    Ok(all_records)
}
