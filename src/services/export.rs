use std::borrow::Cow;

use futures::Stream;

use crate::db::Store;
use crate::entities::{search_queries, search_results};

/// Fixed column order of the export document.
pub const EXPORT_HEADER: &str = "user_input,generated_query,name,snippet,linkedin_url,created_time";

/// Rows fetched per chunk while streaming; keeps memory flat regardless of
/// how many results a query has accumulated.
const EXPORT_CHUNK: u64 = 200;

struct ExportCursor {
    store: Store,
    query: search_queries::Model,
    offset: u64,
    header_sent: bool,
}

/// Stream a query's results as CSV, header row first, one row per stored
/// result. The caller can abandon the stream at any point; nothing is
/// written server-side.
pub fn csv_stream(
    store: Store,
    query: search_queries::Model,
) -> impl Stream<Item = Result<String, anyhow::Error>> + Send + 'static {
    let cursor = ExportCursor {
        store,
        query,
        offset: 0,
        header_sent: false,
    };

    futures::stream::try_unfold(cursor, |mut cursor| async move {
        if !cursor.header_sent {
            cursor.header_sent = true;
            return Ok(Some((format!("{EXPORT_HEADER}\n"), cursor)));
        }

        let rows = cursor
            .store
            .results_chunk(cursor.query.id, cursor.offset, EXPORT_CHUNK)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        cursor.offset += rows.len() as u64;

        let mut out = String::new();
        for row in &rows {
            write_row(&mut out, &cursor.query, row);
        }

        Ok(Some((out, cursor)))
    })
}

fn write_row(out: &mut String, query: &search_queries::Model, row: &search_results::Model) {
    let fields = [
        csv_field(&query.user_input),
        csv_field(&query.generated_query),
        csv_field(&row.title),
        csv_field(&row.snippet),
        csv_field(&row.link),
        csv_field(&row.created_at),
    ];

    out.push_str(&fields.join(","));
    out.push('\n');
}

/// Quote a field when it contains a delimiter, quote, or line break;
/// embedded quotes are doubled.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains(['"', ',', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[test]
    fn plain_fields_pass_through_unquoted() {
        assert_eq!(csv_field("plain text"), "plain text");
        assert_eq!(csv_field(""), "");
    }

    #[test]
    fn delimiters_and_quotes_are_escaped() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[tokio::test]
    async fn zero_result_export_is_header_only() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let query = store
            .create_query("rust engineers", "site:linkedin.com/in rust", 1)
            .await
            .unwrap();

        let chunks: Vec<String> = csv_stream(store, query).try_collect().await.unwrap();
        let body = chunks.concat();

        assert_eq!(body, format!("{EXPORT_HEADER}\n"));
    }

    #[tokio::test]
    async fn rows_project_title_and_link_into_name_and_url_columns() {
        use crate::clients::ResultItem;

        let store = Store::new("sqlite::memory:").await.unwrap();
        let query = store
            .create_query("rust engineers", "site:linkedin.com/in rust", 1)
            .await
            .unwrap();

        let items = vec![ResultItem {
            title: "Jane Doe - Rust Engineer".to_string(),
            link: "https://linkedin.com/in/janedoe".to_string(),
            snippet: "Builds storage engines, loves lifetimes".to_string(),
            display_domain: "linkedin.com".to_string(),
        }];
        store
            .insert_result_batch(query.id, &items, 1, "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        let chunks: Vec<String> = csv_stream(store, query).try_collect().await.unwrap();
        let body = chunks.concat();
        let mut lines = body.lines();

        assert_eq!(lines.next(), Some(EXPORT_HEADER));

        let row = lines.next().unwrap();
        assert!(row.starts_with("rust engineers,site:linkedin.com/in rust,"));
        assert!(row.contains("Jane Doe - Rust Engineer"));
        assert!(row.contains("https://linkedin.com/in/janedoe"));
        // Snippet contains a comma, so it must be quoted.
        assert!(row.contains("\"Builds storage engines, loves lifetimes\""));
        assert_eq!(lines.next(), None);
    }
}
