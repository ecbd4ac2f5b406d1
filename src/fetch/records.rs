// src/fetch/records.rs

use reqwest::{header::ACCEPT, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use tracing::{debug, info, instrument};
use url::Url;

use super::{login::Session, Extractor, Query};
use crate::{Error, Result, Table, Value};

/// Remote error codes that mean the query itself is wrong.
static QUERY_ERROR_CODES: &[&str] = &[
    "INVALID_FIELD",
    "INVALID_TYPE",
    "MALFORMED_QUERY",
    "INVALID_QUERY_FILTER_OPERATOR",
];

/// Metadata envelope the API attaches to every record.
const ATTRIBUTES: &str = "attributes";

/// One page of a query result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryPage {
    done: bool,
    #[serde(default)]
    records: Vec<Map<String, Json>>,
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    #[serde(default)]
    message: String,
    error_code: String,
}

/// Extractor backed by the CRM's REST query endpoint.
pub struct SalesforceExtractor {
    session: Session,
}

impl SalesforceExtractor {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    async fn get_page(&self, url: &Url) -> Result<QueryPage> {
        let resp = self
            .session
            .client
            .get(url.clone())
            .bearer_auth(self.session.session_id())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::unavailable(&format!("GET {}", url.path()), e))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<QueryPage>()
                .await
                .map_err(|e| Error::unavailable("decoding query page", e));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

impl Extractor for SalesforceExtractor {
    #[instrument(level = "info", skip(self, query), fields(object = %query.object))]
    async fn fetch(&self, query: &Query) -> Result<Table> {
        let soql = query.to_soql()?;
        let mut url = self.session.data_url("query/")?;
        url.query_pairs_mut().append_pair("q", &soql);

        let mut table = Table::new(query.fields.iter().cloned());
        let mut pages = 0usize;
        loop {
            pages += 1;
            let page = self.get_page(&url).await?;
            debug!(page = pages, records = page.records.len(), done = page.done, "page");
            for record in &page.records {
                table.push_row(record_to_row(record, &query.fields));
            }

            match (page.done, page.next_records_url) {
                (true, _) => break,
                (false, Some(next)) => {
                    url = self
                        .session
                        .instance_url()
                        .join(&next)
                        .map_err(|e| Error::unavailable("resolving nextRecordsUrl", e))?;
                }
                (false, None) => {
                    return Err(Error::SourceUnavailable(format!(
                        "page {} of {} is not final but has no nextRecordsUrl",
                        pages, query.object
                    )))
                }
            }
        }

        info!(rows = table.len(), pages, "fetched {}", query.object);
        Ok(table)
    }
}

/// Map a non-success response onto the error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> Error {
    let errors: Vec<ApiError> = serde_json::from_str(body).unwrap_or_default();

    if let Some(e) = errors
        .iter()
        .find(|e| QUERY_ERROR_CODES.contains(&e.error_code.as_str()))
    {
        return Error::QuerySyntax(format!("{}: {}", e.error_code, e.message));
    }

    let detail = errors
        .first()
        .map(|e| format!("{}: {}", e.error_code, e.message))
        .unwrap_or_else(|| body.trim().chars().take(200).collect());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::SourceUnavailable(format!("session rejected ({}): {}", status, detail))
        }
        _ => Error::SourceUnavailable(format!("HTTP {}: {}", status, detail)),
    }
}

/// Project one API record onto the requested columns, dropping the envelope.
fn record_to_row(record: &Map<String, Json>, fields: &[String]) -> Vec<Value> {
    fields
        .iter()
        .map(|field| match lookup(record, field) {
            None => Value::Null,
            Some(Json::Object(nested)) => {
                let mut nested = nested.clone();
                nested.remove(ATTRIBUTES);
                Value::from_json(&Json::Object(nested))
            }
            Some(v) => Value::from_json(v),
        })
        .collect()
}

/// Resolve `A.B.C` through nested relationship objects. Names match exactly
/// first, then case-insensitively, since the API echoes its own casing.
fn lookup<'a>(record: &'a Map<String, Json>, path: &str) -> Option<&'a Json> {
    let mut parts = path.split('.');
    let mut current = get_field(record, parts.next()?)?;
    for part in parts {
        current = get_field(current.as_object()?, part)?;
    }
    Some(current)
}

fn get_field<'a>(obj: &'a Map<String, Json>, name: &str) -> Option<&'a Json> {
    obj.get(name).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}
