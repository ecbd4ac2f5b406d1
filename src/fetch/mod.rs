// src/fetch/mod.rs

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, instrument};

use crate::{
    config::{Config, Credentials},
    Error, Result, Table,
};

pub mod login;
pub mod records;

pub use login::Session;
pub use records::SalesforceExtractor;

pub const LEAD: &str = "Lead";
pub const OPPORTUNITY: &str = "Opportunity";
pub const CONTACT: &str = "Contact";

pub static LEAD_FIELDS: &[&str] = &[
    "Id",
    "Name",
    "Email",
    "MobilePhone",
    "LeadSource",
    "LeadSourceDetail__c",
    "CreatedDate",
    "Brand__c",
    "UTM_Campaign_Tag__c",
    "Status",
];

pub static OPPORTUNITY_FIELDS: &[&str] = &[
    "Id",
    "ContactId",
    "ContactFirstName__c",
    "LeadSource",
    "LeadSourceDetail__c",
    "CreatedDate",
    "CloseDate",
    "StageName",
    "Brand__c",
];

pub static CONTACT_FIELDS: &[&str] = &["Id", "Name", "MobilePhone", "Email"];

/// Objects listed by the field catalog.
pub static CATALOG_OBJECTS: &[&str] = &["Account", "Contact", "Opportunity", "Lead"];

static FIELD_CATALOG_FIELDS: &[&str] = &[
    "EntityDefinition.QualifiedApiName",
    "QualifiedApiName",
    "DataType",
];

static OBJECT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("object name regex"));
static FIELD_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)*$").expect("field path regex")
});

/// A select-style query: one object, a fixed field list and an optional filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub object: String,
    pub fields: Vec<String>,
    pub filter: Option<String>,
}

impl Query {
    pub fn new(object: &str, fields: &[&str]) -> Self {
        Self {
            object: object.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            filter: None,
        }
    }

    /// Body of the WHERE clause, without the keyword.
    pub fn filter(mut self, clause: impl Into<String>) -> Self {
        self.filter = Some(clause.into());
        self
    }

    /// Render as SOQL, rejecting names that could never resolve remotely.
    pub fn to_soql(&self) -> Result<String> {
        if !OBJECT_NAME.is_match(&self.object) {
            return Err(Error::QuerySyntax(format!(
                "invalid object name {:?}",
                self.object
            )));
        }
        if self.fields.is_empty() {
            return Err(Error::QuerySyntax(format!(
                "no fields selected from {}",
                self.object
            )));
        }
        if let Some(bad) = self.fields.iter().find(|f| !FIELD_PATH.is_match(f)) {
            return Err(Error::QuerySyntax(format!(
                "invalid field name {:?} on {}",
                bad, self.object
            )));
        }

        let mut soql = format!("SELECT {} FROM {}", self.fields.join(", "), self.object);
        if let Some(filter) = self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            soql.push_str(" WHERE ");
            soql.push_str(filter);
        }
        Ok(soql)
    }
}

pub fn leads_query() -> Query {
    Query::new(LEAD, LEAD_FIELDS)
}

pub fn opportunities_query() -> Query {
    Query::new(OPPORTUNITY, OPPORTUNITY_FIELDS)
}

pub fn contacts_query() -> Query {
    Query::new(CONTACT, CONTACT_FIELDS)
}

/// Source of raw tables. Implementations handle paging; callers always get
/// the complete result set or an error.
#[allow(async_fn_in_trait)]
pub trait Extractor {
    async fn fetch(&self, query: &Query) -> Result<Table>;
}

/// Read credentials, log in and wrap the session in an extractor.
#[instrument(level = "info", skip(config), fields(login_url = %config.login_url))]
pub async fn connect(config: &Config) -> Result<SalesforceExtractor> {
    let creds = Credentials::from_file(&config.credentials_path)?;
    let client = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .gzip(true)
        .build()
        .map_err(|e| Error::unavailable("building HTTP client", e))?;
    let session = Session::login(&client, &config.login_url, &config.api_version, &creds).await?;
    Ok(SalesforceExtractor::new(session))
}

/// `TableName, QualifiedApiName, DataType` for every field of the catalog objects.
#[instrument(level = "info", skip(extractor))]
pub async fn fetch_field_catalog<E: Extractor>(extractor: &E) -> Result<Table> {
    let objects = CATALOG_OBJECTS
        .iter()
        .map(|o| format!("'{}'", o))
        .collect::<Vec<_>>()
        .join(", ");
    let query = Query::new("FieldDefinition", FIELD_CATALOG_FIELDS)
        .filter(format!("EntityDefinition.QualifiedApiName IN ({})", objects));

    let mut table = extractor.fetch(&query).await?;
    table.rename_column(FIELD_CATALOG_FIELDS[0], "TableName")?;
    info!(fields = table.len(), "field catalog");
    Ok(table)
}
