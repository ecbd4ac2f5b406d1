// src/fetch/login.rs

use quick_xml::{escape::escape, events::Event, Reader};
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{config::Credentials, Error, Result};

/// An authenticated connection to one CRM instance. Created once per batch,
/// passed to every extraction, then closed.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) client: Client,
    instance_url: Url,
    session_id: String,
    api_version: String,
}

impl Session {
    /// Partner SOAP login with username and password + security token.
    #[instrument(level = "info", skip(client, creds), fields(user = %creds.username))]
    pub async fn login(
        client: &Client,
        login_url: &str,
        api_version: &str,
        creds: &Credentials,
    ) -> Result<Self> {
        let url = format!(
            "{}/services/Soap/u/{}",
            login_url.trim_end_matches('/'),
            api_version
        );
        let resp = client
            .post(&url)
            .header(CONTENT_TYPE, "text/xml; charset=UTF-8")
            .header("SOAPAction", "login")
            .body(login_envelope(creds))
            .send()
            .await
            .map_err(|e| Error::unavailable(&format!("POST {}", url), e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::unavailable("reading login response", e))?;

        let (session_id, server_url) = parse_login_response(&body).map_err(|e| match e {
            Error::SourceUnavailable(msg) if !status.is_success() => {
                Error::SourceUnavailable(format!("login failed ({}): {}", status, msg))
            }
            other => other,
        })?;
        let instance_url = server_url
            .join("/")
            .map_err(|e| Error::unavailable("resolving instance URL", e))?;

        info!(instance = %instance_url, "logged in");
        Ok(Self::from_parts(
            client.clone(),
            instance_url,
            session_id,
            api_version,
        ))
    }

    /// Wrap an existing session id, e.g. one obtained out of band.
    pub fn from_parts(
        client: Client,
        instance_url: Url,
        session_id: impl Into<String>,
        api_version: &str,
    ) -> Self {
        Self {
            client,
            instance_url,
            session_id: session_id.into(),
            api_version: api_version.to_string(),
        }
    }

    pub fn instance_url(&self) -> &Url {
        &self.instance_url
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    /// `<instance>/services/data/v<version>/<path>`
    pub(crate) fn data_url(&self, path: &str) -> Result<Url> {
        self.instance_url
            .join(&format!("services/data/v{}/{}", self.api_version, path))
            .map_err(|e| Error::unavailable("building data URL", e))
    }

    /// Revoke the session token. Failure is logged, never returned.
    #[instrument(level = "info", skip(self))]
    pub async fn close(self) {
        let url = match self.instance_url.join("services/oauth2/revoke") {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "cannot build revoke URL");
                return;
            }
        };
        let result = self
            .client
            .post(url)
            .form(&[("token", self.session_id.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => debug!("session revoked"),
            Err(e) => warn!(error = %e, "session revoke failed"),
        }
    }
}

fn login_envelope(creds: &Credentials) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:env="http://schemas.xmlsoap.org/soap/envelope/" xmlns:urn="urn:partner.soap.sforce.com">
  <env:Header>
    <urn:CallOptions>
      <urn:client>crmscraper</urn:client>
      <urn:defaultNamespace>sf</urn:defaultNamespace>
    </urn:CallOptions>
  </env:Header>
  <env:Body>
    <n1:login xmlns:n1="urn:partner.soap.sforce.com">
      <n1:username>{}</n1:username>
      <n1:password>{}{}</n1:password>
    </n1:login>
  </env:Body>
</env:Envelope>"#,
        escape(creds.username.as_str()),
        escape(creds.password.as_str()),
        escape(creds.security_token.as_str()),
    )
}

/// Unescaped text of the login response elements we care about.
#[derive(Debug, Default)]
struct LoginFields {
    session_id: Option<String>,
    server_url: Option<String>,
    fault: Option<String>,
}

fn read_login_fields(body: &str) -> Result<LoginFields> {
    let mut reader = Reader::from_str(body);
    let mut fields = LoginFields::default();
    let mut open: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => open = Some(e.local_name().as_ref().to_vec()),
            Ok(Event::End(_)) => open = None,
            Ok(Event::Text(t)) => {
                let slot = match open.as_deref() {
                    Some(b"sessionId") => &mut fields.session_id,
                    Some(b"serverUrl") => &mut fields.server_url,
                    Some(b"faultstring") => &mut fields.fault,
                    _ => continue,
                };
                let text = t
                    .unescape()
                    .map_err(|e| Error::unavailable("decoding login response", e))?;
                slot.get_or_insert_with(String::new).push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::unavailable("parsing login response", e)),
            _ => {}
        }
    }
    Ok(fields)
}

/// Pull `(sessionId, serverUrl)` out of a login response, or the SOAP fault.
fn parse_login_response(body: &str) -> Result<(String, Url)> {
    let fields = read_login_fields(body)?;
    if let Some(fault) = fields.fault {
        return Err(Error::SourceUnavailable(format!(
            "login rejected: {}",
            fault.trim()
        )));
    }
    let session_id = fields
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::SourceUnavailable("login response has no sessionId".into()))?;
    let server_url = fields
        .server_url
        .ok_or_else(|| Error::SourceUnavailable("login response has no serverUrl".into()))?;
    let server_url =
        Url::parse(server_url.trim()).map_err(|e| Error::unavailable("parsing serverUrl", e))?;
    Ok((session_id, server_url))
}
