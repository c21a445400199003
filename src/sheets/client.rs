//! Typed client for the spreadsheet REST API.
//!
//! The [`SheetStore`] trait is the seam the sync pipeline works against; the
//! live implementation talks to the Sheets values/batchUpdate endpoints and
//! resolves the spreadsheet id by name through the Drive files listing. Both
//! the bearer token and the spreadsheet id are cached lazily so construction
//! performs no network calls.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use super::auth::{JWT_GRANT_TYPE, ServiceAccountKey, Token};
use crate::config::{CONNECT_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::SheetError;
use crate::sync::rows::{SheetRow, stringify_cell};

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";
const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Properties of one tab within the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub tab_id: i64,
    pub title: String,
    /// Position within the spreadsheet; the primary tab has index 0
    pub index: usize,
}

/// Operations this job consumes from the spreadsheet service.
///
/// Implementations must keep appends strictly append-only: nothing here may
/// rewrite existing data rows except `write_header` (row 1) and `clear_tab`.
#[async_trait]
pub trait SheetStore: Send + Sync {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, SheetError>;

    async fn add_tab(&self, title: &str) -> Result<TabInfo, SheetError>;

    async fn delete_tab(&self, tab_id: i64) -> Result<(), SheetError>;

    /// All rows of a tab, header row included, as display strings.
    async fn read_rows(&self, title: &str) -> Result<Vec<Vec<String>>, SheetError>;

    /// Overwrite row 1 of the tab with the given header.
    async fn write_header(&self, title: &str, header: &[String]) -> Result<(), SheetError>;

    async fn append_rows(&self, title: &str, rows: &[SheetRow]) -> Result<(), SheetError>;

    async fn clear_tab(&self, title: &str) -> Result<(), SheetError>;
}

/// Live implementation backed by the Sheets and Drive REST APIs.
pub struct HttpSheetStore {
    inner: reqwest::Client,
    key: ServiceAccountKey,
    spreadsheet_name: String,
    token: RwLock<Option<Token>>,
    spreadsheet_id: RwLock<Option<String>>,
}

impl HttpSheetStore {
    /// Create a client for the named spreadsheet. Authentication and the
    /// spreadsheet lookup happen lazily on first use.
    pub fn new(key: ServiceAccountKey, spreadsheet_name: &str) -> Result<Self, SheetError> {
        let inner = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            inner,
            key,
            spreadsheet_name: spreadsheet_name.to_string(),
            token: RwLock::new(None),
            spreadsheet_id: RwLock::new(None),
        })
    }

    /// Current bearer token, refreshed when inside the expiry margin.
    async fn bearer(&self) -> Result<String, SheetError> {
        let now = Utc::now();
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_valid(now) {
                return Ok(token.value().to_string());
            }
        }

        let mut guard = self.token.write().await;
        // A concurrent caller may have refreshed while we waited for the lock
        if let Some(token) = guard.as_ref() {
            if token.is_valid(now) {
                return Ok(token.value().to_string());
            }
        }

        let token = self.fetch_token(now).await?;
        let value = token.value().to_string();
        *guard = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self, now: chrono::DateTime<Utc>) -> Result<Token, SheetError> {
        let assertion = self.key.signed_assertion(now)?;
        let params = [
            ("grant_type", JWT_GRANT_TYPE),
            ("assertion", assertion.as_str()),
        ];

        let res = self
            .inner
            .post(&self.key.token_uri)
            .form(&params)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SheetError::Auth(format!(
                "token exchange failed with {status}: {body}"
            )));
        }

        let body: TokenResponse = res.json().await?;
        debug!("obtained sheets bearer token");
        Ok(Token::new(body.access_token, body.expires_in, now))
    }

    /// Spreadsheet id, resolved by name through Drive on first use.
    async fn spreadsheet_id(&self) -> Result<String, SheetError> {
        if let Some(id) = self.spreadsheet_id.read().await.as_ref() {
            return Ok(id.clone());
        }

        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            self.spreadsheet_name.replace('\'', "\\'"),
            SPREADSHEET_MIME_TYPE
        );
        let req = self
            .inner
            .get(DRIVE_FILES_URL)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")]);
        let listing: DriveFileList = self.execute(req).await?;

        let id = listing
            .files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| SheetError::SpreadsheetNotFound(self.spreadsheet_name.clone()))?;

        debug!(spreadsheet = %self.spreadsheet_name, id = %id, "resolved spreadsheet");
        *self.spreadsheet_id.write().await = Some(id.clone());
        Ok(id)
    }

    /// Attach the bearer token, send, and decode, mapping every failure mode
    /// to a [`SheetError`].
    async fn execute<R: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<R, SheetError> {
        let token = self.bearer().await?;
        let res = req.bearer_auth(token).send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SheetError::Status { status, body });
        }

        let body = res.text().await?;
        trace!(%body, "sheets response");
        serde_json::from_str(&body).map_err(|e| SheetError::Malformed(e.to_string()))
    }

    /// Build `{base}/{id}{suffix}` with the id as an encoded path segment.
    fn sheet_url(&self, id: &str, segments: &[&str]) -> Result<Url, SheetError> {
        let mut url = Url::parse(SHEETS_BASE_URL)
            .map_err(|e| SheetError::Malformed(format!("invalid base url: {e}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SheetError::Malformed("base url cannot hold a path".to_string()))?;
            path.push(id);
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// A1 reference covering a whole tab, quoted so titles may contain
    /// spaces.
    fn tab_range(title: &str) -> String {
        format!("'{}'", title.replace('\'', "''"))
    }
}

#[async_trait]
impl SheetStore for HttpSheetStore {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, SheetError> {
        let id = self.spreadsheet_id().await?;
        let url = self.sheet_url(&id, &[])?;
        let req = self
            .inner
            .get(url)
            .query(&[("fields", "sheets.properties")]);
        let meta: SpreadsheetMeta = self.execute(req).await?;

        Ok(meta
            .sheets
            .into_iter()
            .map(|s| TabInfo {
                tab_id: s.properties.sheet_id,
                title: s.properties.title,
                index: s.properties.index,
            })
            .collect())
    }

    async fn add_tab(&self, title: &str) -> Result<TabInfo, SheetError> {
        let id = self.spreadsheet_id().await?;
        let url = self.sheet_url(&id, &[])?;
        // batchUpdate is addressed as `{id}:batchUpdate`; rebuild the last
        // path segment to carry the method suffix
        let url = Url::parse(&format!("{url}:batchUpdate"))
            .map_err(|e| SheetError::Malformed(format!("invalid batchUpdate url: {e}")))?;

        let body = json!({
            "requests": [{"addSheet": {"properties": {"title": title}}}]
        });
        let req = self.inner.post(url).json(&body);
        let response: BatchUpdateResponse = self.execute(req).await?;

        let properties = response
            .replies
            .into_iter()
            .find_map(|r| r.add_sheet)
            .map(|r| r.properties)
            .ok_or_else(|| SheetError::Malformed("addSheet reply missing".to_string()))?;

        debug!(tab = %properties.title, "added tab");
        Ok(TabInfo {
            tab_id: properties.sheet_id,
            title: properties.title,
            index: properties.index,
        })
    }

    async fn delete_tab(&self, tab_id: i64) -> Result<(), SheetError> {
        let id = self.spreadsheet_id().await?;
        let url = self.sheet_url(&id, &[])?;
        let url = Url::parse(&format!("{url}:batchUpdate"))
            .map_err(|e| SheetError::Malformed(format!("invalid batchUpdate url: {e}")))?;

        let body = json!({
            "requests": [{"deleteSheet": {"sheetId": tab_id}}]
        });
        let req = self.inner.post(url).json(&body);
        let _: serde_json::Value = self.execute(req).await?;
        debug!(tab_id, "deleted tab");
        Ok(())
    }

    async fn read_rows(&self, title: &str) -> Result<Vec<Vec<String>>, SheetError> {
        let id = self.spreadsheet_id().await?;
        let url = self.sheet_url(&id, &["values", &Self::tab_range(title)])?;
        let req = self.inner.get(url);

        // The service reports a missing tab as a range-parse failure
        let range: ValueRange = match self.execute(req).await {
            Err(SheetError::Status { status, body })
                if status == reqwest::StatusCode::BAD_REQUEST
                    && body.contains("Unable to parse range") =>
            {
                return Err(SheetError::TabNotFound(title.to_string()));
            }
            other => other?,
        };

        Ok(range
            .values
            .iter()
            .map(|row| row.iter().map(stringify_cell).collect())
            .collect())
    }

    async fn write_header(&self, title: &str, header: &[String]) -> Result<(), SheetError> {
        let id = self.spreadsheet_id().await?;
        let range = format!("{}!1:1", Self::tab_range(title));
        let url = self.sheet_url(&id, &["values", &range])?;

        let body = json!({ "values": [header] });
        let req = self
            .inner
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&body);
        let _: serde_json::Value = self.execute(req).await?;
        Ok(())
    }

    async fn append_rows(&self, title: &str, rows: &[SheetRow]) -> Result<(), SheetError> {
        let id = self.spreadsheet_id().await?;
        let range = format!("{}:append", Self::tab_range(title));
        let url = self.sheet_url(&id, &["values", &range])?;

        let values: Vec<&Vec<String>> = rows.iter().map(|r| &r.cells).collect();
        let body = json!({ "values": values });
        let req = self
            .inner
            .post(url)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&body);
        let _: serde_json::Value = self.execute(req).await?;
        Ok(())
    }

    async fn clear_tab(&self, title: &str) -> Result<(), SheetError> {
        let id = self.spreadsheet_id().await?;
        let range = format!("{}:clear", Self::tab_range(title));
        let url = self.sheet_url(&id, &["values", &range])?;

        let req = self.inner.post(url).json(&json!({}));
        let _: serde_json::Value = self.execute(req).await?;
        Ok(())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<BatchReply>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchReply {
    add_sheet: Option<AddSheetReply>,
}

#[derive(Deserialize)]
struct AddSheetReply {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}
