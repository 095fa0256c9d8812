//! HTTP transport for the remote attribute view service.
//!
//! Every endpoint is a JSON POST answering `{code, msg, data}`.

use crate::config::{ClientConfig, ConfigError};
use crate::error::ClientError;
use async_trait::async_trait;
use avsync_core::shape::{field, id_string};
use avsync_core::{
    AttachSource, ContentUnit, DetachedField, FieldWrite, NewColumn, RowQuery, Transport,
    TransportError, WriteResponse,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::{json, Value};

const KEYS_BY_AV_ID: &str = "/api/av/getAttributeViewKeysByAvID";
const RENDER_VIEW: &str = "/api/av/renderAttributeView";
const GET_VIEW: &str = "/api/av/getAttributeView";
const BATCH_SET_ATTRS: &str = "/api/av/batchSetAttributeViewBlockAttrs";
const ADD_BLOCKS: &str = "/api/av/addAttributeViewBlocks";
const APPEND_DETACHED: &str = "/api/av/appendAttributeViewDetachedBlocksWithValues";
const REMOVE_BLOCKS: &str = "/api/av/removeAttributeViewBlocks";
const ADD_KEY: &str = "/api/av/addAttributeViewKey";
const APPEND_BLOCK: &str = "/api/block/appendBlock";
const QUERY_SQL: &str = "/api/query/sql";

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let auth_header = build_auth_headers(config.api_token.as_deref())?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    /// POST and return the raw envelope.
    async fn post_raw<B>(&self, path: &str, body: &B) -> Result<WriteResponse, TransportError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(url)
            .headers(self.auth_header.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| http_error(path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                endpoint: path.to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        response
            .json::<WriteResponse>()
            .await
            .map_err(|e| TransportError::Decode {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// POST and unwrap `data`; a non-zero code becomes [`TransportError::Api`].
    async fn post_envelope<B>(&self, path: &str, body: &B) -> Result<Value, TransportError>
    where
        B: Serialize + ?Sized,
    {
        let envelope = self.post_raw(path, body).await?;
        unwrap_envelope(path, envelope)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_columns(&self, source_id: &str) -> Result<Value, TransportError> {
        self.post_envelope(KEYS_BY_AV_ID, &json!({ "avID": source_id }))
            .await
    }

    async fn fetch_rows(&self, source_id: &str, query: &RowQuery) -> Result<Value, TransportError> {
        self.post_envelope(RENDER_VIEW, &render_body(source_id, query))
            .await
    }

    async fn fetch_views(&self, source_id: &str) -> Result<Value, TransportError> {
        self.post_envelope(GET_VIEW, &json!({ "id": source_id }))
            .await
    }

    async fn write_fields(
        &self,
        source_id: &str,
        writes: &[FieldWrite],
    ) -> Result<WriteResponse, TransportError> {
        self.post_raw(BATCH_SET_ATTRS, &json!({ "avID": source_id, "values": writes }))
            .await
    }

    async fn attach_rows(
        &self,
        source_id: &str,
        sources: &[AttachSource],
    ) -> Result<(), TransportError> {
        self.post_envelope(ADD_BLOCKS, &json!({ "avID": source_id, "srcs": sources }))
            .await
            .map(|_| ())
    }

    async fn append_detached_rows(
        &self,
        source_id: &str,
        rows: &[Vec<DetachedField>],
    ) -> Result<(), TransportError> {
        self.post_envelope(
            APPEND_DETACHED,
            &json!({ "avID": source_id, "blocksValues": rows }),
        )
        .await
        .map(|_| ())
    }

    async fn remove_rows(&self, source_id: &str, item_ids: &[String]) -> Result<(), TransportError> {
        self.post_envelope(REMOVE_BLOCKS, &json!({ "avID": source_id, "srcIDs": item_ids }))
            .await
            .map(|_| ())
    }

    async fn add_column(
        &self,
        source_id: &str,
        column: &NewColumn,
    ) -> Result<WriteResponse, TransportError> {
        self.post_raw(ADD_KEY, &add_column_body(source_id, column))
            .await
    }

    async fn create_content_unit(&self, body: &str, parent_id: &str) -> Result<Value, TransportError> {
        let payload = json!({
            "dataType": "markdown",
            "data": body,
            "parentID": parent_id,
        });
        self.post_envelope(APPEND_BLOCK, &payload).await
    }

    async fn fetch_content_unit(&self, id: &str) -> Result<Option<ContentUnit>, TransportError> {
        let data = self
            .post_envelope(QUERY_SQL, &json!({ "stmt": content_unit_stmt(id) }))
            .await?;
        Ok(content_unit_from_rows(&data))
    }
}

fn http_error(endpoint: &str, err: reqwest::Error) -> TransportError {
    TransportError::Http {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    }
}

fn unwrap_envelope(endpoint: &str, envelope: WriteResponse) -> Result<Value, TransportError> {
    if !envelope.is_success() {
        return Err(TransportError::Api {
            endpoint: endpoint.to_string(),
            code: envelope.code,
            message: envelope.msg,
        });
    }
    Ok(envelope.data.unwrap_or(Value::Null))
}

fn render_body(source_id: &str, query: &RowQuery) -> Value {
    let mut body = json!({
        "id": source_id,
        "page": query.page,
        "pageSize": query.page_size,
    });
    if let (Some(view_id), Some(map)) = (&query.view_id, body.as_object_mut()) {
        map.insert("viewID".to_string(), Value::from(view_id.as_str()));
    }
    body
}

fn add_column_body(source_id: &str, column: &NewColumn) -> Value {
    let mut body = json!({
        "avID": source_id,
        "keyID": column.key_id,
        "keyName": column.name,
        "keyType": column.column_type.as_wire_str(),
        "keyIcon": "",
        "previousKeyID": "",
    });
    if column.options.is_empty() {
        return body;
    }
    let options: Vec<Value> = column
        .options
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();
    if let Some(map) = body.as_object_mut() {
        map.insert("options".to_string(), Value::Array(options));
    }
    body
}

fn content_unit_stmt(id: &str) -> String {
    format!("select * from blocks where id = '{}'", id.replace('\'', "''"))
}

fn content_unit_from_rows(data: &Value) -> Option<ContentUnit> {
    let row = data.as_array()?.first()?;
    let id = field(row, "id").and_then(id_string)?;
    let parent_id = field(row, "parent_id").and_then(id_string);
    Some(ContentUnit { id, parent_id })
}

fn build_auth_headers(api_token: Option<&str>) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = api_token {
        let value = format!("Token {}", token);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ConfigError::InvalidValue {
                field: "api_token",
                reason: e.to_string(),
            })?,
        );
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_envelope() {
        let ok = WriteResponse {
            code: 0,
            msg: String::new(),
            data: Some(json!({"keys": []})),
        };
        assert_eq!(unwrap_envelope(KEYS_BY_AV_ID, ok).unwrap(), json!({"keys": []}));
        assert_eq!(unwrap_envelope(REMOVE_BLOCKS, WriteResponse::ok()).unwrap(), Value::Null);

        let err = unwrap_envelope(GET_VIEW, WriteResponse::rejected(-1, "not found")).unwrap_err();
        assert_eq!(
            err,
            TransportError::Api {
                endpoint: GET_VIEW.to_string(),
                code: -1,
                message: "not found".to_string(),
            }
        );
    }

    #[test]
    fn test_render_body() {
        let body = render_body("av-1", &RowQuery::all(Some("v-1".to_string())));
        assert_eq!(
            body,
            json!({"id": "av-1", "viewID": "v-1", "page": 1, "pageSize": -1})
        );
        let body = render_body("av-1", &RowQuery::all(None));
        assert!(body.get("viewID").is_none());
    }

    #[test]
    fn test_add_column_body() {
        let status = NewColumn {
            key_id: "20240301000000-keyst01".to_string(),
            name: "Status".to_string(),
            column_type: avsync_core::ColumnType::MultiSelect,
            options: vec!["Done".to_string()],
        };
        assert_eq!(
            add_column_body("av-1", &status),
            json!({
                "avID": "av-1",
                "keyID": "20240301000000-keyst01",
                "keyName": "Status",
                "keyType": "mSelect",
                "keyIcon": "",
                "previousKeyID": "",
                "options": [{"name": "Done"}],
            })
        );
        let progress = NewColumn {
            options: Vec::new(),
            column_type: avsync_core::ColumnType::Number,
            ..status
        };
        assert!(add_column_body("av-1", &progress).get("options").is_none());
    }

    #[test]
    fn test_content_unit_lookup() {
        assert_eq!(
            content_unit_stmt("a'b"),
            "select * from blocks where id = 'a''b'"
        );
        let rows = json!([{"id": "blk-1", "parent_id": "doc-1", "type": "p"}]);
        assert_eq!(
            content_unit_from_rows(&rows),
            Some(ContentUnit {
                id: "blk-1".to_string(),
                parent_id: Some("doc-1".to_string()),
            })
        );
        assert_eq!(content_unit_from_rows(&json!([])), None);
        assert_eq!(content_unit_from_rows(&Value::Null), None);
    }

    #[test]
    fn test_auth_header() {
        let headers = build_auth_headers(Some("abc")).unwrap();
        assert_eq!(headers["authorization"], "Token abc");
        assert!(build_auth_headers(None).unwrap().is_empty());
        assert!(build_auth_headers(Some("bad\ntoken")).is_err());
    }
}
