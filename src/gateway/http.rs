//! HTTP transport: the PostgREST/GoTrue-shaped surface of a hosted backend or the dev server.

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use super::{Procedure, Query, RowFilter, Table};
use crate::config::ClientConfig;
use crate::errors::{AppError, ErrorBody};
use crate::models::{Identity, Session};
use crate::realtime::ChangeEvent;

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, AppError> {
        Url::parse(&config.url)
            .map_err(|e| AppError::Validation(format!("Invalid backend URL: {}", e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, AppError> {
        Url::parse(&format!("{}{}", self.base, path))
            .map_err(|e| AppError::Validation(format!("Invalid request URL {}: {}", path, e)))
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    // ==================== AUTH ====================

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Session, AppError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "full_name": full_name },
        });
        let value = send(
            self.request(Method::POST, self.url("/auth/v1/signup")?, None)
                .json(&body),
        )
        .await?;
        decode(value)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let mut url = self.url("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let body = json!({ "email": email, "password": password });
        let value = send(self.request(Method::POST, url, None).json(&body)).await?;
        decode(value)
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        send(self.request(Method::POST, self.url("/auth/v1/logout")?, Some(token))).await?;
        Ok(())
    }

    pub async fn user(&self, token: &str) -> Result<Identity, AppError> {
        let value = send(self.request(Method::GET, self.url("/auth/v1/user")?, Some(token))).await?;
        decode(value)
    }

    pub async fn update_password(&self, token: &str, password: &str) -> Result<(), AppError> {
        let body = json!({ "password": password });
        send(
            self.request(Method::PUT, self.url("/auth/v1/user")?, Some(token))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    // ==================== TABLES ====================

    pub async fn select(
        &self,
        token: &str,
        table: Table,
        query: &Query,
    ) -> Result<Vec<Value>, AppError> {
        let mut url = self.url(&format!("/rest/v1/{}", table))?;
        append_pairs(&mut url, &query.to_pairs());

        let value = send(self.request(Method::GET, url, Some(token))).await?;
        decode(value)
    }

    pub async fn insert<B: Serialize + ?Sized>(
        &self,
        token: &str,
        table: Table,
        row: &B,
    ) -> Result<Value, AppError> {
        let url = self.url(&format!("/rest/v1/{}", table))?;
        send(
            self.request(Method::POST, url, Some(token))
                .header("Prefer", "return=representation")
                .json(row),
        )
        .await
    }

    pub async fn update<P: Serialize + ?Sized>(
        &self,
        token: &str,
        table: Table,
        id: &str,
        patch: &P,
    ) -> Result<Value, AppError> {
        let mut url = self.url(&format!("/rest/v1/{}", table))?;
        append_pairs(&mut url, &Query::new().eq("id", id).to_pairs());

        send(
            self.request(Method::PATCH, url, Some(token))
                .header("Prefer", "return=representation")
                .json(patch),
        )
        .await
    }

    pub async fn delete(&self, token: &str, table: Table, id: &str) -> Result<(), AppError> {
        let mut url = self.url(&format!("/rest/v1/{}", table))?;
        append_pairs(&mut url, &Query::new().eq("id", id).to_pairs());

        send(self.request(Method::DELETE, url, Some(token))).await?;
        Ok(())
    }

    pub async fn call<A: Serialize + ?Sized>(
        &self,
        token: &str,
        procedure: Procedure,
        args: &A,
    ) -> Result<Value, AppError> {
        let url = self.url(&format!("/rest/v1/rpc/{}", procedure))?;
        send(self.request(Method::POST, url, Some(token)).json(args)).await
    }

    // ==================== REALTIME ====================

    pub async fn changes(
        &self,
        token: Option<&str>,
        table: Table,
        filter: Option<&RowFilter>,
    ) -> Result<SseStream, AppError> {
        let mut url = self.url(&format!("/realtime/v1/{}", table))?;
        if let Some(filter) = filter {
            url.query_pairs_mut()
                .append_pair("filter", &filter.to_string());
        }

        let response = self
            .request(Method::GET, url, token)
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        tracing::debug!("Realtime stream open on {}", table);
        Ok(SseStream {
            response,
            buffer: Vec::new(),
        })
    }
}

fn append_pairs(url: &mut Url, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        return;
    }
    let mut query = url.query_pairs_mut();
    for (key, value) in pairs {
        query.append_pair(key, value);
    }
}

async fn send(builder: RequestBuilder) -> Result<Value, AppError> {
    let response = builder.send().await?;
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::Internal(format!("Malformed response body: {}", e)))
}

async fn error_from(response: Response) -> AppError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();

    let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| ErrorBody {
        code: format!("HTTP_{}", status),
        message: if text.is_empty() {
            format!("Request failed with status {}", status)
        } else {
            text
        },
        details: None,
        hint: None,
    });
    AppError::from_body(status, body)
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Internal(format!("Unexpected response shape: {}", e)))
}

/// Server-sent change events read off a streaming response.
pub struct SseStream {
    response: Response,
    buffer: Vec<u8>,
}

impl SseStream {
    /// Next change, or `None` once the server closes the stream.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            while let Some(frame) = take_frame(&mut self.buffer) {
                match parse_frame(&frame) {
                    Some(Ok(change)) => return Some(change),
                    Some(Err(e)) => tracing::warn!("Skipping malformed realtime frame: {}", e),
                    None => {}
                }
            }

            match self.response.chunk().await {
                Ok(Some(bytes)) => self.buffer.extend_from_slice(&bytes),
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!("Realtime stream failed: {}", e);
                    return None;
                }
            }
        }
    }
}

/// Split the first complete frame (terminated by a blank line) off the buffer.
fn take_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let frame: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(String::from_utf8_lossy(&frame).replace('\r', ""))
}

/// Data lines of a frame as a change event; comment-only frames yield `None`.
fn parse_frame(frame: &str) -> Option<Result<ChangeEvent, serde_json::Error>> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if data.is_empty() {
        return None;
    }
    Some(serde_json::from_str(&data.join("\n")))
}
