mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, bail};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub fn request(method: Method, url: &str) -> Result<Request> {
    let parsed: reqwest::Url = url
        .parse()
        .with_context(|| format!("invalid url '{url}'"))?;
    Ok(Request::new(method, parsed))
}

/// Builds a request carrying `body` with the given content type.
pub fn request_with_body(
    method: Method,
    url: &str,
    content_type: &'static str,
    body: Vec<u8>,
) -> Result<Request> {
    let mut req = request(method, url)?;
    req.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    *req.body_mut() = Some(body.into());
    Ok(req)
}

/// Executes `req` and decodes a JSON response, failing on non-2xx status.
pub async fn execute_json<C, T>(client: &C, req: Request) -> Result<T>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    let resp = client.execute(req).await.context("request failed")?;
    read_json(resp).await
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("status {status}: {body}");
    }
    let bytes = resp.bytes().await.context("failed to read response body")?;
    serde_json::from_slice(&bytes).context("failed to parse response")
}

pub async fn get_json<C, T>(client: &C, url: &str) -> Result<T>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    execute_json(client, request(Method::GET, url)?).await
}

pub async fn post_json<C, B, T>(client: &C, url: &str, body: &B) -> Result<T>
where
    C: HttpClient + ?Sized,
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let body = serde_json::to_vec(body).context("failed to encode request body")?;
    let req = request_with_body(Method::POST, url, JSON_CONTENT_TYPE, body)?;
    execute_json(client, req).await
}
