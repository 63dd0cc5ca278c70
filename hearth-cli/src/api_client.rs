use anyhow::{Context, Result, bail};
use listings_srv::listing::{Listing, ListingQuery};
use listings_srv::uploads::UploadTicket;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

/// Client of the listings API
///
/// Reads are anonymous. Writes take the bearer token of the current session;
/// whether the caller may write is decided by the server alone.
#[derive(Debug, Clone)]
pub struct ListingsClient {
    base_url: Url,
    http_client: reqwest::Client,
}

impl ListingsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("invalid API base url '{base_url}'"))?;
        let http_client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}")).with_context(|| format!("invalid API path '{path}'"))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Response> {
        let mut request = self
            .http_client
            .request(method.clone(), self.url(path)?)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("{method} {path} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{method} {path} failed: {} {text}", status.as_u16());
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<&Value>,
    ) -> Result<T> {
        let response = self.send(method.clone(), path, bearer, body).await?;
        response
            .json()
            .await
            .with_context(|| format!("{method} {path}: unexpected response body"))
    }

    pub async fn list(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let mut params = Vec::new();
        if let Some(available) = query.available {
            params.push(format!("available={available}"));
        }
        if let Some(beds) = query.beds {
            params.push(format!("beds={beds}"));
        }
        if let Some(baths) = query.baths {
            params.push(format!("baths={baths}"));
        }
        if let Some(max_price) = query.max_price {
            params.push(format!("maxPrice={max_price}"));
        }
        let path = if params.is_empty() {
            "/properties".to_string()
        } else {
            format!("/properties?{}", params.join("&"))
        };
        self.send_json(Method::GET, &path, None, None).await
    }

    pub async fn create(&self, bearer: &str, fields: &Value) -> Result<Listing> {
        self.send_json(Method::POST, "/properties", Some(bearer), Some(fields))
            .await
    }

    pub async fn update(&self, bearer: &str, id: &str, fields: &Value) -> Result<Listing> {
        let path = format!("/properties/{}", encode_path_segment(id));
        self.send_json(Method::PUT, &path, Some(bearer), Some(fields))
            .await
    }

    pub async fn delete(&self, bearer: &str, id: &str) -> Result<()> {
        let path = format!("/properties/{}", encode_path_segment(id));
        self.send(Method::DELETE, &path, Some(bearer), None).await?;
        Ok(())
    }

    pub async fn upload_url(
        &self,
        bearer: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadTicket> {
        let body = json!({ "filename": filename, "contentType": content_type });
        self.send_json(Method::POST, "/uploads", Some(bearer), Some(&body))
            .await
    }
}

fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
