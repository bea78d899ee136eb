//! Authenticated are.na API client and endpoint calls.
//!
//! Every call is a plain GET with the bearer credential; failures come back
//! as descriptive errors for the callers to decide fatality.

use arena_cards_core::arena::{ChannelListing, ChannelPage, RawBlock};

use crate::prelude::*;

const ARENA_API_BASE: &str = "https://api.are.na/v2";

/// Blocks requested per channel page (the API default is 20).
pub const PAGE_SIZE: usize = 100;

pub fn get_api_base() -> &'static str {
    ARENA_API_BASE
}

/// Create an HTTP client with the bearer credential applied to every request.
pub fn create_arena_client(token: &str) -> Result<reqwest::Client> {
    use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| eyre!("Invalid header value: {}", e))?,
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| eyre!("Failed to build HTTP client: {}", e))
}

/// Check that an HTTP response was successful, returning a descriptive error
/// otherwise.
pub async fn check_response(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(eyre!("{context} [{status}]: {body}"))
}

/// List the channels a user owns (single page call).
pub async fn list_channels(client: &reqwest::Client, user: &str) -> Result<ChannelListing> {
    let url = format!("{}/users/{user}/channels", get_api_base());

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch channel list: {e}"))?;

    let response = check_response(response, "Failed to fetch channel list").await?;

    response
        .json()
        .await
        .map_err(|e| eyre!("Failed to parse channel list: {e}"))
}

/// Fetch one page of a channel's contents.
pub async fn fetch_channel_page(
    client: &reqwest::Client,
    slug: &str,
    page: usize,
) -> Result<ChannelPage> {
    let url = format!("{}/channels/{slug}", get_api_base());

    let response = client
        .get(&url)
        .query(&[("per", PAGE_SIZE.to_string()), ("page", page.to_string())])
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch channel {slug} page {page}: {e}"))?;

    let response = check_response(response, "Failed to fetch channel page").await?;

    response
        .json()
        .await
        .map_err(|e| eyre!("Failed to parse channel {slug} page {page}: {e}"))
}

/// Fetch a single block body by id.
pub async fn fetch_block(client: &reqwest::Client, id: u64) -> Result<RawBlock> {
    let url = format!("{}/blocks/{id}", get_api_base());

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch block {}: {}", id, e))?;

    let response = check_response(response, "Failed to fetch block").await?;

    response
        .json()
        .await
        .map_err(|e| eyre!("Failed to parse block {}: {}", id, e))
}
