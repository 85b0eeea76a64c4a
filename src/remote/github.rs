//! GitHub REST implementation of [`DirectoryClient`]

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{DirectoryClient, Organization, RepositoryDescriptor};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const CLIENT_USER_AGENT: &str = concat!("org-backup/", env!("CARGO_PKG_VERSION"));

// Largest page size the API accepts
const PER_PAGE: &str = "100";
// Stop following `next` links after this many pages
const MAX_PAGES: usize = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Deserialize)]
struct OrganizationPayload {
    login: String,
}

#[derive(Deserialize)]
struct RepositoryPayload {
    name: String,
    clone_url: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

/// Authenticated GitHub API client
pub struct GithubClient {
    http: reqwest::Client,
    api_url: Url,
}

impl GithubClient {
    /// Creates a client against `api_url` authenticating with a bearer `token`
    pub fn new(token: &str, api_url: &str) -> Result<Self> {
        let api_url =
            Url::parse(api_url).with_context(|| format!("invalid GitHub API URL '{api_url}'"))?;
        if api_url.cannot_be_a_base() {
            bail!("invalid GitHub API URL '{api_url}'");
        }

        let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("GitHub token contains invalid characters")?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { http, api_url })
    }

    /// Builds an API URL from path segments, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("invalid GitHub API URL '{}'", self.api_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Fetches one page and returns it with the `next` link, if any
    async fn get_page<T: DeserializeOwned>(&self, url: Url) -> Result<(T, Option<Url>)> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_page_url)
            .map(|next| self.same_origin(&next))
            .transpose()?;
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let payload = serde_json::from_str(&body)
            .with_context(|| format!("unexpected response from {url}"))?;
        Ok((payload, next))
    }

    /// Parses a pagination link, refusing to send the token to another host
    fn same_origin(&self, next: &str) -> Result<Url> {
        let url = Url::parse(next).with_context(|| format!("invalid pagination link '{next}'"))?;
        if url.origin() != self.api_url.origin() {
            bail!("pagination link points outside the API: {url}");
        }
        Ok(url)
    }
}

#[async_trait]
impl DirectoryClient for GithubClient {
    async fn resolve_organization(&self, name: &str) -> Result<Organization> {
        let url = self.endpoint(&["orgs", name])?;
        let (payload, _): (OrganizationPayload, _) = self.get_page(url).await?;
        Ok(Organization::new(payload.login))
    }

    async fn list_organization_repositories(
        &self,
        organization: &Organization,
    ) -> Result<Vec<RepositoryDescriptor>> {
        let mut url = self.endpoint(&["orgs", &organization.login, "repos"])?;
        url.query_pairs_mut()
            .append_pair("per_page", PER_PAGE)
            .append_pair("type", "all");

        let mut repositories = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(page_url) = next {
            pages += 1;
            if pages > MAX_PAGES {
                bail!(
                    "organization '{}' has more than {MAX_PAGES} pages of repositories",
                    organization.login
                );
            }

            let (page, next_url): (Vec<RepositoryPayload>, _) = self.get_page(page_url).await?;
            repositories.extend(
                page.into_iter()
                    .map(|repo| RepositoryDescriptor::new(repo.name, repo.clone_url)),
            );
            next = next_url;
        }

        Ok(repositories)
    }
}

/// Builds an error from a non-success API response
fn api_error(status: StatusCode, body: &str) -> anyhow::Error {
    let message = serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .and_then(|payload| payload.message)
        .filter(|message| !message.is_empty());

    match message {
        Some(message) => anyhow!("GitHub API returned {status}: {message}"),
        None => anyhow!("GitHub API returned {status}"),
    }
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header
pub fn next_page_url(link_header: &str) -> Option<String> {
    link_header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;

        let is_next = parts.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });

        is_next.then(|| target.to_string())
    })
}
