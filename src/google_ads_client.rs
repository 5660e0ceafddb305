use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppError;
use crate::google_ads_models::{
    AdsCredentials, MemberRecord, MembersMutationResult, NewCrmUserList, UserListSummary,
};

/// User list operations needed for Customer Match uploads.
#[async_trait]
pub trait UserListService: Send + Sync {
    /// All lists whose name equals `name`, in the order the API returns them.
    async fn get_by_name(&self, name: &str) -> Result<Vec<UserListSummary>, AppError>;

    /// Create a CRM-based list and return its id.
    async fn create(&self, list: &NewCrmUserList) -> Result<String, AppError>;

    /// Add every member to the list in a single mutation.
    async fn add_members(
        &self,
        list: &UserListSummary,
        members: &[MemberRecord],
    ) -> Result<MembersMutationResult, AppError>;
}

/// Builds authenticated `UserListService` clients.
#[async_trait]
pub trait AdsClientFactory: Send + Sync {
    async fn connect(&self, credentials: &AdsCredentials)
        -> Result<Box<dyn UserListService>, AppError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRow>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRow {
    user_list: UserListRow,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserListRow {
    #[serde(default)]
    resource_name: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutateResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutateResult {
    resource_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobResponse {
    resource_name: String,
}

/// Factory producing REST clients for the Google Ads API.
#[derive(Clone)]
pub struct GoogleAdsClientFactory {
    client: Client,
    api_base_url: String,
    api_version: String,
    token_url: String,
}

impl GoogleAdsClientFactory {
    pub fn new(
        api_base_url: String,
        api_version: String,
        token_url: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create Google Ads client: {}", e))
        })?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_version,
            token_url,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.google_ads_api_base_url.clone(),
            config.google_ads_api_version.clone(),
            config.google_oauth_token_url.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    /// Exchange the refresh token for an access token.
    async fn access_token(&self, credentials: &AdsCredentials) -> Result<String, AppError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", credentials.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("OAuth request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Unauthorized(format!(
                "OAuth token exchange failed {}: {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::Unauthorized(format!("Failed to parse OAuth token response: {}", e))
        })?;

        Ok(token.access_token)
    }
}

#[async_trait]
impl AdsClientFactory for GoogleAdsClientFactory {
    async fn connect(
        &self,
        credentials: &AdsCredentials,
    ) -> Result<Box<dyn UserListService>, AppError> {
        let access_token = self.access_token(credentials).await?;
        tracing::debug!(
            "Authenticated Google Ads client for customer {}",
            credentials.client_customer_id
        );

        Ok(Box::new(GoogleAdsClient {
            client: self.client.clone(),
            base_url: format!("{}/{}", self.api_base_url, self.api_version),
            customer_id: normalize_customer_id(&credentials.client_customer_id),
            developer_token: credentials.developer_token.clone(),
            login_customer_id: credentials
                .login_customer_id
                .as_deref()
                .map(normalize_customer_id),
            access_token,
        }))
    }
}

/// Authenticated client for one Google Ads customer.
#[derive(Clone)]
pub struct GoogleAdsClient {
    client: Client,
    /// API root including the version, e.g. "https://googleads.googleapis.com/v17"
    base_url: String,
    customer_id: String,
    developer_token: String,
    login_customer_id: Option<String>,
    access_token: String,
}

impl GoogleAdsClient {
    fn post(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .header("developer-token", &self.developer_token);

        match &self.login_customer_id {
            Some(login) => request.header("login-customer-id", login),
            None => request,
        }
    }

    async fn send(&self, url: &str, body: &Value, action: &str) -> Result<Value, AppError> {
        let response = self
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Google Ads {} returned {}: {}", action, status, error_text);

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(AppError::Unauthorized(format!(
                    "Google Ads {} rejected credentials: {}",
                    action, error_text
                )));
            }
            return Err(AppError::ExternalApiError(format!(
                "Google Ads {} returned {}: {}",
                action, status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse {} response: {}", action, e))
        })
    }

    fn customer_url(&self, method: &str) -> String {
        format!("{}/customers/{}/{}", self.base_url, self.customer_id, method)
    }
}

#[async_trait]
impl UserListService for GoogleAdsClient {
    async fn get_by_name(&self, name: &str) -> Result<Vec<UserListSummary>, AppError> {
        let query = format!(
            "SELECT user_list.id, user_list.name FROM user_list WHERE user_list.name = '{}'",
            escape_gaql_string(name)
        );
        let url = self.customer_url("googleAds:search");

        let mut lists = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut body = json!({ "query": query });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }

            let value = self.send(&url, &body, "user list search").await?;
            let page: SearchResponse = serde_json::from_value(value).map_err(|e| {
                AppError::ExternalApiError(format!("Unexpected search response: {}", e))
            })?;

            for row in page.results {
                let id = match (row.user_list.id, row.user_list.resource_name.as_deref()) {
                    (Some(id), _) => id,
                    (None, Some(resource)) => resource_id(resource)?,
                    (None, None) => {
                        return Err(AppError::ExternalApiError(
                            "User list row without id".to_string(),
                        ))
                    }
                };
                lists.push(UserListSummary {
                    id,
                    name: row.user_list.name,
                });
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(lists)
    }

    async fn create(&self, list: &NewCrmUserList) -> Result<String, AppError> {
        let url = self.customer_url("userLists:mutate");
        let body = json!({ "operations": [list.to_operation()] });

        let value = self.send(&url, &body, "user list create").await?;
        let response: MutateResponse = serde_json::from_value(value).map_err(|e| {
            AppError::ExternalApiError(format!("Unexpected user list mutate response: {}", e))
        })?;

        let created = response.results.first().ok_or_else(|| {
            AppError::ExternalApiError("User list mutate returned no results".to_string())
        })?;

        resource_id(&created.resource_name)
    }

    async fn add_members(
        &self,
        list: &UserListSummary,
        members: &[MemberRecord],
    ) -> Result<MembersMutationResult, AppError> {
        let user_list_resource = format!("customers/{}/userLists/{}", self.customer_id, list.id);

        let job_body = json!({
            "job": {
                "type": "CUSTOMER_MATCH_USER_LIST",
                "customerMatchUserListMetadata": { "userList": user_list_resource }
            }
        });
        let value = self
            .send(
                &self.customer_url("offlineUserDataJobs:create"),
                &job_body,
                "offline user data job create",
            )
            .await?;
        let job: CreateJobResponse = serde_json::from_value(value).map_err(|e| {
            AppError::ExternalApiError(format!("Unexpected job create response: {}", e))
        })?;

        let operations: Vec<Value> = members
            .iter()
            .map(|member| json!({ "create": { "userIdentifiers": member.user_identifiers() } }))
            .collect();
        let add_body = json!({
            "operations": operations,
            "enablePartialFailure": false,
        });
        self.send(
            &format!("{}/{}:addOperations", self.base_url, job.resource_name),
            &add_body,
            "add members",
        )
        .await?;

        self.send(
            &format!("{}/{}:run", self.base_url, job.resource_name),
            &json!({}),
            "offline user data job run",
        )
        .await?;

        Ok(MembersMutationResult {
            user_list_id: list.id.clone(),
            user_list_name: list.name.clone(),
            member_count: members.len(),
            job_resource_name: Some(job.resource_name),
        })
    }
}

/// "123-456-7890" -> "1234567890"
pub fn normalize_customer_id(customer_id: &str) -> String {
    customer_id.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Escape a value for a single-quoted GAQL string literal.
pub fn escape_gaql_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Last path segment of a resource name, e.g. "customers/1/userLists/42" -> "42".
pub fn resource_id(resource_name: &str) -> Result<String, AppError> {
    resource_name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::ExternalApiError(format!("Malformed resource name: {}", resource_name))
        })
}
