use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::DashboardBackend;
use crate::config::DashboardApiConfig;
use crate::error::{status_error, DashboardApiError};
use crate::headers::build_headers;
use crate::payload::{
    BotStatusReport, CompareResponse, DashboardData, FollowStats, NewDataFlag, NonFollower,
    NonFollowersResponse, UpdateListRequest, UpdateListResponse,
};
use crate::retry::{is_retryable_http_error, retry_delay};
use crate::url::{
    join_endpoint, normalize_base_url, BOT_STATUS_PATH, CHECK_DATA_PATH, COMPARE_PATH,
    DASHBOARD_DATA_PATH, FOLLOW_STATS_PATH, NON_FOLLOWERS_PATH, UPDATE_LIST_PATH,
};

#[derive(Debug)]
pub struct DashboardApiClient {
    http: Client,
    config: DashboardApiConfig,
}

impl DashboardApiClient {
    pub fn new(config: DashboardApiConfig) -> Result<Self, DashboardApiError> {
        normalize_base_url(&config.base_url)?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(DashboardApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DashboardApiConfig {
        &self.config
    }

    pub fn endpoint_url(&self, path: &str) -> Result<String, DashboardApiError> {
        join_endpoint(&self.config.base_url, path)
    }

    pub fn build_headers(&self, credential: &str) -> Result<HeaderMap, DashboardApiError> {
        let headers = build_headers(&self.config, credential)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| DashboardApiError::InvalidHeader(format!("invalid key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    DashboardApiError::InvalidHeader(format!("invalid value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Sends an idempotent GET, retrying transient failures with backoff.
    pub async fn get_with_retry(
        &self,
        path: &str,
        credential: &str,
    ) -> Result<Response, DashboardApiError> {
        let url = self.endpoint_url(path)?;
        let headers = self.build_headers(credential)?;
        let max_retries = self.config.max_retries;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            let response = self.http.get(&url).headers(headers.clone()).send().await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    last_status = Some(status);
                    let body = response.text().await.unwrap_or_default();
                    let error = status_error(status, &body);
                    last_error = Some(error.to_string());

                    if attempt < max_retries && is_retryable_http_error(status.as_u16(), &body) {
                        tracing::debug!(
                            endpoint = path,
                            attempt,
                            status = status.as_u16(),
                            "retrying backend request"
                        );
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }

                    return Err(error);
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message);
                    if attempt < max_retries {
                        tracing::debug!(
                            endpoint = path,
                            attempt,
                            error = %error,
                            "retrying backend request after transport failure"
                        );
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(DashboardApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(DashboardApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Sends a POST exactly once.
    pub async fn post_once<B>(
        &self,
        path: &str,
        credential: &str,
        body: Option<&B>,
    ) -> Result<Response, DashboardApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint_url(path)?;
        let headers = self.build_headers(credential)?;
        let mut request = self.http.post(&url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        credential: &str,
    ) -> Result<T, DashboardApiError> {
        let response = self.get_with_retry(path, credential).await?;
        decode_json(response).await
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, DashboardApiError> {
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_str("{}")?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl DashboardBackend for DashboardApiClient {
    async fn fetch_dashboard(&self, credential: &str) -> Result<DashboardData, DashboardApiError> {
        self.get_json(DASHBOARD_DATA_PATH, credential).await
    }

    async fn compare_non_followers(
        &self,
        credential: &str,
    ) -> Result<CompareResponse, DashboardApiError> {
        let response = self
            .post_once::<()>(COMPARE_PATH, credential, None)
            .await?;
        decode_json(response).await
    }

    async fn fetch_non_followers(
        &self,
        credential: &str,
    ) -> Result<Vec<NonFollower>, DashboardApiError> {
        let response: NonFollowersResponse = self.get_json(NON_FOLLOWERS_PATH, credential).await?;
        Ok(response.non_followers)
    }

    async fn submit_non_follower_list(
        &self,
        credential: &str,
        usernames: &[String],
    ) -> Result<UpdateListResponse, DashboardApiError> {
        let body = UpdateListRequest {
            list: usernames.to_vec(),
        };
        let response = self
            .post_once(UPDATE_LIST_PATH, credential, Some(&body))
            .await?;
        decode_json(response).await
    }

    async fn follow_stats(&self, credential: &str) -> Result<FollowStats, DashboardApiError> {
        self.get_json(FOLLOW_STATS_PATH, credential).await
    }

    async fn new_data_available(&self, credential: &str) -> Result<bool, DashboardApiError> {
        let flag: NewDataFlag = self.get_json(CHECK_DATA_PATH, credential).await?;
        Ok(flag.new_data)
    }

    async fn bot_status(&self, credential: &str) -> Result<BotStatusReport, DashboardApiError> {
        self.get_json(BOT_STATUS_PATH, credential).await
    }
}
