// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &HttpConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a URL as text, classifying failures as transient or permanent.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_send_error("fetch", e))?;
    let response = check_status("fetch", response).await?;
    Ok(response.text().await?)
}

/// Map a transport-level failure onto the remote error taxonomy.
pub fn classify_send_error(operation: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        AppError::transient(operation, error)
    } else {
        AppError::Http(error)
    }
}

/// Pass successful responses through; turn everything else into a
/// transient (429, 5xx) or permanent (other 4xx) error.
pub async fn check_status(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();

    if is_transient_status(status) {
        Err(AppError::transient(operation, format!("{status}: {body}")))
    } else {
        Err(AppError::permanent(operation, status.as_u16(), body))
    }
}

/// Rate limiting and server errors are worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_create_client() {
        assert!(create_client(&HttpConfig::default()).is_ok());
    }
}
