pub mod types;

use crate::conf::Config;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use types::{Engine, Job, JobRun, RunMetrics};

/// Represents the ways a control-plane call can fail.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("could not establish connection to the control plane; {0}")]
    Connection(String),

    #[error("control plane returned HTTP {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("could not decode response from {url}; {source}")]
    Decode {
        url: String,
        source: reqwest::Error,
    },

    #[error("request to {url} failed; {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    #[error("credentials contain characters not allowed in a header; {0}")]
    InvalidHeader(String),
}

/// The fixed header set every authenticated call carries. The engine REST
/// API rejects requests missing the REST-call marker, and both collaborators
/// accept the same credential pair.
pub(crate) fn auth_headers(conf: &Config) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("X-Requested-By", HeaderValue::from_static("SDC"));
    headers.insert("X-SS-Rest-Call", HeaderValue::from_static("true"));
    headers.insert(
        "X-SS-App-Component-Id",
        HeaderValue::from_str(&conf.cred_id).map_err(|e| ApiError::InvalidHeader(e.to_string()))?,
    );
    headers.insert(
        "X-SS-App-Auth-Token",
        HeaderValue::from_str(&conf.cred_token)
            .map_err(|e| ApiError::InvalidHeader(e.to_string()))?,
    );
    Ok(headers)
}

/// Thin client for the control plane's job-runner API. One underlying HTTP
/// client is built at construction, carries the credential headers, and is
/// reused for every call.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    server: String,
}

impl Client {
    pub fn new(conf: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .default_headers(auth_headers(conf)?)
            .build()
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            server: conf.sch_url.trim_end_matches('/').to_string(),
        })
    }

    /// Verifies the credentials actually reach the control plane. Called
    /// before any other work so a dead or misconfigured endpoint aborts the
    /// invocation without touching the output file.
    pub async fn connect(&self) -> Result<(), ApiError> {
        let url = format!("{}/security/rest/v1/currentUser", self.server);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Connection(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        Ok(())
    }

    /// Every job visible to the credential, templates included.
    pub async fn jobs(&self) -> Result<Vec<Job>, ApiError> {
        self.get_json(format!("{}/jobrunner/rest/v1/jobs", self.server))
            .await
    }

    /// Run history for one job, most-recent-first as served by the control
    /// plane.
    pub async fn job_history(&self, job_id: &str) -> Result<Vec<JobRun>, ApiError> {
        self.get_json(format!(
            "{}/jobrunner/rest/v1/job/{}/history",
            self.server, job_id
        ))
        .await
    }

    /// Record counters for each of a job's runs. Unordered; match entries to
    /// history by run count.
    pub async fn job_metrics(&self, job_id: &str) -> Result<Vec<RunMetrics>, ApiError> {
        self.get_json(format!(
            "{}/jobrunner/rest/v1/job/{}/metrics",
            self.server, job_id
        ))
        .await
    }

    /// Engines registered with the control plane.
    pub async fn engines(&self) -> Result<Vec<Engine>, ApiError> {
        self.get_json(format!("{}/jobrunner/rest/v1/sdcs", self.server))
            .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
        let response = self.http.get(&url).send().await.map_err(|source| {
            ApiError::Transport {
                url: url.clone(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { status, url });
        }

        response
            .json()
            .await
            .map_err(|source| ApiError::Decode { url, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> Config {
        Config {
            sch_url: "https://sch.example.com/".to_string(),
            cred_id: "component-1".to_string(),
            cred_token: "s3cr3t".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn auth_headers_carry_the_credential_pair() {
        let headers = auth_headers(&config()).unwrap();
        assert_eq!(headers.get("X-SS-App-Component-Id").unwrap(), "component-1");
        assert_eq!(headers.get("X-SS-App-Auth-Token").unwrap(), "s3cr3t");
        assert_eq!(headers.get("X-SS-Rest-Call").unwrap(), "true");
        assert_eq!(headers.get("X-Requested-By").unwrap(), "SDC");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn credentials_with_control_characters_are_rejected() {
        let mut conf = config();
        conf.cred_token = "bad\ntoken".to_string();
        assert!(matches!(
            auth_headers(&conf),
            Err(ApiError::InvalidHeader(_))
        ));
    }

    #[test]
    fn trailing_slash_on_the_server_url_is_trimmed() {
        let client = Client::new(&config()).unwrap();
        assert_eq!(client.server, "https://sch.example.com");
    }
}
