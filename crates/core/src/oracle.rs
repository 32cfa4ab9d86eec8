use crate::error::OracleError;
use crate::models::DomainTerm;
use crate::traits::TermOracle;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP-backed term oracle. Speaks a small JSON protocol against an
/// external language-model service: `POST {endpoint}/extract_terms` and
/// `POST {endpoint}/score_relevance`.
pub struct HttpOracle {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    query: &'a str,
    candidates: &'a [String],
}

#[derive(Deserialize)]
struct OracleTerm {
    term: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    definition: Option<String>,
}

impl HttpOracle {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        Url::parse(endpoint)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<Value, OracleError> {
        let mut request = self
            .client
            .post(format!("{}/{path}", self.endpoint))
            .json(body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Response(format!(
                "oracle endpoint returned {status}: {body}"
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TermOracle for HttpOracle {
    async fn extract_domain_terms(&self, text: &str) -> Result<Vec<DomainTerm>, OracleError> {
        let payload = self.post("extract_terms", &ExtractRequest { text }).await?;
        payload_to_terms(payload)
    }

    async fn score_relevance(
        &self,
        query: &str,
        candidates: &[String],
    ) -> Result<Vec<f64>, OracleError> {
        let payload = self
            .post("score_relevance", &ScoreRequest { query, candidates })
            .await?;
        payload_to_scores(payload)
    }
}

fn payload_to_terms(payload: Value) -> Result<Vec<DomainTerm>, OracleError> {
    let raw = payload
        .get("terms")
        .cloned()
        .ok_or_else(|| OracleError::Response("missing `terms` field".to_string()))?;
    let parsed: Vec<OracleTerm> = serde_json::from_value(raw)?;

    Ok(parsed
        .into_iter()
        .filter(|entry| !entry.term.trim().is_empty())
        .map(|entry| DomainTerm {
            text: entry.term.trim().to_string(),
            confidence: entry.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
            definition: entry
                .definition
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
        })
        .collect())
}

fn payload_to_scores(payload: Value) -> Result<Vec<f64>, OracleError> {
    let raw = payload
        .get("scores")
        .cloned()
        .ok_or_else(|| OracleError::Response("missing `scores` field".to_string()))?;
    let scores: Vec<f64> = serde_json::from_value(raw)?;
    Ok(scores)
}
