use crate::domain::mapping::Mapping;
use crate::domain::playback::MappingFetchError;
use std::time::Duration;

/// Fetches published mappings the way a survey page does, once per page load.
#[derive(Clone)]
pub struct MappingClient {
    http: reqwest::Client,
}

impl MappingClient {
    pub fn new(timeout: Duration) -> Result<Self, MappingFetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MappingFetchError::Request(e.to_string()))?;
        Ok(Self { http })
    }

    pub async fn fetch(&self, url: &str) -> Result<Mapping, MappingFetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MappingFetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MappingFetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MappingFetchError::Request(e.to_string()))?;
        let mapping =
            Mapping::from_json_slice(&body).map_err(|e| MappingFetchError::Body(e.to_string()))?;

        tracing::debug!(url = %url, entries = mapping.len(), "TTS mapping loaded");
        Ok(mapping)
    }
}
