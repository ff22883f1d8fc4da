//! HTTP model backend.
//!
//! Talks to an external model server that exposes one JSON endpoint per
//! model role. Calls are blocking and always run through the
//! [`AdapterPool`](super::AdapterPool), which owns the deadline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::risk::RiskVector;
use crate::models::Entity;

use super::{AdapterError, ImageModel, Summarizer, TabularModel, TextModel};

pub struct RemoteModel {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct TabularRequest<'a> {
    features: &'a BTreeMap<String, f64>,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ConditionsRequest<'a> {
    entities: &'a [Entity],
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image_ref: &'a str,
}

#[derive(Deserialize)]
struct ScoresResponse {
    scores: RiskVector,
}

#[derive(Deserialize)]
struct EntitiesResponse {
    entities: Vec<Entity>,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

impl RemoteModel {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn post<B, R>(&self, path: &str, body: &B) -> Result<R, AdapterError>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| AdapterError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AdapterError::Http(format!("{status}: {body}")));
        }

        response
            .json()
            .map_err(|e| AdapterError::Malformed(e.to_string()))
    }
}

impl TabularModel for RemoteModel {
    fn predict_proba(&self, features: &BTreeMap<String, f64>) -> Result<RiskVector, AdapterError> {
        let out: ScoresResponse = self.post("/v1/tabular/predict", &TabularRequest { features })?;
        Ok(out.scores)
    }
}

impl TextModel for RemoteModel {
    fn extract_entities(&self, text: &str) -> Result<Vec<Entity>, AdapterError> {
        let out: EntitiesResponse = self.post("/v1/text/entities", &TextRequest { text })?;
        Ok(out.entities)
    }

    fn predict_conditions(&self, entities: &[Entity]) -> Result<RiskVector, AdapterError> {
        let out: ScoresResponse =
            self.post("/v1/text/conditions", &ConditionsRequest { entities })?;
        Ok(out.scores)
    }
}

impl Summarizer for RemoteModel {
    fn summarize(&self, text: &str) -> Result<String, AdapterError> {
        let out: SummaryResponse = self.post("/v1/summarize", &TextRequest { text })?;
        Ok(out.summary)
    }
}

impl ImageModel for RemoteModel {
    fn predict_image(&self, image_ref: &str) -> Result<RiskVector, AdapterError> {
        let out: ScoresResponse = self.post("/v1/image/predict", &ImageRequest { image_ref })?;
        Ok(out.scores)
    }
}
