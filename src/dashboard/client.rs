//! Thin client for the gateway API.
//!
//! The gateway answers 200 on everything and signals failure through a
//! non-null `error` field; [`ApiClient`] turns that into `Error::Remote` so
//! callers see one error type for transport and application failures alike.

use reqwest::Client;
use serde_json::Value;

use crate::error::{Error, Result};

pub struct ApiClient {
    base: String,
    http: Client,
}

impl ApiClient {
    pub fn new(endpoint: &str) -> Self {
        ApiClient {
            base: endpoint.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.base
    }

    fn check(payload: Value) -> Result<Value> {
        if let Some(error) = payload.get("error") {
            if !error.is_null() {
                let msg = error.as_str().unwrap_or("unknown error").to_string();
                return Err(Error::Remote(msg));
            }
        }
        Ok(payload)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let payload = self
            .http
            .get(format!("{}{}", self.base, path))
            .query(query)
            .send()
            .await?
            .json::<Value>()
            .await?;
        Self::check(payload)
    }

    async fn post(&self, path: &str, query: &[(&str, String)], body: Option<&Value>) -> Result<Value> {
        let mut request = self.http.post(format!("{}{}", self.base, path)).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        let payload = request.send().await?.json::<Value>().await?;
        Self::check(payload)
    }

    pub async fn sensors(&self) -> Result<Value> {
        self.get("/api/sensors", &[]).await
    }

    pub async fn sensor_data(&self, since: f64) -> Result<Value> {
        self.get("/api/sensor_data", &[("since", since.to_string())]).await
    }

    pub async fn valves(&self) -> Result<Value> {
        self.get("/api/get_valves", &[]).await
    }

    pub async fn set_valve(&self, name: &str, state: &str) -> Result<()> {
        let body = serde_json::json!({"valve": name, "state": state});
        self.post("/api/set_valves", &[], Some(&body)).await?;
        Ok(())
    }

    pub async fn start_collector(&self) -> Result<()> {
        self.post("/api/start_collector", &[], None).await?;
        Ok(())
    }

    pub async fn cancel_collector(&self) -> Result<()> {
        self.post("/api/cancel_collector", &[], None).await?;
        Ok(())
    }

    pub async fn collector(&self) -> Result<Value> {
        self.get("/api/get_collector", &[]).await
    }

    pub async fn replay(&self, since: f64) -> Result<()> {
        self.post("/api/replay", &[("since", since.to_string())], None).await?;
        Ok(())
    }

    pub async fn cancel_replay(&self) -> Result<()> {
        self.post("/api/cancel_replay", &[], None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_field_becomes_remote_error() {
        let err = ApiClient::check(json!({"error": "collector active"})).unwrap_err();
        assert!(matches!(err, Error::Remote(msg) if msg == "collector active"));
    }

    #[test]
    fn test_null_and_absent_error_pass_through() {
        assert!(ApiClient::check(json!({"error": null, "values": {}})).is_ok());
        assert!(ApiClient::check(json!({"values": {}})).is_ok());
    }
}
