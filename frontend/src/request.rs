// keep in sync with api.rs of backend
use common::req::ErrorBody;
use log::debug;
use reqwest::{header::ACCEPT, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::{
    config::ClientConfig,
    gateway::{Fetch, Filter, Gateway, GatewayError, Table},
};

/// [`Gateway`] talking JSON to the backend service.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    host_url: String,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            host_url: config.api_url.trim_end_matches('/').to_owned(),
        }
    }

    fn api_url(&self, table: Table, endpoint: Option<&str>) -> String {
        let host_url = &self.host_url;
        let table = table.name();
        match endpoint {
            Some(endpoint) => format!("{host_url}/api/{table}/{endpoint}"),
            None => format!("{host_url}/api/{table}"),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let resp = request.header(ACCEPT, "application/json").send().await?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(rejection(resp).await)
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

async fn rejection(resp: Response) -> GatewayError {
    let status = resp.status();
    let body = resp.json::<ErrorBody>().await.ok();
    debug!("backend answered {status}: {body:?}");
    match body {
        Some(body) => GatewayError::Rejected {
            status: status.as_u16(),
            code: Some(body.code),
            message: body.message,
        },
        None => GatewayError::Rejected {
            status: status.as_u16(),
            code: None,
            message: status.canonical_reason().unwrap_or_default().to_owned(),
        },
    }
}

impl Gateway for HttpGateway {
    async fn insert(&self, table: Table, record: Value) -> Result<(), GatewayError> {
        self.send(self.client.post(self.api_url(table, None)).json(&record))
            .await?;
        Ok(())
    }

    async fn upsert(&self, table: Table, record: Value) -> Result<(), GatewayError> {
        self.send(self.client.put(self.api_url(table, None)).json(&record))
            .await?;
        Ok(())
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<(), GatewayError> {
        self.send(
            self.client
                .patch(self.api_url(table, None))
                .query(filter.pairs())
                .json(&patch),
        )
        .await?;
        Ok(())
    }

    async fn fetch_one(&self, table: Table, filter: &Filter) -> Fetch<Value> {
        let request = self
            .client
            .get(self.api_url(table, Some("one")))
            .query(filter.pairs());
        match self.send(request).await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(row) => Fetch::Found(row),
                Err(err) => Fetch::Error(err.into()),
            },
            Err(GatewayError::Rejected { status, code, .. })
                if status == StatusCode::NOT_FOUND.as_u16()
                    && code.as_deref() == Some(ErrorBody::NOT_FOUND) =>
            {
                Fetch::NotFound
            }
            Err(err) => Fetch::Error(err),
        }
    }

    async fn fetch_all(&self, table: Table, filter: &Filter) -> Result<Vec<Value>, GatewayError> {
        let resp = self
            .send(self.client.get(self.api_url(table, None)).query(filter.pairs()))
            .await?;
        Ok(resp.json::<Vec<Value>>().await?)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), GatewayError> {
        self.send(self.client.delete(self.api_url(table, None)).query(filter.pairs()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn urls_follow_table_names() {
        let gw = HttpGateway::new(&ClientConfig {
            api_url: "http://tank.local:8081/".to_owned(),
        });
        assert_eq!(gw.api_url(Table::Devices, None), "http://tank.local:8081/api/devices");
        assert_eq!(
            gw.api_url(Table::Settings, Some("one")),
            "http://tank.local:8081/api/settings/one"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // port 9 (discard) is closed on any sane test machine
        let gw = HttpGateway::new(&ClientConfig {
            api_url: "http://127.0.0.1:9".to_owned(),
        });
        let fetched = gw
            .fetch_one(Table::Settings, &Filter::new().eq("setting_type", "thresholds"))
            .await;
        assert!(matches!(fetched, Fetch::Error(GatewayError::Transport(_))));
    }
}
