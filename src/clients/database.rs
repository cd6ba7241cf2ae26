//! # Database Client
//!
//! HTTP client for the database service: customer lookup by order id, disabling
//! menu items when a component runs out, and a health endpoint.
//!
//! | Operation | Request | Answer |
//! |-----------|---------|--------|
//! | lookup | `GET {customer_lookup}` | `{order_id, customer_name, email?, phone?}` |
//! | disable menu | `POST {menu_disable}` `{components}` | `{disabled_items}` |
//! | health | `GET {health}` | any 2xx |

use crate::config::DatabaseConfig;
use crate::framework::{
    CustomerDirectory, MenuControl, StepError, Transport, TransportError, TransportKind,
};
use crate::model::CustomerRecord;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

const NAME: &str = "database";

#[derive(Serialize)]
struct DisableMenuRequest<'a> {
    components: &'a [String],
}

#[derive(Deserialize)]
struct DisableMenuResponse {
    #[serde(default)]
    disabled_items: Vec<String>,
}

pub struct DatabaseClient {
    config: DatabaseConfig,
    http: RwLock<Option<reqwest::Client>>,
}

impl DatabaseClient {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            http: RwLock::new(None),
        }
    }

    fn http(&self) -> Result<reqwest::Client, TransportError> {
        // reqwest::Client is a handle; cloning it is cheap and keeps the lock short.
        self.http
            .read()
            .clone()
            .ok_or_else(|| TransportError::NotInitialized(NAME.into()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_error(&self, operation: &str, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::timeout(operation, self.config.request_timeout)
        } else if err.is_decode() {
            TransportError::protocol(NAME, err)
        } else {
            TransportError::unavailable(NAME, err)
        }
    }

    async fn checked(
        &self,
        operation: &str,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, TransportError> {
        let response = response.map_err(|e| self.request_error(operation, e))?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::remote(NAME, format!("{operation} returned {status}: {body}")))
        }
    }
}

#[async_trait]
impl Transport for DatabaseClient {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> TransportKind {
        TransportKind::HttpClient
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| TransportError::unavailable(NAME, e))?;
        *self.http.write() = Some(client);
        info!(transport = NAME, base_url = %self.config.base_url, "Database client initialized");
        Ok(())
    }

    async fn shutdown(&self) {
        self.http.write().take();
        info!(transport = NAME, "Database client shut down");
    }

    async fn health_check(&self) -> Result<bool, TransportError> {
        let response = self
            .http()?
            .get(self.url(&self.config.endpoints.health))
            .send()
            .await
            .map_err(|e| self.request_error("health check", e))?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl CustomerDirectory for DatabaseClient {
    #[instrument(skip(self))]
    async fn lookup_customer(&self, order_id: &str) -> Result<CustomerRecord, StepError> {
        let path = self.config.endpoints.customer_lookup.replace("{order_id}", order_id);
        let response = self.http()?.get(self.url(&path)).send().await;
        let record: CustomerRecord = self
            .checked("customer lookup", response)
            .await?
            .json()
            .await
            .map_err(|e| self.request_error("customer lookup", e))?;
        debug!(customer = %record.customer_name, "Customer resolved");
        Ok(record)
    }
}

#[async_trait]
impl MenuControl for DatabaseClient {
    #[instrument(skip(self))]
    async fn disable_menu_items(&self, components: &[String]) -> Result<Vec<String>, StepError> {
        let response = self
            .http()?
            .post(self.url(&self.config.endpoints.menu_disable))
            .json(&DisableMenuRequest { components })
            .send()
            .await;
        let body: DisableMenuResponse = self
            .checked("menu disable", response)
            .await?
            .json()
            .await
            .map_err(|e| self.request_error("menu disable", e))?;
        info!(disabled = ?body.disabled_items, "Menu items disabled");
        Ok(body.disabled_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn database_router() -> Router {
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/customer/{order_id}",
                get(|Path(order_id): Path<String>| async move {
                    if order_id == "missing" {
                        return Err(StatusCode::NOT_FOUND);
                    }
                    Ok(Json(json!({
                        "order_id": order_id,
                        "customer_name": "Ada",
                        "email": "ada@example.com",
                    })))
                }),
            )
            .route(
                "/menu/disable",
                post(|Json(body): Json<Value>| async move {
                    let items: Vec<String> = body["components"]
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(|c| c.as_str())
                        .map(|c| format!("{c}_latte"))
                        .collect();
                    Json(json!({ "disabled_items": items }))
                }),
            )
    }

    async fn client() -> DatabaseClient {
        let base_url = serve(database_router()).await;
        let client = DatabaseClient::new(DatabaseConfig {
            base_url,
            ..DatabaseConfig::default()
        });
        client.initialize().await.unwrap();
        client
    }

    #[tokio::test]
    async fn looks_up_customers() {
        let db = client().await;
        let record = db.lookup_customer("order_123").await.unwrap();
        assert_eq!(record.order_id, "order_123");
        assert_eq!(record.customer_name, "Ada");
        assert_eq!(record.email.as_deref(), Some("ada@example.com"));
        assert_eq!(record.phone, None);
    }

    #[tokio::test]
    async fn non_success_status_is_a_remote_error() {
        let db = client().await;
        let err = db.lookup_customer("missing").await.unwrap_err();
        assert!(matches!(err, StepError::Transport(TransportError::Remote { .. })));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn disables_menu_items() {
        let db = client().await;
        let disabled = db.disable_menu_items(&["milk".to_string()]).await.unwrap();
        assert_eq!(disabled, vec!["milk_latte".to_string()]);
    }

    #[tokio::test]
    async fn health_follows_the_endpoint() {
        let db = client().await;
        assert!(db.is_healthy().await);
        db.shutdown().await;
        assert_eq!(
            db.health_check().await,
            Err(TransportError::NotInitialized("database".into()))
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let db = DatabaseClient::new(DatabaseConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..DatabaseConfig::default()
        });
        db.initialize().await.unwrap();
        let err = db.lookup_customer("order_123").await.unwrap_err();
        assert!(matches!(
            err,
            StepError::Transport(
                TransportError::Unavailable { .. } | TransportError::Timeout { .. }
            )
        ));
    }
}
