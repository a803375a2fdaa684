//! HTTP gateway for the hosted mobile-apps backend
//!
//! Tables live under `/tables/{Table}`, summaries under `/api/{Name}`. Every
//! request carries the session token in `X-ZUMO-AUTH`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::query::{self, ListQuery};
use super::{tables, RemoteDataGateway};
use crate::auth::Credentials;
use crate::config::Settings;
use crate::error::{ExpenseError, ExpenseResult};
use crate::models::{
    Account, CurrentExpensePeriodSummary, ExpenseItem, ExpenseItemId, ExpensePeriod,
    ExpensePeriodId, ExpensePeriodSummary, UserProfile,
};

/// Header carrying the session token
pub const AUTH_HEADER: &str = "X-ZUMO-AUTH";

/// Protocol version header the backend requires
pub const API_VERSION_HEADER: &str = "ZUMO-API-VERSION";

pub const API_VERSION: &str = "2.0.0";

const EXPENSE_PERIOD_SUMMARY_API: &str = "ExpensePeriodSummary";
const CURRENT_EXPENSE_PERIOD_SUMMARY_API: &str = "CurrentExpensePeriodSummary";

/// [`RemoteDataGateway`] over HTTP
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(settings: &Settings) -> ExpenseResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ExpenseError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.backend_root().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // --------------------------------------------------------------------
    // Request helpers
    // --------------------------------------------------------------------

    fn authed(&self, method: Method, path: &str, creds: &Credentials) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTH_HEADER, &creds.token)
            .header(API_VERSION_HEADER, API_VERSION)
    }

    async fn send(req: RequestBuilder) -> ExpenseResult<reqwest::Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| ExpenseError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ExpenseError::Unauthorized(if body.is_empty() {
                "The session token was rejected".to_string()
            } else {
                body
            }));
        }
        Err(ExpenseError::Server {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> ExpenseResult<T> {
        let resp = Self::send(req).await?;
        Ok(resp.json().await?)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        creds: &Credentials,
        table: &str,
        query: ListQuery,
    ) -> ExpenseResult<Vec<T>> {
        debug!(table, "Listing table");
        let req = self
            .authed(Method::GET, &format!("/tables/{}", table), creds)
            .query(&query.to_params());
        Self::send_json(req).await
    }

    async fn insert<T>(&self, creds: &Credentials, table: &str, row: &T) -> ExpenseResult<T>
    where
        T: serde::Serialize + DeserializeOwned + Sync,
    {
        let req = self
            .authed(Method::POST, &format!("/tables/{}", table), creds)
            .json(row);
        Self::send_json(req).await
    }

    async fn update<T>(
        &self,
        creds: &Credentials,
        table: &str,
        id: &str,
        row: &T,
    ) -> ExpenseResult<T>
    where
        T: serde::Serialize + DeserializeOwned + Sync,
    {
        let req = self
            .authed(Method::PATCH, &format!("/tables/{}/{}", table, id), creds)
            .json(row);
        Self::send_json(req).await
    }

    async fn delete(&self, creds: &Credentials, table: &str, id: &str) -> ExpenseResult<()> {
        let req = self.authed(Method::DELETE, &format!("/tables/{}/{}", table, id), creds);
        Self::send(req).await.map(|_| ())
    }
}

/// Turn a 404 on a row route into a typed not-found error
fn row_not_found(err: ExpenseError, not_found: impl FnOnce() -> ExpenseError) -> ExpenseError {
    match err {
        ExpenseError::Server { status: 404, .. } => not_found(),
        other => other,
    }
}

#[async_trait]
impl RemoteDataGateway for HttpGateway {
    async fn expense_items(&self, creds: &Credentials) -> ExpenseResult<Vec<ExpenseItem>> {
        self.list(creds, tables::EXPENSE_ITEM, query::EXPENSE_ITEMS)
            .await
    }

    async fn insert_expense_item(
        &self,
        creds: &Credentials,
        item: &ExpenseItem,
    ) -> ExpenseResult<ExpenseItem> {
        self.insert(creds, tables::EXPENSE_ITEM, item).await
    }

    async fn update_expense_item(
        &self,
        creds: &Credentials,
        item: &ExpenseItem,
    ) -> ExpenseResult<ExpenseItem> {
        self.update(creds, tables::EXPENSE_ITEM, item.id.as_str(), item)
            .await
            .map_err(|e| row_not_found(e, || ExpenseError::expense_item_not_found(item.id.as_str())))
    }

    async fn delete_expense_item(
        &self,
        creds: &Credentials,
        id: &ExpenseItemId,
    ) -> ExpenseResult<()> {
        self.delete(creds, tables::EXPENSE_ITEM, id.as_str())
            .await
            .map_err(|e| row_not_found(e, || ExpenseError::expense_item_not_found(id.as_str())))
    }

    async fn expense_periods(&self, creds: &Credentials) -> ExpenseResult<Vec<ExpensePeriod>> {
        self.list(creds, tables::EXPENSE_PERIOD, query::EXPENSE_PERIODS)
            .await
    }

    async fn insert_expense_period(
        &self,
        creds: &Credentials,
        period: &ExpensePeriod,
    ) -> ExpenseResult<ExpensePeriod> {
        self.insert(creds, tables::EXPENSE_PERIOD, period).await
    }

    async fn update_expense_period(
        &self,
        creds: &Credentials,
        period: &ExpensePeriod,
    ) -> ExpenseResult<ExpensePeriod> {
        self.update(creds, tables::EXPENSE_PERIOD, period.id.as_str(), period)
            .await
            .map_err(|e| {
                row_not_found(e, || ExpenseError::expense_period_not_found(period.id.as_str()))
            })
    }

    async fn delete_expense_period(
        &self,
        creds: &Credentials,
        id: &ExpensePeriodId,
    ) -> ExpenseResult<()> {
        self.delete(creds, tables::EXPENSE_PERIOD, id.as_str())
            .await
            .map_err(|e| row_not_found(e, || ExpenseError::expense_period_not_found(id.as_str())))
    }

    async fn user_profiles(&self, creds: &Credentials) -> ExpenseResult<Vec<UserProfile>> {
        self.list(creds, tables::USER_PROFILE, ListQuery::unordered())
            .await
    }

    async fn insert_user_profile(
        &self,
        creds: &Credentials,
        profile: &UserProfile,
    ) -> ExpenseResult<UserProfile> {
        self.insert(creds, tables::USER_PROFILE, profile).await
    }

    async fn accounts(&self, creds: &Credentials) -> ExpenseResult<Vec<Account>> {
        self.list(creds, tables::ACCOUNT, ListQuery::unordered())
            .await
    }

    async fn expense_period_summaries(
        &self,
        creds: &Credentials,
    ) -> ExpenseResult<Vec<ExpensePeriodSummary>> {
        let path = format!("/api/{}", EXPENSE_PERIOD_SUMMARY_API);
        Self::send_json(self.authed(Method::GET, &path, creds)).await
    }

    async fn current_expense_period_summary(
        &self,
        creds: &Credentials,
    ) -> ExpenseResult<CurrentExpensePeriodSummary> {
        let path = format!("/api/{}", CURRENT_EXPENSE_PERIOD_SUMMARY_API);
        Self::send_json(self.authed(Method::GET, &path, creds)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Money;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> HttpGateway {
        let settings = Settings {
            backend_url: format!("{}/", server.uri()),
            ..Settings::default()
        };
        HttpGateway::new(&settings).unwrap()
    }

    fn creds() -> Credentials {
        Credentials::new("sid:1", "zumo-token")
    }

    #[tokio::test]
    async fn test_list_sends_order_limit_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tables/ExpenseItem"))
            .and(query_param("$orderby", "date desc"))
            .and(query_param("$top", "100"))
            .and(header(AUTH_HEADER, "zumo-token"))
            .and(header(API_VERSION_HEADER, API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "a1",
                    "amount": 12.34,
                    "description": "Coffee",
                    "date": "2016-01-02T08:30:00+01:00",
                    "createdBy": "sid:1"
                }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let items = gateway_for(&server).expense_items(&creds()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, Money::from_cents(1234));
        assert_eq!(items[0].created_by.as_deref(), Some("sid:1"));
    }

    #[tokio::test]
    async fn test_periods_order_by_start_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tables/ExpensePeriod"))
            .and(query_param("$orderby", "startDate desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let periods = gateway_for(&server).expense_periods(&creds()).await.unwrap();
        assert!(periods.is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_status_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/CurrentExpensePeriodSummary"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .current_expense_period_summary(&creds())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_server_error_keeps_raw_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ExpensePeriodSummary"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .expense_period_summaries(&creds())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExpenseError::Server {
                status: 500,
                message: "database unavailable".into()
            }
        );
    }

    #[tokio::test]
    async fn test_insert_posts_camel_case_row() {
        let server = MockServer::start().await;
        let item = ExpenseItem::new(Money::from_cents(1234), "Coffee");
        Mock::given(method("POST"))
            .and(path("/tables/ExpenseItem"))
            .and(body_partial_json(serde_json::json!({
                "id": item.id.as_str(),
                "description": "Coffee",
                "amount": 12.34
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(&item))
            .expect(1)
            .mount(&server)
            .await;

        let stored = gateway_for(&server)
            .insert_expense_item(&creds(), &item)
            .await
            .unwrap();
        assert_eq!(stored.id, item.id);
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/tables/ExpensePeriod/p1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = gateway_for(&server)
            .delete_expense_period(&creds(), &ExpensePeriodId::from("p1"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let settings = Settings {
            backend_url: "http://127.0.0.1:9".into(),
            request_timeout_secs: 2,
            ..Settings::default()
        };
        let err = HttpGateway::new(&settings)
            .unwrap()
            .accounts(&creds())
            .await
            .unwrap_err();
        assert!(matches!(err, ExpenseError::Network(_)));
    }
}
