use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::entities::Resource;
use crate::error::LookupError;
use crate::lookup::PageSource;
use crate::page::{PageRequest, PageResult, RawPage, normalize};
use crate::sources::{EMIS_BASE, EMIS_BASE_ENV};

pub struct EmisClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    token: Option<String>,
}

impl EmisClient {
    pub fn new() -> Result<Self, LookupError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(EMIS_BASE, EMIS_BASE_ENV),
            token: crate::sources::api_token(),
        })
    }

    /// Client against an explicit base URL; the token still comes from the
    /// environment.
    pub fn with_base(base: impl Into<String>) -> Result<Self, LookupError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base.into()),
            token: crate::sources::api_token(),
        })
    }

    #[cfg(test)]
    fn new_for_test(base: String, token: Option<&str>) -> Result<Self, LookupError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            token: token.map(str::to_string),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_ref().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        api: &str,
        req: reqwest_middleware::RequestBuilder,
    ) -> Result<T, LookupError> {
        let req = match self.token.as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await?;
        let status = resp.status();
        let content_type = resp.headers().get(reqwest::header::CONTENT_TYPE).cloned();
        let bytes = crate::sources::read_limited_body(resp, api).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(LookupError::Api {
                api: api.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }
        crate::sources::ensure_json_content_type(api, content_type.as_ref(), &bytes)?;
        serde_json::from_slice(&bytes).map_err(|source| LookupError::ApiJson {
            api: api.to_string(),
            source,
        })
    }

    /// `GET {base}/{resource}/?page=&page_size=&search=`; `search` is omitted
    /// for an empty term.
    pub async fn list(
        &self,
        resource: Resource,
        request: &PageRequest,
    ) -> Result<RawPage<Value>, LookupError> {
        let api = format!("emis/{}", resource.path());
        let url = self.endpoint(&format!("{}/", resource.path()));
        let page = request.page().to_string();
        let page_size = request.page_size().to_string();
        let mut req = self.client.get(&url).query(&[
            ("page", page.as_str()),
            ("page_size", page_size.as_str()),
        ]);
        if !request.term().is_empty() {
            req = req.query(&[("search", request.term().as_str())]);
        }
        self.get_json(&api, req).await
    }
}

/// [`PageSource`] over one E-MIS resource.
#[derive(Clone)]
pub struct ResourceSource {
    client: Arc<EmisClient>,
    resource: Resource,
}

impl ResourceSource {
    pub fn new(client: Arc<EmisClient>, resource: Resource) -> Self {
        Self { client, resource }
    }
}

#[async_trait]
impl PageSource for ResourceSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult, LookupError> {
        let raw = self.client.list(self.resource, request).await?;
        let resource = self.resource;
        Ok(normalize(raw, request, |item| {
            crate::transform::option::to_option(resource, &item)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{Outcome, PageAccumulator};
    use crate::page::SearchTerm;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(page: usize, page_size: usize, term: &str) -> PageRequest {
        PageRequest::new(page, page_size, SearchTerm::new(term)).unwrap()
    }

    #[tokio::test]
    async fn list_sends_page_size_and_search() {
        let server = MockServer::start().await;
        let client = EmisClient::new_for_test(format!("{}/api/v1", server.uri()), None).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v1/ranks/"))
            .and(query_param("page", "2"))
            .and(query_param("page_size", "10"))
            .and(query_param("search", "kap"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"results": [{"id": 3, "name": "Kapitan"}], "count": 11, "next": null}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let raw = client
            .list(Resource::Ranks, &request(2, 10, " kap "))
            .await
            .unwrap();
        assert_eq!(raw.count, Some(11));
        assert_eq!(raw.results.map(|r| r.len()), Some(1));
    }

    #[tokio::test]
    async fn list_omits_empty_search() {
        let server = MockServer::start().await;
        let client = EmisClient::new_for_test(server.uri(), None).unwrap();

        Mock::given(method("GET"))
            .and(path("/organizations/"))
            .and(query_param_is_missing("search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"results": []}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        client
            .list(Resource::Units, &request(1, 20, "   "))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_sends_bearer_token() {
        let server = MockServer::start().await;
        let client = EmisClient::new_for_test(server.uri(), Some("secret")).unwrap();

        Mock::given(method("GET"))
            .and(path("/news/"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"results": []}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        client
            .list(Resource::News, &request(1, 5, ""))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_api_error() {
        let server = MockServer::start().await;
        let client = EmisClient::new_for_test(server.uri(), None).unwrap();

        Mock::given(method("GET"))
            .and(path("/positions/"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"detail\": \"Not found.\"}"))
            .mount(&server)
            .await;

        let err = client
            .list(Resource::Positions, &request(9, 10, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Api { .. }));
        let msg = err.to_string();
        assert!(msg.contains("emis/positions"));
        assert!(msg.contains("404"));
    }

    #[tokio::test]
    async fn html_login_page_is_rejected() {
        let server = MockServer::start().await;
        let client = EmisClient::new_for_test(server.uri(), None).unwrap();

        Mock::given(method("GET"))
            .and(path("/courses/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>login</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let err = client
            .list(Resource::Courses, &request(1, 10, ""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTML"));
    }

    #[tokio::test]
    async fn invalid_json_is_an_api_json_error() {
        let server = MockServer::start().await;
        let client = EmisClient::new_for_test(server.uri(), None).unwrap();

        Mock::given(method("GET"))
            .and(path("/shtat/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{not json", "application/json"))
            .mount(&server)
            .await;

        let err = client
            .list(Resource::Shtat, &request(1, 10, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::ApiJson { .. }));
    }

    #[tokio::test]
    async fn resource_source_treats_missing_results_as_empty_page() {
        let server = MockServer::start().await;
        let client = EmisClient::new_for_test(server.uri(), None).unwrap();
        let source = ResourceSource::new(Arc::new(client), Resource::Competitions);

        Mock::given(method("GET"))
            .and(path("/competitions/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"total": 40}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let page = source.fetch_page(&request(1, 10, "")).await.unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn accumulator_pages_through_live_endpoint() {
        let server = MockServer::start().await;
        let client = EmisClient::new_for_test(server.uri(), None).unwrap();
        let source = ResourceSource::new(Arc::new(client), Resource::Persons);

        Mock::given(method("GET"))
            .and(path("/bio-persons/"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{
                  "results": [
                    {"id": 1, "last_name": "Aliyev", "first_name": "Rustam"},
                    {"id": 2, "last_name": "Karimova", "first_name": "Dilnoza"}
                  ],
                  "total": 3,
                  "page": 1
                }"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bio-persons/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{
                  "results": [
                    {"id": 2, "last_name": "Karimova", "first_name": "Dilnoza", "middle_name": "A."},
                    {"id": 3, "last_name": "Tursunov"}
                  ],
                  "total": 3,
                  "page": 2
                }"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let acc = PageAccumulator::new(source, 2).unwrap();
        acc.load_first_page(SearchTerm::default()).await.unwrap();
        assert!(acc.snapshot().has_more);

        let outcome = acc.load_next_page().await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Applied {
                added: 1,
                total_options: 3
            }
        );

        let state = acc.snapshot();
        let labels: Vec<&str> = state.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["Aliyev Rustam", "Karimova Dilnoza A.", "Tursunov"]);
        assert!(!state.has_more);
        assert_eq!(acc.load_next_page().await.unwrap(), Outcome::Skipped);
    }
}
