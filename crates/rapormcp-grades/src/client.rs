//! Backend access.
//!
//! Tools never talk HTTP themselves: they receive an `Arc<dyn GradesApi>`,
//! which is an [`HttpGradesClient`] in production and an in-memory double
//! in tests.
//!
//! # Routes
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET /{kind}` |
//! | get       | `GET /{kind}/{id}` |
//! | create    | `POST /{kind}` with a JSON body |
//! | update    | `PUT /{kind}/{id}` with a JSON body |
//! | delete    | `DELETE /{kind}/{id}` |
//!
//! where `kind` is `mapel`, `siswa` or `nilai`.

use std::time::Duration;

use async_trait::async_trait;
use rapormcp_core::logging::{debug, targets, warn};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::models::{Mapel, NewMapel, NewNilai, Nilai, Siswa};

/// Backend used when `RAPOR_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the grade-book backend.
#[derive(Debug, thiserror::Error)]
pub enum GradesError {
    /// Connection, timeout or body decoding failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The record does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// Any other non-success status.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// CRUD operations over the grade book.
#[async_trait]
pub trait GradesApi: Send + Sync {
    async fn list_mapel(&self) -> Result<Vec<Mapel>, GradesError>;
    async fn get_mapel(&self, id: i64) -> Result<Mapel, GradesError>;
    async fn create_mapel(&self, mapel: &NewMapel) -> Result<Mapel, GradesError>;
    async fn update_mapel(&self, id: i64, mapel: &NewMapel) -> Result<Mapel, GradesError>;
    async fn delete_mapel(&self, id: i64) -> Result<(), GradesError>;

    async fn list_siswa(&self) -> Result<Vec<Siswa>, GradesError>;
    async fn get_siswa(&self, id: i64) -> Result<Siswa, GradesError>;

    async fn list_nilai(&self) -> Result<Vec<Nilai>, GradesError>;
    async fn get_nilai(&self, id: i64) -> Result<Nilai, GradesError>;
    async fn create_nilai(&self, nilai: &NewNilai) -> Result<Nilai, GradesError>;
    async fn update_nilai(&self, id: i64, nilai: &NewNilai) -> Result<Nilai, GradesError>;
    async fn delete_nilai(&self, id: i64) -> Result<(), GradesError>;

    /// Grades of one student. The backend has no filter, so this lists
    /// everything and filters locally.
    async fn nilai_for_siswa(&self, siswa_id: i64) -> Result<Vec<Nilai>, GradesError> {
        let all = self.list_nilai().await?;
        Ok(all.into_iter().filter(|n| n.siswa_id == siswa_id).collect())
    }
}

/// [`GradesApi`] over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpGradesClient {
    http: Client,
    base_url: String,
}

impl HttpGradesClient {
    /// Creates a client for `base_url` with a 30 second request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, GradesError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(base_url, http))
    }

    /// Creates a client reusing an existing `reqwest` client.
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, GradesError> {
        debug!(target: targets::GRADES, "{} {}", method, path);
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(GradesError::NotFound(path.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        warn!(target: targets::GRADES, "{} {} failed with {}", method, path, status);
        Err(GradesError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GradesError> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        Ok(response.json().await?)
    }

    async fn write<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, GradesError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self.send(method, path, Some(body)).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), GradesError> {
        self.send::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }
}

#[async_trait]
impl GradesApi for HttpGradesClient {
    async fn list_mapel(&self) -> Result<Vec<Mapel>, GradesError> {
        self.get("mapel").await
    }

    async fn get_mapel(&self, id: i64) -> Result<Mapel, GradesError> {
        self.get(&format!("mapel/{id}")).await
    }

    async fn create_mapel(&self, mapel: &NewMapel) -> Result<Mapel, GradesError> {
        self.write(Method::POST, "mapel", mapel).await
    }

    async fn update_mapel(&self, id: i64, mapel: &NewMapel) -> Result<Mapel, GradesError> {
        self.write(Method::PUT, &format!("mapel/{id}"), mapel).await
    }

    async fn delete_mapel(&self, id: i64) -> Result<(), GradesError> {
        self.delete(&format!("mapel/{id}")).await
    }

    async fn list_siswa(&self) -> Result<Vec<Siswa>, GradesError> {
        self.get("siswa").await
    }

    async fn get_siswa(&self, id: i64) -> Result<Siswa, GradesError> {
        self.get(&format!("siswa/{id}")).await
    }

    async fn list_nilai(&self) -> Result<Vec<Nilai>, GradesError> {
        self.get("nilai").await
    }

    async fn get_nilai(&self, id: i64) -> Result<Nilai, GradesError> {
        self.get(&format!("nilai/{id}")).await
    }

    async fn create_nilai(&self, nilai: &NewNilai) -> Result<Nilai, GradesError> {
        self.write(Method::POST, "nilai", nilai).await
    }

    async fn update_nilai(&self, id: i64, nilai: &NewNilai) -> Result<Nilai, GradesError> {
        self.write(Method::PUT, &format!("nilai/{id}"), nilai).await
    }

    async fn delete_nilai(&self, id: i64) -> Result<(), GradesError> {
        self.delete(&format!("nilai/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpGradesClient {
        HttpGradesClient::new(format!("{}/", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn lists_subjects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mapel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "nama": "Matematika"},
                {"id": 2, "nama": "Bahasa Indonesia"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mapel = client.list_mapel().await.unwrap();
        assert_eq!(mapel.len(), 2);
        assert_eq!(mapel[1].nama, "Bahasa Indonesia");
    }

    #[tokio::test]
    async fn creates_grade_with_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/nilai"))
            .and(body_json(json!({"siswaId": 1, "mapelId": 2, "nilai": 88.0})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 10, "siswaId": 1, "mapelId": 2, "nilai": 88.0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let created = client
            .create_nilai(&NewNilai {
                siswa_id: 1,
                mapel_id: 2,
                nilai: 88.0,
            })
            .await
            .unwrap();
        assert_eq!(created.id, 10);
    }

    #[tokio::test]
    async fn updates_and_deletes_subject() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/mapel/3"))
            .and(body_json(json!({"nama": "Fisika"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 3, "nama": "Fisika"})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/mapel/3"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let updated = client
            .update_mapel(
                3,
                &NewMapel {
                    nama: "Fisika".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.nama, "Fisika");
        client.delete_mapel(3).await.unwrap();
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/siswa/99"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Siswa tidak ditemukan"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get_siswa(99).await.unwrap_err();
        assert!(matches!(err, GradesError::NotFound(ref p) if p == "siswa/99"));
        assert_eq!(err.to_string(), "siswa/99 not found");
    }

    #[tokio::test]
    async fn server_error_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nilai"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.list_nilai().await.unwrap_err();
        match err {
            GradesError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "database down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn grades_for_student_are_filtered_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nilai"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "siswaId": 1, "mapelId": 1, "nilai": 80},
                {"id": 2, "siswaId": 2, "mapelId": 1, "nilai": 75},
                {"id": 3, "siswaId": 1, "mapelId": 2, "nilai": 90}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let grades = client.nilai_for_siswa(1).await.unwrap();
        let ids: Vec<_> = grades.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = HttpGradesClient::with_client("http://localhost:3000/", Client::new());
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.url("mapel/1"), "http://localhost:3000/mapel/1");
    }
}
