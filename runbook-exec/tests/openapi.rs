mod common;

use std::collections::BTreeMap;

use common::{book_in, json_response, text_response, write, MockHttpClient, RecordingEventSink};
use runbook_exec::runner::http::{HttpRequestParts, HttpResponseParts};
use runbook_exec::{ErrorKind, HttpValidator, OpenApi3Validator, Operator, ValidationError};
use serde_json::{json, Value};
use tempfile::tempdir;
use url::Url;

const USERS_API: &str = r#"
openapi: 3.0.3
info:
  title: users
  version: 0.0.1
servers:
  - url: https://api.example.com/api/{version}
    variables:
      version:
        default: v1
paths:
  /users:
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [username, password]
              properties:
                username:
                  type: string
                password:
                  type: string
                  minLength: 8
      responses:
        201:
          description: created
        400:
          description: bad request
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Error'
  /users/{id}:
    parameters:
      - name: id
        in: path
        schema:
          type: integer
    get:
      parameters:
        - name: verbose
          in: query
          schema:
            type: boolean
      responses:
        200:
          description: found
          content:
            application/json:
              schema:
                type: object
                required: [data]
                properties:
                  data:
                    type: object
                    required: [username, email]
                    properties:
                      username:
                        type: string
                      email:
                        type: string
        4XX:
          description: client error
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Error'
  /avatar:
    get:
      responses:
        200:
          description: image
          content:
            image/png: {}
components:
  schemas:
    Error:
      type: object
      required: [error]
      properties:
        error:
          type: string
"#;

fn validator() -> OpenApi3Validator {
    OpenApi3Validator::from_data(USERS_API, false, false).unwrap()
}

fn req(method: &str, path: &str, body: Option<Value>) -> HttpRequestParts {
    let mut headers = Vec::new();
    let body = match body {
        Some(b) => {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
            serde_json::to_vec(&b).unwrap()
        }
        None => Vec::new(),
    };
    HttpRequestParts {
        method: method.to_string(),
        url: Url::parse(&format!("https://api.example.com/api/v1{path}")).unwrap(),
        headers,
        body,
    }
}

#[test]
fn valid_request_passes() {
    let v = validator();
    let r = req("POST", "/users", Some(json!({"username": "alice", "password": "longenough"})));
    v.validate_request(&r).unwrap();
}

#[test]
fn missing_required_property_fails_the_request() {
    let v = validator();
    let r = req("POST", "/users", Some(json!({"username": "alice"})));
    let err = v.validate_request(&r).unwrap_err();
    assert!(matches!(err, ValidationError::Request { .. }), "{err}");
    assert!(err.to_string().contains("password"));
}

#[test]
fn missing_required_body_fails_the_request() {
    let v = validator();
    let err = v.validate_request(&req("POST", "/users", None)).unwrap_err();
    assert!(matches!(err, ValidationError::Request { .. }));
}

#[test]
fn path_and_query_parameters_are_coerced() {
    let v = validator();
    v.validate_request(&req("GET", "/users/12?verbose=true", None)).unwrap();

    let err = v.validate_request(&req("GET", "/users/abc", None)).unwrap_err();
    assert!(matches!(err, ValidationError::Request { .. }));
    let err = v.validate_request(&req("GET", "/users/12?verbose=maybe", None)).unwrap_err();
    assert!(matches!(err, ValidationError::Request { .. }));
}

#[test]
fn unknown_route_is_reported() {
    let v = validator();
    let err = v.validate_request(&req("GET", "/orders", None)).unwrap_err();
    assert!(matches!(err, ValidationError::NoRoute { .. }));
    let err = v.validate_request(&req("DELETE", "/users", None)).unwrap_err();
    assert!(matches!(err, ValidationError::NoRoute { .. }));
}

#[test]
fn response_body_is_checked_against_the_status_schema() {
    let v = validator();
    let r = req("POST", "/users", Some(json!({"username": "a", "password": "12345678"})));

    v.validate_response(&r, &json_response(400, json!({"error": "taken"})))
        .unwrap();
    let err = v
        .validate_response(&r, &json_response(400, json!({"message": "taken"})))
        .unwrap_err();
    assert!(matches!(err, ValidationError::Response { status: 400, .. }));
}

#[test]
fn nested_required_fields_are_checked() {
    let v = validator();
    let r = req("GET", "/users/1", None);

    v.validate_response(
        &r,
        &json_response(200, json!({"data": {"username": "alice", "email": "a@example.com"}})),
    )
    .unwrap();
    let err = v
        .validate_response(&r, &json_response(200, json!({"data": {"username": "alice"}})))
        .unwrap_err();
    assert!(err.to_string().contains("email"), "{err}");
}

#[test]
fn status_ranges_match_and_undeclared_statuses_fail() {
    let v = validator();
    let r = req("GET", "/users/1", None);

    v.validate_response(&r, &json_response(404, json!({"error": "not found"})))
        .unwrap();
    let err = v
        .validate_response(&r, &json_response(500, json!({"error": "boom"})))
        .unwrap_err();
    assert!(matches!(err, ValidationError::Response { status: 500, .. }));
}

#[test]
fn response_without_declared_content_passes() {
    let v = validator();
    let r = req("POST", "/users", Some(json!({"username": "a", "password": "12345678"})));
    v.validate_response(&r, &HttpResponseParts {
        status: 201,
        headers: BTreeMap::new(),
        body: Vec::new(),
    })
    .unwrap();
}

#[test]
fn unsupported_body_format_is_distinguished() {
    let v = validator();
    let r = req("GET", "/avatar", None);
    let err = v
        .validate_response(&r, &text_response(200, "image/png", "PNG"))
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn skip_flags_disable_each_side() {
    let v = OpenApi3Validator::from_data(USERS_API, true, true).unwrap();
    v.validate_request(&req("POST", "/users", None)).unwrap();
    v.validate_response(&req("GET", "/users/1", None), &json_response(500, json!({})))
        .unwrap();
}

#[test]
fn documents_must_be_openapi_3() {
    let err = OpenApi3Validator::from_data("swagger: '2.0'\npaths: {}\n", false, false).unwrap_err();
    assert!(err.contains("openapi"));
    let err = OpenApi3Validator::from_data("openapi: 2.0.0\npaths: {}\n", false, false).unwrap_err();
    assert!(err.contains("2.0.0"));
}

#[test]
fn dangling_refs_are_rejected_at_load() {
    let doc = r##"
openapi: 3.0.0
paths:
  /a:
    get:
      responses:
        200:
          description: ok
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Missing'
"##;
    assert!(OpenApi3Validator::from_data(doc, false, false).is_err());
}

fn openapi_book(dir: &std::path::Path, path: &str) -> runbook_core::Runbook {
    write(dir, "users.yml", USERS_API);
    book_in(
        &format!(
            r#"
runners:
  req:
    endpoint: https://api.example.com/api/v1
    openapi3: users.yml
steps:
  - req:
      {path}:
        get: {{}}
"#
        ),
        dir,
    )
}

#[tokio::test]
async fn invalid_response_fails_the_step() {
    let dir = tempdir().unwrap();
    let client = MockHttpClient::always(json_response(200, json!({"data": {}})));
    let mut op = Operator::builder(openapi_book(dir.path(), "/users/1"))
        .http_client("req", client)
        .build()
        .await
        .unwrap();

    let result = op.run().await;

    assert!(!result.succeeded);
    assert_eq!(result.error().unwrap().kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unsupported_response_format_is_a_warning() {
    let dir = tempdir().unwrap();
    let client = MockHttpClient::always(text_response(200, "image/png", "PNG"));
    let sink = RecordingEventSink::new();
    let mut op = Operator::builder(openapi_book(dir.path(), "/avatar"))
        .http_client("req", client)
        .events(sink.clone())
        .build()
        .await
        .unwrap();

    let result = op.run().await;

    assert!(result.succeeded, "{:?}", result.error());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind(), ErrorKind::UnsupportedValidation);
    assert!(result.warnings[0].is_unsupported_validation());
    assert!(result.steps[0].warnings[0].is_unsupported_validation());
    assert!(sink.types().contains(&"validation.warning"));
}

#[tokio::test]
async fn missing_openapi_document_is_a_config_error() {
    let dir = tempdir().unwrap();
    let book = book_in(
        "runners:\n  req:\n    endpoint: https://api.example.com\n    openapi3: nope.yml\nsteps: []\n",
        dir.path(),
    );
    let err = Operator::builder(book).build().await.err().unwrap();
    assert!(matches!(err, runbook_exec::ConfigError::OpenApi { .. }));
}
