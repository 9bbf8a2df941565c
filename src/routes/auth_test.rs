use axum::extract::FromRequestParts;
use axum::http::Request;

use super::*;
use crate::state::test_helpers;

fn parts(headers: &[(&str, &str)]) -> Parts {
    let mut builder = Request::builder().uri("/api/workspaces/1/nodes/n/transforms");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(()).unwrap().into_parts().0
}

#[test]
fn token_from_bearer_header() {
    let p = parts(&[("authorization", "Bearer abc123")]);
    assert_eq!(session_token(&p).as_deref(), Some("abc123"));
}

#[test]
fn token_from_cookie() {
    let p = parts(&[("cookie", "theme=dark; session_token=tok42")]);
    assert_eq!(session_token(&p).as_deref(), Some("tok42"));
}

#[test]
fn bearer_wins_over_cookie() {
    let p = parts(&[("authorization", "Bearer fromheader"), ("cookie", "session_token=fromcookie")]);
    assert_eq!(session_token(&p).as_deref(), Some("fromheader"));
}

#[test]
fn missing_or_blank_token_is_none() {
    assert!(session_token(&parts(&[])).is_none());
    assert!(session_token(&parts(&[("authorization", "Bearer   ")])).is_none());
    assert!(session_token(&parts(&[("authorization", "Basic dXNlcg==")])).is_none());
    assert!(session_token(&parts(&[("cookie", "session_token=")])).is_none());
}

#[tokio::test]
async fn extractor_rejects_request_without_credentials() {
    let state = test_helpers::test_app_state();
    let mut p = parts(&[]);
    let result = AuthUser::from_request_parts(&mut p, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}
