use http::Method;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::Router;
use crate::error::Error;
use crate::server::{BufferedResponse, RecordedResponse, RequestContext, ResponseHandle};

fn dispatch(
    router: &Router,
    method: Method,
    path: &str,
) -> (RecordedResponse, super::Dispatch) {
    let buffer = BufferedResponse::new();
    let res = ResponseHandle::new(buffer.clone());
    let d = router.route(&RequestContext::new(method, path), &res);
    (buffer.recorded().unwrap(), d)
}

#[test]
fn test_first_match_wins() {
    let mut router = Router::new();
    router
        .add("/things/{id}", Method::GET, |_, _, res| res.emit(200, "first"))
        .unwrap();
    router
        .add("/things/{id:[0-9]+}", Method::GET, |_, _, res| res.emit(200, "second"))
        .unwrap();

    let (resp, d) = dispatch(&router, Method::GET, "/things/5");
    assert_eq!(resp.json(), Some(json!("first")));
    assert_eq!(d.matched.as_deref(), Some("/things/{id}"));
    assert!(!d.not_found);
}

#[test]
fn test_method_not_allowed() {
    let mut router = Router::new();
    router
        .add("/things", Method::GET, |_, _, res| res.emit(200, &Value::Null))
        .unwrap();

    let (resp, d) = dispatch(&router, Method::DELETE, "/things");
    assert_eq!(resp.status, 405);
    assert!(!d.method_allowed);
    assert!(!d.not_found);
}

#[test]
fn test_method_not_allowed_stops_scan() {
    let mut router = Router::new();
    router
        .add("/things/{id}", Method::GET, |_, _, res| res.emit(200, "get"))
        .unwrap();
    router
        .add("/things/{id}/", Method::DELETE, |_, _, res| res.emit(200, "never"))
        .unwrap();

    // The second template normalises to the same path but sits later in the table.
    let (resp, _) = dispatch(&router, Method::DELETE, "/things/1");
    assert_eq!(resp.status, 405);
}

#[test]
fn test_not_found() {
    let router = Router::new();
    let (resp, d) = dispatch(&router, Method::GET, "/nothing");
    assert_eq!(resp.status, 404);
    assert!(d.matched.is_none());
    assert!(d.not_found);
    assert_eq!(resp.json().unwrap()["path"], "/nothing");
}

#[test]
fn test_matched_handler_that_writes_nothing_yields_404() {
    let mut router = Router::new();
    router
        .add("/quiet", Method::GET, |_, _, _| Ok(()))
        .unwrap();

    let (resp, d) = dispatch(&router, Method::GET, "/quiet");
    assert_eq!(resp.status, 404);
    assert!(d.method_allowed);
    assert!(d.not_found);
}

#[test]
fn test_handler_error_maps_status() {
    let mut router = Router::new();
    router
        .add("/bad", Method::POST, |_, _, _| Err(Error::invalid("name required")))
        .unwrap();
    router
        .add("/boom", Method::GET, |_, _, _| {
            Err(Error::Backend(crate::backend::BackendError::Unavailable))
        })
        .unwrap();

    let (bad, _) = dispatch(&router, Method::POST, "/bad");
    assert_eq!(bad.status, 400);
    assert_eq!(bad.json().unwrap()["error"], "invalid argument: name required");

    let (boom, _) = dispatch(&router, Method::GET, "/boom");
    assert_eq!(boom.status, 500);
}

#[test]
fn test_handler_panic_yields_500() {
    let mut router = Router::new();
    router
        .add("/panic", Method::GET, |_, _, _| panic!("handler blew up"))
        .unwrap();
    let (resp, _) = dispatch(&router, Method::GET, "/panic");
    assert_eq!(resp.status, 500);
}

#[test]
fn test_error_after_emit_keeps_first_response() {
    let mut router = Router::new();
    router
        .add("/twice", Method::GET, |_, _, res| {
            res.emit(200, "ok")?;
            Err(Error::invalid("too late"))
        })
        .unwrap();
    let (resp, _) = dispatch(&router, Method::GET, "/twice");
    assert_eq!(resp.status, 200);
}

#[test]
fn test_captures_reach_handler() {
    let mut router = Router::new();
    router
        .add("/a/{x}/b/{y}", Method::GET, |_, caps, res| {
            res.emit(200, &json!([caps.get(0), caps.name("y")]))
        })
        .unwrap();
    let (resp, _) = dispatch(&router, Method::GET, "/a/1/b/2");
    assert_eq!(resp.json(), Some(json!(["1", "2"])));
}

#[test]
fn test_add_extends_existing_entry() {
    let mut router = Router::new();
    router
        .add("/things", Method::GET, |_, _, res| res.emit(200, &Value::Null))
        .unwrap();
    router
        .add("/other", Method::GET, |_, _, res| res.emit(200, &Value::Null))
        .unwrap();
    router
        .add("/things", Method::POST, |_, _, res| res.emit(201, &Value::Null))
        .unwrap();

    let routes = router.routes();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].template, "/things");
    assert_eq!(routes[0].methods, vec!["GET", "POST"]);
}

#[test]
fn test_custom_not_found() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let mut router = Router::new();
    router.set_not_found(move |_, _, res| {
        counter.fetch_add(1, Ordering::SeqCst);
        res.emit(404, &Value::Null)
    });
    let (resp, _) = dispatch(&router, Method::GET, "/x");
    assert_eq!(resp.body, b"null");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_bad_template_rejected() {
    let mut router = Router::new();
    let err = router
        .add("no-slash", Method::GET, |_, _, res| res.emit(200, &Value::Null))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
