//! (Ab)use `actix-web` as the HTTP adapter for a cascade runtime.
//!
//! Routing happens in the core's route table at request time, because the
//! routes come from a runtime-parsed source file; a single default service
//! funnels every request through [`cascade::Runtime::handle()`
//! ](../cascade/http/struct.Runtime.html#method.handle).

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpServer};
use cascade::{HttpMethod, HttpRequest, HttpResponse, Runtime};
use std::sync::Arc;

/// Bind and run the accept loop.  Blocks until shutdown; the returned
/// error is the bind failure or a worker failure.
///
pub fn serve(
    runtime: Arc<Runtime>,
    host: &str,
    port: u16,
) -> std::io::Result<()> {
    let host = host.to_string();
    actix_rt::System::new().block_on(async move {
        let data = web::Data::from(runtime);
        HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .default_service(web::route().to(dispatch))
        })
        .bind((host.as_str(), port))?
        .run()
        .await
    })
}

/// The one handler: convert the actix request into core request parts,
/// hand off, convert the core response back.
///
pub async fn dispatch(
    runtime: web::Data<Runtime>,
    request: actix_web::HttpRequest,
    body: web::Bytes,
) -> actix_web::HttpResponse {
    let method =
        match HttpMethod::try_from(request.method().as_str()) {
            Ok(method) => method,
            Err(_) => {
                log::debug!(
                    "unsupported method {} {}",
                    request.method(),
                    request.uri(),
                );
                return to_actix(HttpResponse::not_found());
            }
        };
    let headers = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let parts = HttpRequest {
        method,
        path: request.uri().path().to_string(),
        query: request.uri().query().unwrap_or("").to_string(),
        headers,
        body: body.to_vec(),
    };
    to_actix(runtime.handle(&parts))
}

fn to_actix(mut response: HttpResponse) -> actix_web::HttpResponse {
    let mut builder = actix_web::HttpResponse::build(
        StatusCode::from_u16(response.get_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    );
    for header in response.drain_headers() {
        builder.append_header(header);
    }
    match response.get_body() {
        Some(body) => builder.body(body),
        None => builder.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::test::TestRequest;
    use cascade::{parse, DatabaseIf, NullConn};

    fn data(source: &str) -> web::Data<Runtime> {
        web::Data::new(Runtime::new(
            parse(source).unwrap(),
            DatabaseIf::new(Arc::new(NullConn)),
        ))
    }

    #[actix_rt::test]
    async fn test_dispatch_get() {
        let data = data(
            r#"[path="/ping"]:GET { @return json({"ok": true}); }"#,
        );
        let request = TestRequest::get().uri("/ping").to_http_request();
        let response =
            dispatch(data, request, web::Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/json; charset=utf-8"),
        );
        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"ok":true}"#);
    }

    #[actix_rt::test]
    async fn test_dispatch_body_and_headers() {
        let data = data(
            r#"
            [path="/t"]:POST {
                --n: body(n);
                --role: header(x-role);
                @return json({"n": var(--n), "role": var(--role)});
            }
            "#,
        );
        let request = TestRequest::post()
            .uri("/t")
            .insert_header(("Content-Type", "application/json"))
            .insert_header(("X-Role", "admin"))
            .to_http_request();
        let response = dispatch(
            data,
            request,
            web::Bytes::from_static(br#"{"n": "x"}"#),
        )
        .await;
        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"n":"x","role":"admin"}"#);
    }

    #[actix_rt::test]
    async fn test_dispatch_unsupported_method_is_not_found() {
        let data = data(
            r#"[path="/ping"]:GET { @return json({"ok": true}); }"#,
        );
        let request = TestRequest::default()
            .method(actix_web::http::Method::TRACE)
            .uri("/ping")
            .to_http_request();
        let response =
            dispatch(data, request, web::Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
