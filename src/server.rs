use std::net::SocketAddr;

use actix_web::{dev::Server, web, App, HttpRequest, HttpResponse, HttpServer};
use tracing::info;

use crate::config::Config;
use crate::core::store::MemoryStore;
use crate::router;

/// Shared by every actix worker.
pub struct AppState {
    pub store: MemoryStore,
    pub config: Config,
}

mod adapter {
    use actix_web::http::StatusCode;
    use actix_web::HttpRequest;
    use spin_sdk::http::{Method, Request, Response};

    /// Headers a view can set on its response.
    const FORWARDED_HEADERS: &[&str] = &["content-type", "location", "set-cookie"];

    pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Option<Request> {
        let method = match req.method().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            _ => return None,
        };

        let mut builder = Request::builder();
        builder.method(method).uri(req.uri().to_string());

        for (name, value) in req.headers() {
            if let Ok(val_str) = value.to_str() {
                builder.header(name.as_str(), val_str);
            }
        }

        Some(builder.body(body.to_vec()).build())
    }

    pub fn spin_to_actix_response(spin_resp: Response) -> actix_web::HttpResponse {
        let status = *spin_resp.status();

        let mut response = actix_web::HttpResponse::build(
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        );

        for name in FORWARDED_HEADERS {
            if let Some(value) = spin_resp.header(name).and_then(|v| v.as_str()) {
                response.insert_header((*name, value));
            }
        }

        response.body(spin_resp.body().to_vec())
    }
}

async fn handle_all(req: HttpRequest, body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    let Some(spin_req) = adapter::actix_to_spin_request(&req, body) else {
        return HttpResponse::MethodNotAllowed().json(serde_json::json!({"error": "Method Not Allowed"}));
    };

    let spin_resp = router::route(&state.store, &state.config, &spin_req);
    adapter::spin_to_actix_response(spin_resp)
}

/// Bind the native server. The returned future runs it; the addresses are
/// the ones actually bound (useful with port 0).
pub fn build(state: AppState) -> std::io::Result<(Server, Vec<SocketAddr>)> {
    let address = state.config.bind_address.clone();
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(handle_all))
    })
    .bind(&address)?;

    let addrs = server.addrs();
    for addr in &addrs {
        info!("Server listening on http://{}", addr);
    }

    Ok((server.run(), addrs))
}
