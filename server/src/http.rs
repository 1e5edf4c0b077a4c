use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{self, HeaderName, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
};
use platform_api::{ApiError, ApiResult, Message};
use records::{Deletion, Lookup, RESOURCES, Record, RecordStore, Resource, StoreError};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use utoipa::openapi::OpenApi;

use crate::{
    config::AppConfig,
    openapi::{self, OPENAPI_PATH},
};

#[derive(Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub config: Arc<AppConfig>,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "records server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route(OPENAPI_PATH, get(openapi_handler));
    for resource in RESOURCES.iter().copied() {
        router = router.merge(resource_routes(resource));
    }
    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Collection and item routes for one resource; handlers find their
/// descriptor through the request extension.
fn resource_routes(resource: &'static Resource) -> Router<AppState> {
    let collection = openapi::collection_path(resource);
    let routes = match openapi::item_path(resource) {
        Some(item) => Router::new()
            .route(&collection, get(list_handler).post(create_handler))
            .route(
                &item,
                get(get_handler).put(update_handler).delete(delete_handler),
            ),
        None => Router::new().route(&collection, get(query_handler).post(create_handler)),
    };
    routes.layer(Extension(resource))
}

fn api_error(resource: &Resource, err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound => ApiError::NotFound(resource.messages.not_found.to_string()),
        StoreError::Storage(message) => {
            error!(resource = resource.name, %message, "storage error");
            ApiError::Storage(message)
        }
    }
}

/// Request body as a record. A body sent without a JSON content type
/// carries no fields and still goes to storage, where the missing columns
/// are rejected; unreadable JSON is reported as a storage error.
fn body_record(
    resource: &Resource,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Record> {
    match body {
        Ok(Json(Value::Object(map))) => Ok(map),
        // Anything else carries no fields; the engine rejects the NULLs.
        Ok(Json(_)) | Err(JsonRejection::MissingJsonContentType(_)) => Ok(Record::new()),
        Err(rejection) => Err(api_error(
            resource,
            StoreError::Storage(rejection.body_text()),
        )),
    }
}

async fn list_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<&'static Resource>,
) -> ApiResult<Json<Vec<Record>>> {
    let records = state
        .store
        .list(resource)
        .await
        .map_err(|err| api_error(resource, err))?;
    Ok(Json(records))
}

async fn get_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<&'static Resource>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let record = state
        .store
        .get(resource, &key)
        .await
        .map_err(|err| api_error(resource, err))?;
    Ok(match resource.lookup {
        Lookup::Path { single: true } => Json(record).into_response(),
        _ => Json(vec![record]).into_response(),
    })
}

/// Collection route for resources looked up through a query parameter.
async fn query_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<&'static Resource>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<Record>>> {
    let key = match resource.lookup {
        Lookup::Query { param } => params.get(param),
        Lookup::Path { .. } => None,
    };
    let records = match key {
        Some(key) => vec![
            state
                .store
                .get(resource, key)
                .await
                .map_err(|err| api_error(resource, err))?,
        ],
        None => state
            .store
            .list(resource)
            .await
            .map_err(|err| api_error(resource, err))?,
    };
    Ok(Json(records))
}

async fn create_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<&'static Resource>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Message> {
    let body = body_record(resource, body)?;
    state
        .store
        .create(resource, &body)
        .await
        .map_err(|err| api_error(resource, err))?;
    Ok(Message::new(resource.messages.inserted))
}

async fn update_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<&'static Resource>,
    Path(key): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Message> {
    let body = body_record(resource, body)?;
    state
        .store
        .update(resource, &key, &body)
        .await
        .map_err(|err| api_error(resource, err))?;
    Ok(Message::new(resource.messages.updated))
}

async fn delete_handler(
    State(state): State<AppState>,
    Extension(resource): Extension<&'static Resource>,
    Path(key): Path<String>,
) -> ApiResult<Message> {
    let outcome = state
        .store
        .delete(resource, &key)
        .await
        .map_err(|err| api_error(resource, err))?;
    Ok(Message::new(match outcome {
        Deletion::Removed => resource.messages.removed,
        Deletion::NotRemoved => resource.messages.not_removed,
    }))
}

async fn openapi_handler() -> Json<OpenApi> {
    Json(openapi::document())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.store.connection();
    let db_ok = platform_db::ping(pool).await;
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        backend: platform_db::backend_name(pool),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    backend: &'static str,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use entity::employees;
    use http_body_util::BodyExt;
    use sea_orm::{EntityTrait, PaginatorTrait, TransactionTrait};
    use serde_json::json;
    use tower::ServiceExt;

    async fn test_app() -> (Router, RecordStore) {
        let pool = platform_db::connect_in_memory().await.unwrap();
        platform_db::ensure_schema(&pool).await.unwrap();
        let store = RecordStore::new(pool);
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let state = AppState {
            store: store.clone(),
            config: Arc::new(config),
        };
        (build_router(state), store)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map(|body| body.to_string()).unwrap_or_default();
        send_raw(app, method, uri, Some("application/json"), body).await
    }

    async fn send_raw(
        app: &Router,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: String,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            request = request.header(http::header::CONTENT_TYPE, content_type);
        }
        let request = request.body(Body::from(body)).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn juan() -> Value {
        json!({
            "firstName": "Juan",
            "lastName": "Perez",
            "nationalId": "JUAP890123HDFLNM01",
        })
    }

    fn leche() -> Value {
        json!({
            "code": 7,
            "name": "Leche",
            "price": "21.50",
            "brand": "Lala",
            "size": "1 L",
        })
    }

    #[tokio::test]
    async fn created_employee_is_listed_with_generated_id() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, Method::POST, "/employees", Some(juan())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Datos insertados correctamente"}));

        let (status, body) = send(&app, Method::GET, "/employees", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["firstName"], "Juan");
        assert_eq!(rows[0]["lastName"], "Perez");
        assert_eq!(rows[0]["nationalId"], "JUAP890123HDFLNM01");
        assert!(rows[0]["id"].as_i64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn employee_lookup_returns_an_array() {
        let (app, _) = test_app().await;
        send(&app, Method::POST, "/employees", Some(juan())).await;
        let (status, body) = send(&app, Method::GET, "/employees/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{
                "id": 1,
                "firstName": "Juan",
                "lastName": "Perez",
                "nationalId": "JUAP890123HDFLNM01",
            }])
        );
    }

    #[tokio::test]
    async fn product_lookup_returns_the_object() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, Method::POST, "/products", Some(leche())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Producto insertado correctamente");

        let (status, body) = send(&app, Method::GET, "/products/7", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, leche());
    }

    #[tokio::test]
    async fn missing_product_is_404() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/products/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"message": "Producto no existe"}));
    }

    #[tokio::test]
    async fn deleting_twice_reports_not_removed() {
        let (app, _) = test_app().await;
        send(&app, Method::POST, "/employees", Some(juan())).await;

        let (status, body) = send(&app, Method::DELETE, "/employees/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Registro Eliminado");

        let (status, body) = send(&app, Method::DELETE, "/employees/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Registro No Eliminado");

        let (status, _) = send(&app, Method::GET, "/employees/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_keeps_key() {
        let (app, _) = test_app().await;
        send(&app, Method::POST, "/products", Some(leche())).await;
        let change = json!({
            "code": 8,
            "name": "Leche deslactosada",
            "price": "24.00",
            "brand": "Lala",
            "size": "1.5 L",
        });
        let (status, body) = send(&app, Method::PUT, "/products/7", Some(change)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "ACTUALIZADO");

        let (_, body) = send(&app, Method::GET, "/products/7", None).await;
        assert_eq!(body["code"], 7);
        assert_eq!(body["name"], "Leche deslactosada");
        assert_eq!(body["price"], "24.00");
        assert_eq!(body["size"], "1.5 L");

        let (status, _) = send(&app, Method::GET, "/products/8", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_of_missing_key_still_confirms() {
        let (app, _) = test_app().await;
        let (status, body) = send(&app, Method::PUT, "/products/404", Some(leche())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "ACTUALIZADO");
        let (_, body) = send(&app, Method::GET, "/products", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn injected_key_is_a_plain_miss() {
        let (app, store) = test_app().await;
        send(&app, Method::POST, "/employees", Some(juan())).await;

        let (status, body) = send(
            &app,
            Method::GET,
            "/employees/1%3B%20DROP%20TABLE%20employees",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Empleado no existe");

        let remaining = employees::Entity::find()
            .count(store.connection())
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn storage_errors_are_500_with_engine_text() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/employees",
            Some(json!({"lastName": "Perez", "nationalId": "X"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("NOT NULL"), "unexpected message: {message}");

        send(&app, Method::POST, "/products", Some(leche())).await;
        let (status, body) = send(&app, Method::POST, "/products", Some(leche())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("UNIQUE"));
    }

    #[tokio::test]
    async fn users_are_looked_up_by_query() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/users",
            Some(json!({"firstName": "Usuario", "lastName": "Apellido"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Usuario insertado");

        let (status, body) = send(&app, Method::GET, "/users?id=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{"id": 1, "firstName": "Usuario", "lastName": "Apellido"}])
        );

        let (status, body) = send(&app, Method::GET, "/users?id=1%20OR%201%3D1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Datos no encontrados");

        let (_, body) = send(&app, Method::GET, "/users", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::DELETE, "/users/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn every_documented_operation_is_routed() {
        let (app, _) = test_app().await;
        let doc = serde_json::to_value(openapi::document()).unwrap();
        for (path, item) in doc["paths"].as_object().unwrap() {
            let uri = path.replace("{id}", "1").replace("{code}", "1");
            for (method, verb) in [
                ("get", Method::GET),
                ("post", Method::POST),
                ("put", Method::PUT),
                ("delete", Method::DELETE),
            ] {
                if item.get(method).is_none() {
                    continue;
                }
                let body = matches!(method, "post" | "put").then(|| json!({}));
                let (status, body) = send(&app, verb, &uri, body).await;
                assert_ne!(status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
                assert!(
                    body.get("message").is_some() || body.is_array(),
                    "{method} {uri} fell through to the router: {status}"
                );
            }
        }
    }

    #[tokio::test]
    async fn api_description_and_health_are_served() {
        let (app, _) = test_app().await;
        let (status, doc) = send(&app, Method::GET, OPENAPI_PATH, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc, serde_json::to_value(openapi::document()).unwrap());

        let (status, health) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["ok"], true);
        assert_eq!(health["backend"], "sqlite");
    }

    #[tokio::test]
    async fn body_without_json_content_type_reaches_storage() {
        let (app, store) = test_app().await;
        let (status, body) = send_raw(
            &app,
            Method::POST,
            "/employees",
            Some("text/plain"),
            "firstName=Juan".to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("NOT NULL"), "unexpected message: {message}");

        assert_eq!(
            employees::Entity::find()
                .count(store.connection())
                .await
                .unwrap(),
            0
        );

        send(&app, Method::POST, "/products", Some(leche())).await;
        let (status, body) =
            send_raw(&app, Method::PUT, "/products/7", None, String::new()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("NOT NULL"));
        let (_, body) = send(&app, Method::GET, "/products/7", None).await;
        assert_eq!(body, leche());
    }

    #[tokio::test]
    async fn unreadable_json_is_a_storage_error_body() {
        let (app, _) = test_app().await;
        let (status, body) = send_raw(
            &app,
            Method::POST,
            "/employees",
            Some("application/json"),
            "{not json".to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("JSON"), "unexpected message: {message}");

        let (status, body) = send_raw(
            &app,
            Method::PUT,
            "/employees/1",
            Some("application/json"),
            "[1,".to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn product_without_code_is_rejected_by_storage() {
        let (app, _) = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/products",
            Some(json!({"name": "Leche", "price": "21.50", "brand": "Lala", "size": "1 L"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("NOT NULL"), "unexpected message: {message}");

        let (_, body) = send(&app, Method::GET, "/products", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn expired_round_trip_is_a_500() {
        let pool = platform_db::connect_in_memory().await.unwrap();
        platform_db::ensure_schema(&pool).await.unwrap();
        let store = RecordStore::new(pool).with_timeout(Some(std::time::Duration::from_millis(50)));
        let state = AppState {
            store: store.clone(),
            config: Arc::new(AppConfig::from_lookup(|_| None).unwrap()),
        };
        let app = build_router(state);

        // holds the only pooled connection
        let txn = store.connection().begin().await.unwrap();
        let (status, body) = send(&app, Method::GET, "/employees", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "statement timed out after 50 ms");
        txn.rollback().await.unwrap();

        let (status, _) = send(&app, Method::GET, "/employees", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
