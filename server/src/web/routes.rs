// orderflow_server/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{order_handlers, secure_return_handlers, webhook_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .route("/health", web::get().to(health_check_handler))
    // Called by the delivery partner, outside the versioned API.
    .route(
      "/delivery/order_update",
      web::post().to(webhook_handlers::delivery_webhook_handler),
    )
    .service(
      web::scope("/api/v1")
        .service(
          web::scope("/orders/{order_id}")
            .route("/status", web::get().to(order_handlers::order_status_handler))
            .route("/accept", web::post().to(order_handlers::accept_order_handler))
            .route("/reject", web::post().to(order_handlers::reject_order_handler))
            .route(
              "/store-not-operational",
              web::post().to(order_handlers::store_not_operational_handler),
            )
            .route("/dispatch", web::post().to(order_handlers::dispatch_order_handler))
            .route("/settlement", web::get().to(order_handlers::settlement_handler)),
        )
        .service(
          web::scope("/secure-returns")
            .route("", web::post().to(secure_return_handlers::initiate_secure_return_handler))
            .route(
              "/appraisal",
              web::post().to(secure_return_handlers::appraise_secure_return_handler),
            ),
        ),
    );
}
