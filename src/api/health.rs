use actix_web::{get, web, HttpResponse, Responder};
use diesel::prelude::*;
use serde_json::json;

use crate::RqDbPool;

/// Reports whether the database answers a trivial query.
#[get("")]
pub async fn health_check(pool: RqDbPool) -> impl Responder {
    let db_ok = match pool.get() {
        Ok(mut conn) => diesel::sql_query("SELECT 1").execute(&mut conn).is_ok(),
        Err(e) => {
            log::warn!("Health check could not get a connection: {e}");
            false
        }
    };

    if db_ok {
        HttpResponse::Ok().json(json!({
            "status": "healthy",
            "database": "connected"
        }))
    } else {
        HttpResponse::ServiceUnavailable().json(json!({
            "status": "unhealthy",
            "database": "disconnected"
        }))
    }
}

#[get("/live")]
pub async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub fn routes() -> actix_web::Scope {
    web::scope("/health")
        .service(health_check)
        .service(liveness_check)
}
