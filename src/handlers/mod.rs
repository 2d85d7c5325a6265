mod health;
mod users;
mod webhook;

use actix_web::{HttpResponse, Responder, get};
pub use health::*;
pub use users::*;
pub use webhook::*;

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "OK",
        "message": "FlashTip Betting Bot Backend",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
