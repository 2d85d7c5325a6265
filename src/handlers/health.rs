use crate::state::AppState;
use actix_web::{HttpResponse, get, web};
use serde_json::json;

#[get("/health")]
pub async fn health(app_state: web::Data<AppState>) -> HttpResponse {
    match app_state.db.ping().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(e) => {
            log::error!("Health check failed: {:#}", e);
            HttpResponse::InternalServerError().json(json!({ "status": "db_error" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::state;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn reports_ok_when_database_answers() {
        let (state, _) = state().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(health),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "status": "ok" }));
    }
}
