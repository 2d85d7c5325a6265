use crate::bot::{Update, deliver_all, handle_update};
use crate::state::AppState;
use actix_web::{HttpResponse, post, web};

/// Telegram webhook. Replies are delivered before acknowledging the update.
#[post("/bot/{token}")]
pub async fn telegram_webhook(
    path: web::Path<String>,
    body: web::Bytes,
    app_state: web::Data<AppState>,
) -> HttpResponse {
    if path.into_inner() != app_state.bot_token {
        log::warn!("Rejected webhook call with wrong token");
        return HttpResponse::Unauthorized().finish();
    }

    let update = match serde_json::from_slice::<Update>(&body) {
        Ok(update) => update,
        Err(e) => {
            log::warn!("Failed to decode webhook update: {}", e);
            return HttpResponse::BadRequest().finish();
        }
    };

    let outbound = handle_update(&app_state, &update).await;
    log::debug!(
        "Update {} produced {} outbound calls",
        update.update_id,
        outbound.len()
    );
    deliver_all(app_state.chat.as_ref(), &app_state.views, outbound).await;

    HttpResponse::Ok().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::Delivered;
    use crate::state::testing::{TOKEN, state};
    use actix_web::{App, http::StatusCode, test};
    use serde_json::json;

    fn start_from(telegram_id: i64) -> serde_json::Value {
        json!({
            "update_id": 1,
            "message": {
                "message_id": 3,
                "from": { "id": telegram_id, "is_bot": false, "first_name": "Ana" },
                "chat": { "id": telegram_id, "type": "private" },
                "date": 1700000000,
                "text": "/start"
            }
        })
    }

    #[actix_web::test]
    async fn rejects_foreign_token() {
        let (state, client) = state().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(telegram_webhook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/bot/not-the-token")
            .set_json(start_from(5))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(client.delivered().is_empty());
    }

    #[actix_web::test]
    async fn start_registers_and_replies() {
        let (state, client) = state().await;
        let data = web::Data::new(state);
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .service(telegram_webhook),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/bot/{TOKEN}"))
            .set_json(start_from(5))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let user = data.db.user_by_telegram(5).await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("Ana"));
        assert!(matches!(
            client.delivered().as_slice(),
            [Delivered::Sent { chat_id: 5, .. }]
        ));
    }
}
