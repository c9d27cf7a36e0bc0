//! Integration tests for the chat API endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;
    use serial_test::serial;
    use tower::util::ServiceExt;

    use crate::test_utils::{
        GEMINI_PATH, TestApp, auth_cookie, body_to_json, gemini_reply, json_request, test_app,
    };

    const KEYS: &str = r#"{
        "clave-docente": {"count": 0, "max_uses": 10, "user_id": "docente", "description": "Pruebas"},
        "clave-casi": {"count": 99, "max_uses": 100, "user_id": "casi", "description": ""}
    }"#;

    async fn start_session(app: &TestApp, key: &str) -> String {
        let response = app
            .router
            .clone()
            .oneshot(json_request("/chat/start", Some(key), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_json(response.into_body()).await;
        body["session_id"].as_str().unwrap().to_string()
    }

    /// Tests a full conversation turn consumes one use
    #[tokio::test]
    #[serial]
    async fn it_starts_a_session_and_answers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", GEMINI_PATH)
            .match_header("x-goog-api-key", "test-api-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(gemini_reply("¡Hola! ¿En qué puedo ayudarte?"))
            .expect(1)
            .create_async()
            .await;
        let app = test_app(KEYS, Some(&server.url()));

        let response = app
            .router
            .clone()
            .oneshot(json_request("/chat/start", Some("clave-docente"), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_json(response.into_body()).await;
        assert_eq!(body["message"], "Hola, sesión iniciada.");
        let session_id = body["session_id"].as_str().unwrap().to_string();
        assert!(!session_id.is_empty());

        // Starting a session is free
        assert_eq!(app.stored_key("clave-docente").usage_count, 0);

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "/chat/send",
                Some("clave-docente"),
                json!({"session_id": session_id, "pregunta": "hola"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_json(response.into_body()).await;
        assert_eq!(body["session_id"], session_id.as_str());
        assert_eq!(body["respuesta"], "¡Hola! ¿En qué puedo ayudarte?");

        mock.assert_async().await;
        assert_eq!(app.stored_key("clave-docente").usage_count, 1);
    }

    /// Tests the `text` alias for the message field
    #[tokio::test]
    #[serial]
    async fn it_accepts_text_as_the_message_field() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", GEMINI_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(gemini_reply("Respuesta"))
            .create_async()
            .await;
        let app = test_app(KEYS, Some(&server.url()));
        let session_id = start_session(&app, "clave-docente").await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "/chat/send",
                Some("clave-docente"),
                json!({"session_id": session_id, "text": "¿Qué es un PAP?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Tests the second turn carries the first one as history
    #[tokio::test]
    #[serial]
    async fn it_sends_the_history_with_each_turn() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", GEMINI_PATH)
            .match_body(mockito::Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [{"text": "primera"}]}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(gemini_reply("uno"))
            .create_async()
            .await;
        let second = server
            .mock("POST", GEMINI_PATH)
            .match_body(mockito::Matcher::PartialJson(json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "primera"}]},
                    {"role": "model", "parts": [{"text": "uno"}]},
                    {"role": "user", "parts": [{"text": "segunda"}]}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(gemini_reply("dos"))
            .create_async()
            .await;
        let app = test_app(KEYS, Some(&server.url()));
        let session_id = start_session(&app, "clave-docente").await;

        for (text, expected) in [("primera", "uno"), ("segunda", "dos")] {
            let response = app
                .router
                .clone()
                .oneshot(json_request(
                    "/chat/send",
                    Some("clave-docente"),
                    json!({"session_id": session_id, "pregunta": text}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_to_json(response.into_body()).await;
            assert_eq!(body["respuesta"], expected);
        }

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(app.stored_key("clave-docente").usage_count, 2);
    }

    /// Tests unknown sessions return 404
    #[tokio::test]
    #[serial]
    async fn it_rejects_unknown_sessions() {
        let server = mockito::Server::new_async().await;
        let app = test_app(KEYS, Some(&server.url()));

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "/chat/send",
                Some("clave-docente"),
                json!({"session_id": "no-existe", "pregunta": "hola"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_to_json(response.into_body()).await;
        assert!(body["detail"].is_string());
    }

    /// Tests blank messages return 400 without calling the model
    #[tokio::test]
    #[serial]
    async fn it_rejects_blank_messages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", GEMINI_PATH)
            .expect(0)
            .create_async()
            .await;
        let app = test_app(KEYS, Some(&server.url()));
        let session_id = start_session(&app, "clave-docente").await;

        for text in ["", "   \n"] {
            let response = app
                .router
                .clone()
                .oneshot(json_request(
                    "/chat/send",
                    Some("clave-docente"),
                    json!({"session_id": session_id, "pregunta": text}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        mock.assert_async().await;
        assert_eq!(app.stored_key("clave-docente").usage_count, 0);
    }

    /// Tests requests without a valid cookie return 401
    #[tokio::test]
    #[serial]
    async fn it_requires_a_known_key() {
        let server = mockito::Server::new_async().await;
        let app = test_app(KEYS, Some(&server.url()));

        for key in [None, Some("clave-inventada")] {
            let response = app
                .router
                .clone()
                .oneshot(json_request("/chat/start", key, json!({})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let response = app
                .router
                .clone()
                .oneshot(json_request(
                    "/chat/send",
                    key,
                    json!({"session_id": "x", "pregunta": "hola"}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    /// Tests the last remaining use is served and the next one refused
    #[tokio::test]
    #[serial]
    async fn it_stops_at_the_usage_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", GEMINI_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(gemini_reply("Última respuesta"))
            .expect(1)
            .create_async()
            .await;
        let app = test_app(KEYS, Some(&server.url()));
        let session_id = start_session(&app, "clave-casi").await;

        let send = || {
            json_request(
                "/chat/send",
                Some("clave-casi"),
                json!({"session_id": session_id, "pregunta": "hola"}),
            )
        };

        let response = app.router.clone().oneshot(send()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.stored_key("clave-casi").usage_count, 100);

        let response = app.router.clone().oneshot(send()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_to_json(response.into_body()).await;
        assert!(body["detail"].is_string());

        mock.assert_async().await;
        assert_eq!(app.stored_key("clave-casi").usage_count, 100);
    }

    /// Tests a failing model returns 500 and doesn't charge the caller
    #[tokio::test]
    #[serial]
    async fn it_does_not_charge_for_model_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", GEMINI_PATH)
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"code": 500, "message": "Internal error"}}"#)
            .create_async()
            .await;
        let app = test_app(KEYS, Some(&server.url()));
        let session_id = start_session(&app, "clave-docente").await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "/chat/send",
                Some("clave-docente"),
                json!({"session_id": session_id, "pregunta": "hola"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.stored_key("clave-docente").usage_count, 0);
    }

    /// Tests a response with no text is an error and isn't charged
    #[tokio::test]
    #[serial]
    async fn it_does_not_charge_for_empty_responses() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", GEMINI_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
            .create_async()
            .await;
        let app = test_app(KEYS, Some(&server.url()));
        let session_id = start_session(&app, "clave-docente").await;

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "/chat/send",
                Some("clave-docente"),
                json!({"session_id": session_id, "pregunta": "hola"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.stored_key("clave-docente").usage_count, 0);
    }

    /// Tests chat routes return 503 when no model is configured
    #[tokio::test]
    #[serial]
    async fn it_reports_a_missing_model() {
        let app = test_app(KEYS, None);

        let response = app
            .router
            .clone()
            .oneshot(json_request("/chat/start", Some("clave-docente"), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "/chat/send",
                Some("clave-docente"),
                json!({"session_id": "x", "pregunta": "hola"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    /// Tests malformed bodies get a `detail` error like every other failure
    #[tokio::test]
    #[serial]
    async fn it_rejects_malformed_bodies_with_detail() {
        let server = mockito::Server::new_async().await;
        let app = test_app(KEYS, Some(&server.url()));

        let bad_json = Request::builder()
            .uri("/chat/send")
            .method("POST")
            .header("content-type", "application/json")
            .header("cookie", auth_cookie("clave-docente"))
            .body(Body::from("{not json"))
            .unwrap();
        let missing_field = json_request(
            "/chat/send",
            Some("clave-docente"),
            json!({"session_id": "x"}),
        );

        for request in [bad_json, missing_field] {
            let response = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_to_json(response.into_body()).await;
            assert!(body["detail"].is_string());
        }
        assert_eq!(app.stored_key("clave-docente").usage_count, 0);
    }
}
