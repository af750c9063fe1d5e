use chat_api::{endpoint_url, normalize_base_url, ChatApiError};

#[test]
fn base_url_normalization_strips_trailing_slashes() {
    assert_eq!(
        normalize_base_url(" http://127.0.0.1:8000/api// ").expect("valid base"),
        "http://127.0.0.1:8000/api"
    );
}

#[test]
fn base_url_normalization_rejects_empty_and_non_http() {
    assert!(matches!(
        normalize_base_url("   "),
        Err(ChatApiError::InvalidBaseUrl(_))
    ));
    assert!(matches!(
        normalize_base_url("file:///tmp/x"),
        Err(ChatApiError::InvalidBaseUrl(_))
    ));
    assert!(matches!(
        normalize_base_url("not a url"),
        Err(ChatApiError::InvalidBaseUrl(_))
    ));
}

#[test]
fn endpoint_url_joins_path_and_encodes_query() {
    assert_eq!(
        endpoint_url("https://chat.example.com/v1/", "chat", &[]).expect("chat url"),
        "https://chat.example.com/v1/chat"
    );
    assert_eq!(
        endpoint_url(
            "https://chat.example.com",
            "history",
            &[("session_id", "default user")]
        )
        .expect("history url"),
        "https://chat.example.com/history?session_id=default+user"
    );
}
