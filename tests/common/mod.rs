//! Common test utilities

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stern_insider::api::InsiderClient;

pub const USERNAME: &str = "test@example.com";
pub const PASSWORD: &str = "testpassword";

/// Client pointed at the mock server
pub fn client(server: &MockServer) -> InsiderClient {
    InsiderClient::with_base_url(USERNAME, PASSWORD, &server.uri()).unwrap()
}

/// Login body in the current JSON shape
pub fn login_body(token: &str) -> Value {
    json!({"accessToken": token, "expiresIn": 1800})
}

/// Mount a login endpoint that always hands out `token`
pub async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body(token)))
        .mount(server)
        .await;
}

/// Machines response nested under `user`, as the live service sends it
pub fn machines_body() -> Value {
    json!({
        "user": {
            "machines": [
                {
                    "id": 12345,
                    "name": "Basement Godzilla",
                    "model": {
                        "title": {
                            "name": "Godzilla (Premium)",
                            "square_logo": "https://cdn.example.com/godzilla-logo.png",
                            "default_backglass_image": "https://cdn.example.com/godzilla-bg.jpg",
                            "gradient_start": "#1a1a1a",
                            "gradient_stop": "#4a4a4a"
                        }
                    }
                },
                {
                    "id": "67890",
                    "model": {"title": {"name": "Venom"}}
                }
            ]
        }
    })
}

/// High scores in the current shape: no explicit rank, string scores
#[allow(dead_code)]
pub fn high_scores_body(entries: &[(&str, &str)]) -> Value {
    let items: Vec<Value> = entries
        .iter()
        .map(|(username, score)| {
            json!({
                "score": score,
                "user": {
                    "username": username,
                    "initials": username.to_uppercase().chars().take(3).collect::<String>(),
                }
            })
        })
        .collect();
    json!({"high_score": items})
}
