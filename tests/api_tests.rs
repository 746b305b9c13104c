// tests/api_tests.rs

use olympiad_backend::{config::Config, routes, state::AppState, utils::hash::hash_password};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Helper function to spawn the app on a random port for testing.
/// Uses an in-memory SQLite database (single connection, so every request
/// sees the same database). Returns the base URL and the pool for seeding.
async fn spawn_app() -> (String, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        allow_answer_revision: true,
    };

    let state = AppState::new(pool.clone(), config);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

/// Inserts a user directly and returns nothing; log in via the API.
async fn seed_user(pool: &SqlitePool, username: &str, password: &str, role: &str) {
    let hashed = hash_password(password).unwrap();
    sqlx::query("INSERT INTO users (username, password, role, created_at) VALUES (?, ?, ?, ?)")
        .bind(username)
        .bind(hashed)
        .bind(role)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await
        .unwrap();
}

async fn login(client: &reqwest::Client, address: &str, username: &str, password: &str) -> String {
    let resp = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    resp["token"].as_str().expect("Token not found").to_string()
}

#[tokio::test]
async fn unknown_path_is_404() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let unique_name = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);

    // Act
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": unique_name,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["role"], "student");
    assert!(body.get("password").is_none(), "Hash must not leak");
}

#[tokio::test]
async fn register_fails_validation() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act: Send a username that is too short
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": "yo",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({"username": "twice_taken", "password": "password123"});
    let first = client
        .post(format!("{}/api/auth/register", address))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 201);

    let second = client
        .post(format!("{}/api/auth/register", address))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    seed_user(&pool, "login_user", "correct_pw", "student").await;

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({"username": "login_user", "password": "wrong_pw"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
}

/// Full flow: admin builds a package and an olympiad, a student takes the
/// timed attempt (closed-ended, matching and open-ended questions), the
/// result is auto-scored, and a reviewer scores the open answer manually.
#[tokio::test]
async fn test_olympiad_flow() {
    // Arrange
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    seed_user(&pool, "head_admin", "admin_pw_123", "admin").await;
    let admin_token = login(&client, &address, "head_admin", "admin_pw_123").await;

    // 1. Admin creates a package
    let package: serde_json::Value = client
        .post(format!("{}/api/admin/packages", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({"title": "Astronomy finals", "subject": "Astronomy"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let package_id = package["id"].as_i64().unwrap();

    // 2. Admin authors three questions
    let closed: serde_json::Value = client
        .post(format!("{}/api/questions", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "kind": "CLOSED_ENDED",
            "subject": "Astronomy",
            "content": "Which planet is closest to the sun?",
            "options": ["A", "B", "C"],
            "correct_answer": "B",
            "points": 5,
            "package_id": package_id
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let closed_id = closed["id"].as_i64().unwrap();

    let matching: serde_json::Value = client
        .post(format!("{}/api/questions", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "kind": "MATCHING",
            "subject": "Astronomy",
            "content": "Match the planet to its moon.",
            "matching": {
                "left": ["Earth", "Mars"],
                "right": ["Luna", "Phobos"],
                "pairs": [[0, 0], [1, 1]]
            },
            "points": 2,
            "package_id": package_id
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let matching_id = matching["id"].as_i64().unwrap();

    let open: serde_json::Value = client
        .post(format!("{}/api/questions", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "kind": "OPEN_ENDED",
            "subject": "Astronomy",
            "content": "Describe how tides form.",
            "points": 10,
            "package_id": package_id
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let open_id = open["id"].as_i64().unwrap();

    // 3. Admin schedules an olympiad around the current time
    let now = chrono::Utc::now();
    let olympiad: serde_json::Value = client
        .post(format!("{}/api/admin/olympiads", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "title": "Autumn Astronomy Olympiad",
            "subject": "Astronomy",
            "package_id": package_id,
            "start_date": now - chrono::Duration::hours(1),
            "end_date": now + chrono::Duration::hours(1),
            "duration_secs": 3600
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let olympiad_id = olympiad["id"].as_i64().unwrap();

    // 4. The olympiad is publicly listed under its subject
    let listed: Vec<serde_json::Value> = client
        .get(format!("{}/api/olympiads?subject=Astronomy", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    // 5. Student registers and starts the attempt
    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({"username": "star_student", "password": "password123"}))
        .send()
        .await
        .unwrap();
    let student_token = login(&client, &address, "star_student", "password123").await;

    let started: serde_json::Value = client
        .post(format!("{}/api/olympiads/{}/attempt", address, olympiad_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(started["resumed"], false);
    let questions = started["attempt"]["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert_eq!(started["attempt"]["status"]["state"], "in_progress");

    // Canonical answers must not be exposed to the student
    for q in questions {
        assert!(q.get("correct_answer").is_none());
        assert!(q.get("matching").is_none());
    }

    // Options come back shuffled but as the same set
    let shown = questions
        .iter()
        .find(|q| q["id"].as_i64() == Some(closed_id))
        .unwrap();
    let mut options: Vec<String> = shown["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    options.sort();
    assert_eq!(options, vec!["A", "B", "C"]);

    // Matching right side stays in authored order
    let shown_matching = questions
        .iter()
        .find(|q| q["id"].as_i64() == Some(matching_id))
        .unwrap();
    assert_eq!(
        shown_matching["matching_right"],
        serde_json::json!(["Luna", "Phobos"])
    );

    // 6. Student answers everything and navigates
    for body in [
        serde_json::json!({"question_id": closed_id, "value": "B"}),
        serde_json::json!({"question_id": matching_id, "left_index": 0, "right_index": 0}),
        serde_json::json!({"question_id": matching_id, "left_index": 1, "right_index": 1}),
        serde_json::json!({"question_id": open_id, "value": "The moon pulls on the oceans."}),
    ] {
        let resp = client
            .post(format!(
                "{}/api/olympiads/{}/attempt/answer",
                address, olympiad_id
            ))
            .header("Authorization", format!("Bearer {}", student_token))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }

    let advanced: serde_json::Value = client
        .post(format!(
            "{}/api/olympiads/{}/attempt/advance",
            address, olympiad_id
        ))
        .header("Authorization", format!("Bearer {}", student_token))
        .json(&serde_json::json!({"direction": "next"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(advanced["cursor"], 1);

    // 7. A reload (re-reading the session) reproduces the identical state
    let reloaded: serde_json::Value = client
        .get(format!("{}/api/olympiads/{}/attempt", address, olympiad_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(reloaded["attempt"]["cursor"], 1);
    assert_eq!(
        reloaded["attempt"]["questions"],
        started["attempt"]["questions"],
        "Question and option order must survive a reload"
    );
    assert_eq!(reloaded["attempt"]["answers"].as_array().unwrap().len(), 4);

    // 8. Submit: 5 (closed) + 2 (matching) auto points; essay pending
    let submitted: serde_json::Value = client
        .post(format!(
            "{}/api/olympiads/{}/attempt/submit",
            address, olympiad_id
        ))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(submitted["earned_points"], 7);
    assert_eq!(submitted["total_points"], 17);
    assert_eq!(submitted["correct_count"], 2);
    assert_eq!(submitted["total_count"], 3);
    assert_eq!(submitted["percentage"], 67);

    // 9. State now reports the persisted result; restarting is refused
    let after: serde_json::Value = client
        .get(format!("{}/api/olympiads/{}/attempt", address, olympiad_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["status"]["state"], "submitted");
    assert_eq!(after["status"]["summary"]["earned_points"], 7);

    let restart = client
        .post(format!("{}/api/olympiads/{}/attempt", address, olympiad_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(restart.status().as_u16(), 409);

    // 10. Review: the essay is pending, students are kept out
    let forbidden = client
        .get(format!("{}/api/review/pending", address))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);

    let pending: Vec<serde_json::Value> = client
        .get(format!("{}/api/review/pending", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["question_id"].as_i64(), Some(open_id));
    assert_eq!(pending[0]["student"], "star_student");
    let answer_id = pending[0]["answer_id"].as_i64().unwrap();
    let attempt_id = pending[0]["attempt_id"].as_i64().unwrap();

    // 11. Manual score supersedes the essay's auto 0 in the effective total
    let scored = client
        .post(format!("{}/api/review/answers/{}/score", address, answer_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({"score": 8, "feedback": "Good, but incomplete."}))
        .send()
        .await
        .unwrap();
    assert_eq!(scored.status().as_u16(), 201);

    let review: serde_json::Value = client
        .get(format!("{}/api/review/attempts/{}", address, attempt_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(review["effective_total"], 15);
    let essay = review["answers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["answer_id"].as_i64() == Some(answer_id))
        .unwrap();
    assert_eq!(essay["verdict"], "pending");
    assert_eq!(essay["auto_points"], 0);
    assert_eq!(essay["effective_points"], 8);
    assert_eq!(essay["manual_scores"].as_array().unwrap().len(), 1);
}
