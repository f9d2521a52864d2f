use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use axum_test::TestServer;
use serde_json::json;
use summit::api::{create_router, create_router_with_security, AppState, ClimbPath, ClimbProfile, GenerateResponse, SecurityConfig};
use summit::config::Config;
use summit::db::Database;
use summit::generate::TaskGenerator;
use summit::models::*;
use summit::progress::{Motivation, ProgressReport};
use summit::sessions::Sessions;

const USER: &str = "/api/v1/users/alice";

fn app_state(db: &Database, inference_url: &str) -> AppState {
    let generator = TaskGenerator::new(inference_url, "test-model", Duration::from_secs(5))
        .expect("Failed to build generator");
    let sessions = Sessions::new(db.clone(), Duration::from_millis(20));
    AppState::new(sessions, generator, Config::default())
}

fn database() -> Database {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    db
}

fn setup() -> TestServer {
    setup_with_inference("http://127.0.0.1:9/api/chat").0
}

fn setup_with_inference(url: &str) -> (TestServer, Database) {
    let db = database();
    let app = create_router(app_state(&db, url));
    (TestServer::new(app).expect("Failed to create test server"), db)
}

/// Serve a chat endpoint that always replies with `content`.
async fn fake_inference(content: &'static str) -> String {
    let app = Router::new().route(
        "/api/chat",
        post(move || async move {
            Json(json!({ "message": { "role": "assistant", "content": content } }))
        }),
    );
    spawn_inference(app).await
}

/// Serve a chat endpoint that always fails.
async fn broken_inference() -> String {
    let app = Router::new().route(
        "/api/chat",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
    );
    spawn_inference(app).await
}

async fn spawn_inference(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Inference server failed");
    });
    format!("http://{}/api/chat", addr)
}

async fn current_mountain(server: &TestServer) -> Mountain {
    let state = server.get(&format!("{}/state", USER)).await.json::<PersistedState>();
    state
        .mountains
        .into_iter()
        .find(|m| m.id == state.current_mountain_id)
        .expect("current mountain")
}

async fn add_task(server: &TestServer, mountain_id: &str, text: &str) -> Task {
    let response = server
        .post(&format!("{}/mountains/{}/tasks", USER, mountain_id))
        .json(&CreateTaskInput {
            text: text.to_string(),
        })
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Task>()
}

async fn set_goal(server: &TestServer, mountain_id: &str, goal: &str) -> Mountain {
    server
        .put(&format!("{}/mountains/{}", USER, mountain_id))
        .json(&UpdateMountainInput {
            goal: goal.to_string(),
        })
        .await
        .json::<Mountain>()
}

// ============================================================
// Health
// ============================================================

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let server = setup();

        let response = server.get("/api/v1/health").await;

        response.assert_status_ok();
        response.assert_json(&json!({ "status": "ok" }));
    }
}

// ============================================================
// Whole state
// ============================================================

mod state {
    use super::*;

    #[tokio::test]
    async fn first_visit_gets_one_empty_mountain() {
        let server = setup();

        let response = server.get(&format!("{}/state", USER)).await;

        response.assert_status_ok();
        let state = response.json::<PersistedState>();
        assert_eq!(state.version, CURRENT_VERSION);
        assert_eq!(state.mountains.len(), 1);
        assert!(state.mountains[0].tasks.is_empty());
        assert_eq!(state.current_mountain_id, state.mountains[0].id);
        assert_eq!(state.time_of_day, TimeOfDay::Night);
    }

    #[tokio::test]
    async fn accepts_a_legacy_document() {
        let server = setup();

        let response = server
            .put(&format!("{}/state", USER))
            .json(&json!({
                "goal": "Ship MVP",
                "tasks": [
                    {"id": "a", "text": "Design", "done": true},
                    {"id": "b", "text": "Build", "done": false}
                ]
            }))
            .await;

        response.assert_status_ok();
        let uploaded = response.json::<PersistedState>();
        assert_eq!(uploaded.mountains.len(), 1);
        assert_eq!(uploaded.mountains[0].goal, "Ship MVP");
        assert_eq!(uploaded.mountains[0].tasks.len(), 2);

        let state = server.get(&format!("{}/state", USER)).await.json::<PersistedState>();
        assert_eq!(state, uploaded);
    }

    #[tokio::test]
    async fn replaces_garbage_with_a_fresh_state() {
        let server = setup();

        let response = server
            .put(&format!("{}/state", USER))
            .json(&json!([1, 2, 3]))
            .await;

        response.assert_status_ok();
        let state = response.json::<PersistedState>();
        assert_eq!(state.mountains.len(), 1);
    }

    #[tokio::test]
    async fn users_do_not_see_each_other() {
        let server = setup();
        let mountain = current_mountain(&server).await;
        set_goal(&server, &mountain.id, "Alice's goal").await;

        let other = server
            .get("/api/v1/users/bob/state")
            .await
            .json::<PersistedState>();
        assert_eq!(other.mountains[0].goal, "");
    }

    #[tokio::test]
    async fn sign_out_returns_no_content() {
        let server = setup();
        server.get(&format!("{}/state", USER)).await.assert_status_ok();

        server
            .delete(&format!("{}/state", USER))
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn updates_preferences() {
        let server = setup();

        let response = server
            .put(&format!("{}/preferences", USER))
            .json(&json!({
                "taskGenerationPrompt": "p".repeat(300),
                "timeOfDay": "sunset"
            }))
            .await;

        response.assert_status_ok();
        let state = response.json::<PersistedState>();
        assert_eq!(state.task_generation_prompt.len(), MAX_PROMPT_LENGTH);
        assert_eq!(state.time_of_day, TimeOfDay::Sunset);
    }

    #[tokio::test]
    async fn partial_preferences_leave_the_rest_alone() {
        let server = setup();
        server
            .put(&format!("{}/preferences", USER))
            .json(&json!({ "taskGenerationPrompt": "keep it short" }))
            .await
            .assert_status_ok();

        let state = server
            .put(&format!("{}/preferences", USER))
            .json(&json!({ "timeOfDay": "day" }))
            .await
            .json::<PersistedState>();
        assert_eq!(state.task_generation_prompt, "keep it short");
        assert_eq!(state.time_of_day, TimeOfDay::Day);
    }
}

// ============================================================
// Mountains
// ============================================================

mod mountains {
    use super::*;

    #[tokio::test]
    async fn creating_a_mountain_selects_it() {
        let server = setup();
        let first = current_mountain(&server).await;

        let response = server.post(&format!("{}/mountains", USER)).await;

        response.assert_status(StatusCode::CREATED);
        let created = response.json::<Mountain>();
        assert_ne!(created.id, first.id);
        assert_eq!(created.goal, "");

        let summaries = server
            .get(&format!("{}/mountains", USER))
            .await
            .json::<Vec<MountainSummary>>();
        assert_eq!(summaries.len(), 2);
        assert!(!summaries[0].is_current);
        assert!(summaries[1].is_current);
        assert_eq!(summaries[1].title, "Untitled mountain");
    }

    #[tokio::test]
    async fn renames_with_trimmed_goal() {
        let server = setup();
        let mountain = current_mountain(&server).await;

        let updated = set_goal(&server, &mountain.id, "  Run a marathon  ").await;

        assert_eq!(updated.goal, "Run a marathon");
    }

    #[tokio::test]
    async fn returns_404_for_unknown_mountain() {
        let server = setup();

        server
            .get(&format!("{}/mountains/missing", USER))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn refuses_to_delete_the_last_mountain() {
        let server = setup();
        let mountain = current_mountain(&server).await;

        let response = server
            .delete(&format!("{}/mountains/{}", USER, mountain.id))
            .await;

        response.assert_status(StatusCode::CONFLICT);
        let state = server.get(&format!("{}/state", USER)).await.json::<PersistedState>();
        assert_eq!(state.mountains.len(), 1);
    }

    #[tokio::test]
    async fn deleting_the_current_mountain_moves_selection() {
        let server = setup();
        let first = current_mountain(&server).await;
        let second = server.post(&format!("{}/mountains", USER)).await.json::<Mountain>();

        server
            .delete(&format!("{}/mountains/{}", USER, second.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        assert_eq!(current_mountain(&server).await.id, first.id);
    }

    #[tokio::test]
    async fn selection_wraps_around() {
        let server = setup();
        let first = current_mountain(&server).await;
        let second = server.post(&format!("{}/mountains", USER)).await.json::<Mountain>();

        let next = server
            .post(&format!("{}/selection/next", USER))
            .await
            .json::<Mountain>();
        assert_eq!(next.id, first.id);

        let previous = server
            .post(&format!("{}/selection/previous", USER))
            .await
            .json::<Mountain>();
        assert_eq!(previous.id, second.id);

        let selected = server
            .post(&format!("{}/mountains/{}/select", USER, first.id))
            .await
            .json::<Mountain>();
        assert_eq!(selected.id, first.id);
        assert_eq!(current_mountain(&server).await.id, first.id);
    }
}

// ============================================================
// Tasks and progress
// ============================================================

mod tasks {
    use super::*;

    #[tokio::test]
    async fn rejects_blank_task_text() {
        let server = setup();
        let mountain = current_mountain(&server).await;

        let response = server
            .post(&format!("{}/mountains/{}/tasks", USER, mountain.id))
            .json(&CreateTaskInput {
                text: "   ".to_string(),
            })
            .await;

        response.assert_status_bad_request();
        assert!(current_mountain(&server).await.tasks.is_empty());
    }

    #[tokio::test]
    async fn appends_tasks_in_order() {
        let server = setup();
        let mountain = current_mountain(&server).await;

        add_task(&server, &mountain.id, "Design").await;
        add_task(&server, &mountain.id, " Build ").await;

        let texts: Vec<String> = current_mountain(&server)
            .await
            .tasks
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["Design", "Build"]);
    }

    #[tokio::test]
    async fn toggling_twice_restores_the_task() {
        let server = setup();
        let mountain = current_mountain(&server).await;
        let task = add_task(&server, &mountain.id, "Pack").await;
        let url = format!("{}/mountains/{}/tasks/{}/toggle", USER, mountain.id, task.id);

        assert!(server.post(&url).await.json::<Task>().done);
        assert!(!server.post(&url).await.json::<Task>().done);
    }

    #[tokio::test]
    async fn toggling_an_unknown_task_is_404() {
        let server = setup();
        let mountain = current_mountain(&server).await;

        server
            .post(&format!("{}/mountains/{}/tasks/nope/toggle", USER, mountain.id))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn deletes_a_task() {
        let server = setup();
        let mountain = current_mountain(&server).await;
        let task = add_task(&server, &mountain.id, "Temporary").await;

        server
            .delete(&format!("{}/mountains/{}/tasks/{}", USER, mountain.id, task.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        assert!(current_mountain(&server).await.tasks.is_empty());
    }

    #[tokio::test]
    async fn progress_reaches_the_summit() {
        let server = setup();
        let mountain = current_mountain(&server).await;
        set_goal(&server, &mountain.id, "Ship MVP").await;
        for text in ["Design", "Build", "Launch"] {
            let task = add_task(&server, &mountain.id, text).await;
            server
                .post(&format!("{}/mountains/{}/tasks/{}/toggle", USER, mountain.id, task.id))
                .await
                .assert_status_ok();
        }

        let report = server
            .get(&format!("{}/mountains/{}/progress", USER, mountain.id))
            .await
            .json::<ProgressReport>();

        assert_eq!(report.percent, 100);
        assert_eq!(report.altitude, 4000);
        assert!(report.summit_reached);
        assert_eq!(report.motivation, Motivation::Summit);
    }

    #[tokio::test]
    async fn progress_of_a_new_mountain_is_empty() {
        let server = setup();
        let mountain = current_mountain(&server).await;

        let report = server
            .get(&format!("{}/mountains/{}/progress", USER, mountain.id))
            .await
            .json::<ProgressReport>();

        assert_eq!(report.percent, 0);
        assert_eq!(report.altitude, 0);
        assert_eq!(report.motivation, Motivation::Empty);
    }
}

// ============================================================
// Climb path and profile
// ============================================================

mod climb {
    use super::*;

    #[tokio::test]
    async fn path_places_checkpoints_and_climber() {
        let server = setup();
        let mountain = current_mountain(&server).await;
        let first = add_task(&server, &mountain.id, "One").await;
        add_task(&server, &mountain.id, "Two").await;
        add_task(&server, &mountain.id, "Three").await;
        server
            .post(&format!("{}/mountains/{}/tasks/{}/toggle", USER, mountain.id, first.id))
            .await
            .assert_status_ok();

        let path = server
            .get(&format!("{}/mountains/{}/path", USER, mountain.id))
            .await
            .json::<ClimbPath>();

        assert_eq!(path.staircase.seed, mountain.id);
        assert_eq!(path.staircase.steps.len(), 91);
        let checkpoints: Vec<usize> = path
            .staircase
            .steps
            .iter()
            .filter(|s| s.is_checkpoint)
            .map(|s| s.overall_index)
            .collect();
        assert_eq!(checkpoints, vec![30, 60, 90]);
        assert_eq!(path.done, 1);
        assert_eq!(path.climber_index, 30);
        assert_eq!(path.next_checkpoint, Some(60));
    }

    #[tokio::test]
    async fn path_is_stable_between_requests() {
        let server = setup();
        let mountain = current_mountain(&server).await;
        add_task(&server, &mountain.id, "One").await;
        let url = format!("{}/mountains/{}/path", USER, mountain.id);

        let a = server.get(&url).await.json::<ClimbPath>();
        let b = server.get(&url).await.json::<ClimbPath>();

        assert_eq!(a.staircase, b.staircase);
    }

    #[tokio::test]
    async fn profile_marks_reached_ledges() {
        let server = setup();
        let mountain = current_mountain(&server).await;
        let first = add_task(&server, &mountain.id, "One").await;
        add_task(&server, &mountain.id, "Two").await;
        server
            .post(&format!("{}/mountains/{}/tasks/{}/toggle", USER, mountain.id, first.id))
            .await
            .assert_status_ok();

        let profile = server
            .get(&format!("{}/mountains/{}/profile", USER, mountain.id))
            .await
            .json::<ClimbProfile>();

        assert_eq!(profile.ledges.len(), 2);
        assert!(profile.ledges[0].reached);
        assert!(!profile.ledges[1].reached);
        assert!(profile.outline.starts_with('M'));
        assert!(profile.summit_cap.ends_with('Z'));
    }
}

// ============================================================
// Photos
// ============================================================

mod photos {
    use super::*;

    const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[tokio::test]
    async fn inline_photo_moves_into_the_photo_store() {
        let (server, db) = setup_with_inference("http://127.0.0.1:9/api/chat");
        let mountain = current_mountain(&server).await;
        let task = add_task(&server, &mountain.id, "Summit selfie").await;

        let updated = server
            .put(&format!("{}/mountains/{}/tasks/{}/photo", USER, mountain.id, task.id))
            .json(&UpdatePhotoInput {
                photo: Some(IMAGE.to_string()),
            })
            .await
            .json::<Task>();

        let reference = updated.photo.expect("photo reference");
        assert!(reference.starts_with(PHOTO_URL_PREFIX));
        assert_eq!(db.count_photos("alice").unwrap(), 1);

        let photo = server.get(&reference).await.json::<Photo>();
        assert_eq!(photo.data, IMAGE);
    }

    #[tokio::test]
    async fn clearing_a_photo_releases_it() {
        let (server, db) = setup_with_inference("http://127.0.0.1:9/api/chat");
        let mountain = current_mountain(&server).await;
        let task = add_task(&server, &mountain.id, "Pic").await;
        let url = format!("{}/mountains/{}/tasks/{}/photo", USER, mountain.id, task.id);

        server
            .put(&url)
            .json(&UpdatePhotoInput {
                photo: Some(IMAGE.to_string()),
            })
            .await
            .assert_status_ok();
        let cleared = server
            .put(&url)
            .json(&UpdatePhotoInput { photo: None })
            .await
            .json::<Task>();

        assert!(cleared.photo.is_none());
        assert_eq!(db.count_photos("alice").unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_a_task_releases_its_photo() {
        let (server, db) = setup_with_inference("http://127.0.0.1:9/api/chat");
        let mountain = current_mountain(&server).await;
        let task = add_task(&server, &mountain.id, "Pic").await;
        server
            .put(&format!("{}/mountains/{}/tasks/{}/photo", USER, mountain.id, task.id))
            .json(&UpdatePhotoInput {
                photo: Some(IMAGE.to_string()),
            })
            .await
            .assert_status_ok();

        server
            .delete(&format!("{}/mountains/{}/tasks/{}", USER, mountain.id, task.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        assert_eq!(db.count_photos("alice").unwrap(), 0);
    }

    #[tokio::test]
    async fn photo_for_unknown_task_is_not_kept() {
        let (server, db) = setup_with_inference("http://127.0.0.1:9/api/chat");
        let mountain = current_mountain(&server).await;

        server
            .put(&format!("{}/mountains/{}/tasks/ghost/photo", USER, mountain.id))
            .json(&UpdatePhotoInput {
                photo: Some(IMAGE.to_string()),
            })
            .await
            .assert_status_not_found();

        assert_eq!(db.count_photos("alice").unwrap(), 0);
    }

    #[tokio::test]
    async fn external_urls_are_stored_as_given() {
        let server = setup();
        let mountain = current_mountain(&server).await;
        let task = add_task(&server, &mountain.id, "Pic").await;

        let updated = server
            .put(&format!("{}/mountains/{}/tasks/{}/photo", USER, mountain.id, task.id))
            .json(&UpdatePhotoInput {
                photo: Some("https://cdn.example/p.jpg".to_string()),
            })
            .await
            .json::<Task>();

        assert_eq!(updated.photo.as_deref(), Some("https://cdn.example/p.jpg"));
    }

    async fn attach(server: &TestServer, user: &str, mountain_id: &str, task_id: &str, photo: &str) -> axum_test::TestResponse {
        server
            .put(&format!("{}/mountains/{}/tasks/{}/photo", user, mountain_id, task_id))
            .json(&UpdatePhotoInput {
                photo: Some(photo.to_string()),
            })
            .await
    }

    async fn upload(server: &TestServer, mountain_id: &str, text: &str) -> String {
        let task = add_task(server, mountain_id, text).await;
        attach(server, USER, mountain_id, &task.id, IMAGE)
            .await
            .json::<Task>()
            .photo
            .expect("photo reference")
    }

    #[tokio::test]
    async fn another_user_cannot_attach_a_stored_photo() {
        let (server, db) = setup_with_inference("http://127.0.0.1:9/api/chat");
        let mountain = current_mountain(&server).await;
        let reference = upload(&server, &mountain.id, "Mine").await;

        let bob = "/api/v1/users/bob";
        let bob_state = server.get(&format!("{}/state", bob)).await.json::<PersistedState>();
        let bob_mountain = bob_state.current_mountain_id.clone();
        let bob_task = server
            .post(&format!("{}/mountains/{}/tasks", bob, bob_mountain))
            .json(&CreateTaskInput {
                text: "Theirs".to_string(),
            })
            .await
            .json::<Task>();

        attach(&server, bob, &bob_mountain, &bob_task.id, &reference)
            .await
            .assert_status_bad_request();
        assert_eq!(db.count_photos("alice").unwrap(), 1);
    }

    #[tokio::test]
    async fn another_users_state_cannot_release_a_stored_photo() {
        let (server, db) = setup_with_inference("http://127.0.0.1:9/api/chat");
        let mountain = current_mountain(&server).await;
        let reference = upload(&server, &mountain.id, "Mine").await;

        let bob = "/api/v1/users/bob";
        let document = json!({
            "goal": "Borrowed",
            "tasks": [{ "id": "b1", "text": "Theirs", "done": false, "photo": reference }],
        });
        let bob_state = server
            .put(&format!("{}/state", bob))
            .json(&document)
            .await
            .json::<PersistedState>();
        server
            .delete(&format!("{}/mountains/{}/tasks/b1", bob, bob_state.current_mountain_id))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        assert_eq!(db.count_photos("alice").unwrap(), 1);
        server.get(&reference).await.assert_status_ok();
    }

    #[tokio::test]
    async fn shared_photo_is_released_with_its_last_task() {
        let (server, db) = setup_with_inference("http://127.0.0.1:9/api/chat");
        let mountain = current_mountain(&server).await;
        let reference = upload(&server, &mountain.id, "First").await;
        let second = add_task(&server, &mountain.id, "Second").await;
        attach(&server, USER, &mountain.id, &second.id, &reference)
            .await
            .assert_status_ok();

        let tasks = current_mountain(&server).await.tasks;
        server
            .delete(&format!("{}/mountains/{}/tasks/{}", USER, mountain.id, tasks[0].id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert_eq!(db.count_photos("alice").unwrap(), 1);
        server.get(&reference).await.assert_status_ok();

        server
            .delete(&format!("{}/mountains/{}/tasks/{}", USER, mountain.id, second.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert_eq!(db.count_photos("alice").unwrap(), 0);
    }

    #[tokio::test]
    async fn replacing_the_state_releases_dropped_photos() {
        let (server, db) = setup_with_inference("http://127.0.0.1:9/api/chat");
        let mountain = current_mountain(&server).await;
        upload(&server, &mountain.id, "Pic").await;
        assert_eq!(db.count_photos("alice").unwrap(), 1);

        server
            .put(&format!("{}/state", USER))
            .json(&json!({ "goal": "Start over", "tasks": [] }))
            .await
            .assert_status_ok();

        assert_eq!(db.count_photos("alice").unwrap(), 0);
    }
}

// ============================================================
// Task generation
// ============================================================

mod generation {
    use super::*;

    const REPLY: &str = "Here is your plan:\n{\"tasks\": [\
        {\"text\": \"Write tests\"}, \
        {\"text\": \"Deploy app\"}, \
        {\"text\": \"deploy   APP\"}, \
        {\"text\": \"Announce launch\"}\
    ]}\nGood luck!";

    #[tokio::test]
    async fn requires_a_goal() {
        let server = setup();
        let mountain = current_mountain(&server).await;

        let response = server
            .post(&format!("{}/mountains/{}/generate", USER, mountain.id))
            .json(&json!({}))
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn appends_only_new_tasks() {
        let url = fake_inference(REPLY).await;
        let (server, _db) = setup_with_inference(&url);
        let mountain = current_mountain(&server).await;
        set_goal(&server, &mountain.id, "Ship MVP").await;
        add_task(&server, &mountain.id, "Write tests").await;

        let response = server
            .post(&format!("{}/mountains/{}/generate", USER, mountain.id))
            .json(&json!({ "count": 5 }))
            .await;

        response.assert_status_ok();
        let generated = response.json::<GenerateResponse>();
        assert_eq!(generated.requested, 5);
        let added: Vec<String> = generated.added.into_iter().map(|t| t.text).collect();
        assert_eq!(added, vec!["Deploy app", "Announce launch"]);

        let texts: Vec<String> = current_mountain(&server)
            .await
            .tasks
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["Write tests", "Deploy app", "Announce launch"]);
    }

    #[tokio::test]
    async fn respects_the_requested_count() {
        let url = fake_inference(REPLY).await;
        let (server, _db) = setup_with_inference(&url);
        let mountain = current_mountain(&server).await;
        set_goal(&server, &mountain.id, "Ship MVP").await;

        let generated = server
            .post(&format!("{}/mountains/{}/generate", USER, mountain.id))
            .json(&json!({ "count": 1 }))
            .await
            .json::<GenerateResponse>();

        assert_eq!(generated.added.len(), 1);
        assert_eq!(generated.added[0].text, "Write tests");
    }

    #[tokio::test]
    async fn reports_inference_failure_as_bad_gateway() {
        let url = broken_inference().await;
        let (server, _db) = setup_with_inference(&url);
        let mountain = current_mountain(&server).await;
        set_goal(&server, &mountain.id, "Ship MVP").await;

        let response = server
            .post(&format!("{}/mountains/{}/generate", USER, mountain.id))
            .json(&json!({}))
            .await;

        response.assert_status(StatusCode::BAD_GATEWAY);
        assert!(current_mountain(&server).await.tasks.is_empty());
    }

    #[tokio::test]
    async fn reports_a_reply_without_json() {
        let url = fake_inference("I cannot help with that.").await;
        let (server, _db) = setup_with_inference(&url);
        let mountain = current_mountain(&server).await;
        set_goal(&server, &mountain.id, "Ship MVP").await;

        server
            .post(&format!("{}/mountains/{}/generate", USER, mountain.id))
            .json(&json!({}))
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
    }
}

// ============================================================
// Security - API Key Authentication
// ============================================================

mod security_auth {
    use super::*;

    fn setup_with_auth(api_key: &str) -> TestServer {
        let db = database();
        let security = SecurityConfig::disabled().with_api_key(api_key);
        let app = create_router_with_security(app_state(&db, "http://127.0.0.1:9/api/chat"), security);
        TestServer::new(app).expect("Failed to create test server")
    }

    #[tokio::test]
    async fn health_endpoint_is_accessible_without_auth() {
        let server = setup_with_auth("test-secret-key");

        server.get("/api/v1/health").await.assert_status_ok();
    }

    #[tokio::test]
    async fn protected_endpoint_requires_auth() {
        let server = setup_with_auth("test-secret-key");

        server
            .get(&format!("{}/state", USER))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_endpoint_accepts_valid_bearer_token() {
        let server = setup_with_auth("test-secret-key");

        server
            .get(&format!("{}/state", USER))
            .add_header("Authorization", "Bearer test-secret-key")
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn protected_endpoint_rejects_invalid_bearer_token() {
        let server = setup_with_auth("test-secret-key");

        server
            .get(&format!("{}/state", USER))
            .add_header("Authorization", "Bearer wrong-key")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_endpoint_rejects_malformed_auth_header() {
        let server = setup_with_auth("test-secret-key");

        server
            .post(&format!("{}/mountains", USER))
            .add_header("Authorization", "Basic dXNlcjpwYXNz")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}

// ============================================================
// Security - Rate limiting
// ============================================================

mod security_rate_limit {
    use super::*;

    #[tokio::test]
    async fn rejects_requests_over_the_limit() {
        let db = database();
        let security = SecurityConfig::disabled().with_rate_limit(2);
        let app = create_router_with_security(app_state(&db, "http://127.0.0.1:9/api/chat"), security);
        let server = TestServer::new(app).expect("Failed to create test server");

        server.get(&format!("{}/mountains", USER)).await.assert_status_ok();
        server.get(&format!("{}/mountains", USER)).await.assert_status_ok();
        server
            .get(&format!("{}/mountains", USER))
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
    }
}
