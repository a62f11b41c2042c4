//! End-to-end harvest runs against a local fake of every upstream API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use catalog_harvest::config::Config;
use catalog_harvest::ingest::{run_ingest, IngestOptions};
use catalog_harvest::models::{MediaKind, ProviderKind};
use catalog_harvest::store::sqlite::SqliteStore;
use catalog_harvest::store::EntityStore;

const UNSET_ENV: &str = "HARVEST_TEST_DEFINITELY_UNSET";

struct Upstream {
    base: String,
    requests: AtomicUsize,
    youtube_calls: AtomicUsize,
}

type Shared = Arc<Upstream>;

async fn wger_exercises(
    State(up): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    up.requests.fetch_add(1, Ordering::SeqCst);
    if q.get("page").map(String::as_str) == Some("2") {
        return Json(json!({
            "count": 2,
            "next": null,
            "results": [{
                "id": 12, "uuid": "b", "name": "Barbell Squat",
                "description": "<p>Sit back and down.</p>",
                "category": 9, "muscles": [10], "muscles_secondary": [], "equipment": [1]
            }]
        }));
    }
    Json(json!({
        "count": 2,
        "next": format!("{}/api/v2/exercise/?page=2", up.base),
        "results": [{
            "id": 11, "uuid": "a", "name": "Push-Up",
            "description": "<p>Keep a straight line.</p>",
            "category": 11, "muscles": [4], "muscles_secondary": [5], "equipment": [7]
        }]
    }))
}

async fn wger_table(State(up): State<Shared>, table: &'static str) -> Json<Value> {
    up.requests.fetch_add(1, Ordering::SeqCst);
    let rows = match table {
        "muscle" => json!([
            {"id": 4, "name": "Pectoralis major", "name_en": "Chest"},
            {"id": 5, "name": "Triceps brachii", "name_en": "Triceps"},
            {"id": 10, "name": "Quadriceps femoris", "name_en": "Quads"}
        ]),
        "equipment" => json!([
            {"id": 1, "name": "Barbell"},
            {"id": 7, "name": "none (bodyweight exercise)"}
        ]),
        _ => json!([
            {"id": 9, "name": "Legs"},
            {"id": 11, "name": "Chest"}
        ]),
    };
    Json(json!({ "count": 3, "next": null, "results": rows }))
}

async fn exercisedb(
    State(up): State<Shared>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    up.requests.fetch_add(1, Ordering::SeqCst);
    if headers.get("x-rapidapi-key").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "missing key"})));
    }
    if q.get("offset").map(String::as_str) != Some("0") {
        return (StatusCode::OK, Json(json!([])));
    }
    (
        StatusCode::OK,
        Json(json!([
            {
                "id": "0662", "name": "push up", "bodyPart": "chest",
                "equipment": "body weight", "target": "pectorals",
                "secondaryMuscles": ["triceps", "shoulders"],
                "gifUrl": "https://gifs.example/0662.gif",
                "instructions": ["Start in plank.", "Lower your body."]
            },
            {
                "id": "0001", "name": "3/4 sit-up", "bodyPart": "waist",
                "equipment": "body weight", "target": "abs",
                "secondaryMuscles": [], "instructions": ["Curl up."]
            }
        ])),
    )
}

async fn ninjas(
    State(up): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    up.requests.fetch_add(1, Ordering::SeqCst);
    if q.get("muscle").map(String::as_str) != Some("biceps")
        || q.get("offset").map(String::as_str) != Some("0")
    {
        return Json(json!([]));
    }
    Json(json!([{
        "name": "Incline Hammer Curls", "type": "strength", "muscle": "biceps",
        "equipment": "dumbbell", "difficulty": "beginner",
        "instructions": "Curl with a neutral grip."
    }]))
}

async fn youtube(
    State(up): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    up.requests.fetch_add(1, Ordering::SeqCst);
    up.youtube_calls.fetch_add(1, Ordering::SeqCst);
    let slug = q.get("q").cloned().unwrap_or_default().replace(' ', "_");
    Json(json!({
        "items": [{
            "id": {"kind": "youtube#video", "videoId": slug},
            "snippet": {"title": "demo", "thumbnails": {"medium": {"url": "https://img.example/t.jpg"}}}
        }]
    }))
}

async fn start_upstream() -> Shared {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let up = Arc::new(Upstream {
        base,
        requests: AtomicUsize::new(0),
        youtube_calls: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/api/v2/exercise/", get(wger_exercises))
        .route("/api/v2/muscle/", get(|s: State<Shared>| wger_table(s, "muscle")))
        .route("/api/v2/equipment/", get(|s: State<Shared>| wger_table(s, "equipment")))
        .route(
            "/api/v2/exercisecategory/",
            get(|s: State<Shared>| wger_table(s, "exercisecategory")),
        )
        .route("/exercises", get(exercisedb))
        .route("/v1/exercises", get(ninjas))
        .route("/youtube/v3/search", get(youtube))
        .with_state(up.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    up
}

fn config_for(up: &Upstream, tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.db.path = tmp.path().join("data").join("catalog.sqlite");
    config.http.backoff_ms = 5;
    config.http.max_retries = 1;

    let providers = &mut config.providers;
    providers.wger.base_url = up.base.clone();
    providers.wger.page_size = 1;
    providers.wger.api_key_env = UNSET_ENV.to_string();
    providers.exercisedb.base_url = up.base.clone();
    providers.exercisedb.api_key = Some("edb-key".to_string());
    providers.ninjas.base_url = up.base.clone();
    providers.ninjas.muscles = vec!["biceps".to_string(), "chest".to_string()];
    providers.ninjas.api_key = Some("ninjas-key".to_string());

    config.media.youtube.base_url = up.base.clone();
    config.media.youtube.api_key = Some("yt-key".to_string());
    config.media.giphy.api_key = None;
    config.media.giphy.api_key_env = UNSET_ENV.to_string();
    config
}

async fn open_store(config: &Config) -> SqliteStore {
    let pool = catalog_harvest::db::connect(config).await.unwrap();
    SqliteStore::new(pool)
}

#[tokio::test]
async fn test_full_run_merges_across_providers() {
    let up = start_upstream().await;
    let tmp = TempDir::new().unwrap();
    let config = config_for(&up, &tmp);

    let summary = run_ingest(&config, IngestOptions::default()).await.unwrap();

    let fetched: HashMap<ProviderKind, usize> = summary
        .providers
        .iter()
        .map(|p| (p.provider, p.fetched))
        .collect();
    assert_eq!(fetched[&ProviderKind::Wger], 2);
    assert_eq!(fetched[&ProviderKind::ExerciseDb], 2);
    assert_eq!(fetched[&ProviderKind::ApiNinjas], 1);
    assert_eq!(summary.page_errors(), 0);
    assert_eq!(summary.merged, 4);
    assert_eq!(summary.upsert.inserted, 4);

    let store = open_store(&config).await;
    let push_up = store.get("push-up|chest").await.unwrap().unwrap();
    assert_eq!(push_up.name, "Push-Up");
    assert_eq!(push_up.description, "Keep a straight line.");
    assert_eq!(push_up.muscles, vec!["chest"]);
    assert_eq!(push_up.equipment, vec!["body weight"]);
    assert_eq!(push_up.media.len(), 1);
    assert_eq!(push_up.media[0].kind, MediaKind::Gif);
    assert!(push_up.sources.contains("wger") && push_up.sources.contains("exercisedb"));
    assert!(push_up.alt_ids.contains("wger:11") && push_up.alt_ids.contains("exercisedb:0662"));

    assert!(store.get("barbell-squat|legs").await.unwrap().is_some());
    assert!(store.get("3/4-sit-up|core").await.unwrap().is_some());
    let curls = store.get("incline-hammer-curls|arms").await.unwrap().unwrap();
    assert_eq!(curls.equipment, vec!["dumbbell"]);
}

#[tokio::test]
async fn test_second_run_is_unchanged_and_skips_media() {
    let up = start_upstream().await;
    let tmp = TempDir::new().unwrap();
    let config = config_for(&up, &tmp);
    let opts = IngestOptions {
        enrich: Some(true),
        ..IngestOptions::default()
    };

    let first = run_ingest(&config, opts.clone()).await.unwrap();
    assert_eq!(first.upsert.inserted, 4);
    // Push-Up already carries a gif; the other three need media.
    assert_eq!(first.enrich.attempted, 3);
    assert_eq!(first.enrich.enriched, 3);
    assert_eq!(up.youtube_calls.load(Ordering::SeqCst), 3);

    let store = open_store(&config).await;
    let squat = store.get("barbell-squat|legs").await.unwrap().unwrap();
    assert_eq!(squat.media[0].kind, MediaKind::Video);
    let created = squat.created_at;
    let updated = squat.updated_at;
    store.pool().close().await;

    let second = run_ingest(&config, opts).await.unwrap();
    assert_eq!(second.upsert.unchanged, 4);
    assert_eq!(second.upsert.inserted + second.upsert.updated, 0);
    assert_eq!(second.enrich.attempted, 0);
    assert_eq!(up.youtube_calls.load(Ordering::SeqCst), 3);

    let store = open_store(&config).await;
    let squat = store.get("barbell-squat|legs").await.unwrap().unwrap();
    assert_eq!(squat.created_at, created);
    assert_eq!(squat.updated_at, updated);
}

#[tokio::test]
async fn test_missing_keys_complete_with_zero_results() {
    let up = start_upstream().await;
    let tmp = TempDir::new().unwrap();
    let mut config = config_for(&up, &tmp);
    config.providers.wger.enabled = false;
    config.providers.exercisedb.api_key = None;
    config.providers.exercisedb.api_key_env = UNSET_ENV.to_string();
    config.providers.ninjas.api_key = None;
    config.providers.ninjas.api_key_env = UNSET_ENV.to_string();

    let summary = run_ingest(&config, IngestOptions::default()).await.unwrap();

    assert!(summary.providers.iter().all(|p| !p.enabled && p.fetched == 0));
    assert_eq!(summary.merged, 0);
    assert_eq!(summary.upsert.inserted, 0);
    assert_eq!(up.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_provider_subset_and_dry_run() {
    let up = start_upstream().await;
    let tmp = TempDir::new().unwrap();
    let config = config_for(&up, &tmp);

    let summary = run_ingest(
        &config,
        IngestOptions {
            providers: Some(vec![ProviderKind::ExerciseDb]),
            dry_run: true,
            ..IngestOptions::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(summary.providers.len(), 1);
    assert_eq!(summary.merged, 2);
    assert!(summary.dry_run);

    let store = open_store(&config).await;
    assert!(store.get("push-up|chest").await.unwrap().is_none());
}
