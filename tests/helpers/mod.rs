//! Test application wiring the in-process collaborator doubles into the
//! real router.

use std::sync::Arc;

use axum::Router;
use serde_json::json;

use coursegate::gateway::Gateway;
use coursegate::models::COURSES;
use coursegate::settings::Settings;
use coursegate::testing::{InMemoryStore, StaticIdentity, StaticPolicy};
use coursegate::web::{self, AppState};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub policy: Arc<StaticPolicy>,
    pub identity: Arc<StaticIdentity>,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::default());
    let policy = Arc::new(StaticPolicy::default());
    let identity = Arc::new(StaticIdentity::default());

    let gateway = Gateway::new(store.clone(), policy.clone());
    let state = AppState {
        settings: Arc::new(Settings::default()),
        identity: identity.clone(),
        gateway: Arc::new(gateway),
    };

    TestApp {
        router: web::router(state),
        store,
        policy,
        identity,
    }
}

pub fn seed_course(store: &InMemoryStore, id: &str, title: &str, teacher: &str, students: &[&str]) {
    store.seed(
        COURSES,
        id,
        json!({
            "title": title,
            "description": "",
            "teacherId": teacher,
            "studentIds": students,
        }),
    );
}
