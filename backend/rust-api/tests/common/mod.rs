#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use assessment_api::{
    config::{Config, ExamSettings},
    create_router,
    engine::ResultStore,
    models::question::{AnswerValue, Question, QuestionSelector},
    models::result::ExamResult,
    services::{
        question_repository::QuestionSource,
        session_service::{ResultStores, SessionService},
        AppState,
    },
};

/// Serves the same question list for every selector.
pub struct MemoryQuestions(pub Vec<Question>);

#[async_trait]
impl QuestionSource for MemoryQuestions {
    async fn fetch_questions(&self, selector: &QuestionSelector) -> anyhow::Result<Vec<Question>> {
        match selector {
            QuestionSelector::Exam(exam_id) if exam_id == "missing-exam" => Ok(Vec::new()),
            _ => Ok(self.0.clone()),
        }
    }
}

/// Keeps written results in memory.
#[derive(Default)]
pub struct MemoryResults {
    pub written: Mutex<Vec<ExamResult>>,
}

impl MemoryResults {
    pub fn count(&self) -> usize {
        self.written.lock().unwrap().len()
    }
}

#[async_trait]
impl ResultStore for MemoryResults {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save_result(&self, result: &ExamResult) -> anyhow::Result<()> {
        self.written.lock().unwrap().push(result.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub durable: Arc<MemoryResults>,
    pub cache: Arc<MemoryResults>,
}

pub fn question(id: &str, topic: &str, key: &str) -> Question {
    Question {
        id: id.to_string(),
        content: format!("Question {}", id),
        options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        correct_answer: AnswerValue::Choice(key.to_string()),
        topic: topic.to_string(),
        difficulty: "easy".to_string(),
        explanation: Some(format!("The answer is {}", key)),
        exam_id: Some("exam-1".to_string()),
        class_id: None,
    }
}

/// Word/A, Word/B, Excel/C.
pub fn office_questions() -> Vec<Question> {
    vec![
        question("q1", "Word", "A"),
        question("q2", "Word", "B"),
        question("q3", "Excel", "C"),
    ]
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(ExamSettings::default())
}

pub fn create_test_app_with(exam: ExamSettings) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let durable = Arc::new(MemoryResults::default());
    let cache = Arc::new(MemoryResults::default());
    let stores = ResultStores {
        best_effort: Some(cache.clone()),
        durable: Some(durable.clone()),
    };

    let config = Config {
        exam: exam.clone(),
        ..Config::default()
    };
    let sessions = Arc::new(SessionService::new(
        Arc::new(MemoryQuestions(office_questions())),
        stores,
        exam,
    ));
    let app_state = Arc::new(AppState::with_service(config, sessions));

    TestApp {
        router: create_router(app_state),
        durable,
        cache,
    }
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, json)
}
