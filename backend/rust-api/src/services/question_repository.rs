use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, from_document, Bson, Document},
    options::FindOptions,
    Collection, Database,
};

use crate::metrics::track_db_operation;
use crate::models::question::{Question, QuestionFilter, QuestionSelector};

const COLLECTION: &str = "questions";

/// Read-only provider of question sets.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Questions in a stable order. Called once per session.
    async fn fetch_questions(&self, selector: &QuestionSelector) -> Result<Vec<Question>>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MongoQuestionRepository {
    mongo: Database,
}

impl MongoQuestionRepository {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl QuestionSource for MongoQuestionRepository {
    async fn fetch_questions(&self, selector: &QuestionSelector) -> Result<Vec<Question>> {
        let collection: Collection<Document> = self.mongo.collection(COLLECTION);
        let options = FindOptions::builder()
            .sort(doc! { "position": 1, "_id": 1 })
            .limit(selector_limit(selector))
            .build();
        let filter = selector_filter(selector);

        let documents: Vec<Document> = track_db_operation("find", COLLECTION, async {
            let cursor = collection
                .find(filter)
                .with_options(options)
                .await
                .context("Failed to query questions")?;
            cursor
                .try_collect()
                .await
                .context("Failed to iterate questions")
        })
        .await?;

        let questions = documents
            .into_iter()
            .map(decode_question)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Fetched {} questions for selector {:?}",
            questions.len(),
            selector
        );
        Ok(questions)
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// Query document for a selector. Unset filter fields match everything.
pub fn selector_filter(selector: &QuestionSelector) -> Document {
    match selector {
        QuestionSelector::Exam(exam_id) => doc! { "exam_id": exam_id },
        QuestionSelector::Filter(QuestionFilter {
            topic,
            difficulty,
            class_id,
            ..
        }) => {
            let mut filter = Document::new();
            if let Some(topic) = topic {
                filter.insert("topic", topic);
            }
            if let Some(difficulty) = difficulty {
                filter.insert("difficulty", difficulty);
            }
            if let Some(class_id) = class_id {
                filter.insert("class_id", class_id);
            }
            filter
        }
    }
}

fn selector_limit(selector: &QuestionSelector) -> Option<i64> {
    match selector {
        QuestionSelector::Exam(_) => None,
        QuestionSelector::Filter(filter) => filter.limit.map(i64::from),
    }
}

/// Stored ids may be ObjectIds; the engine works with string ids.
fn decode_question(mut document: Document) -> Result<Question> {
    for key in ["_id", "exam_id", "class_id"] {
        if let Some(Bson::ObjectId(oid)) = document.get(key) {
            let hex = oid.to_hex();
            document.insert(key, hex);
        }
    }

    let id = document
        .get("_id")
        .map(ToString::to_string)
        .unwrap_or_default();
    from_document(document).with_context(|| format!("Malformed question document {}", id))
}
