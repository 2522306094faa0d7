//! services/agent/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL backend store using `sqlx`.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use taskpilot_core::domain::{Task, UserProfile};
use taskpilot_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    display_name: String,
    email: String,
    instructions: String,
    work_scope: String,
}
impl ProfileRecord {
    fn to_domain(self) -> UserProfile {
        UserProfile {
            user_id: self.id,
            display_name: self.display_name,
            email: self.email,
            instructions: self.instructions,
            work_scope: self.work_scope,
        }
    }
}

/// Row shape of the append-only `tasks` table. The domain's `related_id`
/// is stored under the `chat_origin_id` column.
#[derive(Debug, PartialEq, FromRow)]
struct TaskRecord {
    task_name: String,
    description: String,
    due_date: NaiveDate,
    priority: i32,
    chat_origin_id: String,
}
impl TaskRecord {
    fn from_domain(task: &Task) -> Self {
        Self {
            task_name: task.task_name.clone(),
            description: task.description.clone(),
            due_date: task.due_date,
            priority: task.priority,
            chat_origin_id: task.related_id.clone(),
        }
    }

    fn to_domain(self) -> Task {
        Task {
            task_name: self.task_name,
            description: self.description,
            due_date: self.due_date,
            priority: self.priority,
            related_id: self.chat_origin_id,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    /// Fetches the owner's profile. Exactly one row must exist; zero rows or
    /// several rows are both fatal misconfigurations, reported distinctly.
    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, display_name, email, instructions, work_scope FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut records = records.into_iter();
        match (records.next(), records.next()) {
            (Some(record), None) => Ok(record.to_domain()),
            (None, _) => Err(PortError::NotFound(format!("Profile {} not found", user_id))),
            (Some(_), Some(_)) => Err(PortError::Ambiguous(format!(
                "Multiple profiles found for {user_id}, expected exactly one"
            ))),
        }
    }

    async fn get_tasks_for_sender(&self, user_id: Uuid, related_id: &str) -> PortResult<Vec<Task>> {
        let records = sqlx::query_as::<_, TaskRecord>(
            "SELECT task_name, description, due_date, priority, chat_origin_id \
             FROM tasks WHERE user_id = $1 AND chat_origin_id = $2 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .bind(related_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let tasks = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(tasks)
    }

    async fn post_task(&self, user_id: Uuid, task: &Task) -> PortResult<()> {
        let record = TaskRecord::from_domain(task);
        sqlx::query(
            "INSERT INTO tasks (task_name, description, due_date, priority, chat_origin_id, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.task_name)
        .bind(record.description)
        .bind(record.due_date)
        .bind(record.priority)
        .bind(record.chat_origin_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}
