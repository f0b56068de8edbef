use crate::config::DatabaseConfig;
use crate::validation::CREATOR_DELIMITER;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Metadata store failures, classified by what the caller can do about them
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("unique violation: {0}")]
    UniqueViolation(String),

    #[error("metadata store unavailable: {0}")]
    Unavailable(String),

    /// Decode, column or protocol failures that retrying will not fix
    #[error("metadata store error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for MetadataError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            if db_err.is_foreign_key_violation() {
                return MetadataError::ForeignKeyViolation(constraint);
            }
            if db_err.is_unique_violation() {
                return MetadataError::UniqueViolation(constraint);
            }
        }
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => MetadataError::Unavailable(err.to_string()),
            _ => MetadataError::Internal(err.to_string()),
        }
    }
}

/// Project category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    /// Unique display name
    pub name: String,
}

/// Category with the number of projects filed under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CategoryUsage {
    pub id: Uuid,
    pub name: String,
    pub project_count: i64,
}

/// Stored project record
///
/// `has_cover` and `has_video` are the only record of which blobs exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Project {
    /// Also the stem of the asset keys
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub year: i32,
    /// Creator names joined with `;`
    pub creators: String,
    pub external_link: Option<String>,
    pub category_id: Uuid,
    pub has_cover: bool,
    pub has_video: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn creator_names(&self) -> Vec<String> {
        self.creators
            .split(CREATOR_DELIMITER)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Visitor review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    /// 1 to 5
    pub stars: i16,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Review statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReviewStats {
    pub total_reviews: i64,
    pub average_stars: Option<f64>,
}

/// Query parameters for project browsing
#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    /// Filter by category
    pub category_id: Option<Uuid>,
    /// Filter by exhibition year
    pub year: Option<i32>,
    /// Case-insensitive match on title, description or creators
    pub search: Option<String>,
    /// Only projects with a demo video
    pub with_video_only: bool,
    /// Maximum number of results
    pub limit: Option<i64>,
    /// Offset for pagination
    pub offset: Option<i64>,
}

/// Relational persistence for categories, projects and reviews.
///
/// `projects.category_id` references `categories.id` with restrict-on-delete,
/// so deleting a referenced category fails with
/// [`MetadataError::ForeignKeyViolation`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Connectivity check
    async fn ping(&self) -> Result<(), MetadataError>;

    async fn insert_category(&self, category: &Category) -> Result<(), MetadataError>;

    /// Returns false when no category has this id
    async fn rename_category(&self, id: Uuid, name: &str) -> Result<bool, MetadataError>;

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, MetadataError>;

    /// Exact match on the unique name
    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>, MetadataError>;

    /// Ordered by name
    async fn list_categories(&self) -> Result<Vec<Category>, MetadataError>;

    /// Ordered by name, including categories with no projects
    async fn list_category_usage(&self) -> Result<Vec<CategoryUsage>, MetadataError>;

    async fn count_projects_in_category(&self, id: Uuid) -> Result<i64, MetadataError>;

    /// Returns false when no category has this id
    async fn delete_category(&self, id: Uuid) -> Result<bool, MetadataError>;

    async fn insert_project(&self, project: &Project) -> Result<(), MetadataError>;

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, MetadataError>;

    /// Newest first
    async fn query_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, MetadataError>;

    /// Writes every column but `id` and `created_at` in one statement.
    /// Returns false when no project has this id.
    async fn update_project(&self, project: &Project) -> Result<bool, MetadataError>;

    /// Returns false when no project has this id
    async fn delete_project(&self, id: Uuid) -> Result<bool, MetadataError>;

    async fn insert_review(&self, review: &Review, client_token: &str) -> Result<(), MetadataError>;

    async fn get_review_by_token(&self, client_token: &str) -> Result<Option<Review>, MetadataError>;

    /// Newest first
    async fn list_reviews(&self) -> Result<Vec<Review>, MetadataError>;

    async fn review_stats(&self) -> Result<ReviewStats, MetadataError>;

    /// Returns false when no review has this id
    async fn delete_review(&self, id: Uuid) -> Result<bool, MetadataError>;
}

const PROJECT_COLUMNS: &str = r#"
    id, title, description, year, creators, external_link,
    category_id, has_cover, has_video, created_at, updated_at
"#;

/// PostgreSQL-backed metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn ping(&self) -> Result<(), MetadataError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self, category), fields(category_id = %category.id))]
    async fn insert_category(&self, category: &Category) -> Result<(), MetadataError> {
        sqlx::query("INSERT INTO categories (id, name) VALUES ($1, $2)")
            .bind(category.id)
            .bind(&category.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename_category(&self, id: Uuid, name: &str) -> Result<bool, MetadataError> {
        let result = sqlx::query("UPDATE categories SET name = $2 WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, MetadataError> {
        let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>, MetadataError> {
        let category =
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, MetadataError> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    async fn list_category_usage(&self) -> Result<Vec<CategoryUsage>, MetadataError> {
        let usage = sqlx::query_as::<_, CategoryUsage>(
            r#"
            SELECT c.id, c.name, COUNT(p.id) AS project_count
            FROM categories c
            LEFT JOIN projects p ON p.category_id = c.id
            GROUP BY c.id, c.name
            ORDER BY c.name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(usage)
    }

    async fn count_projects_in_category(&self, id: Uuid) -> Result<i64, MetadataError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects WHERE category_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    #[instrument(skip(self))]
    async fn delete_category(&self, id: Uuid) -> Result<bool, MetadataError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, project), fields(project_id = %project.id))]
    async fn insert_project(&self, project: &Project) -> Result<(), MetadataError> {
        sqlx::query(
            r#"
            INSERT INTO projects (
                id, title, description, year, creators, external_link,
                category_id, has_cover, has_video, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11
            )
            "#,
        )
        .bind(project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.year)
        .bind(&project.creators)
        .bind(&project.external_link)
        .bind(project.category_id)
        .bind(project.has_cover)
        .bind(project.has_video)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(project_id = %project.id, "Project row inserted");
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, MetadataError> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1");
        let project = sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    #[instrument(skip(self))]
    async fn query_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, MetadataError> {
        let mut sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE 1=1");
        let mut param_count = 0;

        if query.category_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND category_id = ${}", param_count));
        }

        if query.year.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND year = ${}", param_count));
        }

        if query.search.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND (title ILIKE ${p} OR description ILIKE ${p} OR creators ILIKE ${p})",
                p = param_count
            ));
        }

        if query.with_video_only {
            sql.push_str(" AND has_video");
        }

        sql.push_str(" ORDER BY created_at DESC, id");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${}", param_count));
        }

        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${}", param_count));
        }

        let mut query_builder = sqlx::query_as::<_, Project>(&sql);

        if let Some(category_id) = query.category_id {
            query_builder = query_builder.bind(category_id);
        }
        if let Some(year) = query.year {
            query_builder = query_builder.bind(year);
        }
        if let Some(ref search) = query.search {
            query_builder = query_builder.bind(format!("%{}%", search));
        }
        if let Some(limit) = query.limit {
            query_builder = query_builder.bind(limit);
        }
        if let Some(offset) = query.offset {
            query_builder = query_builder.bind(offset);
        }

        let projects = query_builder.fetch_all(&self.pool).await?;
        Ok(projects)
    }

    #[instrument(skip(self, project), fields(project_id = %project.id))]
    async fn update_project(&self, project: &Project) -> Result<bool, MetadataError> {
        let result = sqlx::query(
            r#"
            UPDATE projects SET
                title = $2, description = $3, year = $4, creators = $5,
                external_link = $6, category_id = $7,
                has_cover = $8, has_video = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.year)
        .bind(&project.creators)
        .bind(&project.external_link)
        .bind(project.category_id)
        .bind(project.has_cover)
        .bind(project.has_video)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_project(&self, id: Uuid) -> Result<bool, MetadataError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, review, client_token), fields(review_id = %review.id))]
    async fn insert_review(&self, review: &Review, client_token: &str) -> Result<(), MetadataError> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, stars, reason, client_token, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(review.id)
        .bind(review.stars)
        .bind(&review.reason)
        .bind(client_token)
        .bind(review.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_review_by_token(&self, client_token: &str) -> Result<Option<Review>, MetadataError> {
        let review = sqlx::query_as::<_, Review>(
            "SELECT id, stars, reason, created_at FROM reviews WHERE client_token = $1",
        )
        .bind(client_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, MetadataError> {
        let reviews = sqlx::query_as::<_, Review>(
            "SELECT id, stars, reason, created_at FROM reviews ORDER BY created_at DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    async fn review_stats(&self) -> Result<ReviewStats, MetadataError> {
        let stats: ReviewStats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) as total_reviews,
                AVG(stars)::float8 as average_stars
            FROM reviews
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    #[instrument(skip(self))]
    async fn delete_review(&self, id: Uuid) -> Result<bool, MetadataError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
