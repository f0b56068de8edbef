//! In-process implementations of the two stores.
//!
//! They enforce the same constraints as the Postgres schema (unique names and
//! tokens, restrict-on-delete for categories) so catalog behaviour can be
//! exercised without infrastructure.

use crate::metadata_store::{
    Category, CategoryUsage, MetadataError, MetadataStore, Project, ProjectQuery, Review,
    ReviewStats,
};
use crate::object_store::{join_public_url, ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Object store held in a map
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    public_base_url: String,
}

impl MemoryObjectStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).map(|o| o.bytes.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().get(key).map(|o| o.content_type.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), ObjectStoreError> {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.objects.lock().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_public_url(&self.public_base_url, key)
    }
}

#[derive(Default)]
struct Tables {
    categories: HashMap<Uuid, Category>,
    projects: HashMap<Uuid, Project>,
    reviews: HashMap<Uuid, (Review, String)>,
}

/// Metadata store held in maps
#[derive(Default)]
pub struct InMemoryMetadataStore {
    tables: Mutex<Tables>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn project_matches(project: &Project, query: &ProjectQuery) -> bool {
    if query.category_id.is_some_and(|c| c != project.category_id) {
        return false;
    }
    if query.year.is_some_and(|y| y != project.year) {
        return false;
    }
    if query.with_video_only && !project.has_video {
        return false;
    }
    if let Some(ref search) = query.search {
        let needle = search.to_lowercase();
        let haystacks = [&project.title, &project.description, &project.creators];
        if !haystacks.iter().any(|h| h.to_lowercase().contains(&needle)) {
            return false;
        }
    }
    true
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn ping(&self) -> Result<(), MetadataError> {
        Ok(())
    }

    async fn insert_category(&self, category: &Category) -> Result<(), MetadataError> {
        let mut tables = self.tables.lock();
        if tables.categories.values().any(|c| c.name == category.name) {
            return Err(MetadataError::UniqueViolation("categories_name_key".into()));
        }
        tables.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn rename_category(&self, id: Uuid, name: &str) -> Result<bool, MetadataError> {
        let mut tables = self.tables.lock();
        if tables.categories.values().any(|c| c.name == name && c.id != id) {
            return Err(MetadataError::UniqueViolation("categories_name_key".into()));
        }
        match tables.categories.get_mut(&id) {
            Some(category) => {
                category.name = name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, MetadataError> {
        Ok(self.tables.lock().categories.get(&id).cloned())
    }

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>, MetadataError> {
        let tables = self.tables.lock();
        Ok(tables.categories.values().find(|c| c.name == name).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, MetadataError> {
        let mut categories: Vec<Category> = self.tables.lock().categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn list_category_usage(&self) -> Result<Vec<CategoryUsage>, MetadataError> {
        let tables = self.tables.lock();
        let mut usage: Vec<CategoryUsage> = tables
            .categories
            .values()
            .map(|c| CategoryUsage {
                id: c.id,
                name: c.name.clone(),
                project_count: tables
                    .projects
                    .values()
                    .filter(|p| p.category_id == c.id)
                    .count() as i64,
            })
            .collect();
        usage.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(usage)
    }

    async fn count_projects_in_category(&self, id: Uuid) -> Result<i64, MetadataError> {
        let tables = self.tables.lock();
        Ok(tables.projects.values().filter(|p| p.category_id == id).count() as i64)
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, MetadataError> {
        let mut tables = self.tables.lock();
        if tables.projects.values().any(|p| p.category_id == id) {
            return Err(MetadataError::ForeignKeyViolation("projects_category_id_fkey".into()));
        }
        Ok(tables.categories.remove(&id).is_some())
    }

    async fn insert_project(&self, project: &Project) -> Result<(), MetadataError> {
        let mut tables = self.tables.lock();
        if !tables.categories.contains_key(&project.category_id) {
            return Err(MetadataError::ForeignKeyViolation("projects_category_id_fkey".into()));
        }
        if tables.projects.contains_key(&project.id) {
            return Err(MetadataError::UniqueViolation("projects_pkey".into()));
        }
        tables.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, MetadataError> {
        Ok(self.tables.lock().projects.get(&id).cloned())
    }

    async fn query_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, MetadataError> {
        let tables = self.tables.lock();
        let mut projects: Vec<Project> = tables
            .projects
            .values()
            .filter(|p| project_matches(p, query))
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(projects.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_project(&self, project: &Project) -> Result<bool, MetadataError> {
        let mut tables = self.tables.lock();
        if !tables.categories.contains_key(&project.category_id) {
            return Err(MetadataError::ForeignKeyViolation("projects_category_id_fkey".into()));
        }
        match tables.projects.get_mut(&project.id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = Project {
                    created_at,
                    ..project.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_project(&self, id: Uuid) -> Result<bool, MetadataError> {
        Ok(self.tables.lock().projects.remove(&id).is_some())
    }

    async fn insert_review(&self, review: &Review, client_token: &str) -> Result<(), MetadataError> {
        let mut tables = self.tables.lock();
        if tables.reviews.values().any(|(_, t)| t == client_token) {
            return Err(MetadataError::UniqueViolation("reviews_client_token_key".into()));
        }
        tables
            .reviews
            .insert(review.id, (review.clone(), client_token.to_string()));
        Ok(())
    }

    async fn get_review_by_token(&self, client_token: &str) -> Result<Option<Review>, MetadataError> {
        let tables = self.tables.lock();
        Ok(tables
            .reviews
            .values()
            .find(|(_, t)| t == client_token)
            .map(|(r, _)| r.clone()))
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, MetadataError> {
        let mut reviews: Vec<Review> = self
            .tables
            .lock()
            .reviews
            .values()
            .map(|(r, _)| r.clone())
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(reviews)
    }

    async fn review_stats(&self) -> Result<ReviewStats, MetadataError> {
        let tables = self.tables.lock();
        let total = tables.reviews.len() as i64;
        let average_stars = if total == 0 {
            None
        } else {
            let sum: i64 = tables.reviews.values().map(|(r, _)| r.stars as i64).sum();
            Some(sum as f64 / total as f64)
        };
        Ok(ReviewStats {
            total_reviews: total,
            average_stars,
        })
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool, MetadataError> {
        Ok(self.tables.lock().reviews.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio_test::{assert_err, assert_ok};

    fn project_in(category_id: Uuid, title: &str, year: i32) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: "a school project".to_string(),
            year,
            creators: "Ali;Sara".to_string(),
            external_link: None,
            category_id,
            has_cover: true,
            has_video: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_object_store_delete_is_idempotent() {
        let store = MemoryObjectStore::new("https://media.example.org");
        assert_ok!(store.put("imgs/a.png", vec![1, 2, 3], "image/png").await);
        assert_eq!(store.content_type("imgs/a.png").as_deref(), Some("image/png"));
        assert_ok!(store.delete("imgs/a.png").await);
        assert_ok!(store.delete("imgs/a.png").await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_category_restrict_on_delete() {
        let store = InMemoryMetadataStore::new();
        let category = Category {
            id: Uuid::new_v4(),
            name: "Robotics".to_string(),
        };
        store.insert_category(&category).await.unwrap();
        store
            .insert_project(&project_in(category.id, "Arm", 2025))
            .await
            .unwrap();

        assert_eq!(
            store.delete_category(category.id).await,
            Err(MetadataError::ForeignKeyViolation("projects_category_id_fkey".into()))
        );
        assert_eq!(store.count_projects_in_category(category.id).await, Ok(1));
    }

    #[tokio::test]
    async fn test_project_requires_existing_category() {
        let store = InMemoryMetadataStore::new();
        assert_err!(store.insert_project(&project_in(Uuid::new_v4(), "Orphan", 2025)).await);
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = InMemoryMetadataStore::new();
        let category = Category {
            id: Uuid::new_v4(),
            name: "Energy".to_string(),
        };
        store.insert_category(&category).await.unwrap();
        let mut solar = project_in(category.id, "Solar Car", 2025);
        solar.has_video = true;
        store.insert_project(&solar).await.unwrap();
        store
            .insert_project(&project_in(category.id, "Wind Farm", 2024))
            .await
            .unwrap();

        let by_year = ProjectQuery {
            year: Some(2024),
            ..Default::default()
        };
        let found = store.query_projects(&by_year).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Wind Farm");

        let by_search = ProjectQuery {
            search: Some("SOLAR".to_string()),
            ..Default::default()
        };
        assert_eq!(store.query_projects(&by_search).await.unwrap().len(), 1);

        let videos = ProjectQuery {
            with_video_only: true,
            ..Default::default()
        };
        assert_eq!(store.query_projects(&videos).await.unwrap()[0].id, solar.id);
    }

    #[tokio::test]
    async fn test_review_stats_average() {
        let store = InMemoryMetadataStore::new();
        assert_eq!(store.review_stats().await.unwrap().average_stars, None);
        for (stars, token) in [(4, "a"), (5, "b")] {
            let review = Review {
                id: Uuid::new_v4(),
                stars,
                reason: None,
                created_at: Utc::now(),
            };
            store.insert_review(&review, token).await.unwrap();
        }
        let stats = store.review_stats().await.unwrap();
        assert_eq!(stats.total_reviews, 2);
        assert_eq!(stats.average_stars, Some(4.5));
    }

    #[tokio::test]
    async fn test_category_lookup_by_name_and_usage() {
        let store = InMemoryMetadataStore::new();
        let robotics = Category {
            id: Uuid::new_v4(),
            name: "Robotics".to_string(),
        };
        let energy = Category {
            id: Uuid::new_v4(),
            name: "Energy".to_string(),
        };
        assert_ok!(store.insert_category(&robotics).await);
        assert_ok!(store.insert_category(&energy).await);
        assert_ok!(store.insert_project(&project_in(robotics.id, "Arm", 2025)).await);
        assert_ok!(store.insert_project(&project_in(robotics.id, "Rover", 2024)).await);

        let found = assert_ok!(store.get_category_by_name("Robotics").await);
        assert_eq!(found, Some(robotics.clone()));
        assert_eq!(assert_ok!(store.get_category_by_name("robotics").await), None);

        let usage = assert_ok!(store.list_category_usage().await);
        let counts: Vec<(&str, i64)> = usage
            .iter()
            .map(|u| (u.name.as_str(), u.project_count))
            .collect();
        assert_eq!(counts, vec![("Energy", 0), ("Robotics", 2)]);
    }
}
