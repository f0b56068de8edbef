use crate::error::{CatalogError, CatalogResult, ConflictError, ValidationError};
use crate::metadata_store::{Category, CategoryUsage, MetadataError, MetadataStore};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Category administration with a referential guard on delete.
///
/// The project count checked before deleting gives a precise message; the
/// restrict-on-delete foreign key is what actually prevents a category from
/// disappearing under a project created concurrently.
pub struct CategoryGuard {
    metadata: Arc<dyn MetadataStore>,
}

impl CategoryGuard {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> CatalogResult<Category> {
        let name = normalize_name(name)?;
        let category = Category {
            id: Uuid::new_v4(),
            name,
        };

        self.metadata
            .insert_category(&category)
            .await
            .map_err(|e| duplicate_name(e, &category.name))?;

        info!(category_id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    #[instrument(skip(self))]
    pub async fn rename(&self, id: Uuid, name: &str) -> CatalogResult<Category> {
        let name = normalize_name(name)?;

        let found = self
            .metadata
            .rename_category(id, &name)
            .await
            .map_err(|e| duplicate_name(e, &name))?;
        if !found {
            return Err(CatalogError::not_found("category", id));
        }

        info!(category_id = %id, name = %name, "Category renamed");
        Ok(Category { id, name })
    }

    pub async fn list(&self) -> CatalogResult<Vec<Category>> {
        Ok(self.metadata.list_categories().await?)
    }

    /// Categories with their project counts, ordered by name
    pub async fn usage(&self) -> CatalogResult<Vec<CategoryUsage>> {
        Ok(self.metadata.list_category_usage().await?)
    }

    pub async fn find_by_name(&self, name: &str) -> CatalogResult<Category> {
        let name = normalize_name(name)?;
        self.metadata
            .get_category_by_name(&name)
            .await?
            .ok_or_else(|| CatalogError::not_found("category", name))
    }

    /// Create a category, or return the existing one with the same name
    pub async fn ensure(&self, name: &str) -> CatalogResult<Category> {
        match self.create(name).await {
            Err(CatalogError::Conflict(ConflictError::DuplicateCategoryName(existing))) => {
                self.find_by_name(&existing).await
            }
            other => other,
        }
    }

    /// Delete a category that no project references
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> CatalogResult<()> {
        let count = self.metadata.count_projects_in_category(id).await?;
        if count > 0 {
            return Err(ConflictError::CategoryInUse { count }.into());
        }

        match self.metadata.delete_category(id).await {
            Ok(true) => {}
            Ok(false) => return Err(CatalogError::not_found("category", id)),
            // A project was linked between the count and the delete
            Err(MetadataError::ForeignKeyViolation(_)) => {
                let count = self.metadata.count_projects_in_category(id).await?.max(1);
                return Err(ConflictError::CategoryInUse { count }.into());
            }
            Err(e) => return Err(e.into()),
        }

        info!(category_id = %id, "Category deleted");
        Ok(())
    }
}

fn normalize_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyCategoryName);
    }
    Ok(name.to_string())
}

fn duplicate_name(err: MetadataError, name: &str) -> CatalogError {
    match err {
        MetadataError::UniqueViolation(_) => {
            ConflictError::DuplicateCategoryName(name.to_string()).into()
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMetadataStore;
    use crate::metadata_store::{MockMetadataStore, Project};
    use chrono::Utc;

    async fn guard_with_store() -> (CategoryGuard, Arc<InMemoryMetadataStore>) {
        let store = Arc::new(InMemoryMetadataStore::new());
        (CategoryGuard::new(store.clone()), store)
    }

    fn project_in(category_id: Uuid) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            title: "Arm".to_string(),
            description: String::new(),
            year: 2025,
            creators: "Ali".to_string(),
            external_link: None,
            category_id,
            has_cover: true,
            has_video: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_delete_unreferenced_category() {
        let (guard, store) = guard_with_store().await;
        let category = guard.create("Robotics").await.unwrap();

        guard.delete(category.id).await.unwrap();
        assert!(store.get_category(category.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_referenced_category_conflicts() {
        let (guard, store) = guard_with_store().await;
        let category = guard.create("Robotics").await.unwrap();
        store.insert_project(&project_in(category.id)).await.unwrap();
        store.insert_project(&project_in(category.id)).await.unwrap();

        let err = guard.delete(category.id).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Conflict(ConflictError::CategoryInUse { count: 2 })
        ));
        assert!(store.get_category(category.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_category() {
        let (guard, _) = guard_with_store().await;
        let err = guard.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { entity: "category", .. }));
    }

    #[tokio::test]
    async fn test_foreign_key_backstops_the_count() {
        let id = Uuid::new_v4();
        let mut store = MockMetadataStore::new();
        // The pre-flight count sees no projects, the delete then races a new one
        let mut counts = vec![0i64, 1].into_iter();
        store
            .expect_count_projects_in_category()
            .times(2)
            .returning(move |_| Ok(counts.next().unwrap_or(1)));
        store.expect_delete_category().times(1).returning(|_| {
            Err(MetadataError::ForeignKeyViolation("projects_category_id_fkey".to_string()))
        });

        let guard = CategoryGuard::new(Arc::new(store));
        let err = guard.delete(id).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Conflict(ConflictError::CategoryInUse { count: 1 })
        ));
    }

    #[tokio::test]
    async fn test_names_are_trimmed_and_unique() {
        let (guard, _) = guard_with_store().await;
        let category = guard.create("  Energy ").await.unwrap();
        assert_eq!(category.name, "Energy");

        let err = guard.create("Energy").await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Conflict(ConflictError::DuplicateCategoryName(ref n)) if n == "Energy"
        ));

        let err = guard.create("   ").await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(ValidationError::EmptyCategoryName)));
    }

    #[tokio::test]
    async fn test_ensure_and_delete_by_name() {
        let (guard, store) = guard_with_store().await;
        let first = guard.ensure("Robotics").await.unwrap();
        let again = guard.ensure(" Robotics ").await.unwrap();
        assert_eq!(first, again);

        store.insert_project(&project_in(first.id)).await.unwrap();
        let usage = guard.usage().await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].project_count, 1);

        let found = guard.find_by_name("Robotics").await.unwrap();
        let err = guard.delete(found.id).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Conflict(ConflictError::CategoryInUse { count: 1 })
        ));

        let err = guard.find_by_name("Energy").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { entity: "category", .. }));
    }

    #[tokio::test]
    async fn test_rename_and_list() {
        let (guard, _) = guard_with_store().await;
        let b = guard.create("Zoology").await.unwrap();
        guard.create("Energy").await.unwrap();

        let renamed = guard.rename(b.id, "Agriculture").await.unwrap();
        assert_eq!(renamed.name, "Agriculture");

        let names: Vec<String> = guard.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Agriculture", "Energy"]);

        let err = guard.rename(Uuid::new_v4(), "Other").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }
}
