//! Project lifecycle across the metadata store and the object store.
//!
//! No transaction spans both stores, so every write runs in two phases that
//! never interleave:
//!
//! 1. validate everything (pure, no side effects)
//! 2. storage phase: upload and delete blobs
//! 3. metadata phase: one row write that commits the resulting flags
//!
//! A failure between phases can leave a blob nobody references (tolerated,
//! logged as an orphan) but never a row whose flags name a missing blob.
//! Deletes therefore hit storage before the row stops claiming the blob, and
//! uploads land before the row starts claiming it.

use crate::config::CatalogLimits;
use crate::error::{CatalogError, CatalogResult, ValidationError};
use crate::metadata_store::{MetadataError, MetadataStore, Project, ProjectQuery};
use crate::object_store::{AssetKind, ObjectStore};
use crate::validation::{self, MediaUpload};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Editable project fields, as submitted
#[derive(Debug, Clone)]
pub struct ProjectFields {
    pub title: String,
    pub description: String,
    pub year: i32,
    /// `;`-delimited creator names
    pub creators: String,
    pub external_link: Option<String>,
    pub category_id: Uuid,
}

/// Input to [`ProjectLifecycle::create`]
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Caller-chosen id. Retrying a create with the same id converges on one project.
    pub id: Option<Uuid>,
    pub fields: ProjectFields,
    pub cover: MediaUpload,
    pub video: Option<MediaUpload>,
}

/// Field edits for [`ProjectLifecycle::update`]; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub creators: Option<String>,
    /// `Some(None)` clears the link
    pub external_link: Option<Option<String>>,
    pub category_id: Option<Uuid>,
}

/// Asset edits for [`ProjectLifecycle::update`].
///
/// Removing and replacing the same asset in one call is allowed and nets to
/// a replacement.
#[derive(Debug, Clone, Default)]
pub struct MediaChanges {
    pub cover: Option<MediaUpload>,
    pub video: Option<MediaUpload>,
    pub remove_cover: bool,
    pub remove_video: bool,
}

/// A project as shown to callers, with public asset URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub year: i32,
    pub creators: Vec<String>,
    pub external_link: Option<String>,
    pub category_id: Uuid,
    pub has_cover: bool,
    pub has_video: bool,
    /// Present only when the row says the cover exists
    pub cover_url: Option<String>,
    /// Present only when the row says the video exists
    pub video_url: Option<String>,
}

/// Field values after validation
struct ValidatedFields {
    title: String,
    description: String,
    year: i32,
    creators: String,
    external_link: Option<String>,
    category_id: Uuid,
}

/// Orchestrates create, update and delete of media-backed projects
pub struct ProjectLifecycle {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    limits: CatalogLimits,
}

impl ProjectLifecycle {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        limits: CatalogLimits,
    ) -> Self {
        Self {
            objects,
            metadata,
            limits,
        }
    }

    /// Create a project with a mandatory cover and an optional video.
    ///
    /// Blobs are uploaded before the row is inserted. If the insert fails the
    /// uploaded blobs stay behind as orphans under an id nothing references.
    #[instrument(skip(self, new), fields(project_id = tracing::field::Empty))]
    pub async fn create(&self, new: NewProject) -> CatalogResult<ProjectView> {
        let NewProject {
            id,
            fields,
            cover,
            video,
        } = new;

        let fields = self.validate_fields(&fields)?;
        let cover = validation::non_empty(Some(cover)).ok_or(ValidationError::MissingCover)?;
        let cover_png = validation::prepare_cover(&cover, &self.limits)?;
        let video = match validation::non_empty(video) {
            Some(video) => {
                validation::validate_video(&video, &self.limits)?;
                Some(video.bytes)
            }
            None => None,
        };

        self.require_category(fields.category_id).await?;

        if let Some(id) = id {
            if let Some(existing) = self.metadata.get_project(id).await? {
                info!(project_id = %id, "Project already exists, returning it unchanged");
                return Ok(self.view(existing));
            }
        }

        let id = id.unwrap_or_else(Uuid::new_v4);
        tracing::Span::current().record("project_id", tracing::field::display(id));

        // Storage phase
        let mut uploaded = Vec::with_capacity(2);
        self.upload(AssetKind::Cover, id, cover_png).await?;
        uploaded.push(AssetKind::Cover.key(id));

        let has_video = match video {
            Some(bytes) => {
                if let Err(e) = self.upload(AssetKind::Video, id, bytes).await {
                    self.report_orphans(id, &uploaded);
                    return Err(e);
                }
                uploaded.push(AssetKind::Video.key(id));
                true
            }
            None => false,
        };

        // Metadata phase
        let now = Utc::now();
        let project = Project {
            id,
            title: fields.title,
            description: fields.description,
            year: fields.year,
            creators: fields.creators,
            external_link: fields.external_link,
            category_id: fields.category_id,
            has_cover: true,
            has_video,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.metadata.insert_project(&project).await {
            self.report_orphans(id, &uploaded);
            return Err(category_error(e, fields.category_id));
        }

        metrics::counter!("catalog.projects.created").increment(1);
        info!(project_id = %id, has_video, "Project created");

        Ok(self.view(project))
    }

    /// Apply field and asset edits to an existing project.
    ///
    /// Asset changes resolve in order: remove cover, remove video, upload
    /// cover, upload video. The row is then written once with the resulting
    /// flags.
    #[instrument(skip(self, changes, media))]
    pub async fn update(
        &self,
        id: Uuid,
        changes: ProjectChanges,
        media: MediaChanges,
    ) -> CatalogResult<ProjectView> {
        let existing = self
            .metadata
            .get_project(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("project", id))?;

        let fields = self.apply_changes(&existing, changes)?;

        let cover_png = match validation::non_empty(media.cover) {
            Some(cover) => Some(validation::prepare_cover(&cover, &self.limits)?),
            None => None,
        };
        let video = match validation::non_empty(media.video) {
            Some(video) => {
                validation::validate_video(&video, &self.limits)?;
                Some(video.bytes)
            }
            None => None,
        };

        if fields.category_id != existing.category_id {
            self.require_category(fields.category_id).await?;
        }

        // Storage phase
        let mut has_cover = existing.has_cover;
        let mut has_video = existing.has_video;
        let mut touched: Vec<String> = Vec::new();

        let storage_result = async {
            if media.remove_cover && has_cover {
                self.remove(AssetKind::Cover, id).await?;
                touched.push(AssetKind::Cover.key(id));
                has_cover = false;
            }
            if media.remove_video && has_video {
                self.remove(AssetKind::Video, id).await?;
                touched.push(AssetKind::Video.key(id));
                has_video = false;
            }
            if let Some(png) = cover_png {
                self.upload(AssetKind::Cover, id, png).await?;
                touched.push(AssetKind::Cover.key(id));
                has_cover = true;
            }
            if let Some(bytes) = video {
                self.upload(AssetKind::Video, id, bytes).await?;
                touched.push(AssetKind::Video.key(id));
                has_video = true;
            }
            Ok::<(), CatalogError>(())
        }
        .await;

        if let Err(e) = storage_result {
            self.report_stale_flags(id, &touched);
            return Err(e);
        }

        // Metadata phase
        let project = Project {
            id,
            title: fields.title,
            description: fields.description,
            year: fields.year,
            creators: fields.creators,
            external_link: fields.external_link,
            category_id: fields.category_id,
            has_cover,
            has_video,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };

        match self.metadata.update_project(&project).await {
            Ok(true) => {}
            Ok(false) => {
                self.report_stale_flags(id, &touched);
                return Err(CatalogError::not_found("project", id));
            }
            Err(e) => {
                self.report_stale_flags(id, &touched);
                return Err(category_error(e, fields.category_id));
            }
        }

        metrics::counter!("catalog.projects.updated").increment(1);
        info!(project_id = %id, has_cover, has_video, "Project updated");

        Ok(self.view(project))
    }

    /// Delete a project's blobs, then its row.
    ///
    /// If the row delete fails the row survives with flags that may name
    /// deleted blobs; repeating the delete converges because blob deletes
    /// are idempotent.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> CatalogResult<()> {
        let existing = self
            .metadata
            .get_project(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("project", id))?;

        if existing.has_cover {
            self.remove(AssetKind::Cover, id).await?;
        }
        if existing.has_video {
            self.remove(AssetKind::Video, id).await?;
        }

        if !self.metadata.delete_project(id).await? {
            return Err(CatalogError::not_found("project", id));
        }

        metrics::counter!("catalog.projects.deleted").increment(1);
        info!(project_id = %id, "Project deleted");

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> CatalogResult<ProjectView> {
        self.metadata
            .get_project(id)
            .await?
            .map(|p| self.view(p))
            .ok_or_else(|| CatalogError::not_found("project", id))
    }

    pub async fn list(&self, query: &ProjectQuery) -> CatalogResult<Vec<ProjectView>> {
        let projects = self.metadata.query_projects(query).await?;
        Ok(projects.into_iter().map(|p| self.view(p)).collect())
    }

    /// Attach public URLs for the assets the row says exist
    pub fn view(&self, project: Project) -> ProjectView {
        let cover_url = project
            .has_cover
            .then(|| self.objects.public_url(&AssetKind::Cover.key(project.id)));
        let video_url = project
            .has_video
            .then(|| self.objects.public_url(&AssetKind::Video.key(project.id)));

        ProjectView {
            creators: project.creator_names(),
            id: project.id,
            title: project.title,
            description: project.description,
            year: project.year,
            external_link: project.external_link,
            category_id: project.category_id,
            has_cover: project.has_cover,
            has_video: project.has_video,
            cover_url,
            video_url,
        }
    }

    fn validate_fields(&self, fields: &ProjectFields) -> Result<ValidatedFields, ValidationError> {
        let title = validation::validate_title(&fields.title)?;
        let year = validation::validate_year(fields.year, &self.limits)?;
        let creators = validation::parse_creators(&fields.creators)?;

        Ok(ValidatedFields {
            title,
            description: fields.description.trim().to_string(),
            year,
            creators: validation::join_creators(&creators),
            external_link: validation::normalize_link(fields.external_link.as_deref()),
            category_id: fields.category_id,
        })
    }

    /// Validate only the fields being changed; untouched fields keep their stored values
    fn apply_changes(
        &self,
        existing: &Project,
        changes: ProjectChanges,
    ) -> Result<ValidatedFields, ValidationError> {
        let title = match changes.title {
            Some(title) => validation::validate_title(&title)?,
            None => existing.title.clone(),
        };
        let year = match changes.year {
            Some(year) => validation::validate_year(year, &self.limits)?,
            None => existing.year,
        };
        let creators = match changes.creators {
            Some(creators) => validation::join_creators(&validation::parse_creators(&creators)?),
            None => existing.creators.clone(),
        };
        let external_link = match changes.external_link {
            Some(link) => validation::normalize_link(link.as_deref()),
            None => existing.external_link.clone(),
        };

        Ok(ValidatedFields {
            title,
            description: changes
                .description
                .map(|d| d.trim().to_string())
                .unwrap_or_else(|| existing.description.clone()),
            year,
            creators,
            external_link,
            category_id: changes.category_id.unwrap_or(existing.category_id),
        })
    }

    async fn require_category(&self, category_id: Uuid) -> CatalogResult<()> {
        match self.metadata.get_category(category_id).await? {
            Some(_) => Ok(()),
            None => Err(CatalogError::not_found("category", category_id)),
        }
    }

    async fn upload(&self, kind: AssetKind, id: Uuid, bytes: Vec<u8>) -> CatalogResult<()> {
        let key = kind.key(id);
        self.objects.put(&key, bytes, kind.content_type()).await?;
        metrics::counter!("catalog.blobs.uploaded").increment(1);
        Ok(())
    }

    async fn remove(&self, kind: AssetKind, id: Uuid) -> CatalogResult<()> {
        self.objects.delete(&kind.key(id)).await?;
        metrics::counter!("catalog.blobs.deleted").increment(1);
        Ok(())
    }

    fn report_orphans(&self, id: Uuid, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        metrics::counter!("catalog.orphan_blobs").increment(keys.len() as u64);
        warn!(project_id = %id, keys = ?keys, "Create aborted after upload, blobs left unreferenced");
    }

    fn report_stale_flags(&self, id: Uuid, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        warn!(
            project_id = %id,
            keys = ?keys,
            "Update aborted after storage changes, row flags not yet updated"
        );
    }
}

/// A foreign-key failure on a project write means the category vanished
fn category_error(err: MetadataError, category_id: Uuid) -> CatalogError {
    match err {
        MetadataError::ForeignKeyViolation(_) => CatalogError::not_found("category", category_id),
        other => other.into(),
    }
}
