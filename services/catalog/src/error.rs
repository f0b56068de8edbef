//! Error taxonomy for catalog operations.
//!
//! Every operation resolves to one of five kinds. Validation failures are
//! always raised before any store is touched; storage failures may leave
//! the partial effects described on each lifecycle operation.

use crate::metadata_store::MetadataError;
use crate::object_store::ObjectStoreError;
use thiserror::Error;

/// Input rejected before any side effect took place
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid student name: \"{0}\". Only letters and spaces are allowed.")]
    InvalidCreatorName(String),

    #[error("At least one student name is required")]
    NoCreators,

    #[error("Invalid year {year}. Must be between {min} and {max}.")]
    InvalidYear { year: i32, min: i32, max: i32 },

    #[error("Year \"{0}\" is not a number")]
    MalformedYear(String),

    #[error("Title is required")]
    EmptyTitle,

    #[error("Cover image is required")]
    MissingCover,

    #[error("Cover image is {size} bytes, exceeds the {limit} byte limit")]
    CoverTooLarge { size: usize, limit: usize },

    #[error("Cover image could not be processed: {0}")]
    UnprocessableImage(String),

    #[error("Video is {size} bytes, exceeds the {limit} byte limit")]
    VideoTooLarge { size: usize, limit: usize },

    #[error("Only MP4 videos are accepted, got {0}")]
    UnsupportedVideoFormat(String),

    #[error("Invalid rating {0}. Must be between 1 and 5.")]
    InvalidRating(i32),

    #[error("Category name is required")]
    EmptyCategoryName,
}

/// The operation would break a referential or uniqueness rule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Cannot delete category because {count} project(s) are linked to it")]
    CategoryInUse { count: i64 },

    #[error("A category named \"{0}\" already exists")]
    DuplicateCategoryName(String),
}

/// Top-level error returned by every catalog operation
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Unexpected(_) => "UNEXPECTED_ERROR",
        }
    }

    /// Whether retrying the same request unchanged can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Message suitable for showing directly to the person who made the request.
    ///
    /// Input problems tell the user what to fix; infrastructure problems tell
    /// them to try again later and never leak backend detail.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::NotFound { entity, .. } => format!("The requested {entity} does not exist."),
            Self::Conflict(e) => e.to_string(),
            Self::StorageUnavailable(_) => {
                "Storage is temporarily unavailable. Please try again later.".to_string()
            }
            Self::Unexpected(_) => {
                "Something went wrong on our side. Please report this to the exhibition team.".to_string()
            }
        }
    }
}

impl From<ObjectStoreError> for CatalogError {
    fn from(err: ObjectStoreError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<MetadataError> for CatalogError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Unavailable(message) => Self::StorageUnavailable(message),
            other => Self::Unexpected(anyhow::Error::new(other)),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
