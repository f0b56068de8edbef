//! Exhibit Catalog Service
//!
//! Project catalog for the innovation exhibition. Administrators publish
//! projects with a cover image and an optional demo video, organise them into
//! categories, and visitors browse the catalog and leave star ratings.
//!
//! ## Features
//!
//! - **Project Lifecycle**: Create, update and delete projects whose media
//!   lives in an S3-compatible bucket and whose record lives in PostgreSQL,
//!   keeping the record's media flags in step with the bucket
//! - **Category Guard**: Categories referenced by any project cannot be
//!   deleted
//! - **Review Intake**: Validated 1-5 star ratings with token-based
//!   resubmission detection
//! - **Admin CLI**: `catalog-admin` publishes projects from local files and
//!   manages categories through the same services
//!
//! ## Architecture
//!
//! ```text
//!   Admin / Visitor HTTP
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ API (axum)       │
//! └──────────────────┘
//!    │        │        │
//!    ▼        ▼        ▼
//! ┌────────┐┌────────┐┌────────┐
//! │Project ││Category││Review  │
//! │Life-   ││Guard   ││Intake  │
//! │cycle   │└────────┘└────────┘
//! └────────┘    │         │
//!   │    │      │         │
//!   │    ▼      ▼         ▼
//!   │  ┌──────────────────────┐
//!   │  │ Metadata Store       │──▶ PostgreSQL
//!   │  └──────────────────────┘     projects / categories / reviews
//!   ▼
//! ┌──────────────────┐
//! │ Object Store     │──▶ S3 bucket
//! └──────────────────┘     imgs/{id}.png, videos/{id}.mp4
//! ```

pub mod admin;
pub mod api;
pub mod category_guard;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod metadata_store;
pub mod object_store;
pub mod review_intake;
pub mod validation;

pub use category_guard::CategoryGuard;
pub use config::{CatalogLimits, Config};
pub use error::{CatalogError, CatalogResult};
pub use lifecycle::{NewProject, ProjectLifecycle, ProjectView};
pub use metadata_store::{Category, MetadataStore, PgMetadataStore, Project, Review};
pub use object_store::{AssetKind, ObjectStore, S3ObjectStore};
pub use review_intake::{ReviewIntake, ReviewReceipt};
