//! Command-line administration for the catalog.
//!
//! Drives the same [`ProjectLifecycle`] and [`CategoryGuard`] the HTTP API
//! uses, so media validation, storage ordering and the category guard apply
//! identically to projects published from local files.

use crate::category_guard::CategoryGuard;
use crate::config::CatalogLimits;
use crate::lifecycle::{NewProject, ProjectFields, ProjectLifecycle};
use crate::metadata_store::{MetadataStore, ProjectQuery};
use crate::object_store::ObjectStore;
use crate::validation::MediaUpload;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "catalog-admin", about = "Exhibition catalog administration")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage exhibition projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage project categories
    #[command(subcommand)]
    Category(CategoryCommand),
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    /// Publish a project from local media files
    Add(AddProjectArgs),
    /// Delete a project and its media
    Remove { id: Uuid },
    /// List every project, newest first
    List,
}

#[derive(Debug, Args)]
struct AddProjectArgs {
    title: String,
    description: String,
    year: i32,
    /// Semicolon separated, e.g. "John Doe;Jane Smith"
    creators: String,
    /// Name of an existing category
    category: String,
    /// Cover image (PNG, JPEG or WebP)
    cover: PathBuf,
    /// MP4 demo video
    #[arg(long)]
    video: Option<PathBuf>,
    #[arg(long)]
    link: Option<String>,
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    /// Add a category; an existing one with the same name is kept
    Add {
        #[arg(required = true)]
        name: Vec<String>,
    },
    /// Remove a category no project is filed under
    Remove {
        #[arg(required = true)]
        name: Vec<String>,
    },
    /// List categories with their project counts
    List,
}

/// Services the admin commands operate on
pub struct AdminContext {
    lifecycle: ProjectLifecycle,
    categories: CategoryGuard,
}

impl AdminContext {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        limits: CatalogLimits,
    ) -> Self {
        Self {
            lifecycle: ProjectLifecycle::new(objects, metadata.clone(), limits),
            categories: CategoryGuard::new(metadata),
        }
    }
}

impl Cli {
    pub async fn run<W: Write>(self, ctx: &AdminContext, out: &mut W) -> Result<()> {
        match self.command {
            Command::Project(command) => run_project(command, ctx, out).await,
            Command::Category(command) => run_category(command, ctx, out).await,
        }
    }
}

async fn run_project<W: Write>(
    command: ProjectCommand,
    ctx: &AdminContext,
    out: &mut W,
) -> Result<()> {
    match command {
        ProjectCommand::Add(args) => {
            let category = ctx.categories.find_by_name(&args.category).await?;
            let cover = read_media(&args.cover).await?;
            let video = match args.video {
                Some(ref path) => Some(read_media(path).await?),
                None => None,
            };

            let project = ctx
                .lifecycle
                .create(NewProject {
                    id: None,
                    fields: ProjectFields {
                        title: args.title,
                        description: args.description,
                        year: args.year,
                        creators: args.creators,
                        external_link: args.link,
                        category_id: category.id,
                    },
                    cover,
                    video,
                })
                .await?;

            writeln!(out, "Project \"{}\" created with id {}", project.title, project.id)?;
        }
        ProjectCommand::Remove { id } => {
            let project = ctx.lifecycle.get(id).await?;
            ctx.lifecycle.delete(id).await?;
            writeln!(out, "Project \"{}\" and its media removed", project.title)?;
        }
        ProjectCommand::List => {
            let names: HashMap<Uuid, String> = ctx
                .categories
                .list()
                .await?
                .into_iter()
                .map(|c| (c.id, c.name))
                .collect();
            let projects = ctx.lifecycle.list(&ProjectQuery::default()).await?;

            if projects.is_empty() {
                writeln!(out, "No projects found")?;
            }
            for project in projects {
                writeln!(out, "- [{}] {} ({})", project.id, project.title, project.year)?;
                writeln!(
                    out,
                    "  Category: {}",
                    names.get(&project.category_id).map_or("?", String::as_str)
                )?;
                writeln!(out, "  Creators: {}", project.creators.join(", "))?;
                writeln!(
                    out,
                    "  Media: cover {}, video {}",
                    yes_no(project.has_cover),
                    yes_no(project.has_video)
                )?;
            }
        }
    }
    Ok(())
}

async fn run_category<W: Write>(
    command: CategoryCommand,
    ctx: &AdminContext,
    out: &mut W,
) -> Result<()> {
    match command {
        CategoryCommand::Add { name } => {
            let category = ctx.categories.ensure(&name.join(" ")).await?;
            writeln!(out, "Category \"{}\" is available ({})", category.name, category.id)?;
        }
        CategoryCommand::Remove { name } => {
            let category = ctx.categories.find_by_name(&name.join(" ")).await?;
            ctx.categories.delete(category.id).await?;
            writeln!(out, "Category \"{}\" removed", category.name)?;
        }
        CategoryCommand::List => {
            let usage = ctx.categories.usage().await?;
            if usage.is_empty() {
                writeln!(out, "No categories found")?;
            }
            for category in usage {
                writeln!(out, "- {} ({} projects)", category.name, category.project_count)?;
            }
        }
    }
    Ok(())
}

async fn read_media(path: &Path) -> Result<MediaUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path.file_name().and_then(|n| n.to_str());
    Ok(MediaUpload::new(bytes, None, filename))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CatalogError, ConflictError};
    use crate::memory::{InMemoryMetadataStore, MemoryObjectStore};
    use crate::validation::tests::{jpeg_upload, limits, mp4_upload};

    struct Harness {
        ctx: AdminContext,
        objects: Arc<MemoryObjectStore>,
        metadata: Arc<InMemoryMetadataStore>,
    }

    fn harness() -> Harness {
        let objects = Arc::new(MemoryObjectStore::new("https://media.example.org"));
        let metadata = Arc::new(InMemoryMetadataStore::new());
        Harness {
            ctx: AdminContext::new(objects.clone(), metadata.clone(), limits()),
            objects,
            metadata,
        }
    }

    async fn run(h: &Harness, args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("catalog-admin").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        cli.run(&h.ctx, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    async fn media_file(name: &str, upload: MediaUpload) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("catalog-admin-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join(name);
        tokio::fs::write(&path, &upload.bytes).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_category_add_list_remove() {
        let h = harness();

        run(&h, &["category", "add", "Renewable", "Energy"]).await.unwrap();
        run(&h, &["category", "add", "Renewable", "Energy"]).await.unwrap();
        run(&h, &["category", "add", "Robotics"]).await.unwrap();

        let listed = run(&h, &["category", "list"]).await.unwrap();
        assert_eq!(listed, "- Renewable Energy (0 projects)\n- Robotics (0 projects)\n");

        run(&h, &["category", "remove", "Robotics"]).await.unwrap();
        let listed = run(&h, &["category", "list"]).await.unwrap();
        assert_eq!(listed, "- Renewable Energy (0 projects)\n");
    }

    #[tokio::test]
    async fn test_project_add_list_remove() {
        let h = harness();
        run(&h, &["category", "add", "Robotics"]).await.unwrap();

        let cover = media_file("cover.jpg", jpeg_upload()).await;
        let video = media_file("demo.mp4", mp4_upload()).await;
        let output = run(
            &h,
            &[
                "project",
                "add",
                "Line Follower",
                "A robot that follows a line",
                "2025",
                "Ali;Sara",
                "Robotics",
                cover.to_str().unwrap(),
                "--video",
                video.to_str().unwrap(),
            ],
        )
        .await
        .unwrap();
        assert!(output.starts_with("Project \"Line Follower\" created"));
        assert_eq!(h.objects.len(), 2);

        let listed = run(&h, &["project", "list"]).await.unwrap();
        assert!(listed.contains("Line Follower (2025)"));
        assert!(listed.contains("Category: Robotics"));
        assert!(listed.contains("Creators: Ali, Sara"));
        assert!(listed.contains("Media: cover yes, video yes"));

        let usage = run(&h, &["category", "list"]).await.unwrap();
        assert_eq!(usage, "- Robotics (1 projects)\n");

        let project = h
            .metadata
            .query_projects(&ProjectQuery::default())
            .await
            .unwrap()
            .remove(0);
        run(&h, &["project", "remove", &project.id.to_string()])
            .await
            .unwrap();
        assert!(h.objects.is_empty());
        assert_eq!(run(&h, &["project", "list"]).await.unwrap(), "No projects found\n");
    }

    #[tokio::test]
    async fn test_project_add_with_unknown_category_uploads_nothing() {
        let h = harness();
        let cover = media_file("cover.jpg", jpeg_upload()).await;

        let err = run(
            &h,
            &["project", "add", "X", "", "2025", "Ali", "Energy", cover.to_str().unwrap()],
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::NotFound { entity: "category", .. })
        ));
        assert!(h.objects.is_empty());
    }

    #[tokio::test]
    async fn test_category_in_use_cannot_be_removed() {
        let h = harness();
        run(&h, &["category", "add", "Robotics"]).await.unwrap();
        let cover = media_file("cover.jpg", jpeg_upload()).await;
        run(
            &h,
            &["project", "add", "X", "", "2025", "Ali", "Robotics", cover.to_str().unwrap()],
        )
        .await
        .unwrap();

        let err = run(&h, &["category", "remove", "Robotics"]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::Conflict(ConflictError::CategoryInUse { count: 1 }))
        ));
    }

    #[test]
    fn test_missing_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["catalog-admin", "category", "add"]).is_err());
        assert!(Cli::try_parse_from(["catalog-admin", "project", "remove", "not-a-uuid"]).is_err());
    }
}
