use crate::error::{CatalogError, CatalogResult};
use crate::metadata_store::{MetadataStore, Review, ReviewStats};
use crate::validation;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Tokens longer than this cannot have been issued here
const MAX_TOKEN_LEN: usize = 64;

/// Result of a review submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewReceipt {
    pub review: Review,
    /// Opaque token the visitor keeps and presents on later visits
    pub token: String,
    /// True when the presented token already had a review and nothing was stored
    pub already_submitted: bool,
}

/// Accepts visitor ratings.
///
/// Deduplication is client-cooperative: a visitor who presents the token
/// from an earlier submission gets that review back, one who discards it can
/// submit again. The token is only ever used to look a review up.
pub struct ReviewIntake {
    metadata: Arc<dyn MetadataStore>,
}

impl ReviewIntake {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    #[instrument(skip(self, reason, token))]
    pub async fn submit(
        &self,
        stars: i32,
        reason: Option<&str>,
        token: Option<&str>,
    ) -> CatalogResult<ReviewReceipt> {
        let stars = validation::validate_rating(stars)?;

        if let Some(token) = token {
            if let Some(review) = self.lookup(token).await? {
                debug!(review_id = %review.id, "Token already has a review");
                return Ok(ReviewReceipt {
                    review,
                    token: token.trim().to_string(),
                    already_submitted: true,
                });
            }
        }

        let review = Review {
            id: Uuid::new_v4(),
            stars,
            reason: reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            created_at: Utc::now(),
        };
        let token = Uuid::new_v4().simple().to_string();

        self.metadata.insert_review(&review, &token).await?;

        metrics::counter!("catalog.reviews.submitted").increment(1);
        info!(review_id = %review.id, stars, "Review submitted");

        Ok(ReviewReceipt {
            review,
            token,
            already_submitted: false,
        })
    }

    /// Resolve a visitor token to the review it was issued for
    pub async fn lookup(&self, token: &str) -> CatalogResult<Option<Review>> {
        let token = token.trim();
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Ok(None);
        }
        Ok(self.metadata.get_review_by_token(token).await?)
    }

    pub async fn list(&self) -> CatalogResult<Vec<Review>> {
        Ok(self.metadata.list_reviews().await?)
    }

    pub async fn stats(&self) -> CatalogResult<ReviewStats> {
        Ok(self.metadata.review_stats().await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> CatalogResult<()> {
        if !self.metadata.delete_review(id).await? {
            return Err(CatalogError::not_found("review", id));
        }
        info!(review_id = %id, "Review deleted");
        Ok(())
    }
}
