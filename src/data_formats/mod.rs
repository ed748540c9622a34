mod request;
mod response;
mod wrapper;

pub use request::*;
pub use response::*;
pub use wrapper::*;

use serde::{Deserialize, Serialize};

use crate::{db_helpers::ArticleFilter, models::ArticleStatus};

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct ArticleQueryParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    /// Comma separated, matches articles carrying any of the tags.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub status: Option<ArticleStatus>,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<ArticleQueryParams> for ArticleFilter {
    fn from(
        ArticleQueryParams {
            search,
            publisher,
            tags,
            status,
            email,
        }: ArticleQueryParams,
    ) -> Self {
        let tags = tags
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        ArticleFilter {
            search: search.filter(|s| !s.is_empty()),
            publisher: publisher.filter(|p| !p.is_empty()),
            tags,
            status,
            author_email: email.filter(|e| !e.is_empty()),
        }
    }
}
