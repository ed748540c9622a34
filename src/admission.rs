use crate::{
    data_formats::CreateArticleRequest, db_helpers::Store, errors::RequestError, models::Role,
};

/// Articles a non-premium account may publish.
pub const FREE_ARTICLE_LIMIT: i64 = 1;

/// Inserts `article` if its author may publish another one and returns the new
/// article id. Only the `premium` role lifts the free limit; admins are capped
/// like everyone else.
#[tracing::instrument(skip(store, article), fields(author = %article.author_email))]
pub async fn admit_article(
    store: &dyn Store,
    article: &CreateArticleRequest,
) -> Result<i64, RequestError> {
    let user = store
        .get_user_by_email(&article.author_email)
        .await?
        .ok_or(RequestError::NotFound("User not found"))?;

    if user.role != Role::Premium {
        let existing = store.count_articles_by_author(&user.email).await?;
        if existing >= FREE_ARTICLE_LIMIT {
            tracing::debug!("Free article limit reached ({} existing)", existing);
            return Err(RequestError::Forbidden(
                "Normal users can only publish one article. Upgrade to premium to post more.",
            ));
        }
    }

    let id = store.insert_article(article).await?;
    tracing::info!("Article {} submitted for review", id);
    Ok(id)
}
