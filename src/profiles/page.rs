use axum::{debug_handler, extract::{Path, State}, response::{Html, IntoResponse, Response}};
use sqlx::SqlitePool;

use crate::{communities, include_res, res, AppResult, OrNotFound};

#[debug_handler]
pub(crate) async fn profile(
    Path(username): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let profile = super::by_username(&db_pool, &username).await?.or_not_found()?;

    let community_items: String = communities::of_member(&db_pool, profile.id)
        .await?
        .iter()
        .map(|community| format!("<li>{}</li>", communities::link(community)))
        .collect();

    let link_or_blank = |url: &str| {
        if url.is_empty() {
            String::new()
        } else {
            format!("<a href=\"{0}\">{0}</a>", res::escape(url))
        }
    };

    Ok(Html(res::page(
        &profile.to_string(),
        &include_res!(str, "/pages/profiles/profile.html")
            .replace("{display_name}", &res::escape(&profile.to_string()))
            .replace("{username}", &res::escape(&profile.username))
            .replace("{country}", &res::escape(profile.country.as_deref().unwrap_or_default()))
            .replace("{blog_url}", &link_or_blank(&profile.blog_url))
            .replace("{homepage_url}", &link_or_blank(&profile.homepage_url))
            .replace("{picture}", &res::escape(profile.profile_picture.as_deref().unwrap_or(super::DEFAULT_PICTURE)))
            .replace("{edit_url}", &format!("/users/{}/edit", res::urlencode(&profile.username)))
            .replace("{community_items}", &community_items),
    )).into_response())
}
