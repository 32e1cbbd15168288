use axum::{debug_handler, extract::{Path, State}, response::{Html, IntoResponse, Response}};
use sqlx::SqlitePool;

use crate::{include_res, pages, profiles, res, AppResult, OrNotFound};

use super::link;

#[debug_handler]
pub(crate) async fn main_page(
    Path(community_slug): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = super::by_slug(&db_pool, &community_slug).await?.or_not_found()?;

    let page_items: String = pages::for_community(&db_pool, community.id)
        .await?
        .iter()
        .map(|page| {
            format!(
                "<li><a href=\"/c/{}/pages/{}\">{}</a></li>",
                res::urlencode(&community.slug),
                res::urlencode(&page.slug),
                res::escape(&page.title),
            )
        })
        .collect();

    Ok(Html(res::page(
        &community.name,
        &include_res!(str, "/pages/communities/main.html")
            .replace("{name}", &res::escape(&community.name))
            .replace("{slug}", &res::urlencode(&community.slug))
            .replace("{page_items}", &page_items),
    )).into_response())
}

#[debug_handler]
pub(crate) async fn profile(
    Path(community_slug): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = super::by_slug(&db_pool, &community_slug).await?.or_not_found()?;
    let admin = super::admin(&db_pool, &community).await?;

    let parent = match community.parent_community_id {
        Some(parent_id) => super::by_id(&db_pool, parent_id).await?.map(|c| link(&c)),
        None => None,
    };
    let child_items: String = super::children(&db_pool, community.id)
        .await?
        .iter()
        .map(|child| format!("<li>{}</li>", link(child)))
        .collect();

    Ok(Html(res::page(
        &format!("{} profile", community.name),
        &include_res!(str, "/pages/communities/profile.html")
            .replace("{name}", &res::escape(&community.name))
            .replace("{slug}", &res::urlencode(&community.slug))
            .replace("{admin}", &profiles::link(&admin))
            .replace("{parent}", &parent.unwrap_or_else(|| "none".to_owned()))
            .replace("{child_items}", &child_items)
            .replace("{email}", &res::escape(&community.email))
            .replace("{mailing_list}", &res::escape(&community.mailing_list))
            .replace("{resource_area}", &res::escape(&community.resource_area))
            .replace("{website}", &res::escape(&community.website))
            .replace("{facebook}", &res::escape(&community.facebook))
            .replace("{googleplus}", &res::escape(&community.googleplus))
            .replace("{twitter}", &res::escape(&community.twitter)),
    )).into_response())
}
