use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::CurrentUser,
    communities::{self, Community},
    forms::{FormData, FormErrors, PageForm},
    include_res, markdown,
    permissions::{self, Permission},
    res, AppResult, AppState, OrNotFound,
};

use super::CommunityPage;

#[derive(Deserialize)]
pub(crate) struct PagePath {
    community_slug: String,
    slug: String,
}

fn pages_url(community: &Community) -> String {
    format!("/c/{}/pages", res::urlencode(&community.slug))
}

fn page_url(community: &Community, page: &CommunityPage) -> String {
    format!("{}/{}", pages_url(community), res::urlencode(&page.slug))
}

async fn community(db_pool: &SqlitePool, community_slug: &str) -> AppResult<Community> {
    communities::by_slug(db_pool, community_slug).await?.or_not_found()
}

#[debug_handler(state = AppState)]
pub(crate) async fn manage(
    Path(community_slug): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, Permission::ChangeCommunityPage, community.id).await?;

    let items: String = super::for_community(&db_pool, community.id)
        .await?
        .iter()
        .map(|page| {
            let url = page_url(&community, page);
            include_res!(str, "/pages/pages/manage_item.html")
                .replace("{url}", &url)
                .replace("{title}", &res::escape(&page.title))
        })
        .collect();

    Ok(Html(res::page(
        &format!("{} pages", community.name),
        &include_res!(str, "/pages/pages/manage.html")
            .replace("{community}", &communities::link(&community))
            .replace("{items}", &items)
            .replace("{add_url}", &format!("{}/add", pages_url(&community))),
    )).into_response())
}

#[debug_handler]
pub(crate) async fn view(
    Path(PagePath { community_slug, slug }): Path<PagePath>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    let page = super::by_slug(&db_pool, community.id, &slug).await?.or_not_found()?;

    Ok(Html(res::page(
        &page.describe(&community),
        &include_res!(str, "/pages/pages/view.html")
            .replace("{title}", &res::escape(&page.title))
            .replace("{community}", &communities::link(&community))
            .replace("{content}", &markdown(&page.content)),
    )).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_page(
    Path(community_slug): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, Permission::AddCommunityPage, community.id).await?;
    Ok(render_form(&community, None, &PageForm::default(), &FormErrors::default()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn add(
    Path(community_slug): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, Permission::AddCommunityPage, community.id).await?;

    let form = match check_form(&db_pool, None, FormData::from(pairs)).await? {
        Ok(form) => form,
        Err((form, errors)) => return Ok(render_form(&community, None, &form, &errors)),
    };
    let page = super::create(&db_pool, community.id, &form).await?;

    Ok(Redirect::to(&page_url(&community, &page)).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit_page(
    Path(PagePath { community_slug, slug }): Path<PagePath>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, Permission::ChangeCommunityPage, community.id).await?;
    let page = super::by_slug(&db_pool, community.id, &slug).await?.or_not_found()?;

    let form = PageForm {
        title: page.title.clone(),
        slug: page.slug.clone(),
        content: page.content.clone(),
    };
    Ok(render_form(&community, Some(&page), &form, &FormErrors::default()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit(
    Path(PagePath { community_slug, slug }): Path<PagePath>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, Permission::ChangeCommunityPage, community.id).await?;
    let mut page = super::by_slug(&db_pool, community.id, &slug).await?.or_not_found()?;

    let form = match check_form(&db_pool, Some(page.id), FormData::from(pairs)).await? {
        Ok(form) => form,
        Err((form, errors)) => return Ok(render_form(&community, Some(&page), &form, &errors)),
    };
    super::update(&db_pool, &mut page, &form).await?;

    Ok(Redirect::to(&page_url(&community, &page)).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_page(
    Path(PagePath { community_slug, slug }): Path<PagePath>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, Permission::DeleteCommunityPage, community.id).await?;
    let page = super::by_slug(&db_pool, community.id, &slug).await?.or_not_found()?;

    let url = page_url(&community, &page);
    Ok(Html(res::page(
        &format!("Delete {}", page.title),
        &include_res!(str, "/pages/confirm_delete.html")
            .replace("{what}", &res::escape(&page.describe(&community)))
            .replace("{action}", &format!("{url}/delete"))
            .replace("{cancel}", &url),
    )).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    Path(PagePath { community_slug, slug }): Path<PagePath>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, Permission::DeleteCommunityPage, community.id).await?;
    let page = super::by_slug(&db_pool, community.id, &slug).await?.or_not_found()?;

    super::delete(&db_pool, &page).await?;
    Ok(Redirect::to(&format!("/c/{}", res::urlencode(&community.slug))).into_response())
}

async fn check_form(
    db_pool: &SqlitePool,
    exclude: Option<i64>,
    data: FormData,
) -> AppResult<Result<PageForm, (PageForm, FormErrors)>> {
    let form = match PageForm::parse(&data) {
        Ok(form) => form,
        Err(failed) => return Ok(Err(failed)),
    };
    if super::slug_taken(db_pool, &form.slug, exclude).await? {
        let mut errors = FormErrors::default();
        errors.add("slug", "Community page with this Slug already exists.");
        return Ok(Err((form, errors)));
    }
    Ok(Ok(form))
}

fn render_form(community: &Community, page: Option<&CommunityPage>, form: &PageForm, errors: &FormErrors) -> Response {
    let (heading, action) = match page {
        Some(page) => (format!("Edit {}", page.title), format!("{}/edit", page_url(community, page))),
        None => (format!("Add page to {}", community.name), format!("{}/add", pages_url(community))),
    };

    Html(res::page(
        &heading,
        &include_res!(str, "/pages/pages/form.html")
            .replace("{heading}", &res::escape(&heading))
            .replace("{action}", &action)
            .replace("{title}", &res::escape(&form.title))
            .replace("{title_errors}", &errors.render("title"))
            .replace("{slug}", &res::escape(&form.slug))
            .replace("{slug_errors}", &errors.render("slug"))
            .replace("{content}", &res::escape(&form.content)),
    )).into_response()
}
