use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    auth::CurrentUser,
    communities::{self, Community},
    forms::{ContentForm, FormData, FormErrors},
    include_res, markdown,
    permissions,
    profiles::{self, Profile},
    res, tags, AppError, AppResult, AppState, OrNotFound,
};

use super::{Content, Kind};

#[derive(Deserialize)]
pub(crate) struct ItemPath {
    community_slug: String,
    slug: String,
}

fn list_url(kind: Kind, community: &Community) -> String {
    format!("/c/{}/{}", res::urlencode(&community.slug), kind.path())
}

fn item_url(kind: Kind, community: &Community, item: &Content) -> String {
    format!("{}/{}", list_url(kind, community), res::urlencode(&item.slug))
}

async fn community(db_pool: &SqlitePool, community_slug: &str) -> AppResult<Community> {
    communities::by_slug(db_pool, community_slug).await?.or_not_found()
}

async fn viewer(session: &Session, db_pool: &SqlitePool) -> AppResult<Option<Profile>> {
    Ok(CurrentUser::from_session(session, db_pool).await?.map(|CurrentUser(profile)| profile))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    Path(community_slug): Path<String>,
    Extension(kind): Extension<Kind>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    let viewer = viewer(&session, &db_pool).await?;
    let include_private = communities::can_see_private(&db_pool, &community, viewer.as_ref()).await?;

    let items: String = super::for_community(&db_pool, kind, community.id, include_private)
        .await?
        .iter()
        .map(|item| {
            include_res!(str, "/pages/content/item.html")
                .replace("{url}", &item_url(kind, &community, item))
                .replace("{title}", &res::escape(&item.title))
                .replace("{date}", &item.date_created.to_string())
                .replace("{private}", if item.is_public { "" } else { " (private)" })
        })
        .collect();

    let title = format!("{} {}", community.name, kind.plural());
    Ok(Html(res::page(
        &title,
        &include_res!(str, "/pages/content/list.html")
            .replace("{heading}", &res::escape(&title))
            .replace("{items}", &items)
            .replace("{add_url}", &format!("{}/add", list_url(kind, &community)))
            .replace("{label}", kind.label()),
    )).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn view(
    Path(ItemPath { community_slug, slug }): Path<ItemPath>,
    Extension(kind): Extension<Kind>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    let item = super::by_slug(&db_pool, kind, community.id, &slug).await?.or_not_found()?;

    if !item.is_public {
        let viewer = viewer(&session, &db_pool).await?;
        if !communities::can_see_private(&db_pool, &community, viewer.as_ref()).await? {
            return Err(AppError::NotFound);
        }
    }

    let author = profiles::by_id(&db_pool, item.author_id).await?.or_not_found()?;
    let tag_links: String = tags::tags_by_ids(&db_pool, &super::tag_ids(&db_pool, kind, item.id).await?)
        .await?
        .iter()
        .map(|tag| format!("<a class=\"tag\" href=\"/tags/{}\">{}</a> ", tag.id, res::escape(&tag.name)))
        .collect();
    let resource_type = match item.resource_type_id {
        Some(id) => tags::resource_type_by_id(&db_pool, id)
            .await?
            .map(|t| format!("<p>Type: {}</p>", res::escape(&t.name)))
            .unwrap_or_default(),
        None => String::new(),
    };

    let url = item_url(kind, &community, &item);
    Ok(Html(res::page(
        &item.describe(&community),
        &include_res!(str, "/pages/content/view.html")
            .replace("{title}", &res::escape(&item.title))
            .replace("{community}", &communities::link(&community))
            .replace("{author}", &profiles::link(&author))
            .replace("{date_created}", &item.date_created.to_string())
            .replace("{date_modified}", &item.date_modified.to_string())
            .replace("{resource_type}", &resource_type)
            .replace("{tags}", &tag_links)
            .replace("{edit_url}", &format!("{url}/edit"))
            .replace("{delete_url}", &format!("{url}/delete"))
            .replace("{content}", &markdown(&item.content)),
    )).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_page(
    Path(community_slug): Path<String>,
    Extension(kind): Extension<Kind>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, kind.add_perm(), community.id).await?;
    render_form(&db_pool, kind, &community, None, &ContentForm::blank(), &FormErrors::default()).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn add(
    Path(community_slug): Path<String>,
    Extension(kind): Extension<Kind>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, kind.add_perm(), community.id).await?;

    let form = match check_form(&db_pool, kind, None, FormData::from(pairs)).await? {
        Ok(form) => form,
        Err((form, errors)) => return render_form(&db_pool, kind, &community, None, &form, &errors).await,
    };
    let item = super::create(&db_pool, kind, community.id, user.id, &form).await?;

    Ok(Redirect::to(&item_url(kind, &community, &item)).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit_page(
    Path(ItemPath { community_slug, slug }): Path<ItemPath>,
    Extension(kind): Extension<Kind>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, kind.change_perm(), community.id).await?;
    let item = super::by_slug(&db_pool, kind, community.id, &slug).await?.or_not_found()?;

    let form = ContentForm {
        title: item.title.clone(),
        slug: item.slug.clone(),
        content: item.content.clone(),
        is_public: item.is_public,
        tags: super::tag_ids(&db_pool, kind, item.id).await?,
        resource_type: item.resource_type_id,
    };
    render_form(&db_pool, kind, &community, Some(&item), &form, &FormErrors::default()).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit(
    Path(ItemPath { community_slug, slug }): Path<ItemPath>,
    Extension(kind): Extension<Kind>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, kind.change_perm(), community.id).await?;
    let mut item = super::by_slug(&db_pool, kind, community.id, &slug).await?.or_not_found()?;

    let form = match check_form(&db_pool, kind, Some(item.id), FormData::from(pairs)).await? {
        Ok(form) => form,
        Err((form, errors)) => return render_form(&db_pool, kind, &community, Some(&item), &form, &errors).await,
    };
    super::update(&db_pool, kind, &mut item, &form).await?;

    Ok(Redirect::to(&item_url(kind, &community, &item)).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_page(
    Path(ItemPath { community_slug, slug }): Path<ItemPath>,
    Extension(kind): Extension<Kind>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, kind.delete_perm(), community.id).await?;
    let item = super::by_slug(&db_pool, kind, community.id, &slug).await?.or_not_found()?;

    let url = item_url(kind, &community, &item);
    Ok(Html(res::page(
        &format!("Delete {}", item.title),
        &include_res!(str, "/pages/confirm_delete.html")
            .replace("{what}", &res::escape(&item.describe(&community)))
            .replace("{action}", &format!("{url}/delete"))
            .replace("{cancel}", &url),
    )).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    Path(ItemPath { community_slug, slug }): Path<ItemPath>,
    Extension(kind): Extension<Kind>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = community(&db_pool, &community_slug).await?;
    permissions::require(&db_pool, &user, kind.delete_perm(), community.id).await?;
    let item = super::by_slug(&db_pool, kind, community.id, &slug).await?.or_not_found()?;

    super::delete(&db_pool, kind, &item).await?;
    Ok(Redirect::to(&list_url(kind, &community)).into_response())
}

/// Parses the form and runs the checks that need the database.
async fn check_form(
    db_pool: &SqlitePool,
    kind: Kind,
    exclude: Option<i64>,
    data: FormData,
) -> AppResult<Result<ContentForm, (ContentForm, FormErrors)>> {
    let (form, mut errors) = match ContentForm::parse(&data) {
        Ok(form) => (form, FormErrors::default()),
        Err(failed) => return Ok(Err(failed)),
    };

    if super::slug_taken(db_pool, kind, &form.slug, exclude).await? {
        errors.add("slug", format!("{} with this Slug already exists.", kind.label()));
    }
    for id in tags::missing_tags(db_pool, &form.tags).await? {
        errors.add("tags", format!("Select a valid choice. {id} is not one of the available choices."));
    }
    if let Some(id) = form.resource_type {
        if kind == Kind::News || tags::resource_type_by_id(db_pool, id).await?.is_none() {
            errors.add("resource_type", "Select a valid choice.");
        }
    }

    Ok(if errors.is_empty() { Ok(form) } else { Err((form, errors)) })
}

async fn render_form(
    db_pool: &SqlitePool,
    kind: Kind,
    community: &Community,
    item: Option<&Content>,
    form: &ContentForm,
    errors: &FormErrors,
) -> AppResult<Response> {
    let (heading, action) = match item {
        Some(item) => (
            format!("Edit {}", item.title),
            format!("{}/edit", item_url(kind, community, item)),
        ),
        None => (
            format!("Add {} to {}", kind.label(), community.name),
            format!("{}/add", list_url(kind, community)),
        ),
    };

    let all_tags = tags::all_tags(db_pool).await?;
    let tag_options = res::options(all_tags.iter().map(|t| (t.id, t.name.as_str())), &form.tags);

    let resource_type_field = match kind {
        Kind::News => String::new(),
        Kind::Resource => {
            let types = tags::all_resource_types(db_pool).await?;
            let selected: Vec<i64> = form.resource_type.into_iter().collect();
            include_res!(str, "/pages/content/resource_type_field.html")
                .replace("{options}", &res::options(types.iter().map(|t| (t.id, t.name.as_str())), &selected))
                .replace("{errors}", &errors.render("resource_type"))
        }
    };

    Ok(Html(res::page(
        &heading,
        &include_res!(str, "/pages/content/form.html")
            .replace("{heading}", &res::escape(&heading))
            .replace("{action}", &action)
            .replace("{title}", &res::escape(&form.title))
            .replace("{title_errors}", &errors.render("title"))
            .replace("{slug}", &res::escape(&form.slug))
            .replace("{slug_errors}", &errors.render("slug"))
            .replace("{is_public}", res::checked(form.is_public))
            .replace("{tag_options}", &tag_options)
            .replace("{tags_errors}", &errors.render("tags"))
            .replace("{resource_type_field}", &resource_type_field)
            .replace("{content}", &res::escape(&form.content))
            .replace("{content_errors}", &errors.render("content")),
    )).into_response())
}
