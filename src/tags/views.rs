use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use sqlx::SqlitePool;

use crate::{
    auth::CurrentUser,
    communities,
    content::{self, Kind},
    forms::{FormData, FormErrors, NameForm},
    include_res,
    permissions::{self, Permission},
    res, AppResult, AppState, OrNotFound,
};

#[debug_handler]
pub(crate) async fn tags(State(db_pool): State<SqlitePool>) -> AppResult<Response> {
    render(&db_pool, &FormErrors::default(), &FormErrors::default()).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_tag(
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    permissions::require_global(&user, Permission::AddTag)?;
    match NameForm::parse(&FormData::from(pairs)) {
        Ok(form) => {
            super::create_tag(&db_pool, &form.name).await?;
            Ok(Redirect::to("/tags").into_response())
        }
        Err((_, errors)) => render(&db_pool, &errors, &FormErrors::default()).await,
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_resource_type(
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    permissions::require_global(&user, Permission::AddResourceType)?;
    match NameForm::parse(&FormData::from(pairs)) {
        Ok(form) => {
            super::create_resource_type(&db_pool, &form.name).await?;
            Ok(Redirect::to("/tags").into_response())
        }
        Err((_, errors)) => render(&db_pool, &FormErrors::default(), &errors).await,
    }
}

/// Public news and resources carrying the tag.
#[debug_handler]
pub(crate) async fn tagged(
    Path(tag_id): Path<i64>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let tag = super::tag_by_id(&db_pool, tag_id).await?.or_not_found()?;

    let mut sections = String::new();
    for kind in [Kind::News, Kind::Resource] {
        let mut items = String::new();
        for item in content::with_tag(&db_pool, kind, tag.id).await? {
            let Some(community) = communities::by_id(&db_pool, item.community_id).await? else {
                continue;
            };
            items += &format!(
                "<li><a href=\"/c/{}/{}/{}\">{}</a></li>",
                res::urlencode(&community.slug),
                kind.path(),
                res::urlencode(&item.slug),
                res::escape(&item.describe(&community)),
            );
        }
        sections += &format!("<h2>{}</h2><ul>{items}</ul>", kind.plural());
    }

    Ok(Html(res::page(
        &format!("Tagged {}", tag.name),
        &include_res!(str, "/pages/tags/tagged.html")
            .replace("{name}", &res::escape(&tag.name))
            .replace("{sections}", &sections),
    )).into_response())
}

async fn render(db_pool: &SqlitePool, tag_errors: &FormErrors, type_errors: &FormErrors) -> AppResult<Response> {
    let tag_items: String = super::all_tags(db_pool)
        .await?
        .iter()
        .map(|tag| format!("<li><a href=\"/tags/{}\">{}</a></li>", tag.id, res::escape(&tag.name)))
        .collect();
    let type_items: String = super::all_resource_types(db_pool)
        .await?
        .iter()
        .map(|t| format!("<li>{}</li>", res::escape(&t.name)))
        .collect();

    Ok(Html(res::page(
        "Tags",
        &include_res!(str, "/pages/tags/tags.html")
            .replace("{tag_items}", &tag_items)
            .replace("{tag_errors}", &tag_errors.render("name"))
            .replace("{type_items}", &type_items)
            .replace("{type_errors}", &type_errors.render("name")),
    )).into_response())
}
