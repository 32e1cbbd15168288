use axum::{debug_handler, extract::{Path, State}, response::{Html, IntoResponse, Redirect, Response}, Form};
use sqlx::SqlitePool;

use crate::{
    auth::CurrentUser,
    forms::{CommunityForm, FormData, FormErrors},
    include_res,
    permissions::{self, Permission, Role},
    res, AppResult, AppState, OrNotFound,
};

use super::{Community, NewCommunity};

#[debug_handler(state = AppState)]
pub(crate) async fn new_community_page(
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    permissions::require_global(&user, Permission::AddCommunity)?;
    render(&db_pool, None, &CommunityForm::default(), &FormErrors::default()).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_community(
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    permissions::require_global(&user, Permission::AddCommunity)?;

    let (form, mut errors) = match CommunityForm::parse(&FormData::from(pairs)) {
        Ok(form) => (form, FormErrors::default()),
        Err((form, errors)) => return render(&db_pool, None, &form, &errors).await,
    };
    check_unique(&db_pool, &form, None, &mut errors).await?;
    if let Some(parent_id) = form.parent_community {
        if super::by_id(&db_pool, parent_id).await?.is_none() {
            errors.add("parent_community", "Select a valid choice.");
        }
    }
    if !errors.is_empty() {
        return render(&db_pool, None, &form, &errors).await;
    }

    let mut community = super::create(&db_pool, NewCommunity {
        name: form.name.clone(),
        slug: form.slug.clone(),
        community_admin_id: user.id,
        parent_community_id: form.parent_community,
    })
    .await?;
    apply_contacts(&mut community, &form);
    super::save(&db_pool, &mut community).await?;

    Ok(Redirect::to(&format!("/c/{}/profile", res::urlencode(&community.slug))).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit_community_page(
    Path(community_slug): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = super::by_slug(&db_pool, &community_slug).await?.or_not_found()?;
    permissions::require(&db_pool, &user, Permission::ChangeCommunity, community.id).await?;

    let form = CommunityForm {
        name: community.name.clone(),
        slug: community.slug.clone(),
        email: Some(community.email.clone()),
        mailing_list: Some(community.mailing_list.clone()),
        resource_area: Some(community.resource_area.clone()),
        community_admin: Some(community.community_admin_id),
        parent_community: community.parent_community_id,
        website: Some(community.website.clone()),
        facebook: Some(community.facebook.clone()),
        googleplus: Some(community.googleplus.clone()),
        twitter: Some(community.twitter.clone()),
    };
    render(&db_pool, Some(&community), &form, &FormErrors::default()).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit_community(
    Path(community_slug): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let mut community = super::by_slug(&db_pool, &community_slug).await?.or_not_found()?;
    permissions::require(&db_pool, &user, Permission::ChangeCommunity, community.id).await?;

    let (form, mut errors) = match CommunityForm::parse(&FormData::from(pairs)) {
        Ok(form) => (form, FormErrors::default()),
        Err((form, errors)) => return render(&db_pool, Some(&community), &form, &errors).await,
    };
    check_unique(&db_pool, &form, Some(community.id), &mut errors).await?;

    match form.community_admin {
        Some(admin_id) => {
            if !super::is_member(&db_pool, community.id, admin_id).await? {
                errors.add("community_admin", "Select a valid choice.");
            }
        }
        None => errors.add("community_admin", "This field is required."),
    }

    if let Some(parent_id) = form.parent_community {
        let below = super::descendant_ids(&db_pool, community.id).await?;
        if parent_id == community.id || below.contains(&parent_id) {
            errors.add("parent_community", "A community can't be placed under itself.");
        } else if super::by_id(&db_pool, parent_id).await?.is_none() {
            errors.add("parent_community", "Select a valid choice.");
        }
    }

    if !errors.is_empty() {
        return render(&db_pool, Some(&community), &form, &errors).await;
    }

    let previous_admin = community.community_admin_id;
    community.name = form.name.clone();
    community.slug = form.slug.clone();
    community.parent_community_id = form.parent_community;
    if let Some(admin_id) = form.community_admin {
        community.community_admin_id = admin_id;
    }
    apply_contacts(&mut community, &form);
    super::save(&db_pool, &mut community).await?;

    if community.community_admin_id != previous_admin {
        let admin = super::admin(&db_pool, &community).await?;
        permissions::assign_role(&db_pool, admin.user_id, community.id, Role::CommunityAdmin).await?;
        tracing::info!(community = %community.slug, admin = %admin.username, "admin changed");
    }

    Ok(Redirect::to(&format!("/c/{}/profile", res::urlencode(&community.slug))).into_response())
}

fn apply_contacts(community: &mut Community, form: &CommunityForm) {
    community.email = form.email.clone().unwrap_or_default();
    community.mailing_list = form.mailing_list.clone().unwrap_or_default();
    community.resource_area = form.resource_area.clone().unwrap_or_default();
    community.website = form.website.clone().unwrap_or_default();
    community.facebook = form.facebook.clone().unwrap_or_default();
    community.googleplus = form.googleplus.clone().unwrap_or_default();
    community.twitter = form.twitter.clone().unwrap_or_default();
}

async fn check_unique(
    db_pool: &SqlitePool,
    form: &CommunityForm,
    exclude: Option<i64>,
    errors: &mut FormErrors,
) -> AppResult<()> {
    if sqlx::query("SELECT 1 FROM communities WHERE name=? AND id IS NOT ?")
        .bind(&form.name)
        .bind(exclude)
        .fetch_optional(db_pool)
        .await?
        .is_some()
    {
        errors.add("name", "Community with this Name already exists.");
    }
    if sqlx::query("SELECT 1 FROM communities WHERE slug=? AND id IS NOT ?")
        .bind(&form.slug)
        .bind(exclude)
        .fetch_optional(db_pool)
        .await?
        .is_some()
    {
        errors.add("slug", "Community with this Slug already exists.");
    }
    Ok(())
}

/// Add form when `community` is `None`, edit form otherwise.
async fn render(
    db_pool: &SqlitePool,
    community: Option<&Community>,
    form: &CommunityForm,
    errors: &FormErrors,
) -> AppResult<Response> {
    let mut excluded = Vec::new();
    if let Some(community) = community {
        excluded = super::descendant_ids(db_pool, community.id).await?;
        excluded.push(community.id);
    }
    let parents: Vec<Community> = super::all(db_pool)
        .await?
        .into_iter()
        .filter(|c| !excluded.contains(&c.id))
        .collect();
    let selected_parent: Vec<i64> = form.parent_community.into_iter().collect();
    let parent_options = res::options(parents.iter().map(|c| (c.id, c.name.as_str())), &selected_parent);

    let (title, action, admin_field) = match community {
        Some(community) => {
            let members = super::members(db_pool, community.id).await?;
            let labels: Vec<(i64, String)> = members.iter().map(|p| (p.id, p.to_string())).collect();
            let selected_admin: Vec<i64> = form.community_admin.into_iter().collect();
            let admin_field = include_res!(str, "/pages/communities/admin_field.html")
                .replace("{options}", &res::options(labels.iter().map(|(id, l)| (*id, l.as_str())), &selected_admin))
                .replace("{errors}", &errors.render("community_admin"));
            (
                format!("Edit {}", community.name),
                format!("/c/{}/profile/edit", res::urlencode(&community.slug)),
                admin_field,
            )
        }
        None => ("New community".to_owned(), "/communities/new".to_owned(), String::new()),
    };

    let value = |v: &Option<String>| res::escape(v.as_deref().unwrap_or_default());

    Ok(Html(res::page(
        &title,
        &include_res!(str, "/pages/communities/form.html")
            .replace("{title}", &res::escape(&title))
            .replace("{action}", &action)
            .replace("{name}", &res::escape(&form.name))
            .replace("{name_errors}", &errors.render("name"))
            .replace("{slug}", &res::escape(&form.slug))
            .replace("{slug_errors}", &errors.render("slug"))
            .replace("{email}", &value(&form.email))
            .replace("{email_errors}", &errors.render("email"))
            .replace("{mailing_list}", &value(&form.mailing_list))
            .replace("{mailing_list_errors}", &errors.render("mailing_list"))
            .replace("{resource_area}", &value(&form.resource_area))
            .replace("{resource_area_errors}", &errors.render("resource_area"))
            .replace("{admin_field}", &admin_field)
            .replace("{parent_options}", &parent_options)
            .replace("{parent_errors}", &errors.render("parent_community"))
            .replace("{website}", &value(&form.website))
            .replace("{website_errors}", &errors.render("website"))
            .replace("{facebook}", &value(&form.facebook))
            .replace("{facebook_errors}", &errors.render("facebook"))
            .replace("{googleplus}", &value(&form.googleplus))
            .replace("{googleplus_errors}", &errors.render("googleplus"))
            .replace("{twitter}", &value(&form.twitter))
            .replace("{twitter_errors}", &errors.render("twitter")),
    )).into_response())
}
