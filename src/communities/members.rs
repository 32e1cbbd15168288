use axum::{debug_handler, extract::{Path, State}, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::CurrentUser,
    include_res,
    permissions::{self, Permission, Role},
    profiles, res, AppResult, AppState, OrNotFound,
};

use super::Community;

#[derive(Deserialize)]
pub(crate) struct MemberPath {
    community_slug: String,
    username: String,
}

#[derive(Deserialize)]
pub(crate) struct AddMemberForm {
    username: String,
}

#[derive(Deserialize)]
pub(crate) struct RoleForm {
    role: String,
}

#[debug_handler]
pub(crate) async fn members(
    Path(community_slug): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = super::by_slug(&db_pool, &community_slug).await?.or_not_found()?;
    render(&db_pool, &community, None).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn add(
    Path(community_slug): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(AddMemberForm { username }): Form<AddMemberForm>,
) -> AppResult<Response> {
    let community = super::by_slug(&db_pool, &community_slug).await?.or_not_found()?;
    permissions::require(&db_pool, &user, Permission::AddCommunitySysteruser, community.id).await?;

    let Some(profile) = profiles::by_username(&db_pool, username.trim()).await? else {
        return render(&db_pool, &community, Some("No user with that username.")).await;
    };
    super::add_member(&db_pool, community.id, profile.id).await?;
    tracing::info!(community = %community.slug, member = %profile.username, "member added");

    Ok(back(&community))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove(
    Path(MemberPath { community_slug, username }): Path<MemberPath>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let community = super::by_slug(&db_pool, &community_slug).await?.or_not_found()?;
    permissions::require(&db_pool, &user, Permission::DeleteCommunitySysteruser, community.id).await?;

    let profile = profiles::by_username(&db_pool, &username).await?.or_not_found()?;
    if profile.id == community.community_admin_id {
        return render(&db_pool, &community, Some("The community admin can't be removed.")).await;
    }

    super::remove_member(&db_pool, community.id, profile.id).await?;
    permissions::revoke_all(&db_pool, profile.user_id, community.id).await?;
    tracing::info!(community = %community.slug, member = %profile.username, "member removed");

    Ok(back(&community))
}

#[debug_handler(state = AppState)]
pub(crate) async fn assign_role(
    Path(MemberPath { community_slug, username }): Path<MemberPath>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    Form(RoleForm { role }): Form<RoleForm>,
) -> AppResult<Response> {
    let community = super::by_slug(&db_pool, &community_slug).await?.or_not_found()?;
    permissions::require(&db_pool, &user, Permission::ChangeCommunitySysteruser, community.id).await?;

    let profile = profiles::by_username(&db_pool, &username).await?.or_not_found()?;
    if !super::is_member(&db_pool, community.id, profile.id).await? {
        return Err(crate::AppError::NotFound);
    }
    if profile.id == community.community_admin_id {
        return render(&db_pool, &community, Some("The community admin's role can't be changed.")).await;
    }
    let Some(role) = Role::from_name(&role) else {
        return render(&db_pool, &community, Some("Select a valid role.")).await;
    };
    if role == Role::CommunityAdmin {
        permissions::require(&db_pool, &user, Permission::ChangeCommunity, community.id).await?;
    }

    permissions::assign_role(&db_pool, profile.user_id, community.id, role).await?;
    tracing::info!(community = %community.slug, member = %profile.username, role = role.name(), "role assigned");
    Ok(back(&community))
}

fn back(community: &Community) -> Response {
    Redirect::to(&format!("/c/{}/members", res::urlencode(&community.slug))).into_response()
}

async fn render(db_pool: &SqlitePool, community: &Community, message: Option<&str>) -> AppResult<Response> {
    let admin = super::admin(db_pool, community).await?;
    let slug = res::urlencode(&community.slug);

    let mut member_items = String::new();
    for member in super::members(db_pool, community.id).await? {
        let role = permissions::role_of(db_pool, member.user_id, community.id).await?;
        let role_options: String = Role::ALL
            .iter()
            .map(|r| {
                let selected = if Some(*r) == role { " selected" } else { "" };
                format!("<option{selected}>{}</option>", r.name())
            })
            .collect();

        member_items += &include_res!(str, "/pages/communities/member_item.html")
            .replace("{link}", &profiles::link(&member))
            .replace("{role}", role.map(|r| r.name()).unwrap_or("member"))
            .replace("{role_options}", &role_options)
            .replace("{slug}", &slug)
            .replace("{username}", &res::urlencode(&member.username));
    }

    let message = message
        .map(|m| format!("<p class=\"errors\">{}</p>", res::escape(m)))
        .unwrap_or_default();

    Ok(Html(res::page(
        &format!("{} members", community.name),
        &include_res!(str, "/pages/communities/members.html")
            .replace("{name}", &res::escape(&community.name))
            .replace("{slug}", &slug)
            .replace("{admin}", &profiles::link(&admin))
            .replace("{message}", &message)
            .replace("{member_items}", &member_items),
    )).into_response())
}
