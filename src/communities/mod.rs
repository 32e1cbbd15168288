//! Communities: a tree of named groups with an admin and members.

mod edit;
mod members;
mod page;

use std::fmt;

use axum::{routing::{get, post}, Router};
use sqlx::{Executor, Sqlite, SqlitePool};

use crate::{
    permissions::{self, Role},
    profiles::{self, profile_query, Profile},
    res, AppResult, AppState,
};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Community {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub email: String,
    pub mailing_list: String,
    pub resource_area: String,
    pub community_admin_id: i64,
    pub parent_community_id: Option<i64>,
    pub website: String,
    pub facebook: String,
    pub googleplus: String,
    pub twitter: String,
    /// Name as last loaded or saved, so a pending rename can be told apart.
    #[sqlx(skip)]
    pub original_name: String,
}

impl Community {
    fn loaded(mut self) -> Community {
        self.original_name = self.name.clone();
        self
    }

    pub fn is_renamed(&self) -> bool {
        self.name != self.original_name
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub name: String,
    pub slug: String,
    pub community_admin_id: i64,
    pub parent_community_id: Option<i64>,
}

macro_rules! community_query {
    () => {
        "SELECT id,name,slug,email,mailing_list,resource_area,community_admin_id,parent_community_id,\
        website,facebook,googleplus,twitter FROM communities"
    };
}

pub fn link(community: &Community) -> String {
    format!("<a href=\"/c/{}\">{}</a>", res::urlencode(&community.slug), res::escape(&community.name))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/communities/new", get(edit::new_community_page).post(edit::new_community))
        .route("/c/{community_slug}", get(page::main_page))
        .route("/c/{community_slug}/profile", get(page::profile))
        .route("/c/{community_slug}/profile/edit", get(edit::edit_community_page).post(edit::edit_community))
        .route("/c/{community_slug}/members", get(members::members))
        .route("/c/{community_slug}/members/add", post(members::add))
        .route("/c/{community_slug}/members/{username}/remove", post(members::remove))
        .route("/c/{community_slug}/members/{username}/role", post(members::assign_role))
}

/// Inserts the community and makes its admin a member holding the
/// Community Admin role on it.
pub async fn create(db_pool: &SqlitePool, new: NewCommunity) -> AppResult<Community> {
    let mut tx = db_pool.begin().await?;

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO communities (name,slug,community_admin_id,parent_community_id) VALUES (?,?,?,?) RETURNING id",
    )
    .bind(&new.name)
    .bind(&new.slug)
    .bind(new.community_admin_id)
    .bind(new.parent_community_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO community_members (community_id,profile_id) VALUES (?,?)")
        .bind(id)
        .bind(new.community_admin_id)
        .execute(&mut *tx)
        .await?;

    let community = by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("community {id} vanished mid-transaction"))?;
    tx.commit().await?;

    let admin = profiles::by_id(db_pool, new.community_admin_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("admin profile {} is gone", new.community_admin_id))?;
    permissions::assign_role(db_pool, admin.user_id, id, Role::CommunityAdmin).await?;

    tracing::info!(community = %community.slug, admin = %admin.username, "community created");
    Ok(community)
}

/// Writes every editable column back and resets the rename tracking.
pub async fn save(db_pool: &SqlitePool, community: &mut Community) -> AppResult<()> {
    sqlx::query(
        "UPDATE communities SET name=?,slug=?,email=?,mailing_list=?,resource_area=?,community_admin_id=?,\
        parent_community_id=?,website=?,facebook=?,googleplus=?,twitter=? WHERE id=?",
    )
    .bind(&community.name)
    .bind(&community.slug)
    .bind(&community.email)
    .bind(&community.mailing_list)
    .bind(&community.resource_area)
    .bind(community.community_admin_id)
    .bind(community.parent_community_id)
    .bind(&community.website)
    .bind(&community.facebook)
    .bind(&community.googleplus)
    .bind(&community.twitter)
    .bind(community.id)
    .execute(db_pool)
    .await?;

    if community.is_renamed() {
        tracing::info!(from = %community.original_name, to = %community.name, "community renamed");
    }
    community.original_name = community.name.clone();
    Ok(())
}

pub async fn by_id<'e, E>(db: E, id: i64) -> AppResult<Option<Community>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let community: Option<Community> = sqlx::query_as(concat!(community_query!(), " WHERE id=?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(community.map(Community::loaded))
}

pub async fn by_slug(db_pool: &SqlitePool, slug: &str) -> AppResult<Option<Community>> {
    let community: Option<Community> = sqlx::query_as(concat!(community_query!(), " WHERE slug=?"))
        .bind(slug)
        .fetch_optional(db_pool)
        .await?;
    Ok(community.map(Community::loaded))
}

pub async fn all(db_pool: &SqlitePool) -> AppResult<Vec<Community>> {
    let communities: Vec<Community> = sqlx::query_as(concat!(community_query!(), " ORDER BY name"))
        .fetch_all(db_pool)
        .await?;
    Ok(communities.into_iter().map(Community::loaded).collect())
}

pub async fn top_level(db_pool: &SqlitePool) -> AppResult<Vec<Community>> {
    let communities: Vec<Community> =
        sqlx::query_as(concat!(community_query!(), " WHERE parent_community_id IS NULL ORDER BY name"))
            .fetch_all(db_pool)
            .await?;
    Ok(communities.into_iter().map(Community::loaded).collect())
}

pub async fn children(db_pool: &SqlitePool, community_id: i64) -> AppResult<Vec<Community>> {
    let communities: Vec<Community> =
        sqlx::query_as(concat!(community_query!(), " WHERE parent_community_id=? ORDER BY name"))
            .bind(community_id)
            .fetch_all(db_pool)
            .await?;
    Ok(communities.into_iter().map(Community::loaded).collect())
}

/// Ids of every community below `community_id`, at any depth.
pub async fn descendant_ids(db_pool: &SqlitePool, community_id: i64) -> AppResult<Vec<i64>> {
    let ids = sqlx::query_as::<_, (i64,)>(
        "WITH RECURSIVE below(id) AS (\
            SELECT id FROM communities WHERE parent_community_id=? \
            UNION SELECT c.id FROM communities c JOIN below b ON c.parent_community_id=b.id\
        ) SELECT id FROM below",
    )
    .bind(community_id)
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(|(id,)| id)
    .collect();
    Ok(ids)
}

pub async fn admin(db_pool: &SqlitePool, community: &Community) -> AppResult<Profile> {
    profiles::by_id(db_pool, community.community_admin_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("community {} has no admin profile", community.slug).into())
}

pub async fn members(db_pool: &SqlitePool, community_id: i64) -> AppResult<Vec<Profile>> {
    Ok(sqlx::query_as(concat!(
        profile_query!(),
        " JOIN community_members m ON m.profile_id=p.id WHERE m.community_id=? ORDER BY u.username"
    ))
    .bind(community_id)
    .fetch_all(db_pool)
    .await?)
}

/// Communities the profile belongs to.
pub async fn of_member(db_pool: &SqlitePool, profile_id: i64) -> AppResult<Vec<Community>> {
    let communities: Vec<Community> = sqlx::query_as(concat!(
        community_query!(),
        " WHERE id IN (SELECT community_id FROM community_members WHERE profile_id=?) ORDER BY name"
    ))
    .bind(profile_id)
    .fetch_all(db_pool)
    .await?;
    Ok(communities.into_iter().map(Community::loaded).collect())
}

pub async fn is_member(db_pool: &SqlitePool, community_id: i64, profile_id: i64) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM community_members WHERE community_id=? AND profile_id=?")
        .bind(community_id)
        .bind(profile_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

pub async fn add_member(db_pool: &SqlitePool, community_id: i64, profile_id: i64) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO community_members (community_id,profile_id) VALUES (?,?)")
        .bind(community_id)
        .bind(profile_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn remove_member(db_pool: &SqlitePool, community_id: i64, profile_id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM community_members WHERE community_id=? AND profile_id=?")
        .bind(community_id)
        .bind(profile_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Members, the admin and superusers may see private content.
pub async fn can_see_private(db_pool: &SqlitePool, community: &Community, viewer: Option<&Profile>) -> AppResult<bool> {
    match viewer {
        None => Ok(false),
        Some(profile) if profile.is_superuser || profile.id == community.community_admin_id => Ok(true),
        Some(profile) => is_member(db_pool, community.id, profile.id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::fixtures, permissions::Permission};

    #[tokio::test]
    async fn membership_is_exactly_what_was_added() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "admin").await;
        let foo = fixtures::profile(&db_pool, "foo").await;
        let bar = fixtures::profile(&db_pool, "bar").await;
        let community = fixtures::community(&db_pool, "Rust", &admin).await;

        remove_member(&db_pool, community.id, admin.id).await.unwrap();
        assert!(members(&db_pool, community.id).await.unwrap().is_empty());

        add_member(&db_pool, community.id, foo.id).await.unwrap();
        add_member(&db_pool, community.id, bar.id).await.unwrap();
        add_member(&db_pool, community.id, bar.id).await.unwrap();

        let usernames: Vec<String> = members(&db_pool, community.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(usernames, ["bar", "foo"]);
        assert_eq!(super::admin(&db_pool, &community).await.unwrap().id, admin.id);
    }

    #[tokio::test]
    async fn creator_is_admin_member_with_admin_role() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "admin").await;
        let community = fixtures::community(&db_pool, "Python Romania", &admin).await;

        assert_eq!(community.slug, "python-romania");
        assert!(is_member(&db_pool, community.id, admin.id).await.unwrap());
        assert!(permissions::has_perm(&db_pool, &admin, Permission::ChangeCommunity, community.id).await.unwrap());
        assert_eq!(
            permissions::role_of(&db_pool, admin.user_id, community.id).await.unwrap(),
            Some(Role::CommunityAdmin)
        );
    }

    #[tokio::test]
    async fn rename_is_tracked_until_saved() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "admin").await;
        let mut community = fixtures::community(&db_pool, "foo", &admin).await;
        assert_eq!(community.original_name, "foo");
        assert!(!community.is_renamed());

        community.name = "bar".to_owned();
        assert!(community.is_renamed());
        save(&db_pool, &mut community).await.unwrap();
        assert_eq!(community.original_name, "bar");

        let reloaded = by_slug(&db_pool, "foo").await.unwrap().unwrap();
        assert_eq!(reloaded.name, "bar");
        assert_eq!(reloaded.original_name, "bar");
    }

    #[tokio::test]
    async fn hierarchy_queries() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "admin").await;
        let root = fixtures::community(&db_pool, "root", &admin).await;
        let mut child = fixtures::community(&db_pool, "child", &admin).await;
        let mut grandchild = fixtures::community(&db_pool, "grandchild", &admin).await;

        child.parent_community_id = Some(root.id);
        save(&db_pool, &mut child).await.unwrap();
        grandchild.parent_community_id = Some(child.id);
        save(&db_pool, &mut grandchild).await.unwrap();

        let top: Vec<i64> = top_level(&db_pool).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(top, [root.id]);
        assert_eq!(children(&db_pool, root.id).await.unwrap(), [child.clone()]);

        let mut below = descendant_ids(&db_pool, root.id).await.unwrap();
        below.sort();
        assert_eq!(below, [child.id, grandchild.id]);

        sqlx::query("DELETE FROM communities WHERE id=?").bind(root.id).execute(&db_pool).await.unwrap();
        let orphan = by_id(&db_pool, child.id).await.unwrap().unwrap();
        assert_eq!(orphan.parent_community_id, None);
    }

    #[tokio::test]
    async fn private_content_audience() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "admin").await;
        let member = fixtures::profile(&db_pool, "member").await;
        let stranger = fixtures::profile(&db_pool, "stranger").await;
        let community = fixtures::community(&db_pool, "foo", &admin).await;
        add_member(&db_pool, community.id, member.id).await.unwrap();

        assert!(can_see_private(&db_pool, &community, Some(&admin)).await.unwrap());
        assert!(can_see_private(&db_pool, &community, Some(&member)).await.unwrap());
        assert!(!can_see_private(&db_pool, &community, Some(&stranger)).await.unwrap());
        assert!(!can_see_private(&db_pool, &community, None).await.unwrap());
    }
}
