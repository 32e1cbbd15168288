//! Per-community permissions.
//!
//! Every mutating view names one [`Permission`] and the community it acts on.
//! A user holds a permission on a community when they are a superuser or were
//! granted it explicitly, which happens by assigning them one of the four
//! [`Role`]s on that community.

mod provision;

use std::fmt;

use sqlx::SqlitePool;

use crate::{profiles::Profile, AppError, AppResult};

pub use provision::provision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    AddCommunity,
    ChangeCommunity,
    DeleteCommunity,
    AddCommunitySysteruser,
    ChangeCommunitySysteruser,
    DeleteCommunitySysteruser,
    AddCommunityNews,
    ChangeCommunityNews,
    DeleteCommunityNews,
    AddCommunityResource,
    ChangeCommunityResource,
    DeleteCommunityResource,
    AddCommunityPage,
    ChangeCommunityPage,
    DeleteCommunityPage,
    AddTag,
    AddResourceType,
}

impl Permission {
    pub const ALL: [Permission; 17] = {
        use Permission::*;
        [
            AddCommunity,
            ChangeCommunity,
            DeleteCommunity,
            AddCommunitySysteruser,
            ChangeCommunitySysteruser,
            DeleteCommunitySysteruser,
            AddCommunityNews,
            ChangeCommunityNews,
            DeleteCommunityNews,
            AddCommunityResource,
            ChangeCommunityResource,
            DeleteCommunityResource,
            AddCommunityPage,
            ChangeCommunityPage,
            DeleteCommunityPage,
            AddTag,
            AddResourceType,
        ]
    };

    pub fn codename(&self) -> &'static str {
        use Permission::*;
        match self {
            AddCommunity => "add_community",
            ChangeCommunity => "change_community",
            DeleteCommunity => "delete_community",
            AddCommunitySysteruser => "add_community_systeruser",
            ChangeCommunitySysteruser => "change_community_systeruser",
            DeleteCommunitySysteruser => "delete_community_systeruser",
            AddCommunityNews => "add_community_news",
            ChangeCommunityNews => "change_community_news",
            DeleteCommunityNews => "delete_community_news",
            AddCommunityResource => "add_community_resource",
            ChangeCommunityResource => "change_community_resource",
            DeleteCommunityResource => "delete_community_resource",
            AddCommunityPage => "add_community_page",
            ChangeCommunityPage => "change_community_page",
            DeleteCommunityPage => "delete_community_page",
            AddTag => "add_tag",
            AddResourceType => "add_resourcetype",
        }
    }

    pub fn name(&self) -> &'static str {
        use Permission::*;
        match self {
            AddCommunity => "Can add community",
            ChangeCommunity => "Can change community",
            DeleteCommunity => "Can delete community",
            AddCommunitySysteruser => "Add community Systeruser",
            ChangeCommunitySysteruser => "Change community Systeruser",
            DeleteCommunitySysteruser => "Delete community Systeruser",
            AddCommunityNews => "Add community news",
            ChangeCommunityNews => "Change community news",
            DeleteCommunityNews => "Delete community news",
            AddCommunityResource => "Add community resource",
            ChangeCommunityResource => "Change community resource",
            DeleteCommunityResource => "Delete community resource",
            AddCommunityPage => "Add community page",
            ChangeCommunityPage => "Change community page",
            DeleteCommunityPage => "Delete community page",
            AddTag => "Can add tag",
            AddResourceType => "Can add resource type",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.codename())
    }
}

use Permission::*;

const CONTENT_CONTRIBUTOR: &[Permission] = &[
    AddCommunityNews,
    ChangeCommunityNews,
    AddCommunityResource,
    ChangeCommunityResource,
];

const CONTENT_MANAGER: &[Permission] = &[
    AddCommunityNews,
    ChangeCommunityNews,
    DeleteCommunityNews,
    AddCommunityResource,
    ChangeCommunityResource,
    DeleteCommunityResource,
    AddCommunityPage,
    ChangeCommunityPage,
    DeleteCommunityPage,
];

const USER_CONTENT_MANAGER: &[Permission] = &[
    AddCommunityNews,
    ChangeCommunityNews,
    DeleteCommunityNews,
    AddCommunityResource,
    ChangeCommunityResource,
    DeleteCommunityResource,
    AddCommunityPage,
    ChangeCommunityPage,
    DeleteCommunityPage,
    AddCommunitySysteruser,
    ChangeCommunitySysteruser,
    DeleteCommunitySysteruser,
];

const COMMUNITY_ADMIN: &[Permission] = &[
    AddCommunityNews,
    ChangeCommunityNews,
    DeleteCommunityNews,
    AddCommunityResource,
    ChangeCommunityResource,
    DeleteCommunityResource,
    AddCommunityPage,
    ChangeCommunityPage,
    DeleteCommunityPage,
    AddCommunitySysteruser,
    ChangeCommunitySysteruser,
    DeleteCommunitySysteruser,
    ChangeCommunity,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    ContentContributor,
    ContentManager,
    UserContentManager,
    CommunityAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::ContentContributor,
        Role::ContentManager,
        Role::UserContentManager,
        Role::CommunityAdmin,
    ];

    /// Group name as stored in `groups`.
    pub fn name(&self) -> &'static str {
        match self {
            Role::ContentContributor => "Content Contributor",
            Role::ContentManager => "Content Manager",
            Role::UserContentManager => "User and Content Manager",
            Role::CommunityAdmin => "Community Admin",
        }
    }

    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Role::ContentContributor => CONTENT_CONTRIBUTOR,
            Role::ContentManager => CONTENT_MANAGER,
            Role::UserContentManager => USER_CONTENT_MANAGER,
            Role::CommunityAdmin => COMMUNITY_ADMIN,
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.name() == name)
    }
}

pub async fn has_perm(
    db_pool: &SqlitePool,
    profile: &Profile,
    perm: Permission,
    community_id: i64,
) -> AppResult<bool> {
    if profile.is_superuser {
        return Ok(true);
    }

    let granted = sqlx::query("SELECT 1 FROM community_permissions WHERE user_id=? AND community_id=? AND codename=?")
        .bind(profile.user_id)
        .bind(community_id)
        .bind(perm.codename())
        .fetch_optional(db_pool)
        .await?
        .is_some();
    Ok(granted)
}

/// 403 unless `profile` holds `perm` on the community.
pub async fn require(
    db_pool: &SqlitePool,
    profile: &Profile,
    perm: Permission,
    community_id: i64,
) -> AppResult<()> {
    if has_perm(db_pool, profile, perm, community_id).await? {
        Ok(())
    } else {
        tracing::info!(user = %profile.username, %perm, community_id, "permission denied");
        Err(AppError::Forbidden)
    }
}

/// 403 unless `profile` is a superuser; used for site-wide permissions.
pub fn require_global(profile: &Profile, perm: Permission) -> AppResult<()> {
    if profile.is_superuser {
        Ok(())
    } else {
        tracing::info!(user = %profile.username, %perm, "global permission denied");
        Err(AppError::Forbidden)
    }
}

/// Replaces whatever the user held on the community with the role's set.
pub async fn assign_role(
    db_pool: &SqlitePool,
    user_id: i64,
    community_id: i64,
    role: Role,
) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;

    sqlx::query("DELETE FROM community_permissions WHERE user_id=? AND community_id=?")
        .bind(user_id)
        .bind(community_id)
        .execute(&mut *tx)
        .await?;

    for perm in role.permissions() {
        sqlx::query("INSERT INTO community_permissions (user_id,community_id,codename) VALUES (?,?,?)")
            .bind(user_id)
            .bind(community_id)
            .bind(perm.codename())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::info!(user_id, community_id, role = role.name(), "role assigned");
    Ok(())
}

pub async fn revoke_all(db_pool: &SqlitePool, user_id: i64, community_id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM community_permissions WHERE user_id=? AND community_id=?")
        .bind(user_id)
        .bind(community_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

/// The role whose permission set matches the user's grants exactly, if any.
pub async fn role_of(db_pool: &SqlitePool, user_id: i64, community_id: i64) -> AppResult<Option<Role>> {
    let mut held: Vec<String> = sqlx::query_as::<_, (String,)>(
        "SELECT codename FROM community_permissions WHERE user_id=? AND community_id=?",
    )
    .bind(user_id)
    .bind(community_id)
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(|(codename,)| codename)
    .collect();
    held.sort();

    Ok(Role::ALL.into_iter().find(|role| {
        let mut expected: Vec<&str> = role.permissions().iter().map(Permission::codename).collect();
        expected.sort();
        expected == held
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;

    #[tokio::test]
    async fn role_grants_only_on_its_community() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "admin").await;
        let writer = fixtures::profile(&db_pool, "writer").await;
        let foo = fixtures::community(&db_pool, "foo", &admin).await;
        let bar = fixtures::community(&db_pool, "bar", &admin).await;

        assign_role(&db_pool, writer.user_id, foo.id, Role::ContentContributor).await.unwrap();

        assert!(has_perm(&db_pool, &writer, AddCommunityNews, foo.id).await.unwrap());
        assert!(!has_perm(&db_pool, &writer, DeleteCommunityNews, foo.id).await.unwrap());
        assert!(!has_perm(&db_pool, &writer, AddCommunityNews, bar.id).await.unwrap());
        assert!(matches!(
            require(&db_pool, &writer, AddCommunityPage, foo.id).await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(role_of(&db_pool, writer.user_id, foo.id).await.unwrap(), Some(Role::ContentContributor));
    }

    #[tokio::test]
    async fn reassigning_replaces_previous_grants() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "admin").await;
        let user = fixtures::profile(&db_pool, "user").await;
        let foo = fixtures::community(&db_pool, "foo", &admin).await;

        assign_role(&db_pool, user.user_id, foo.id, Role::CommunityAdmin).await.unwrap();
        assert!(has_perm(&db_pool, &user, ChangeCommunity, foo.id).await.unwrap());

        assign_role(&db_pool, user.user_id, foo.id, Role::ContentManager).await.unwrap();
        assert!(!has_perm(&db_pool, &user, ChangeCommunity, foo.id).await.unwrap());
        assert!(has_perm(&db_pool, &user, DeleteCommunityPage, foo.id).await.unwrap());

        revoke_all(&db_pool, user.user_id, foo.id).await.unwrap();
        assert_eq!(role_of(&db_pool, user.user_id, foo.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn superuser_passes_every_check() {
        let db_pool = fixtures::provisioned().await;
        let mut root = fixtures::profile(&db_pool, "root").await;
        let foo = fixtures::community(&db_pool, "foo", &root).await;

        assert!(require_global(&root, AddCommunity).is_err());
        root.is_superuser = true;
        for perm in Permission::ALL {
            assert!(has_perm(&db_pool, &root, perm, foo.id).await.unwrap());
        }
        assert!(require_global(&root, AddCommunity).is_ok());
    }

    #[test]
    fn roles_round_trip_by_name() {
        for role in Role::ALL {
            assert_eq!(Role::from_name(role.name()), Some(role));
        }
        assert_eq!(Role::from_name("Janitor"), None);
    }
}
