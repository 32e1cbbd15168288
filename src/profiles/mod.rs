mod edit;
mod page;

use std::fmt;

use axum::{routing::get, Router};
use sqlx::{Executor, Sqlite, SqlitePool};

use crate::{res, AppResult, AppState};

pub const DEFAULT_PICTURE: &str = "photos/dummy.jpeg";

/// A user identity together with its profile row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_superuser: bool,
    pub country: Option<String>,
    pub blog_url: String,
    pub homepage_url: String,
    pub profile_picture: Option<String>,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.first_name.is_empty() && !self.last_name.is_empty() {
            write!(f, "{} {}", self.first_name, self.last_name)
        } else {
            f.write_str(&self.username)
        }
    }
}

/// `SELECT` over profiles joined with their identity, as a string literal so
/// it can be `concat!`ed into `'static` queries.
macro_rules! profile_query {
    () => {
        "SELECT p.id,p.user_id,u.username,u.first_name,u.last_name,u.email,u.is_superuser,\
        p.country,p.blog_url,p.homepage_url,p.profile_picture \
        FROM profiles p JOIN users u ON u.id=p.user_id"
    };
}
pub(crate) use profile_query;

/// Anchor to the profile page, labelled with the display name.
pub fn link(profile: &Profile) -> String {
    format!(
        "<a href=\"/users/{}\">{}</a>",
        res::urlencode(&profile.username),
        res::escape(&profile.to_string())
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{username}", get(page::profile))
        .route("/{username}/edit", get(edit::edit_profile_page).post(edit::edit_profile))
}

pub async fn by_id<'e, E>(db: E, id: i64) -> AppResult<Option<Profile>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query_as(concat!(profile_query!(), " WHERE p.id=?"))
        .bind(id)
        .fetch_optional(db)
        .await?)
}

pub async fn by_user_id(db_pool: &SqlitePool, user_id: i64) -> AppResult<Option<Profile>> {
    Ok(sqlx::query_as(concat!(profile_query!(), " WHERE p.user_id=?"))
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn by_username(db_pool: &SqlitePool, username: &str) -> AppResult<Option<Profile>> {
    Ok(sqlx::query_as(concat!(profile_query!(), " WHERE u.username=?"))
        .bind(username)
        .fetch_optional(db_pool)
        .await?)
}

/// Writes identity and profile fields back.
pub async fn save(db_pool: &SqlitePool, profile: &Profile) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;

    sqlx::query("UPDATE users SET first_name=?,last_name=?,email=? WHERE id=?")
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.email)
        .bind(profile.user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE profiles SET country=?,blog_url=?,homepage_url=?,profile_picture=? WHERE id=?")
        .bind(&profile.country)
        .bind(&profile.blog_url)
        .bind(&profile.homepage_url)
        .bind(&profile.profile_picture)
        .bind(profile.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Destroys the identity; the profile goes with it.
pub async fn delete_user(db_pool: &SqlitePool, user_id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM users WHERE id=?")
        .bind(user_id)
        .execute(db_pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth, db};

    async fn count(db_pool: &SqlitePool, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db_pool)
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn identity_and_profile_live_and_die_together() {
        let db_pool = db::temporary().await;
        assert_eq!(count(&db_pool, "profiles").await, 0);

        let mut foo = auth::create_user(&db_pool, "foo", "foo@example.com", None).await.unwrap();
        foo.blog_url = "http://blog_url.com".to_owned();
        foo.homepage_url = "http://homepage_url.com".to_owned();
        save(&db_pool, &foo).await.unwrap();

        assert_eq!(count(&db_pool, "users").await, 1);
        assert_eq!(count(&db_pool, "profiles").await, 1);
        assert_eq!(foo.to_string(), "foo");

        let reloaded = by_user_id(&db_pool, foo.user_id).await.unwrap().unwrap();
        assert_eq!(reloaded.blog_url, "http://blog_url.com");
        assert_eq!(reloaded.homepage_url, "http://homepage_url.com");
        assert_eq!(reloaded.profile_picture.as_deref(), Some(DEFAULT_PICTURE));

        let second = auth::create_user(&db_pool, "user2", "", None).await.unwrap();
        assert_eq!(count(&db_pool, "users").await, 2);
        assert_eq!(count(&db_pool, "profiles").await, 2);

        delete_user(&db_pool, second.user_id).await.unwrap();
        assert_eq!(count(&db_pool, "users").await, 1);
        assert_eq!(count(&db_pool, "profiles").await, 1);
        assert!(by_username(&db_pool, "user2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn display_prefers_full_name() {
        let db_pool = db::temporary().await;
        let mut ana = auth::create_user(&db_pool, "ana", "", None).await.unwrap();
        ana.first_name = "Ana".to_owned();
        assert_eq!(ana.to_string(), "ana");
        ana.last_name = "Balica".to_owned();
        assert_eq!(ana.to_string(), "Ana Balica");
    }
}
