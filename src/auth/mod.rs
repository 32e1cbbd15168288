use axum::{
    extract::{FromRef, FromRequestParts, OriginalUri},
    http::request::Parts,
    routing::get,
    Router,
};
use rand::seq::IndexedRandom;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    config::SuperuserSeed,
    profiles::{self, Profile},
    session::USER_ID,
    AppError, AppResult, AppState,
};

mod clients;
mod lockin;
mod login;
mod logout;

pub use clients::Clients;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

/// Inserts an identity and its profile in one go.
pub async fn create_user(
    db_pool: &SqlitePool,
    username: &str,
    email: &str,
    external_id: Option<&str>,
) -> AppResult<Profile> {
    let mut tx = db_pool.begin().await?;

    let (user_id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (username,email,external_id,date_joined) VALUES (?,?,?,?) RETURNING id",
    )
    .bind(username)
    .bind(email)
    .bind(external_id)
    .bind(OffsetDateTime::now_utc().date())
    .fetch_one(&mut *tx)
    .await?;

    let (profile_id,): (i64,) = sqlx::query_as("INSERT INTO profiles (user_id) VALUES (?) RETURNING id")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    let profile = profiles::by_id(&mut *tx, profile_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("profile {profile_id} vanished mid-transaction"))?;

    tx.commit().await?;
    tracing::info!("adding @{username} #{user_id}");
    Ok(profile)
}

/// Looks up the identity behind an OAuth login, binding a seeded account with
/// the same email or creating a fresh one on first sight.
pub(crate) async fn find_or_create_user(
    db_pool: &SqlitePool,
    external_id: &str,
    email: &str,
    display_name: Option<&str>,
) -> AppResult<Profile> {
    let known: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE external_id=?")
        .bind(external_id)
        .fetch_optional(db_pool)
        .await?;
    if let Some((user_id,)) = known {
        return profiles::by_user_id(db_pool, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {user_id} has no profile").into());
    }

    if !email.is_empty() {
        let seeded: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email=? AND external_id IS NULL")
            .bind(email)
            .fetch_optional(db_pool)
            .await?;
        if let Some((user_id,)) = seeded {
            sqlx::query("UPDATE users SET external_id=? WHERE id=?")
                .bind(external_id)
                .bind(user_id)
                .execute(db_pool)
                .await?;
            tracing::info!(user_id, "bound seeded account to its first login");
            return profiles::by_user_id(db_pool, user_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("user {user_id} has no profile").into());
        }
    }

    let username = username_for(email, display_name);
    let mut profile = create_user(db_pool, &username, email, Some(external_id)).await?;

    let (first_name, last_name) = match display_name {
        Some(name) => split_name(name),
        None => split_name(&random_alias()),
    };
    profile.first_name = first_name;
    profile.last_name = last_name;
    profiles::save(db_pool, &profile).await?;
    Ok(profile)
}

fn username_for(email: &str, display_name: Option<&str>) -> String {
    let base = email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .map(slug::slugify)
        .or_else(|| display_name.map(slug::slugify))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "user".to_owned());
    // Uniqueness comes from the suffix, not from probing the table.
    format!("{base}-{}", &Uuid::now_v7().simple().to_string()[24..])
}

fn split_name(name: &str) -> (String, String) {
    match name.trim().split_once(' ') {
        Some((first, last)) => (first.to_owned(), last.trim().to_owned()),
        None => (name.trim().to_owned(), String::new()),
    }
}

fn random_alias() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy",
    ];
    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Panda", "Phoenix", "Griffin", "Turtle", "Dolphin",
    ];

    let mut rng = rand::rng();
    match (adjectives.choose(&mut rng), nouns.choose(&mut rng)) {
        (Some(adjective), Some(noun)) => format!("{adjective} {noun}"),
        _ => "Nameless User".to_owned(),
    }
}

/// Creates the configured superuser if missing. It gets bound to a real login
/// the first time someone signs in with the same email.
pub async fn seed_superuser(db_pool: &SqlitePool, seed: &SuperuserSeed) -> AppResult<()> {
    let profile = match profiles::by_username(db_pool, &seed.username).await? {
        Some(profile) => profile,
        None => create_user(db_pool, &seed.username, &seed.email, None).await?,
    };

    if !profile.is_superuser {
        sqlx::query("UPDATE users SET is_superuser=TRUE WHERE id=?")
            .bind(profile.user_id)
            .execute(db_pool)
            .await?;
        tracing::info!(username = %seed.username, "seeded superuser");
    }
    Ok(())
}

/// Only local paths, so the login flow can't be used as an open redirect.
pub(crate) fn safe_return_url(return_url: Option<String>) -> String {
    return_url
        .filter(|url| url.starts_with('/') && !url.starts_with("//"))
        .unwrap_or_else(|| "/".to_owned())
}

/// The logged in user's profile, loaded from the session.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Profile);

impl CurrentUser {
    pub async fn from_session(session: &Session, db_pool: &SqlitePool) -> AppResult<Option<CurrentUser>> {
        let Some(user_id) = session.get::<i64>(USER_ID).await? else {
            return Ok(None);
        };
        Ok(profiles::by_user_id(db_pool, user_id).await?.map(CurrentUser))
    }
}

/// Rejects with a redirect to the login page when nobody is logged in.
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let return_url = match parts.extensions.get::<OriginalUri>() {
            Some(OriginalUri(uri)) => uri.to_string(),
            None => parts.uri.to_string(),
        };

        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(anyhow::anyhow!(msg)))?;
        let db_pool = SqlitePool::from_ref(state);

        CurrentUser::from_session(&session, &db_pool)
            .await?
            .ok_or(AppError::LoginRequired(return_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn first_login_creates_identity_and_profile() {
        let db_pool = db::temporary().await;
        let profile = find_or_create_user(&db_pool, "ext-1", "ada@example.com", Some("Ada Lovelace"))
            .await
            .unwrap();
        assert!(profile.username.starts_with("ada-"));
        assert_eq!(profile.to_string(), "Ada Lovelace");

        let again = find_or_create_user(&db_pool, "ext-1", "ada@example.com", None).await.unwrap();
        assert_eq!(again.id, profile.id);
    }

    #[tokio::test]
    async fn seeded_superuser_is_bound_by_email() {
        let db_pool = db::temporary().await;
        let seed = SuperuserSeed { username: "root".to_owned(), email: "root@example.com".to_owned() };
        seed_superuser(&db_pool, &seed).await.unwrap();
        seed_superuser(&db_pool, &seed).await.unwrap();

        let profile = find_or_create_user(&db_pool, "ext-9", "root@example.com", None).await.unwrap();
        assert_eq!(profile.username, "root");
        assert!(profile.is_superuser);
    }

    #[test]
    fn return_urls_stay_local() {
        assert_eq!(safe_return_url(Some("/c/foo".to_owned())), "/c/foo");
        assert_eq!(safe_return_url(Some("//evil.example".to_owned())), "/");
        assert_eq!(safe_return_url(Some("https://evil.example".to_owned())), "/");
        assert_eq!(safe_return_url(None), "/");
    }

    #[test]
    fn names_split_on_first_space() {
        assert_eq!(split_name("Grace Brewster Hopper"), ("Grace".to_owned(), "Brewster Hopper".to_owned()));
        assert_eq!(split_name("Cher"), ("Cher".to_owned(), String::new()));
    }
}
