use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};

use crate::AppResult;

/// Opens the pool, creating the database file and running pending migrations.
pub async fn connect(url: &str, max_connections: u32) -> AppResult<SqlitePool> {
    if !Sqlite::database_exists(url).await? {
        Sqlite::create_database(url).await?;
    }

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;
    Ok(db_pool)
}

/// Fresh in-memory database, one per call.
#[cfg(test)]
pub(crate) async fn temporary() -> SqlitePool {
    connect("sqlite::memory:", 4).await.expect("in-memory database")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use sqlx::SqlitePool;

    use crate::{
        auth,
        communities::{self, NewCommunity},
        permissions,
        profiles::Profile,
    };

    pub(crate) async fn provisioned() -> SqlitePool {
        let db_pool = super::temporary().await;
        permissions::provision(&db_pool).await.unwrap();
        db_pool
    }

    pub(crate) async fn profile(db_pool: &SqlitePool, username: &str) -> Profile {
        auth::create_user(db_pool, username, "", None).await.unwrap()
    }

    pub(crate) async fn community(db_pool: &SqlitePool, name: &str, admin: &Profile) -> communities::Community {
        communities::create(db_pool, NewCommunity {
            name: name.to_owned(),
            slug: slug::slugify(name),
            community_admin_id: admin.id,
            parent_community_id: None,
        })
        .await
        .unwrap()
    }
}
