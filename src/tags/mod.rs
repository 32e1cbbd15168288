//! Tags and resource types: flat lookup tables managed by superusers.

mod views;

use axum::{routing::{get, post}, Router};
use sqlx::SqlitePool;

use crate::{AppResult, AppState};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ResourceType {
    pub id: i64,
    pub name: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(views::tags).post(views::add_tag))
        .route("/tags/{tag_id}", get(views::tagged))
        .route("/resource-types", post(views::add_resource_type))
}

pub async fn create_tag(db_pool: &SqlitePool, name: &str) -> AppResult<Tag> {
    let tag = sqlx::query_as("INSERT INTO tags (name) VALUES (?) RETURNING id,name")
        .bind(name)
        .fetch_one(db_pool)
        .await?;
    tracing::info!(name, "tag added");
    Ok(tag)
}

pub async fn create_resource_type(db_pool: &SqlitePool, name: &str) -> AppResult<ResourceType> {
    let resource_type = sqlx::query_as("INSERT INTO resource_types (name) VALUES (?) RETURNING id,name")
        .bind(name)
        .fetch_one(db_pool)
        .await?;
    tracing::info!(name, "resource type added");
    Ok(resource_type)
}

pub async fn all_tags(db_pool: &SqlitePool) -> AppResult<Vec<Tag>> {
    Ok(sqlx::query_as("SELECT id,name FROM tags ORDER BY name")
        .fetch_all(db_pool)
        .await?)
}

pub async fn all_resource_types(db_pool: &SqlitePool) -> AppResult<Vec<ResourceType>> {
    Ok(sqlx::query_as("SELECT id,name FROM resource_types ORDER BY name")
        .fetch_all(db_pool)
        .await?)
}

pub async fn tag_by_id(db_pool: &SqlitePool, id: i64) -> AppResult<Option<Tag>> {
    Ok(sqlx::query_as("SELECT id,name FROM tags WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn resource_type_by_id(db_pool: &SqlitePool, id: i64) -> AppResult<Option<ResourceType>> {
    Ok(sqlx::query_as("SELECT id,name FROM resource_types WHERE id=?")
        .bind(id)
        .fetch_optional(db_pool)
        .await?)
}

/// Tags by id, in name order; unknown ids are skipped.
pub async fn tags_by_ids(db_pool: &SqlitePool, ids: &[i64]) -> AppResult<Vec<Tag>> {
    let mut tags = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(tag) = tag_by_id(db_pool, *id).await? {
            tags.push(tag);
        }
    }
    tags.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tags)
}

/// The ids in `ids` that name no tag.
pub async fn missing_tags(db_pool: &SqlitePool, ids: &[i64]) -> AppResult<Vec<i64>> {
    let mut missing = Vec::new();
    for id in ids {
        if tag_by_id(db_pool, *id).await?.is_none() {
            missing.push(*id);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn lookups() {
        let db_pool = db::temporary().await;
        let rust = create_tag(&db_pool, "rust").await.unwrap();
        let async_tag = create_tag(&db_pool, "async").await.unwrap();
        let guide = create_resource_type(&db_pool, "guide").await.unwrap();

        let names: Vec<String> = all_tags(&db_pool).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["async", "rust"]);
        assert_eq!(all_resource_types(&db_pool).await.unwrap(), [guide.clone()]);
        assert_eq!(resource_type_by_id(&db_pool, guide.id).await.unwrap(), Some(guide));

        assert_eq!(tags_by_ids(&db_pool, &[rust.id, 99, async_tag.id]).await.unwrap(), [async_tag, rust.clone()]);
        assert_eq!(missing_tags(&db_pool, &[rust.id, 99]).await.unwrap(), [99]);
    }
}
