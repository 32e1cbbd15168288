//! Static pages bound to a community.
//!
//! A community page is a titled, slugged entry that owns exactly one `pages`
//! row holding the actual text. Deleting the entry deletes its page too.

mod views;

use axum::{routing::get, Router};
use sqlx::SqlitePool;

use crate::{communities::Community, forms::PageForm, AppResult, AppState};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CommunityPage {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub page_id: i64,
    pub community_id: i64,
    pub content: String,
    pub template: String,
}

impl CommunityPage {
    pub fn describe(&self, community: &Community) -> String {
        format!("{} of {} Community", self.title, community.name)
    }
}

macro_rules! page_query {
    () => {
        "SELECT cp.id,cp.title,cp.slug,cp.page_id,cp.community_id,p.content,p.template \
        FROM community_pages cp JOIN pages p ON p.id=cp.page_id"
    };
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(views::manage))
        .route("/add", get(views::add_page).post(views::add))
        .route("/{slug}", get(views::view))
        .route("/{slug}/edit", get(views::edit_page).post(views::edit))
        .route("/{slug}/delete", get(views::delete_page).post(views::delete))
}

pub async fn create(db_pool: &SqlitePool, community_id: i64, form: &PageForm) -> AppResult<CommunityPage> {
    let mut tx = db_pool.begin().await?;

    let (page_id,): (i64,) = sqlx::query_as("INSERT INTO pages (title,content) VALUES (?,?) RETURNING id")
        .bind(&form.title)
        .bind(&form.content)
        .fetch_one(&mut *tx)
        .await?;

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO community_pages (title,slug,page_id,community_id) VALUES (?,?,?,?) RETURNING id",
    )
    .bind(&form.title)
    .bind(&form.slug)
    .bind(page_id)
    .bind(community_id)
    .fetch_one(&mut *tx)
    .await?;

    let page = sqlx::query_as(concat!(page_query!(), " WHERE cp.id=?"))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(slug = %form.slug, community_id, "page created");
    Ok(page)
}

pub async fn update(db_pool: &SqlitePool, page: &mut CommunityPage, form: &PageForm) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;

    sqlx::query("UPDATE community_pages SET title=?,slug=? WHERE id=?")
        .bind(&form.title)
        .bind(&form.slug)
        .bind(page.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE pages SET title=?,content=? WHERE id=?")
        .bind(&form.title)
        .bind(&form.content)
        .bind(page.page_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    page.title = form.title.clone();
    page.slug = form.slug.clone();
    page.content = form.content.clone();
    Ok(())
}

pub async fn delete(db_pool: &SqlitePool, page: &CommunityPage) -> AppResult<()> {
    // community_pages goes with it
    sqlx::query("DELETE FROM pages WHERE id=?")
        .bind(page.page_id)
        .execute(db_pool)
        .await?;
    tracing::info!(slug = %page.slug, "page deleted");
    Ok(())
}

pub async fn by_slug(db_pool: &SqlitePool, community_id: i64, slug: &str) -> AppResult<Option<CommunityPage>> {
    Ok(sqlx::query_as(concat!(page_query!(), " WHERE cp.community_id=? AND cp.slug=?"))
        .bind(community_id)
        .bind(slug)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn for_community(db_pool: &SqlitePool, community_id: i64) -> AppResult<Vec<CommunityPage>> {
    Ok(sqlx::query_as(concat!(page_query!(), " WHERE cp.community_id=? ORDER BY cp.title"))
        .bind(community_id)
        .fetch_all(db_pool)
        .await?)
}

pub async fn slug_taken(db_pool: &SqlitePool, slug: &str, exclude: Option<i64>) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM community_pages WHERE slug=? AND id IS NOT ?")
        .bind(slug)
        .bind(exclude)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;

    fn form(title: &str, slug: &str) -> PageForm {
        PageForm { title: title.to_owned(), slug: slug.to_owned(), content: "Hello".to_owned() }
    }

    async fn count(db_pool: &SqlitePool, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db_pool)
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn page_is_owned_one_to_one() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "foo").await;
        let community = fixtures::community(&db_pool, "Foo", &admin).await;

        let mut page = create(&db_pool, community.id, &form("About", "about")).await.unwrap();
        assert_eq!(page.describe(&community), "About of Foo Community");
        assert_eq!(page.template, "page_template.html");
        assert_eq!(for_community(&db_pool, community.id).await.unwrap(), [page.clone()]);

        let duplicate = sqlx::query("INSERT INTO community_pages (title,slug,page_id,community_id) VALUES (?,?,?,?)")
            .bind("Copy")
            .bind("copy")
            .bind(page.page_id)
            .bind(community.id)
            .execute(&db_pool)
            .await;
        assert!(duplicate.is_err());

        update(&db_pool, &mut page, &PageForm { content: "Changed".to_owned(), ..form("About us", "about-us") })
            .await
            .unwrap();
        let stored = by_slug(&db_pool, community.id, "about-us").await.unwrap().unwrap();
        assert_eq!(stored, page);
        assert!(slug_taken(&db_pool, "about-us", None).await.unwrap());
        assert!(!slug_taken(&db_pool, "about-us", Some(page.id)).await.unwrap());

        delete(&db_pool, &page).await.unwrap();
        assert_eq!(count(&db_pool, "pages").await, 0);
        assert_eq!(count(&db_pool, "community_pages").await, 0);
    }

    #[tokio::test]
    async fn pages_follow_their_community() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "foo").await;
        let community = fixtures::community(&db_pool, "Foo", &admin).await;
        create(&db_pool, community.id, &form("About", "about")).await.unwrap();

        sqlx::query("DELETE FROM communities WHERE id=?").bind(community.id).execute(&db_pool).await.unwrap();
        assert_eq!(count(&db_pool, "community_pages").await, 0);
    }
}
