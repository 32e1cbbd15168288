//! News posts and resources.
//!
//! Both are community-scoped, authored, taggable items with a visibility flag
//! and share one table layout, so they share the queries and views here too.
//! [`Kind`] picks the tables and the permissions guarding them.

mod views;

use axum::{routing::get, Extension, Router};
use sqlx::{SqliteConnection, SqlitePool};
use time::{Date, OffsetDateTime};

use crate::{
    communities::Community,
    forms::ContentForm,
    permissions::Permission,
    AppResult, AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    News,
    Resource,
}

impl Kind {
    pub fn table(self) -> &'static str {
        match self {
            Kind::News => "news",
            Kind::Resource => "resources",
        }
    }

    fn tag_table(self) -> &'static str {
        match self {
            Kind::News => "news_tags",
            Kind::Resource => "resource_tags",
        }
    }

    fn tag_column(self) -> &'static str {
        match self {
            Kind::News => "news_id",
            Kind::Resource => "resource_id",
        }
    }

    fn columns(self) -> &'static str {
        match self {
            Kind::News => "id,title,slug,community_id,author_id,date_created,date_modified,is_public,content,\
                NULL AS resource_type_id",
            Kind::Resource => "id,title,slug,community_id,author_id,date_created,date_modified,is_public,content,\
                resource_type_id",
        }
    }

    /// Path segment under `/c/{community_slug}`.
    pub fn path(self) -> &'static str {
        self.table()
    }

    pub fn label(self) -> &'static str {
        match self {
            Kind::News => "News",
            Kind::Resource => "Resource",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Kind::News => "News",
            Kind::Resource => "Resources",
        }
    }

    pub fn add_perm(self) -> Permission {
        match self {
            Kind::News => Permission::AddCommunityNews,
            Kind::Resource => Permission::AddCommunityResource,
        }
    }

    pub fn change_perm(self) -> Permission {
        match self {
            Kind::News => Permission::ChangeCommunityNews,
            Kind::Resource => Permission::ChangeCommunityResource,
        }
    }

    pub fn delete_perm(self) -> Permission {
        match self {
            Kind::News => Permission::DeleteCommunityNews,
            Kind::Resource => Permission::DeleteCommunityResource,
        }
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Content {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub community_id: i64,
    pub author_id: i64,
    pub date_created: Date,
    pub date_modified: Date,
    pub is_public: bool,
    pub content: String,
    /// Always `None` for news.
    pub resource_type_id: Option<i64>,
}

impl Content {
    /// "{title} of {community} Community"
    pub fn describe(&self, community: &Community) -> String {
        format!("{} of {} Community", self.title, community.name)
    }
}

pub fn router(kind: Kind) -> Router<AppState> {
    Router::new()
        .route("/", get(views::list))
        .route("/add", get(views::add_page).post(views::add))
        .route("/{slug}", get(views::view))
        .route("/{slug}/edit", get(views::edit_page).post(views::edit))
        .route("/{slug}/delete", get(views::delete_page).post(views::delete))
        .layer(Extension(kind))
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Inserts an item from a validated form, with its tags.
pub async fn create(
    db_pool: &SqlitePool,
    kind: Kind,
    community_id: i64,
    author_id: i64,
    form: &ContentForm,
) -> AppResult<Content> {
    let mut tx = db_pool.begin().await?;
    let today = today();

    let sql = match kind {
        Kind::News => "INSERT INTO news (title,slug,community_id,author_id,date_created,date_modified,is_public,\
            content) VALUES (?,?,?,?,?,?,?,?) RETURNING id",
        Kind::Resource => "INSERT INTO resources (title,slug,community_id,author_id,date_created,date_modified,\
            is_public,content,resource_type_id) VALUES (?,?,?,?,?,?,?,?,?) RETURNING id",
    };
    let mut insert = sqlx::query_as::<_, (i64,)>(sql)
        .bind(&form.title)
        .bind(&form.slug)
        .bind(community_id)
        .bind(author_id)
        .bind(today)
        .bind(today)
        .bind(form.is_public)
        .bind(&form.content);
    if kind == Kind::Resource {
        insert = insert.bind(form.resource_type);
    }
    let (id,) = insert.fetch_one(&mut *tx).await?;

    set_tags(&mut tx, kind, id, &form.tags).await?;

    let item = sqlx::query_as::<_, Content>(&format!("SELECT {} FROM {} WHERE id=?", kind.columns(), kind.table()))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(kind = kind.label(), slug = %item.slug, community_id, "created");
    Ok(item)
}

/// Writes the item back and bumps `date_modified`.
pub async fn save(db_pool: &SqlitePool, kind: Kind, item: &mut Content) -> AppResult<()> {
    item.date_modified = today();
    let sql = match kind {
        Kind::News => "UPDATE news SET title=?,slug=?,is_public=?,content=?,date_modified=? WHERE id=?",
        Kind::Resource => "UPDATE resources SET title=?,slug=?,is_public=?,content=?,date_modified=?,\
            resource_type_id=? WHERE id=?",
    };
    let mut update = sqlx::query(sql)
        .bind(&item.title)
        .bind(&item.slug)
        .bind(item.is_public)
        .bind(&item.content)
        .bind(item.date_modified);
    if kind == Kind::Resource {
        update = update.bind(item.resource_type_id);
    }
    update.bind(item.id).execute(db_pool).await?;
    Ok(())
}

/// Applies an edit form: fields, then tags, in one go.
pub async fn update(db_pool: &SqlitePool, kind: Kind, item: &mut Content, form: &ContentForm) -> AppResult<()> {
    item.title = form.title.clone();
    item.slug = form.slug.clone();
    item.content = form.content.clone();
    item.is_public = form.is_public;
    if kind == Kind::Resource {
        item.resource_type_id = form.resource_type;
    }
    save(db_pool, kind, item).await?;

    let mut tx = db_pool.begin().await?;
    set_tags(&mut tx, kind, item.id, &form.tags).await?;
    tx.commit().await?;
    tracing::info!(kind = kind.label(), slug = %item.slug, "updated");
    Ok(())
}

async fn set_tags(conn: &mut SqliteConnection, kind: Kind, id: i64, tags: &[i64]) -> AppResult<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE {}=?", kind.tag_table(), kind.tag_column()))
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let insert = format!("INSERT OR IGNORE INTO {} ({},tag_id) VALUES (?,?)", kind.tag_table(), kind.tag_column());
    for tag_id in tags {
        sqlx::query(&insert)
            .bind(id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn delete(db_pool: &SqlitePool, kind: Kind, item: &Content) -> AppResult<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE id=?", kind.table()))
        .bind(item.id)
        .execute(db_pool)
        .await?;
    tracing::info!(kind = kind.label(), slug = %item.slug, "deleted");
    Ok(())
}

pub async fn by_slug(db_pool: &SqlitePool, kind: Kind, community_id: i64, slug: &str) -> AppResult<Option<Content>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE community_id=? AND slug=?",
        kind.columns(),
        kind.table()
    ))
    .bind(community_id)
    .bind(slug)
    .fetch_optional(db_pool)
    .await?)
}

/// Newest first; private items only when asked for.
pub async fn for_community(
    db_pool: &SqlitePool,
    kind: Kind,
    community_id: i64,
    include_private: bool,
) -> AppResult<Vec<Content>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE community_id=? AND (is_public OR ?) ORDER BY date_created DESC, id DESC",
        kind.columns(),
        kind.table()
    ))
    .bind(community_id)
    .bind(include_private)
    .fetch_all(db_pool)
    .await?)
}

/// Public items carrying the tag, across communities.
pub async fn with_tag(db_pool: &SqlitePool, kind: Kind, tag_id: i64) -> AppResult<Vec<Content>> {
    Ok(sqlx::query_as(&format!(
        "SELECT {} FROM {} WHERE is_public AND id IN (SELECT {} FROM {} WHERE tag_id=?) ORDER BY title",
        kind.columns(),
        kind.table(),
        kind.tag_column(),
        kind.tag_table(),
    ))
    .bind(tag_id)
    .fetch_all(db_pool)
    .await?)
}

pub async fn tag_ids(db_pool: &SqlitePool, kind: Kind, id: i64) -> AppResult<Vec<i64>> {
    Ok(sqlx::query_as::<_, (i64,)>(&format!(
        "SELECT tag_id FROM {} WHERE {}=? ORDER BY tag_id",
        kind.tag_table(),
        kind.tag_column()
    ))
    .bind(id)
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(|(tag_id,)| tag_id)
    .collect())
}

/// Whether another item of the same kind already uses `slug`.
pub async fn slug_taken(db_pool: &SqlitePool, kind: Kind, slug: &str, exclude: Option<i64>) -> AppResult<bool> {
    Ok(sqlx::query(&format!("SELECT 1 FROM {} WHERE slug=? AND id IS NOT ?", kind.table()))
        .bind(slug)
        .bind(exclude)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::fixtures, tags};

    fn form(title: &str, slug: &str, tags: Vec<i64>) -> ContentForm {
        ContentForm {
            title: title.to_owned(),
            slug: slug.to_owned(),
            content: "Some content".to_owned(),
            tags,
            ..ContentForm::blank()
        }
    }

    #[tokio::test]
    async fn reverse_lookups_find_the_item() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "foo").await;
        let community = fixtures::community(&db_pool, "Foo", &admin).await;
        let tag = tags::create_tag(&db_pool, "foo").await.unwrap();

        for kind in [Kind::News, Kind::Resource] {
            let item = create(&db_pool, kind, community.id, admin.id, &form("Bar", "bar", vec![tag.id]))
                .await
                .unwrap();
            assert_eq!(item.describe(&community), "Bar of Foo Community");
            assert_eq!(item.date_created, item.date_modified);

            assert_eq!(for_community(&db_pool, kind, community.id, false).await.unwrap(), [item.clone()]);
            assert_eq!(with_tag(&db_pool, kind, tag.id).await.unwrap(), [item.clone()]);
            assert_eq!(tag_ids(&db_pool, kind, item.id).await.unwrap(), [tag.id]);
        }
    }

    #[tokio::test]
    async fn visibility_toggle_is_observable() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "foo").await;
        let community = fixtures::community(&db_pool, "Foo", &admin).await;
        let mut item = create(&db_pool, Kind::Resource, community.id, admin.id, &form("Bar", "bar", vec![]))
            .await
            .unwrap();
        assert!(item.is_public);

        item.is_public = false;
        assert!(!item.is_public);
        save(&db_pool, Kind::Resource, &mut item).await.unwrap();

        assert!(for_community(&db_pool, Kind::Resource, community.id, false).await.unwrap().is_empty());
        let stored = by_slug(&db_pool, Kind::Resource, community.id, "bar").await.unwrap().unwrap();
        assert!(!stored.is_public);
        assert_eq!(for_community(&db_pool, Kind::Resource, community.id, true).await.unwrap(), [stored]);
    }

    #[tokio::test]
    async fn slugs_are_unique_per_kind() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "foo").await;
        let community = fixtures::community(&db_pool, "Foo", &admin).await;
        let news = create(&db_pool, Kind::News, community.id, admin.id, &form("Bar", "bar", vec![]))
            .await
            .unwrap();

        assert!(slug_taken(&db_pool, Kind::News, "bar", None).await.unwrap());
        assert!(!slug_taken(&db_pool, Kind::News, "bar", Some(news.id)).await.unwrap());
        assert!(!slug_taken(&db_pool, Kind::Resource, "bar", None).await.unwrap());
        assert!(create(&db_pool, Kind::News, community.id, admin.id, &form("Baz", "bar", vec![])).await.is_err());
    }

    #[tokio::test]
    async fn update_replaces_tags_and_type() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "foo").await;
        let community = fixtures::community(&db_pool, "Foo", &admin).await;
        let rust = tags::create_tag(&db_pool, "rust").await.unwrap();
        let sql = tags::create_tag(&db_pool, "sql").await.unwrap();
        let guide = tags::create_resource_type(&db_pool, "guide").await.unwrap();

        let mut item = create(&db_pool, Kind::Resource, community.id, admin.id, &form("Bar", "bar", vec![rust.id]))
            .await
            .unwrap();
        let mut edit = form("Bar 2", "bar-2", vec![sql.id]);
        edit.resource_type = Some(guide.id);
        update(&db_pool, Kind::Resource, &mut item, &edit).await.unwrap();

        let stored = by_slug(&db_pool, Kind::Resource, community.id, "bar-2").await.unwrap().unwrap();
        assert_eq!(stored, item);
        assert_eq!(stored.resource_type_id, Some(guide.id));
        assert_eq!(tag_ids(&db_pool, Kind::Resource, item.id).await.unwrap(), [sql.id]);

        sqlx::query("DELETE FROM resource_types WHERE id=?").bind(guide.id).execute(&db_pool).await.unwrap();
        let stored = by_slug(&db_pool, Kind::Resource, community.id, "bar-2").await.unwrap().unwrap();
        assert_eq!(stored.resource_type_id, None);
    }

    #[tokio::test]
    async fn deleting_the_community_takes_its_content() {
        let db_pool = fixtures::provisioned().await;
        let admin = fixtures::profile(&db_pool, "foo").await;
        let community = fixtures::community(&db_pool, "Foo", &admin).await;
        create(&db_pool, Kind::News, community.id, admin.id, &form("Bar", "bar", vec![])).await.unwrap();

        sqlx::query("DELETE FROM communities WHERE id=?").bind(community.id).execute(&db_pool).await.unwrap();
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news").fetch_one(&db_pool).await.unwrap();
        assert_eq!(n, 0);
    }
}
