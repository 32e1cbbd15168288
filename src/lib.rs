pub mod appresult;
pub mod auth;
pub mod communities;
pub mod config;
pub mod content;
pub mod db;
pub mod forms;
pub mod index;
pub mod pages;
pub mod permissions;
pub mod profiles;
pub mod res;
pub mod session;
pub mod tags;

use std::path::PathBuf;

use anyhow::anyhow;
use axum::{extract::FromRef, routing::get, Router};
use serde_json::Value;
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult, OrNotFound};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    /// Where uploaded profile pictures are written.
    pub media_root: PathBuf,
}

/// Every route of the portal. Session and trace layers are added by the caller.
pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index))
        .merge(auth::router())
        .nest("/users", profiles::router())
        .merge(communities::router())
        .nest("/c/{community_slug}/news", content::router(content::Kind::News))
        .nest("/c/{community_slug}/resources", content::router(content::Kind::Resource))
        .nest("/c/{community_slug}/pages", pages::router())
        .merge(tags::router())
        .with_state(app_state)
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or_else(|| anyhow!("expected {field} in {self}"))?
            .as_str()
            .ok_or_else(|| anyhow!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }
}

/// Renders user-written Markdown. Raw HTML in the source comes out as text.
pub fn markdown(source: &str) -> String {
    use pulldown_cmark::{Event, Options, Parser};

    let parser = Parser::new_ext(source, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH)
        .map(|event| match event {
            Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
            _ => event,
        });

    let mut html_output = String::new();
    pulldown_cmark::html::push_html(&mut html_output, parser);
    html_output.replace('{', "&#123;").replace('}', "&#125;")
}
