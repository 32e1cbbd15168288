use axum::{debug_handler, extract::State, response::{Html, IntoResponse, Response}};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{auth::CurrentUser, communities, include_res, profiles, res, AppResult};

#[debug_handler]
pub async fn index(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let greeting = match CurrentUser::from_session(&session, &db_pool).await? {
        Some(CurrentUser(profile)) => format!(
            "Hello, {}. <a href=\"/logout\">Log out</a>",
            profiles::link(&profile)
        ),
        None => "<a href=\"/login\">Log in</a>".to_owned(),
    };

    let mut community_items = String::new();
    for community in communities::top_level(&db_pool).await? {
        community_items += &include_res!(str, "/pages/community_item.html")
            .replace("{link}", &communities::link(&community))
            .replace("{slug}", &res::urlencode(&community.slug));
    }

    Ok(
        Html(res::page(
            "Communities",
            &include_res!(str, "/pages/index.html")
                .replace("{greeting}", &greeting)
                .replace("{community_items}", &community_items),
        )).into_response()
    )
}
