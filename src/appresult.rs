use axum::{http::StatusCode, response::{Html, IntoResponse, Redirect, Response}};

use crate::res;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    NotFound,
    Forbidden,
    /// Carries the path to come back to after logging in.
    LoginRequired(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Html(res::sorry("Page not found", "Nothing lives at this address.")),
            ).into_response(),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                Html(res::sorry("Forbidden", "You don't have permission to do that here.")),
            ).into_response(),
            AppError::LoginRequired(return_url) => {
                Redirect::to(&format!("/login?return_url={}", res::urlencode(&return_url))).into_response()
            }
            AppError::Internal(err) => {
                tracing::error!("{err:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(res::sorry("Something broke", "The error has been logged.")),
                ).into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

/// 404 for anything that came back as an `Option`.
pub trait OrNotFound<T> {
    fn or_not_found(self) -> AppResult<T>;
}

impl<T> OrNotFound<T> for Option<T> {
    fn or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_redirect_keeps_return_url() {
        let response = AppError::LoginRequired("/c/foo/news/add?x=1".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "/login?return_url=/c/foo/news/add%3Fx%3D1"
        );
    }

    #[test]
    fn missing_option_is_not_found() {
        let missing: Option<u8> = None;
        assert!(matches!(missing.or_not_found(), Err(AppError::NotFound)));
        assert_eq!(Some(3).or_not_found().ok(), Some(3));
    }
}
