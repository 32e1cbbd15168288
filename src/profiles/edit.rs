use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::Bytes,
    debug_handler,
    extract::{Multipart, Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    forms::{FormData, FormErrors, UserForm},
    include_res, res, AppError, AppResult, AppState, OrNotFound,
};

use super::{Profile, DEFAULT_PICTURE};

const PICTURE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Lowercased extension of an accepted picture file name.
fn picture_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    PICTURE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Only the owner gets past this.
async fn own_profile(db_pool: &SqlitePool, user: &Profile, username: &str) -> AppResult<Profile> {
    let profile = super::by_username(db_pool, username).await?.or_not_found()?;
    if profile.id != user.id {
        tracing::info!(user = %user.username, target = %profile.username, "refusing to edit someone else's profile");
        return Err(AppError::Forbidden);
    }
    Ok(profile)
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit_profile_page(
    Path(username): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Response> {
    let profile = own_profile(&db_pool, &user, &username).await?;
    let form = UserForm {
        first_name: profile.first_name.clone(),
        last_name: profile.last_name.clone(),
        email: Some(profile.email.clone()).filter(|e| !e.is_empty()),
        country: profile.country.clone().unwrap_or_default(),
        blog_url: Some(profile.blog_url.clone()).filter(|u| !u.is_empty()),
        homepage_url: Some(profile.homepage_url.clone()).filter(|u| !u.is_empty()),
    };
    Ok(render(&profile, &form, &FormErrors::default()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn edit_profile(
    Path(username): Path<String>,
    CurrentUser(user): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(media_root): State<PathBuf>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut profile = own_profile(&db_pool, &user, &username).await?;

    let mut data = FormData::default();
    let mut picture: Option<(String, Bytes)> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "profile_picture" {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let bytes = field.bytes().await?;
            if !bytes.is_empty() {
                picture = Some((file_name, bytes));
            }
        } else {
            data.push(&name, field.text().await?);
        }
    }

    let (form, mut errors) = match UserForm::parse(&data) {
        Ok(form) => (form, FormErrors::default()),
        Err((form, errors)) => (form, errors),
    };
    let extension = match &picture {
        Some((file_name, _)) => {
            let extension = picture_extension(file_name);
            if extension.is_none() {
                errors.add(
                    "profile_picture",
                    "Upload a valid image. Accepted formats are jpg, jpeg, png, gif and webp.",
                );
            }
            extension
        }
        None => None,
    };
    if !errors.is_empty() {
        return Ok(render(&profile, &form, &errors));
    }

    profile.first_name = form.first_name;
    profile.last_name = form.last_name;
    profile.email = form.email.unwrap_or_default();
    profile.country = Some(form.country).filter(|c| !c.is_empty());
    profile.blog_url = form.blog_url.unwrap_or_default();
    profile.homepage_url = form.homepage_url.unwrap_or_default();

    let picture = match (&picture, &extension) {
        (Some((_, bytes)), Some(extension)) => Some((&bytes[..], extension.as_str())),
        _ => None,
    };
    save_with_picture(&db_pool, &media_root, &mut profile, picture).await?;
    tracing::info!(user = %profile.username, "profile updated");

    Ok(Redirect::to(&format!("/users/{}", res::urlencode(&profile.username))).into_response())
}

/// Saves the profile, switching to the uploaded picture if there is one.
/// The old file goes only once the row points at the new one; a failed save
/// takes the new file back out.
async fn save_with_picture(
    db_pool: &SqlitePool,
    media_root: &FsPath,
    profile: &mut Profile,
    picture: Option<(&[u8], &str)>,
) -> AppResult<()> {
    let Some((bytes, extension)) = picture else {
        return super::save(db_pool, profile).await;
    };

    let stored = store_picture(media_root, bytes, extension).await?;
    let old = profile.profile_picture.replace(stored.clone());
    if let Err(err) = super::save(db_pool, profile).await {
        remove_picture(media_root, &stored).await;
        profile.profile_picture = old;
        return Err(err);
    }
    if let Some(old) = old {
        remove_picture(media_root, &old).await;
    }
    Ok(())
}

/// Writes the upload under `photos/` and returns its path relative to the media root.
async fn store_picture(media_root: &FsPath, bytes: &[u8], extension: &str) -> AppResult<String> {
    let relative = format!("photos/{}.{extension}", Uuid::now_v7().simple());
    let path = media_root.join(&relative);
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(&path, bytes).await?;
    Ok(relative)
}

/// The shared default picture is never removed.
async fn remove_picture(media_root: &FsPath, relative: &str) {
    if relative == DEFAULT_PICTURE || relative.is_empty() {
        return;
    }
    if let Err(err) = tokio::fs::remove_file(media_root.join(relative)).await {
        tracing::warn!("couldn't remove old picture {relative}: {err}");
    }
}

fn render(profile: &Profile, form: &UserForm, errors: &FormErrors) -> Response {
    let value = |v: &Option<String>| res::escape(v.as_deref().unwrap_or_default());

    Html(res::page(
        "Edit profile",
        &include_res!(str, "/pages/profiles/edit.html")
            .replace("{action}", &format!("/users/{}/edit", res::urlencode(&profile.username)))
            .replace("{first_name}", &res::escape(&form.first_name))
            .replace("{first_name_errors}", &errors.render("first_name"))
            .replace("{last_name}", &res::escape(&form.last_name))
            .replace("{last_name_errors}", &errors.render("last_name"))
            .replace("{email}", &value(&form.email))
            .replace("{email_errors}", &errors.render("email"))
            .replace("{country}", &res::escape(&form.country))
            .replace("{country_errors}", &errors.render("country"))
            .replace("{blog_url}", &value(&form.blog_url))
            .replace("{blog_url_errors}", &errors.render("blog_url"))
            .replace("{homepage_url}", &value(&form.homepage_url))
            .replace("{homepage_url_errors}", &errors.render("homepage_url"))
            .replace("{picture_errors}", &errors.render("profile_picture")),
    )).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;

    #[test]
    fn only_image_extensions_are_accepted() {
        assert_eq!(picture_extension("me.JPG").as_deref(), Some("jpg"));
        assert_eq!(picture_extension("archive.tar.webp").as_deref(), Some("webp"));
        assert_eq!(picture_extension("script.sh"), None);
        assert_eq!(picture_extension("noextension"), None);
    }

    #[tokio::test]
    async fn replacing_a_picture_keeps_the_default() {
        let media_root = std::env::temp_dir().join(format!("sysportal-{}", Uuid::now_v7().simple()));
        let first = store_picture(&media_root, b"one", "png").await.unwrap();
        assert!(first.starts_with("photos/") && first.ends_with(".png"));
        assert!(media_root.join(&first).exists());

        remove_picture(&media_root, &first).await;
        assert!(!media_root.join(&first).exists());

        let default = media_root.join(DEFAULT_PICTURE);
        tokio::fs::write(&default, b"dummy").await.unwrap();
        remove_picture(&media_root, DEFAULT_PICTURE).await;
        assert!(default.exists());

        tokio::fs::remove_dir_all(&media_root).await.unwrap();
    }

    #[tokio::test]
    async fn picture_swaps_only_after_the_row_is_saved() {
        let db_pool = fixtures::provisioned().await;
        let media_root = std::env::temp_dir().join(format!("sysportal-{}", Uuid::now_v7().simple()));
        let mut profile = fixtures::profile(&db_pool, "ada").await;

        let old = store_picture(&media_root, b"old", "png").await.unwrap();
        profile.profile_picture = Some(old.clone());
        super::super::save(&db_pool, &profile).await.unwrap();

        save_with_picture(&db_pool, &media_root, &mut profile, Some((&b"new"[..], "jpg"))).await.unwrap();
        let new = profile.profile_picture.clone().unwrap();
        assert!(new.ends_with(".jpg"));
        assert!(media_root.join(&new).exists());
        assert!(!media_root.join(&old).exists());
        let stored = super::super::by_id(&db_pool, profile.id).await.unwrap().unwrap();
        assert_eq!(stored.profile_picture.as_deref(), Some(new.as_str()));

        db_pool.close().await;
        assert!(save_with_picture(&db_pool, &media_root, &mut profile, Some((&b"newer"[..], "gif"))).await.is_err());
        assert_eq!(profile.profile_picture.as_deref(), Some(new.as_str()));
        assert!(media_root.join(&new).exists());
        let mut photos = tokio::fs::read_dir(media_root.join("photos")).await.unwrap();
        let mut count = 0;
        while photos.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);

        tokio::fs::remove_dir_all(&media_root).await.unwrap();
    }
}
