//! Boundary checks for client-supplied fields. Every failure maps to a
//! 400 with a message naming the offending field.

use serde::Deserialize;

use crate::db::models::{NewPost, ProfileUpdate};
use crate::error::{AppError, AppResult};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 6;
/// bcrypt only reads this many bytes of input.
pub const PASSWORD_MAX_BYTES: usize = 72;
pub const BIO_MAX: usize = 150;
pub const CAPTION_MAX: usize = 2200;
pub const COMMENT_MAX: usize = 500;
pub const IMAGES_MAX: usize = 10;
pub const FULL_NAME_MAX: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
}

fn bad(message: impl Into<String>) -> AppError {
    AppError::BadRequest(message.into())
}

pub fn username(value: &str) -> AppResult<String> {
    let name = value.trim().to_lowercase();
    let len = name.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(bad(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_')
    {
        return Err(bad(
            "Username may only contain letters, numbers, periods and underscores",
        ));
    }
    Ok(name)
}

pub fn email(value: &str) -> AppResult<String> {
    let email = value.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(bad("Please enter a valid email"));
    }
    Ok(email)
}

pub fn password(value: &str) -> AppResult<()> {
    if value.chars().count() < PASSWORD_MIN {
        return Err(bad(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN
        )));
    }
    if value.len() > PASSWORD_MAX_BYTES {
        return Err(bad(format!(
            "Password cannot exceed {} bytes",
            PASSWORD_MAX_BYTES
        )));
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(bad(format!("{} cannot exceed {} characters", field, max)));
    }
    Ok(())
}

/// Normalized `(username, email, full_name)` for a valid signup.
pub fn signup(req: &SignupRequest) -> AppResult<(String, String, String)> {
    let username = username(&req.username)?;
    let email = email(&req.email)?;
    password(&req.password)?;
    let full_name = req.full_name.as_deref().unwrap_or("").trim().to_string();
    max_len("Full name", &full_name, FULL_NAME_MAX)?;
    Ok((username, email, full_name))
}

pub fn profile_update(update: &ProfileUpdate) -> AppResult<()> {
    if let Some(ref bio) = update.bio {
        max_len("Bio", bio, BIO_MAX)?;
    }
    if let Some(ref name) = update.full_name {
        max_len("Full name", name, FULL_NAME_MAX)?;
    }
    Ok(())
}

pub fn caption(value: &str) -> AppResult<()> {
    max_len("Caption", value, CAPTION_MAX)
}

pub fn new_post(post: &NewPost) -> AppResult<()> {
    caption(&post.caption)?;
    let images = post.images.iter().filter(|i| !i.trim().is_empty()).count();
    if images == 0 || images != post.images.len() {
        return Err(bad("A post needs at least one image"));
    }
    if images > IMAGES_MAX {
        return Err(bad(format!("A post can have at most {} images", IMAGES_MAX)));
    }
    Ok(())
}

pub fn comment_text(value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(bad("Comment text is required"));
    }
    max_len("Comment", value.trim(), COMMENT_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup_req(username: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            full_name: None,
        }
    }

    #[test]
    fn minimal_signup_is_accepted() {
        let (username, email, full_name) =
            signup(&signup_req("abc", "a@b.com", "secret1")).unwrap();
        assert_eq!(username, "abc");
        assert_eq!(email, "a@b.com");
        assert_eq!(full_name, "");
    }

    #[test]
    fn short_username_is_rejected() {
        let err = signup(&signup_req("ab", "a@b.com", "secret1")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("Username")));
    }

    #[test]
    fn usernames_are_lowercased_and_restricted() {
        assert_eq!(username("  Jane.Doe_1 ").unwrap(), "jane.doe_1");
        assert!(username("jane doe").is_err());
        assert!(username("jané").is_err());
        assert!(username(&"a".repeat(31)).is_err());
    }

    #[test]
    fn email_and_password_rules() {
        assert!(email("nope").is_err());
        assert!(email("@b.com").is_err());
        assert!(email("a@").is_err());
        assert!(email("a@b@c").is_err());
        assert_eq!(email(" A@B.com ").unwrap(), "a@b.com");
        assert!(password("12345").is_err());
        assert!(password("123456").is_ok());
    }

    #[test]
    fn posts_need_images_within_bounds() {
        let mut post = NewPost::default();
        assert!(new_post(&post).is_err());
        post.images = vec!["a.jpg".into()];
        assert!(new_post(&post).is_ok());
        post.images = vec!["x.jpg".into(); 11];
        assert!(new_post(&post).is_err());
        post.images = vec!["a.jpg".into(), " ".into()];
        assert!(new_post(&post).is_err());
        post.images = vec!["a.jpg".into()];
        post.caption = "x".repeat(2201);
        assert!(new_post(&post).is_err());
    }

    #[test]
    fn comment_and_bio_limits() {
        assert!(comment_text("   ").is_err());
        assert!(comment_text(&"c".repeat(501)).is_err());
        assert!(comment_text("nice shot").is_ok());
        let update = ProfileUpdate {
            bio: Some("b".repeat(151)),
            ..Default::default()
        };
        assert!(profile_update(&update).is_err());
    }

    #[test]
    fn passwords_past_bcrypt_input_limit_are_rejected() {
        assert!(password(&"a".repeat(PASSWORD_MAX_BYTES)).is_ok());
        assert!(matches!(
            password(&"a".repeat(PASSWORD_MAX_BYTES + 1)),
            Err(AppError::BadRequest(_))
        ));
        // 24 three-byte characters fill the limit exactly.
        assert!(password(&"€".repeat(24)).is_ok());
        assert!(password(&"€".repeat(25)).is_err());
    }
}
