use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Declares a string-backed enum stored as TEXT in SQLite and serialized
/// in lowercase over the wire.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(MediaType {
    Image => "image",
    Video => "video",
    Audio => "audio",
});

text_enum!(NotificationKind {
    Like => "like",
    Comment => "comment",
    Follow => "follow",
    Mention => "mention",
    Message => "message",
});

text_enum!(ActivityKind {
    Login => "login",
    Logout => "logout",
    Post => "post",
    Like => "like",
    Comment => "comment",
    Follow => "follow",
    Message => "message",
});

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub likes: bool,
    pub comments: bool,
    pub follows: bool,
    pub messages: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            likes: true,
            comments: true,
            follows: true,
            messages: true,
        }
    }
}

impl NotificationSettings {
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Like => self.likes,
            NotificationKind::Comment | NotificationKind::Mention => self.comments,
            NotificationKind::Follow => self.follows,
            NotificationKind::Message => self.messages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: String,
    pub bio: String,
    pub website: String,
    pub profile_picture: String,
    pub is_private: bool,
    pub is_verified: bool,
    pub notifications: NotificationSettings,
    pub last_active: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub profile_picture: Option<String>,
    pub is_private: Option<bool>,
}

/// Compact author reference embedded in posts, comments and stories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub profile_picture: String,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub bio: String,
    pub website: String,
    pub profile_picture: String,
    pub is_private: bool,
    pub is_verified: bool,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub is_following: bool,
    pub created_at: String,
}

// -- Posts --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user: UserSummary,
    pub caption: String,
    pub images: Vec<String>,
    pub filter: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub mentioned_users: Vec<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked_by_me: bool,
    pub saved_by_me: bool,
    pub is_archived: bool,
    pub is_comments_disabled: bool,
    pub is_sensitive: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPost {
    pub caption: String,
    pub images: Vec<String>,
    pub filter: Option<String>,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub is_sensitive: bool,
    pub is_comments_disabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostUpdate {
    pub caption: Option<String>,
    pub location: Option<String>,
    pub is_archived: Option<bool>,
    pub is_comments_disabled: Option<bool>,
    pub is_sensitive: Option<bool>,
}

/// Flags read back alongside a post when checking permissions.
#[derive(Debug, Clone)]
pub struct PostOwnership {
    pub user_id: String,
    pub is_comments_disabled: bool,
}

// -- Comments --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user: UserSummary,
    pub text: String,
    pub parent_comment: Option<String>,
    pub like_count: i64,
    pub reply_count: i64,
    pub liked_by_me: bool,
    pub is_edited: bool,
    pub created_at: String,
    pub updated_at: String,
}

// -- Stories --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub user: UserSummary,
    pub media: String,
    pub media_type: MediaType,
    pub caption: Option<String>,
    pub location: Option<String>,
    pub is_highlighted: bool,
    pub highlight_name: Option<String>,
    pub view_count: i64,
    pub viewed_by_me: bool,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewStory {
    pub media: String,
    pub media_type: Option<MediaType>,
    pub caption: Option<String>,
    pub location: Option<String>,
    pub is_highlighted: bool,
    pub highlight_name: Option<String>,
}

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: Option<String>,
    pub media: Option<String>,
    pub media_type: Option<MediaType>,
    pub reply_to: Option<String>,
    pub is_read: bool,
    pub is_liked: bool,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMessage {
    pub recipient: String,
    pub text: Option<String>,
    pub media: Option<String>,
    pub media_type: Option<MediaType>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<UserSummary>,
    pub last_message: Option<Message>,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub group_icon: Option<String>,
    /// Unread message count keyed by participant id.
    pub unread_count: HashMap<String, i64>,
    pub created_at: String,
    pub updated_at: String,
}

// -- Notifications & activity --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender: UserSummary,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub message_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// References carried by a notification about the entity that caused it.
#[derive(Debug, Clone, Default)]
pub struct NotificationTarget<'a> {
    pub post_id: Option<&'a str>,
    pub comment_id: Option<&'a str>,
    pub message_id: Option<&'a str>,
}

/// Request metadata attached to activity records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Entities an activity record points at.
#[derive(Debug, Clone, Default)]
pub struct ActivityRefs<'a> {
    pub post_id: Option<&'a str>,
    pub comment_id: Option<&'a str>,
    pub target_user_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub user_id: String,
    pub kind: ActivityKind,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub target_user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hashtag {
    pub id: String,
    pub name: String,
    pub post_count: i64,
    pub created_at: String,
    pub updated_at: String,
}
