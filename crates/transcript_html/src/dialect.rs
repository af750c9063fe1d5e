//! Names and markers of the conversation export dialect.

pub const TURN_TAG: &str = "article";
pub const TURN_ROLE_ATTR: &str = "data-turn";
pub const TURN_ID_ATTR: &str = "data-turn-id";
pub const AUTHOR_ROLE_ATTR: &str = "data-message-author-role";
pub const USER_TEXT_CLASS: &str = "whitespace-pre-wrap";
pub const MARKDOWN_CLASS: &str = "markdown";

/// Alt texts the exporter puts on uploaded images.
pub const IMAGE_ALT_MARKERS: [&str; 2] = ["已上传的图片", "Uploaded image"];
/// Content substituted for a user turn that only carries an uploaded image.
pub const IMAGE_PLACEHOLDER: &str = "[Image Uploaded]";

pub const SYNTHETIC_ID_PREFIX: &str = "imported";
pub const DOCUMENT_TITLE: &str = "Chat Export";
