//! Composite member codec.
//!
//! A timeline member identifies one content reference inside a user's
//! sorted set:
//!
//! ```text
//! {type}:{author_id}:{content_id}     current
//! {type}:{content_id}                 legacy, still readable
//! ```

use crate::model::{ContentReference, ContentType};

const SEP: char = ':';

/// Sorted-set key holding a user's timeline.
pub fn timeline_key(user_id: &str) -> String {
    format!("timeline:{user_id}")
}

/// Encode the member string for `item`.
pub fn encode(item: &ContentReference) -> String {
    format!(
        "{}{SEP}{}{SEP}{}",
        item.content_type, item.author_id, item.content_id
    )
}

/// Decoded member: `(type, author_id, content_id)`. `author_id` is empty
/// for legacy two-part members.
pub type DecodedMember = (ContentType, String, String);

/// Decode a member string. Returns `None` for any shape other than two or
/// three parts, or for an unknown type.
pub fn decode(member: &str) -> Option<DecodedMember> {
    let parts: Vec<&str> = member.split(SEP).collect();
    let (kind, author_id, content_id) = match parts.as_slice() {
        [kind, author_id, content_id] => (*kind, *author_id, *content_id),
        [kind, content_id] => (*kind, "", *content_id),
        _ => return None,
    };
    let content_type = ContentType::from_str(kind)?;
    Some((content_type, author_id.to_string(), content_id.to_string()))
}

/// Whether `id` can be embedded in a member without breaking decoding.
pub fn is_encodable_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(SEP)
}
