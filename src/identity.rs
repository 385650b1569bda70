//! Stream group identity: the key preferences are stored under

use crate::core::{Direction, PropertyList};

/// Property that, when set, is used verbatim as the stream's key
pub const IDENTIFICATION_PROPERTY: &str = "module-stream-restore.id";

pub const PROP_MEDIA_ROLE: &str = "media.role";
pub const PROP_APPLICATION_ID: &str = "application.id";
pub const PROP_APPLICATION_NAME: &str = "application.name";
pub const PROP_MEDIA_NAME: &str = "media.name";

/// Derive the preference key for a stream from its properties.
///
/// Returns `None` when the stream carries nothing usable; such streams are
/// never restored or remembered.
pub fn stream_group(properties: &PropertyList, direction: Direction) -> Option<String> {
    if let Some(id) = non_empty(properties, IDENTIFICATION_PROPERTY) {
        return Some(id.to_owned());
    }

    let prefix = direction.stream_prefix();
    [
        (PROP_MEDIA_ROLE, "by-media-role"),
        (PROP_APPLICATION_ID, "by-application-id"),
        (PROP_APPLICATION_NAME, "by-application-name"),
        (PROP_MEDIA_NAME, "by-media-name"),
    ]
    .iter()
    .find_map(|(prop, kind)| {
        non_empty(properties, prop).map(|value| format!("{}-{}:{}", prefix, kind, value))
    })
}

fn non_empty<'a>(properties: &'a PropertyList, key: &str) -> Option<&'a str> {
    properties
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}
