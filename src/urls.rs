//! Building fetch-tool locators from bare ids.

/// Whether `value` is already an http(s) URL.
pub fn looks_like_url(value: &str) -> bool {
    let v = value.trim();
    v.starts_with("http://") || v.starts_with("https://")
}

/// Locator for a channel's video listing. URLs pass through untouched.
pub fn channel_locator(channel_id: &str) -> String {
    let id = channel_id.trim();
    if looks_like_url(id) {
        id.to_string()
    } else {
        format!("https://www.youtube.com/channel/{}/videos", id)
    }
}

/// Locator for a single item. URLs pass through untouched.
pub fn item_locator(item_id: &str) -> String {
    let id = item_id.trim();
    if looks_like_url(id) {
        id.to_string()
    } else {
        format!("https://www.youtube.com/watch?v={}", id)
    }
}
