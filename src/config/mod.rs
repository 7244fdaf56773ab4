use anyhow::Result;
use std::env;

/// Application-wide defaults. These can be overridden by env vars but do not
/// require any user-authored config files.
#[derive(Debug, Clone)]
pub struct AppDefaults {
    pub list_limit: i64,
    pub show_hidden: bool,
}

impl AppDefaults {
    pub fn load() -> Result<Self> {
        let list_limit = env::var("POSTBOX_LIST_LIMIT")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(20);
        let show_hidden = env::var("POSTBOX_SHOW_HIDDEN")
            .ok()
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            list_limit,
            show_hidden,
        })
    }
}
