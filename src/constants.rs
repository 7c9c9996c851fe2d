/// Fixed values written on every row the uploader creates
pub const DEFAULT_TAG: &str = "performance";
pub const DEFAULT_STATUS: &str = "on sale";

/// Source names and the domain fragments that identify them in a detail URL
pub const DAMAI_SOURCE: &str = "damai";
pub const DAMAI_DOMAIN: &str = "damai.cn";
pub const SHOWSTART_SOURCE: &str = "showstart";
pub const SHOWSTART_DOMAIN: &str = "showstart.com";

/// Accepted scraped date layouts, tried in this order
pub const DATE_FORMATS: [&str; 4] = ["%Y/%m/%d %H:%M", "%Y/%m/%d", "%Y-%m-%d %H:%M", "%Y-%m-%d"];

/// Layout used when showing stored dates to API clients
pub const DISPLAY_DATE_FORMAT: &str = "%Y/%m/%d";

pub const SHOWS_TABLE: &str = "shows";

// Crawler defaults
pub const SHOWSTART_BASE_URL: &str = "https://www.showstart.com";
pub const SHOWSTART_CITY_CODE: &str = "10";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATABASE_PATH: &str = "data/shows.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
