pub mod showstart;

pub use showstart::ShowstartCrawler;
