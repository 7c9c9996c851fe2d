use crate::config::CrawlerConfig;
use crate::constants::SHOWSTART_SOURCE;
use crate::error::{CrawlerError, Result};
use crate::types::{ShowRecord, ShowScraper};
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Searches the showstart.com event list for an artist
pub struct ShowstartCrawler {
    client: reqwest::Client,
    config: CrawlerConfig,
}

impl ShowstartCrawler {
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    pub fn search_url(&self) -> String {
        format!("{}/event/list", self.base_url())
    }

    async fn fetch_page(&self, artist: &str) -> Result<String> {
        let url = self.search_url();
        info!("Fetching {} for {:?}", url, artist);

        let response = self
            .client
            .get(&url)
            .query(&[("cityCode", self.config.city_code.as_str()), ("keyword", artist)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CrawlerError::Scrape(format!(
                "search request for {:?} failed with status {}",
                artist,
                response.status()
            )));
        }

        Ok(response.text().await?)
    }

    fn dump_page(&self, artist: &str, body: &str) {
        let Some(dir) = self.config.debug_dump_dir.as_deref() else {
            return;
        };
        let file_name = format!("debug_{}.html", artist.replace(|c: char| c == '/' || c == '\\', "_"));
        let path = Path::new(dir).join(file_name);
        let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, body));
        match written {
            Ok(()) => debug!("Saved search page to {}", path.display()),
            Err(e) => warn!("Could not save search page to {}: {}", path.display(), e),
        }
    }
}

#[async_trait::async_trait]
impl ShowScraper for ShowstartCrawler {
    fn source_name(&self) -> &'static str {
        SHOWSTART_SOURCE
    }

    #[instrument(skip(self))]
    async fn search(&self, artist: &str) -> Result<Vec<ShowRecord>> {
        let body = self.fetch_page(artist).await?;
        self.dump_page(artist, &body);

        let shows = parse_listing(&body, self.base_url())?;
        info!("Extracted {} shows for {:?}", shows.len(), artist);
        Ok(shows)
    }
}

struct CardSelectors {
    card: Selector,
    title: Selector,
    artist: Selector,
    price: Selector,
    time: Selector,
    addr: Selector,
    image: Selector,
}

impl CardSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            card: selector("a.show-item")?,
            title: selector("div.title")?,
            artist: selector("div.artist")?,
            price: selector("div.price")?,
            time: selector("div.time")?,
            addr: selector("div.addr")?,
            image: selector("img")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| CrawlerError::Scrape(format!("bad selector {css:?}: {e:?}")))
}

/// Extract show cards from a search result page.
///
/// Cards without a title are skipped; every other field is optional here and
/// left for validation to judge.
pub fn parse_listing(html: &str, base_url: &str) -> Result<Vec<ShowRecord>> {
    let document = Html::parse_document(html);
    let sel = CardSelectors::new()?;

    let cards: Vec<_> = document.select(&sel.card).collect();
    debug!("Found {} elements matching a.show-item", cards.len());

    let mut shows = Vec::new();
    for card in cards {
        let Some(name) = text_of(card, &sel.title) else {
            warn!("Skipping show card without a title");
            continue;
        };

        let (city, venue) = text_of(card, &sel.addr)
            .map(|addr| split_address(&addr))
            .unwrap_or((None, None));

        let show = ShowRecord {
            name: Some(name),
            lineup: text_of(card, &sel.artist).and_then(|t| non_empty(t.replace("艺人：", ""))),
            price: text_of(card, &sel.price)
                .and_then(|t| non_empty(t.replace("价格：", "").replace('¥', ""))),
            date: text_of(card, &sel.time).and_then(|t| non_empty(t.replace("时间：", ""))),
            city,
            venue,
            detail_url: card.value().attr("href").map(|href| absolutize(href, base_url)),
            poster: card
                .select(&sel.image)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(|src| absolutize(src, base_url)),
        };
        debug!("Extracted show {:?}", show.display_name());
        shows.push(show);
    }

    Ok(shows)
}

fn text_of(card: ElementRef<'_>, sel: &Selector) -> Option<String> {
    card.select(sel)
        .next()
        .and_then(|el| non_empty(el.text().collect::<String>()))
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `"[Beijing]MAO Livehouse"` → city and venue
fn split_address(addr: &str) -> (Option<String>, Option<String>) {
    let mut parts = addr.splitn(2, ']');
    let city = parts.next().and_then(|c| non_empty(c.replace('[', "")));
    let venue = parts.next().and_then(|v| non_empty(v.to_string()));
    (city, venue)
}

fn absolutize(link: &str, base_url: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else if let Some(rest) = link.strip_prefix("//") {
        format!("https://{rest}")
    } else if link.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), link)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), link)
    }
}
