use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};

use crate::monitor_types::{FetchError, StationId, StationReading};
use crate::notification_service::StatusFetcher;

/// Station listing page of the Biopetrol deployment being monitored.
pub const DEFAULT_BIOPETROL_URL: &str =
    "http://ec2-3-22-240-207.us-east-2.compute.amazonaws.com/guiasaldos/main/donde/134";

lazy_static! {
    static ref CARD_START: Regex =
        Regex::new(r#"(?i)<div[^>]*class="[^"]*\bbtn-bio-app\b[^"]*"[^>]*>"#)
            .expect("card pattern is valid");
    static ref NAME_BLOCK: Regex =
        Regex::new(r#"(?is)<div[^>]*class="[^"]*\bbg-oscuro-1\b[^"]*"[^>]*>(.*?)</div>"#)
            .expect("name pattern is valid");
    static ref RIGHT_BLOCK: Regex =
        Regex::new(r#"(?is)<div[^>]*class="[^"]*\btext-right\b[^"]*"[^>]*>(.*?)</div>"#)
            .expect("text-right pattern is valid");
    static ref ADDRESS_BLOCK: Regex = Regex::new(
        r#"(?is)<div[^>]*class="[^"]*\balert-secondary\b[^"]*"[^>]*>\s*<div[^>]*>(.*?)</div>"#
    )
    .expect("address pattern is valid");
    static ref TAG: Regex = Regex::new(r"<[^>]*>").expect("tag pattern is valid");
}

/// Client for the Biopetrol station listing page
pub struct BiopetrolClient {
    client: Client,
    page_url: String,
}

impl BiopetrolClient {
    /// Create a new client for the given listing page.
    pub fn new(page_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            page_url: page_url.into(),
        })
    }

    /// Download the listing page and extract every station card.
    pub async fn fetch_all(&self) -> Result<Vec<StationReading>, FetchError> {
        debug!("Fetching station page {}", self.page_url);

        let response = self
            .client
            .get(&self.page_url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Http(format!("Failed to read body: {}", e)))?;

        let cards = parse_station_cards(&html);
        if cards.is_empty() {
            warn!("Station page returned no cards");
            return Err(FetchError::EmptyPage);
        }

        Ok(cards)
    }
}

#[async_trait]
impl StatusFetcher for BiopetrolClient {
    async fn fetch(&self, station_id: &StationId) -> Result<StationReading, FetchError> {
        let cards = self.fetch_all().await?;
        find_station(cards, station_id)
    }
}

/// First card whose name contains the station id, ignoring case.
pub fn find_station(
    cards: Vec<StationReading>,
    station_id: &StationId,
) -> Result<StationReading, FetchError> {
    cards
        .into_iter()
        .find(|card| station_id.matches_name(&card.name))
        .ok_or_else(|| FetchError::StationNotFound(station_id.to_string()))
}

/// Extract station cards from the listing HTML.
///
/// Each card is scanned on its own, so a malformed card only loses its own
/// fields. Cards without a name are skipped.
pub fn parse_station_cards(html: &str) -> Vec<StationReading> {
    let starts: Vec<usize> = CARD_START.find_iter(html).map(|m| m.start()).collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(html.len());
            parse_card(&html[start..end])
        })
        .collect()
}

fn parse_card(card: &str) -> Option<StationReading> {
    let name = NAME_BLOCK
        .captures(card)
        .map(|c| clean_text(&c[1]))
        .filter(|name| !name.is_empty())?;

    let mut right = RIGHT_BLOCK.captures_iter(card).map(|c| clean_text(&c[1]));
    let availability = right.next().unwrap_or_default();
    let measured_at = right.next().filter(|t| !t.is_empty());

    let address = ADDRESS_BLOCK
        .captures(card)
        .map(|c| clean_text(&c[1]))
        .filter(|a| !a.is_empty());

    Some(StationReading {
        name,
        availability,
        measured_at,
        address,
    })
}

/// Strip tags, decode the common entities and collapse whitespace.
fn clean_text(fragment: &str) -> String {
    let text = TAG.replace_all(fragment, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
