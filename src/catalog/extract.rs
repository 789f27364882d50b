use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use super::category::infer_category;
use crate::models::ListingObservation;
use crate::utils::error::AppError;
use crate::Result;

const MIN_TITLE_CHARS: usize = 3;
const MAX_TITLE_CHARS: usize = 120;

/// Heuristic listing extraction from a rendered catalog page.
///
/// Any `a` or `div` whose collapsed text contains a `<number> <marker>` run is
/// a candidate card: the first such run is the price and the text before it is
/// the title. Nested containers produce overlapping candidates; oversized
/// titles and the dedupe pass weed most of them out.
pub struct ListingExtractor {
    base_url: Url,
    marker: String,
    price_re: Regex,
    whitespace_re: Regex,
    card_selector: Selector,
    img_selector: Selector,
    link_selector: Selector,
}

impl ListingExtractor {
    pub fn new(base_url: &str, currency_marker: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Configuration(format!("invalid catalog.base_url: {}", e)))?;
        let marker = currency_marker.trim().to_string();
        let escaped = regex::escape(&marker);

        Ok(Self {
            base_url,
            price_re: compile(&format!(r"(?i)(\d[\d\s.]*)\s*{}", escaped))?,
            whitespace_re: compile(r"\s+")?,
            marker,
            card_selector: selector("a, div")?,
            img_selector: selector("img")?,
            link_selector: selector("a")?,
        })
    }

    pub fn extract(&self, html: &str, max_items: usize) -> Vec<ListingObservation> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut listings = Vec::new();

        for element in document.select(&self.card_selector) {
            if listings.len() >= max_items {
                break;
            }

            let Some(candidate) = self.candidate(element) else {
                continue;
            };

            let key = format!(
                "{}|{}|{}",
                candidate.title,
                candidate.price_text,
                candidate.image_url.as_deref().unwrap_or("")
            )
            .to_lowercase();
            if !seen.insert(key) {
                continue;
            }

            let category = infer_category(&candidate.title);
            listings.push(ListingObservation::new(
                candidate.title,
                candidate.price_text,
                candidate.image_url,
                candidate.item_url,
                category,
            ));
        }

        tracing::debug!(count = listings.len(), "Extracted listings from page");
        listings
    }

    fn candidate(&self, element: ElementRef<'_>) -> Option<Candidate> {
        let text = self.collapse(&element.text().collect::<Vec<_>>().join(" "));
        let price = self.price_re.captures(&text)?;
        let (whole, amount) = (price.get(0)?, price.get(1)?);

        let title = text[..whole.start()].trim().to_string();
        let title_len = title.chars().count();
        if !(MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&title_len) {
            return None;
        }

        let price_text = format!("{} {}", self.collapse(amount.as_str()), self.marker);

        let image_url = element.select(&self.img_selector).next().and_then(|img| {
            img.value()
                .attr("src")
                .or_else(|| img.value().attr("data-src"))
                .map(str::to_string)
        });

        let href = if element.value().name() == "a" {
            element.value().attr("href")
        } else {
            element
                .select(&self.link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
        };
        let item_url = href.and_then(|h| self.resolve(h));

        Some(Candidate {
            title,
            price_text,
            image_url,
            item_url,
        })
    }

    fn collapse(&self, text: &str) -> String {
        self.whitespace_re.replace_all(text, " ").trim().to_string()
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        self.base_url.join(href).ok().map(|u| u.to_string())
    }
}

struct Candidate {
    title: String,
    price_text: String,
    image_url: Option<String>,
    item_url: Option<String>,
}

/// Convenience wrapper for one-off extraction.
pub fn extract_listings(
    html: &str,
    base_url: &str,
    currency_marker: &str,
    max_items: usize,
) -> Result<Vec<ListingObservation>> {
    Ok(ListingExtractor::new(base_url, currency_marker)?.extract(html, max_items))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::Parse {
        message: format!("invalid pattern {}: {}", pattern, e),
    })
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::Parse {
        message: format!("invalid selector {}: {:?}", css, e),
    })
}
