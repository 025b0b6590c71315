use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;
use tracing::debug;

use crate::utils::error::{AppError, Result};

pub const NO_DESCRIPTION: &str = "No description found";

/// Structural selectors tried before any free-text search.
const PRICE_SELECTORS: &[&str] = &[
    ".price",
    ".vehicle-price",
    ".product-price",
    "[class*=\"price\"]",
    "[data-test*=\"price\"]",
    "[data-testid*=\"price\"]",
    "[data-test=\"product-price\"]",
    ".ProductPrice__priceValue",
    "[class*=\"ProductPrice\"]",
    ".product__price",
    ".selling-price",
    ".sale-price",
    ".current-price",
];

/// Elements searched for the currency symbol once the selectors miss.
const PRICE_TEXT_TAGS: &[&str] = &["h2", "span", "div"];

const MILEAGE_SELECTORS: &[&str] = &[".mileage", "[class*=\"mileage\"]"];

const DESCRIPTION_SELECTORS: &[&str] = &[
    "title",
    ".vehicle-title",
    ".product-title",
    "h1",
    "[data-test=\"product-overview-name\"]",
];

/// One way of locating the price text on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceStrategy {
    /// First element matching a CSS selector.
    Selector(&'static str),
    /// First element with this tag whose text contains the currency symbol.
    TagContainingSymbol(&'static str),
    /// All text in the document.
    DocumentText,
}

impl PriceStrategy {
    pub fn default_order() -> Vec<PriceStrategy> {
        PRICE_SELECTORS
            .iter()
            .copied()
            .map(PriceStrategy::Selector)
            .chain(PRICE_TEXT_TAGS.iter().copied().map(PriceStrategy::TagContainingSymbol))
            .chain(std::iter::once(PriceStrategy::DocumentText))
            .collect()
    }

    fn candidate_text(&self, document: &Html, symbol: &str) -> Option<String> {
        match self {
            PriceStrategy::Selector(css) => {
                let selector = Selector::parse(css).ok()?;
                document.select(&selector).next().map(|el| element_text(&el))
            }
            PriceStrategy::TagContainingSymbol(tag) => {
                let selector = Selector::parse(tag).ok()?;
                document
                    .select(&selector)
                    .map(|el| element_text(&el))
                    .find(|text| text.contains(symbol))
            }
            PriceStrategy::DocumentText => Some(document.root_element().text().collect()),
        }
    }

    fn label(&self) -> String {
        match self {
            PriceStrategy::Selector(css) => (*css).to_string(),
            PriceStrategy::TagContainingSymbol(tag) => format!("{} containing symbol", tag),
            PriceStrategy::DocumentText => "document text".to_string(),
        }
    }
}

/// Everything read from one listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub price: Option<Decimal>,
    pub mileage: Option<u32>,
    pub description: String,
}

pub struct Extractor {
    currency_symbol: String,
    price_regex: Regex,
    mileage_regex: Regex,
    strategies: Vec<PriceStrategy>,
}

impl Extractor {
    pub fn new(currency_symbol: &str) -> Result<Self> {
        let price_regex = Regex::new(&format!(r"{}([\d,]+\.?\d*)", regex::escape(currency_symbol)))
            .map_err(|e| AppError::Validation(format!("Invalid currency symbol pattern: {}", e)))?;
        let mileage_regex = Regex::new(r"(?i)([\d,]+)\s*miles")
            .map_err(|e| AppError::Internal(format!("Invalid mileage pattern: {}", e)))?;

        Ok(Self {
            currency_symbol: currency_symbol.to_string(),
            price_regex,
            mileage_regex,
            strategies: PriceStrategy::default_order(),
        })
    }

    pub fn strategies(&self) -> &[PriceStrategy] {
        &self.strategies
    }

    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);

        Extraction {
            price: self.extract_price(&document),
            mileage: self.extract_mileage(&document),
            description: self.extract_description(&document),
        }
    }

    pub fn extract_price(&self, document: &Html) -> Option<Decimal> {
        for strategy in &self.strategies {
            let Some(text) = strategy.candidate_text(document, &self.currency_symbol) else {
                continue;
            };

            if let Some(price) = self.parse_price(&text) {
                debug!("Price {} matched by strategy '{}'", price, strategy.label());
                return Some(price);
            }
        }

        None
    }

    /// First `<symbol><digits>` in the text, commas ignored. Zero and
    /// negative values are treated as no match.
    pub fn parse_price(&self, text: &str) -> Option<Decimal> {
        let captures = self.price_regex.captures(text)?;
        let digits = captures.get(1)?.as_str().replace(',', "");
        let digits = digits.trim_end_matches('.');

        Decimal::from_str(digits)
            .ok()
            .filter(|price| *price > Decimal::ZERO)
    }

    pub fn extract_mileage(&self, document: &Html) -> Option<u32> {
        let text = MILEAGE_SELECTORS
            .iter()
            .filter_map(|css| Selector::parse(css).ok())
            .map(|selector| document.select(&selector).map(|el| element_text(&el)).collect::<String>())
            .find(|text| !text.trim().is_empty())
            .or_else(|| {
                let selector = Selector::parse("li").ok()?;
                let text: String = document
                    .select(&selector)
                    .map(|el| element_text(&el))
                    .filter(|text| text.to_lowercase().contains("miles"))
                    .collect();
                (!text.is_empty()).then_some(text)
            })?;

        let captures = self.mileage_regex.captures(&text)?;
        captures.get(1)?.as_str().replace(',', "").parse().ok()
    }

    pub fn extract_description(&self, document: &Html) -> String {
        DESCRIPTION_SELECTORS
            .iter()
            .filter_map(|css| Selector::parse(css).ok())
            .filter_map(|selector| document.select(&selector).next().map(|el| element_text(&el)))
            .map(|text| text.trim().to_string())
            .find(|text| !text.is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string())
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect()
}
