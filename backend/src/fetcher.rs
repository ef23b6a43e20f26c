use crate::{
    config::Config,
    error::{Result, TrackerError},
    types::{now_local, PriceObservation},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const BOOKING_URL: &str = "https://www.airbaltic.com/fi/varaa-lennot";
const USER_AGENT: &str = concat!("flight-price-tracker/", env!("CARGO_PKG_VERSION"));

/// Source of price observations for the tracked route
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    async fn fetch(&self) -> Result<PriceObservation>;
}

/// Reads the lowest fare from the booking page for a fixed route and month
pub struct BookingPageFetcher {
    client: reqwest::Client,
    url: String,
    route: String,
}

impl BookingPageFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_timeout(config, config.fetch_timeout())
    }

    pub fn with_timeout(config: &Config, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: search_url(config),
            route: config.route_label(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PriceFetcher for BookingPageFetcher {
    async fn fetch(&self) -> Result<PriceObservation> {
        info!("Fetching price: {}", self.route);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Fetch(format!(
                "booking page answered HTTP {}",
                status
            )));
        }

        let page = response.text().await?;
        let text = first_price_text(&page).ok_or_else(|| {
            TrackerError::Fetch("no price elements on the booking page".to_string())
        })?;
        debug!("Raw price text: {:?}", text);

        let price = parse_price_text(&text)?;
        info!("Price: {:.2} EUR", price);

        Ok(PriceObservation {
            price,
            currency: "EUR".to_string(),
            timestamp: now_local(),
        })
    }
}

fn search_url(config: &Config) -> String {
    format!(
        "{}?tripType=return&originCode={}&destinCode={}&numAdt={}&selectedMonth={}",
        BOOKING_URL, config.origin, config.destination, config.passengers, config.month
    )
}

/// Text content of the first element whose class attribute mentions "price"
///
/// Nested markup inside the element is dropped and whitespace collapsed.
fn first_price_text(page: &str) -> Option<String> {
    let lower = page.to_ascii_lowercase();
    let mut from = 0;

    while let Some(rel) = lower[from..].find('<') {
        let tag_start = from + rel;
        let tag_end = tag_start + lower[tag_start..].find('>')?;
        from = tag_end + 1;

        let tag = &lower[tag_start + 1..tag_end];
        let Some(name) = tag_name(tag) else {
            continue;
        };
        if tag.ends_with('/') || !class_attr(tag).is_some_and(|c| c.contains("price")) {
            continue;
        }

        let inner_end = matching_close(&lower, name, from).unwrap_or(page.len());
        let text = strip_tags(&page[from..inner_end]);
        if !text.is_empty() {
            return Some(text);
        }
    }

    None
}

/// Element name of an opening tag body (`span class="x"` -> `span`)
fn tag_name(tag: &str) -> Option<&str> {
    if !tag.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let len = tag
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(tag.len());
    Some(&tag[..len])
}

/// Value of the `class` attribute, quoted or not
fn class_attr(tag: &str) -> Option<&str> {
    let mut from = 0;

    while let Some(rel) = tag[from..].find("class") {
        let at = from + rel;
        from = at + "class".len();

        // `data-class`, `subclass` etc. are other attributes
        if !tag[..at].ends_with(|c: char| c.is_ascii_whitespace()) {
            continue;
        }
        let Some(value) = tag[from..].trim_start().strip_prefix('=') else {
            continue;
        };
        let value = value.trim_start();

        return Some(match value.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &value[1..];
                &body[..body.find(quote).unwrap_or(body.len())]
            }
            _ => {
                let len = value
                    .find(|c: char| c.is_ascii_whitespace() || c == '/')
                    .unwrap_or(value.len());
                &value[..len]
            }
        });
    }

    None
}

/// Offset of the close tag matching an element opened just before `from`
fn matching_close(lower: &str, name: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = from;

    while let Some(rel) = lower[pos..].find('<') {
        let at = pos + rel;
        pos = at + 1;

        let rest = &lower[pos..];
        let (body, closing) = match rest.strip_prefix('/') {
            Some(body) => (body, true),
            None => (rest, false),
        };
        let ends_name = body
            .strip_prefix(name)
            .is_some_and(|after| after.starts_with(|c: char| c == '>' || c == '/' || c.is_ascii_whitespace()));
        if !ends_name {
            continue;
        }

        if closing {
            depth -= 1;
            if depth == 0 {
                return Some(at);
            }
        } else {
            let tag_end = at + lower[at..].find('>')?;
            if !lower[..tag_end].ends_with('/') {
                depth += 1;
            }
        }
    }

    None
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;

    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a displayed fare such as `158€` or `245,00 €`
///
/// The first run of digits is the whole part; an optional `.` or `,`
/// followed by digits is the fraction. The result is rounded to cents.
pub fn parse_price_text(text: &str) -> Result<Decimal> {
    let start = text
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| TrackerError::Fetch(format!("no price in {:?}", text)))?;
    let rest = &text[start..];

    let whole_len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let whole = &rest[..whole_len];

    let fraction = rest[whole_len..]
        .strip_prefix(['.', ','])
        .map(|tail| {
            let len = tail
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(tail.len());
            &tail[..len]
        })
        .filter(|digits| !digits.is_empty())
        .unwrap_or("00");

    Decimal::from_str(&format!("{}.{}", whole, fraction))
        .map(|price| price.round_dp(2))
        .map_err(|e| TrackerError::Fetch(format!("unparseable price {:?}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HomeAssistantConfig;
    use std::path::PathBuf;

    fn config() -> Config {
        Config {
            origin: "HEL".to_string(),
            destination: "RIX".to_string(),
            passengers: 2,
            month: "2025-06".to_string(),
            check_interval: 3600,
            home_assistant: HomeAssistantConfig::default(),
            history_file: PathBuf::from("price_history.json"),
            fetch_timeout_seconds: 60,
            notify_timeout_seconds: 10,
        }
    }

    #[test]
    fn test_search_url() {
        let fetcher = BookingPageFetcher::new(&config()).unwrap();
        assert_eq!(
            fetcher.url(),
            "https://www.airbaltic.com/fi/varaa-lennot?tripType=return&originCode=HEL&destinCode=RIX&numAdt=2&selectedMonth=2025-06"
        );
    }

    #[test]
    fn test_parse_price_text() {
        assert_eq!(parse_price_text("158€").unwrap(), Decimal::from(158));
        assert_eq!(parse_price_text("245,00 €").unwrap(), Decimal::new(24500, 2));
        assert_eq!(parse_price_text("from 89.9").unwrap(), Decimal::new(899, 1));
        assert_eq!(parse_price_text("1.5").unwrap(), Decimal::new(15, 1));
        // Extra precision is rounded to cents
        assert_eq!(parse_price_text("12.345").unwrap(), Decimal::new(1234, 2));
        // Trailing separator without digits
        assert_eq!(parse_price_text("99,-").unwrap(), Decimal::from(99));
    }

    #[test]
    fn test_parse_price_text_without_digits() {
        let err = parse_price_text("Sold out").unwrap_err();
        assert!(matches!(err, TrackerError::Fetch(_)));
    }

    #[test]
    fn test_first_price_text() {
        let page = r#"
            <div class="header">Flights</div>
            <span class="fare-Price--lowest"> 158€ </span>
            <span class="price">245€</span>
        "#;
        assert_eq!(first_price_text(page).as_deref(), Some("158€"));

        assert_eq!(first_price_text(r#"<div class="header">none</div>"#), None);
    }

    #[test]
    fn test_first_price_text_reads_nested_amount() {
        let page = r#"<div class="price"><span class="amount">99 €</span></div>"#;
        assert_eq!(first_price_text(page).as_deref(), Some("99 €"));

        // Same-named children don't end the element early
        let page = r#"<div class='fare price'><div>from</div> <div>89 €</div></div><div>7</div>"#;
        assert_eq!(first_price_text(page).as_deref(), Some("from 89 €"));
    }

    #[test]
    fn test_first_price_text_only_matches_class_attribute() {
        let page = r#"<a href="/prices" class="nav">Deals</a><span class="fare-price">120€</span>"#;
        assert_eq!(first_price_text(page).as_deref(), Some("120€"));

        let page = r#"<span id="price-1" data-class="price" class="label">Total</span>"#;
        assert_eq!(first_price_text(page), None);

        let page = r#"<b class=price>45,50</b>"#;
        assert_eq!(first_price_text(page).as_deref(), Some("45,50"));
    }

    #[test]
    fn test_first_price_text_skips_empty_elements() {
        let page = r#"<div class="price-wrapper"><span class="price-value">99,50 €</span></div>"#;
        assert_eq!(first_price_text(page).as_deref(), Some("99,50 €"));
    }
}
