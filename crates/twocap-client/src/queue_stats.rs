//! Service load scraped from the public status page
//!
//! The page has no contract. Each value sits in an element identified by
//! `id`, and each id appears at least twice: the first occurrence is header
//! text, the second holds the number. Selecting the second match is coupled
//! to the current page layout and will break if the page changes.
//!
//! Every parse failure surfaces as the same `ServiceUnavailable` error.

use async_trait::async_trait;
use scraper::{Html, Selector};
use twocap_core::{CaptchaError, Result, ServiceLoad};

use crate::client::TwoCaptchaClient;
use crate::transport::{Endpoint, Transport};

/// Price per CAPTCHA
const BID_ANCHOR: &str = "market-price";
/// Average solve time, e.g. `12s`
const SPEED_ANCHOR: &str = "block-size";
/// Daily load, e.g. `37%`
const LOAD_ANCHOR: &str = "tx-per-day";
/// Workers online
const WORKERS_ANCHOR: &str = "mempool-size";

const PARSE_FAILURE: &str = "Error parsing queue status information";

/// Anything that can report the service's current load
#[async_trait]
pub trait QueueStatsSource: Send + Sync {
    async fn queue_stats(&self) -> Result<ServiceLoad>;
}

#[async_trait]
impl<T: Transport> QueueStatsSource for TwoCaptchaClient<T> {
    async fn queue_stats(&self) -> Result<ServiceLoad> {
        let page = self.transport().get(Endpoint::QueueStats).await?;

        if page.status != 200 {
            return Err(CaptchaError::ServiceUnavailable(format!(
                "Response status code: {}",
                page.status
            )));
        }

        extract(&page.body)
    }
}

/// Parse a status page into a [`ServiceLoad`]
pub fn extract(document: &str) -> Result<ServiceLoad> {
    let html = Html::parse_document(document);
    parse_load(&html).ok_or_else(|| CaptchaError::ServiceUnavailable(PARSE_FAILURE.to_string()))
}

fn parse_load(html: &Html) -> Option<ServiceLoad> {
    let bid = anchor_text(html, BID_ANCHOR)?.trim().parse::<f64>().ok()?;
    let speed = anchor_text(html, SPEED_ANCHOR)?.replace('s', "").trim().parse::<i64>().ok()?;
    let load = anchor_text(html, LOAD_ANCHOR)?.replace('%', "").trim().parse::<i64>().ok()?;
    let workers_total = anchor_text(html, WORKERS_ANCHOR)?.trim().parse::<i64>().ok()?;

    ServiceLoad::derive(workers_total, load, bid, speed)
}

/// Text of the second element carrying `id`
fn anchor_text(html: &Html, id: &str) -> Option<String> {
    let selector = Selector::parse(&format!("[id=\"{}\"]", id)).ok()?;
    html.select(&selector)
        .nth(1)
        .map(|element| element.text().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_page(bid: &str, speed: &str, load: &str, workers: &str) -> String {
        format!(
            r#"<html><body>
            <div class="header">
              <span id="market-price">Price</span>
              <span id="block-size">Speed</span>
              <span id="tx-per-day">Load</span>
              <span id="mempool-size">Workers</span>
            </div>
            <table><tr>
              <td id="market-price">{}</td>
              <td id="block-size">{}</td>
              <td id="tx-per-day">{}</td>
              <td id="mempool-size">{}</td>
            </tr></table>
            </body></html>"#,
            bid, speed, load, workers
        )
    }

    #[test]
    fn test_extract_uses_second_match() {
        let load = extract(&status_page("0.75", "14s", "37%", "100")).unwrap();
        assert_eq!(load.bid, 0.75);
        assert_eq!(load.speed_seconds, 14);
        assert_eq!(load.load_percent, 37);
        assert_eq!(load.workers_total, 100);
        assert_eq!(load.busy_workers(), 37);
        assert_eq!(load.free_workers, 63);
    }

    #[test]
    fn test_extract_tolerates_whitespace() {
        let load = extract(&status_page(" 1.5\n", "\n 9s ", " 50 % ", "\t7 ")).unwrap();
        assert_eq!(load.bid, 1.5);
        assert_eq!(load.speed_seconds, 9);
        assert_eq!(load.free_workers, 4);
    }

    #[test]
    fn test_single_match_is_service_unavailable() {
        let page = r#"<html><body>
            <td id="market-price">0.75</td>
            <td id="block-size">Speed</td><td id="block-size">14s</td>
            <td id="tx-per-day">Load</td><td id="tx-per-day">37%</td>
            <td id="mempool-size">Workers</td><td id="mempool-size">100</td>
            </body></html>"#;

        match extract(page) {
            Err(CaptchaError::ServiceUnavailable(msg)) => assert_eq!(msg, PARSE_FAILURE),
            other => panic!("expected ServiceUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_is_service_unavailable() {
        let result = extract(&status_page("0.75", "fast", "37%", "100"));
        assert!(matches!(result, Err(CaptchaError::ServiceUnavailable(_))));

        let result = extract(&status_page("cheap", "14s", "37%", "100"));
        assert!(matches!(result, Err(CaptchaError::ServiceUnavailable(_))));
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(
            extract(""),
            Err(CaptchaError::ServiceUnavailable(_))
        ));
    }
}
