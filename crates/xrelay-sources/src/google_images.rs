//! Google image search scraper used to pick an illustration for a keyword.

use async_trait::async_trait;
use rand::Rng;
use reqwest::Url;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use xrelay_core::{config::ImagesConfig, error::RelayError, traits::ImageLookup};

/// The first few `<img>` tags on the results page are logos and chrome.
const SKIP_IMAGES: usize = 3;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Image lookup backed by the Google image search results page.
pub struct GoogleImageLookup {
    client: reqwest::Client,
    search_url: Url,
}

impl GoogleImageLookup {
    pub fn from_config(config: &ImagesConfig) -> Result<Self, RelayError> {
        let search_url = Url::parse(&config.search_url).map_err(|e| {
            RelayError::Config(format!("invalid images.search_url '{}': {e}", config.search_url))
        })?;
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, search_url })
    }
}

#[async_trait]
impl ImageLookup for GoogleImageLookup {
    async fn lookup_image(&self, keyword: &str) -> Result<Option<String>, RelayError> {
        let resp = self
            .client
            .get(self.search_url.clone())
            .query(&[("q", keyword), ("tbm", "isch")])
            .send()
            .await
            .map_err(|e| RelayError::ImageLookup(format!("image search failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::ImageLookup(format!(
                "image search returned {status}"
            )));
        }

        let html = resp
            .text()
            .await
            .map_err(|e| RelayError::ImageLookup(format!("image search body: {e}")))?;

        let url = choose_image(&html, &self.search_url, &mut rand::thread_rng());
        debug!("image for '{keyword}': {url:?}");
        Ok(url)
    }
}

/// `src` of every `<img>` in document order; `None` where it is missing or empty.
fn image_sources(html: &str) -> Vec<Option<String>> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("img") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|img| {
            img.value()
                .attr("src")
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(str::to_string)
        })
        .collect()
}

/// Pick a random result image, skipping page chrome at both ends; fall back
/// to the first usable result when the random pick has no `src`.
fn choose_image(html: &str, base: &Url, rng: &mut impl Rng) -> Option<String> {
    let sources = image_sources(html);

    if sources.len() > SKIP_IMAGES * 2 {
        let index = rng.gen_range(SKIP_IMAGES..sources.len() - SKIP_IMAGES);
        if let Some(url) = sources[index].as_deref().and_then(|src| absolute(base, src)) {
            return Some(url);
        }
    }

    sources
        .iter()
        .skip(SKIP_IMAGES)
        .flatten()
        .find_map(|src| absolute(base, src))
}

fn absolute(base: &Url, src: &str) -> Option<String> {
    base.join(src).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn base() -> Url {
        Url::parse("https://www.google.com/search").unwrap()
    }

    fn page(srcs: &[&str]) -> String {
        let imgs: String = srcs
            .iter()
            .map(|s| {
                if s.is_empty() {
                    "<img alt=\"x\">".to_string()
                } else {
                    format!("<img src=\"{s}\">")
                }
            })
            .collect();
        format!("<html><body>{imgs}</body></html>")
    }

    #[test]
    fn test_image_sources_in_order() {
        let html = page(&["/logo.png", "", "https://cdn.test/a.jpg"]);
        assert_eq!(
            image_sources(&html),
            vec![
                Some("/logo.png".to_string()),
                None,
                Some("https://cdn.test/a.jpg".to_string())
            ]
        );
    }

    #[test]
    fn test_random_pick_stays_inside_results() {
        let html = page(&[
            "/l0.png", "/l1.png", "/l2.png", "/r3.png", "/r4.png", "/t5.png", "/t6.png",
            "/t7.png",
        ]);
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let url = choose_image(&html, &base(), &mut rng).unwrap();
            assert!(
                url == "https://www.google.com/r3.png"
                    || url == "https://www.google.com/r4.png",
                "unexpected pick {url}"
            );
        }
    }

    #[test]
    fn test_small_page_falls_back_to_first_result() {
        let html = page(&["/l0.png", "/l1.png", "/l2.png", "", "/r4.png"]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            choose_image(&html, &base(), &mut rng),
            Some("https://www.google.com/r4.png".to_string())
        );
    }

    #[test]
    fn test_absolute_urls_kept() {
        let html = page(&["/l0.png", "/l1.png", "/l2.png", "https://cdn.test/x.jpg"]);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            choose_image(&html, &base(), &mut rng),
            Some("https://cdn.test/x.jpg".to_string())
        );
    }

    #[test]
    fn test_no_results() {
        let html = page(&["/l0.png", "/l1.png", "/l2.png"]);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(choose_image(&html, &base(), &mut rng), None);
        assert_eq!(choose_image("", &base(), &mut rng), None);
    }

    #[test]
    fn test_invalid_search_url_rejected() {
        let cfg = ImagesConfig {
            enabled: true,
            search_url: "not a url".to_string(),
        };
        assert!(matches!(
            GoogleImageLookup::from_config(&cfg),
            Err(RelayError::Config(_))
        ));
    }
}
