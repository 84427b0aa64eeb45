//! Minifigure extraction from Brickset set pages.
//!
//! A set page links every minifigure it contains as `/minifigs/<id>`. The link text
//! is the figure name and an `<img>` inside the link, when present, is its picture.

use std::collections::HashMap;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::catalog::SubItem;

const FIGURE_LINK_SELECTOR: &str = r#"a[href*="/minifigs/"]"#;
const FIGURE_ID_PATTERN: &str = r"/minifigs/([A-Za-z0-9_-]+)";

pub struct SubItemExtractor {
    link_selector: Selector,
    image_selector: Selector,
    figure_id: Regex,
    site_base: String,
}

impl SubItemExtractor {
    pub fn new(site_base: &str) -> Self {
        Self {
            link_selector: Selector::parse(FIGURE_LINK_SELECTOR)
                .expect("figure link selector should parse"),
            image_selector: Selector::parse("img").expect("img selector should parse"),
            figure_id: Regex::new(FIGURE_ID_PATTERN).expect("figure id pattern should compile"),
            site_base: site_base.trim_end_matches('/').to_string(),
        }
    }

    /// Extracts one `SubItem` per distinct figure id. A later link to the same figure
    /// replaces the earlier one but keeps its position.
    pub fn extract(&self, html: &str) -> Vec<SubItem> {
        let document = Html::parse_document(html);
        let mut figures: Vec<SubItem> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for link in document.select(&self.link_selector) {
            let href = link.value().attr("href").unwrap_or_default();
            let Some(captures) = self.figure_id.captures(href) else {
                continue;
            };
            let id = captures[1].to_string();
            let text = link_text(&link);
            let name = if text.is_empty() { id.clone() } else { text };
            let image = link
                .select(&self.image_selector)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(|src| self.absolute_url(src))
                .unwrap_or_default();

            let figure = SubItem { id, name, image };
            match positions.get(&figure.id) {
                Some(&index) => figures[index] = figure,
                None => {
                    positions.insert(figure.id.clone(), figures.len());
                    figures.push(figure);
                }
            }
        }

        figures
    }

    /// `//host/x` -> `https://host/x`, `/x` -> `<site base>/x`, others unchanged.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }
        if let Some(rest) = url.strip_prefix("//") {
            return format!("https://{rest}");
        }
        if url.starts_with('/') {
            return format!("{}{}", self.site_base, url);
        }
        url.to_string()
    }
}

fn link_text(link: &ElementRef<'_>) -> String {
    link.text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
