//! Section catalog for the AP News landing page.
//!
//! | Section | Root | Items | Timestamp |
//! |---------|------|-------|-----------|
//! | A1, A2 Main Story | `div.PageListStandardE[data-tb-region='A1']` (or `'A2'`) | `div.PagePromo` | nested `bsp-timestamp` |
//! | Top Stories | `bsp-list-loadmore.PageListStandardB[data-tb-region='A3']` | `div.PageList-items-item` | nested `div.PagePromo` |
//! | C Block | `div.PageListRightRailA[data-tb-region='C block']` | `li.PageList-items-item` | nested `div.PagePromo` |
//! | Most Read | `div.PageListRightRailA[data-tb-region='Most read']` | `li.PageList-items-item` | marker only |
//! | B1, B2, topic hubs, heading rails | see below | | own attribute |

use super::section::{LeadStory, SectionRoot, SectionSpec, TimestampRule};

const OWN_TIMESTAMP: &str = "data-updated-date-timestamp";

fn topic(name: &str, gtm_topic: &str) -> SectionSpec {
    SectionSpec::css(name, format!("div[data-gtm-topic='{gtm_topic}']"), "div.PagePromo").with_own_timestamp(OWN_TIMESTAMP)
}

fn main_story(region: &str) -> SectionSpec {
    SectionSpec::css(
        format!("{region} Main Story"),
        format!("div.PageListStandardE[data-tb-region='{region}']"),
        "div.PagePromo",
    )
    .with_timestamp(TimestampRule::Nested {
        selector: "bsp-timestamp[data-timestamp]".to_string(),
        attr: "data-timestamp".to_string(),
    })
    .with_hook(LeadStory::new("div.PageListStandardE-leadPromo-info"))
}

fn rail_with_heading(name: &str, heading: &str) -> SectionSpec {
    SectionSpec::new(
        name,
        SectionRoot::Heading {
            container: "div.PageListRightRailA".to_string(),
            heading: "h2 a".to_string(),
            text: heading.to_string(),
        },
        "div.PagePromo",
    )
    .with_own_timestamp(OWN_TIMESTAMP)
}

/// Every section scraped from the AP News landing page, in scrape order.
pub fn ap_news_sections() -> Vec<SectionSpec> {
    vec![
        main_story("A1"),
        main_story("A2"),
        SectionSpec::css(
            "Top Stories",
            "bsp-list-loadmore.PageListStandardB[data-tb-region='A3']",
            "div.PageList-items-item",
        ),
        SectionSpec::css(
            "C Block",
            "div.PageListRightRailA[data-tb-region='C block']",
            "li.PageList-items-item",
        )
        .with_hook(LeadStory::new("div.PageList-items-first")),
        SectionSpec::css(
            "Most Read",
            "div.PageListRightRailA[data-tb-region='Most read']",
            "li.PageList-items-item",
        )
        .most_read(),
        SectionSpec::css("B1", "div.PageListStandardE[data-tb-region='B1']", "bsp-custom-headline"),
        SectionSpec::css("B2", "div.PageListRightRailA[data-tb-region='B2']", "div.PagePromo")
            .with_own_timestamp(OWN_TIMESTAMP),
        SectionSpec::css("ICYMI", "div[data-tb-region='ICYMI']", "div.PagePromo").with_own_timestamp(OWN_TIMESTAMP),
        topic("US News", "Topics - US News"),
        topic("Business", "Topics - Business"),
        topic("Entertainment", "Topics - Entertainment"),
        topic("Fact Check", "Topics - Fact Check"),
        topic("Health", "Topics - Be Well"),
        topic("Lifestyle", "Topics - Lifestyle"),
        SectionSpec::css("Science", "div[data-gtm-region='Topics - Science']", "div.PagePromo")
            .with_own_timestamp(OWN_TIMESTAMP),
        topic("Climate", "Topics - Climate"),
        SectionSpec::css("Latest News", "bsp-list-loadmore[data-gtm-region='Most Recent']", "div.PagePromo")
            .with_own_timestamp(OWN_TIMESTAMP),
        rail_with_heading("World News", "WORLD NEWS"),
        rail_with_heading("Politics", "POLITICS"),
        rail_with_heading("Sports", "SPORTS"),
        rail_with_heading("Technology", "Technology"),
    ]
}
