#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use housefinder::error::{AppError, FetchError};
use housefinder::fetcher::{PageSource, Pacing};
use housefinder::scrapers::{resolve_source_url, SourceProvider};

pub struct Listing<'a> {
    pub attributes: &'a str,
    pub address: &'a str,
    pub description: &'a str,
    pub price: &'a str,
}

pub fn listing_page(listings: &[Listing]) -> String {
    let items: String = listings
        .iter()
        .map(|l| {
            format!(
                r#"
        <dl class="clearfix">
          <dt class="floatl"><img src="house.jpg"></dt>
          <dd>
            <h4 class="clearfix"><a><span class="tit_shop">{address} 精装修</span></a></h4>
            <p class="tel_shop">{attributes}</p>
            <p class="add_shop"><a title="{address}">{address}</a></p>
            <p class="clearfix label"><span class="colorGreen">{description}</span></p>
          </dd>
          <dd class="price_right"><span class="red"><b>{price}</b></span></dd>
        </dl>"#,
                attributes = l.attributes,
                address = l.address,
                description = l.description,
                price = l.price,
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>二手房</title></head>
<body>
  <div class="shop_list shop_list_4">{}</div>
</body></html>"#,
        items
    )
}

/// Two pages, three listings each; the second listing on page 2 is malformed.
pub fn two_page_fixture() -> Vec<String> {
    vec![
        listing_page(&[
            Listing {
                attributes: "3室2厅|91㎡|中层（共18层）|南向|2004年建|郭星",
                address: "望京西园",
                description: "满五唯一",
                price: "560万61538元/㎡",
            },
            Listing {
                attributes: "2室1厅|67.4㎡|低层（共6层）|南北向|1996年建|王女士",
                address: "天通苑",
                description: "南北通透",
                price: "360万53412元/㎡",
            },
            Listing {
                attributes: "1室1厅|45㎡|高层（共28层）|东向|年代不详|李先生",
                address: "回龙观",
                description: "近地铁",
                price: "面议",
            },
        ]),
        listing_page(&[
            Listing {
                attributes: "4室2厅|140㎡|中层（共12层）|南北向|2012年建|赵先生",
                address: "亚运村",
                description: "学区房",
                price: "1200万",
            },
            Listing {
                attributes: "2室1厅|70㎡|顶层",
                address: "双井",
                description: "急售",
                price: "500万",
            },
            Listing {
                attributes: "2室2厅|88㎡|低层（共18层）|西向|2008年建|陈先生",
                address: "劲松",
                description: "满二",
                price: "2800000元",
            },
        ]),
    ]
}

pub struct FixtureSource {
    pages: Vec<String>,
}

impl PageSource for FixtureSource {
    fn describe(&self) -> &str {
        "fixture"
    }

    fn pacing(&self) -> Pacing {
        Pacing::none()
    }

    fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        self.pages
            .get(page as usize - 1)
            .cloned()
            .ok_or(FetchError::Status {
                url: format!("fixture?page={}", page),
                status: 404,
            })
    }
}

pub fn fixture_source(pages: Vec<String>) -> FixtureSource {
    FixtureSource { pages }
}

/// Serves the same fixture pages for every valid source key.
pub struct FixtureProvider {
    pages: Vec<String>,
    opened: AtomicUsize,
    failures_left: AtomicUsize,
}

impl FixtureProvider {
    pub fn new(pages: Vec<String>) -> Self {
        Self::failing_first(pages, 0)
    }

    /// Like `new`, but the first `failures` opens report the source as unavailable.
    pub fn failing_first(pages: Vec<String>, failures: usize) -> Self {
        Self {
            pages,
            opened: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl SourceProvider for FixtureProvider {
    fn open(&self, source_key: &str) -> Result<Box<dyn PageSource>, AppError> {
        resolve_source_url(source_key)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Internal(format!("{} is unavailable", source_key)));
        }
        Ok(Box::new(fixture_source(self.pages.clone())))
    }
}
