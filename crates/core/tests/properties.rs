//! Property tests for storage round-trips and DOM chunking

use proptest::prelude::*;
use scraper::{Html, Selector};
use smokestore_core::dom::match_document;
use std::collections::BTreeMap;
use smokestore_core::{Category, ContentStore, DomStore, StoreOptions};
use std::sync::Arc;
use tempfile::TempDir;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// One element, optionally wrapping a child, with a small attribute vocabulary.
fn element_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["div", "span", "li", "a", "p", "section"]),
        prop::option::of(prop::sample::select(vec!["item", "box", "active", "item box"])),
        prop::option::of(0u8..6),
        "[a-z ]{0,12}",
        prop::option::of(prop::sample::select(vec!["em", "b", "img", "br"])),
    )
        .prop_map(|(tag, class, id, text, child)| {
            let mut el = format!("<{}", tag);
            if let Some(class) = class {
                el.push_str(&format!(" class=\"{}\"", class));
            }
            if let Some(id) = id {
                el.push_str(&format!(" id=\"n{}\"", id));
            }
            if tag == "a" {
                el.push_str(" href=\"/x\"");
            }
            el.push('>');
            el.push_str(&text);
            match child {
                Some(void @ ("img" | "br")) => el.push_str(&format!("<{}>", void)),
                Some(inner) => el.push_str(&format!("<{0}>{1}</{0}>", inner, text)),
                None => {}
            }
            el.push_str(&format!("</{}>", tag));
            el
        })
}

/// Tag and attributes of every element `selector` selects in a browser-style parse
fn html5_matches(html: &str, selector: &str) -> Vec<(String, BTreeMap<String, String>)> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(selector).unwrap();
    document
        .select(&selector)
        .map(|e| {
            let attrs = e.value().attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            (e.value().name().to_string(), attrs)
        })
        .collect()
}

fn document_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(element_strategy(), 0..40).prop_map(|elements| {
        format!(
            "<!DOCTYPE html><html><head><title>t</title></head><body>{}</body></html>",
            elements.concat()
        )
    })
}

const SELECTORS: &[&str] = &[
    "*",
    "html",
    "body",
    "li",
    ".item",
    ".item.box",
    "#n3",
    "a[href]",
    "[href^=\"/\"]",
    "div.active, span, em",
    "img",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_content_roundtrip(data in prop::collection::vec(any::<u8>(), 0..4096), compress in any::<bool>()) {
        let rt = runtime();
        let tmp = TempDir::new().unwrap();
        let (r, back) = rt.block_on(async {
            let store = ContentStore::new(tmp.path(), true, compress).await.unwrap();
            let r = store.store(Category::Metadata, &data, StoreOptions::new("prop")).await.unwrap();
            let back = store.retrieve(&r).await.unwrap();
            (r, back)
        });
        prop_assert_eq!(r.size, data.len() as u64);
        prop_assert_eq!(r.hash, ContentStore::hash(&data));
        prop_assert_eq!(back, data);
    }

    // Fragments without html/head/body exercise the elements the parser implies.
    #[test]
    fn prop_dom_chunking_is_transparent(
        html in prop_oneof![
            document_strategy(),
            prop::collection::vec(element_strategy(), 0..20).prop_map(|els| els.concat()),
        ],
        chunk_size in 1usize..25,
    ) {
        let rt = runtime();
        let tmp = TempDir::new().unwrap();
        let (retrieved, results) = rt.block_on(async {
            let content = ContentStore::new(tmp.path(), true, false).await.unwrap();
            let store = DomStore::new(Arc::new(content), chunk_size);
            let r = store.store(&html, StoreOptions::new("prop")).await.unwrap();
            let retrieved = store.retrieve(&r).await.unwrap();
            let mut results = Vec::new();
            for selector in SELECTORS {
                results.push(store.query_by_selector(&r, selector).await.unwrap());
            }
            (retrieved, results)
        });

        prop_assert_eq!(&retrieved, &html);
        for (selector, chunked) in SELECTORS.iter().zip(results) {
            let seen: Vec<(String, BTreeMap<String, String>)> =
                chunked.iter().map(|n| (n.tag.clone(), n.attributes.clone())).collect();
            prop_assert_eq!(&seen, &html5_matches(&html, selector), "selector {}", selector);

            let whole = match_document(&html, selector).unwrap();
            prop_assert_eq!(chunked, whole, "selector {}", selector);
        }
    }
}
