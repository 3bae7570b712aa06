mod common;

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use bstock_client::{
    types::{CheckStatus, TrackedItem},
    ClientError, ItemStore, PageFetcher,
};
use bstock_core::{
    notifier::TracingNotifier,
    services::poller::{check_all, check_one, PollTrigger},
    state::{AppContext, PollOptions},
    InputError,
};
use common::{b_stock_page, product_page, Harness, B_STOCK_URL, PRODUCT_URL};
use tokio::time::Instant;

#[tokio::test]
async fn item_turning_available_flags_b_stock_price_and_notifies_once() {
    let harness = Harness::new().await;
    harness.track("123456", PRODUCT_URL).await;
    harness
        .fetcher
        .serve(PRODUCT_URL, product_page("Harley Benton ST-20", "199.00", None));

    let first = check_all(&harness.context, PollTrigger::Scheduled)
        .await
        .expect("first poll");
    assert_eq!(first.checked, 1);
    assert_eq!(first.notified, 0);

    let results = harness.context.store.results().await;
    let result = &results["123456"];
    assert_eq!(result.status, CheckStatus::Unavailable);
    assert_eq!(result.message, "Stock B is not available");
    assert_eq!(result.price.as_deref(), Some("199.00"));
    assert_eq!(result.b_stock_price, None);

    harness.fetcher.serve(
        PRODUCT_URL,
        product_page(
            "Harley Benton ST-20",
            "199.00",
            Some("harley_benton_st_20_b_stock.htm"),
        ),
    );
    harness.fetcher.serve(B_STOCK_URL, b_stock_page("149.00"));

    let second = check_all(&harness.context, PollTrigger::Scheduled)
        .await
        .expect("second poll");
    assert_eq!(second.available, 1);
    assert_eq!(second.notified, 1);

    let results = harness.context.store.results().await;
    let result = &results["123456"];
    assert_eq!(result.status, CheckStatus::Available);
    assert_eq!(result.price.as_deref(), Some("199.00"));
    assert_eq!(result.b_stock_price.as_deref(), Some("149.00"));
    assert_eq!(result.b_stock_url.as_deref(), Some(B_STOCK_URL));
    assert_eq!(
        result.image_url.as_deref(),
        Some("https://www.thomann.de/pics/prod/123456.jpg")
    );
    assert!(!result.price_changed);
    assert!(result.b_stock_price_changed);

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].item_id, "123456");
    assert_eq!(sent[0].title, "B-Stock Available!");
    assert_eq!(sent[0].message, "B-Stock is available for Harley Benton ST-20");
    assert_eq!(sent[0].url.as_deref(), Some(PRODUCT_URL));

    let items = harness.context.store.items().await;
    assert_eq!(items[0].name.as_deref(), Some("Harley Benton ST-20"));

    // Still available: no second notification.
    check_all(&harness.context, PollTrigger::Scheduled)
        .await
        .expect("third poll");
    assert_eq!(harness.notifier.sent().len(), 1);
}

#[tokio::test]
async fn manual_polls_never_notify() {
    let harness = Harness::new().await;
    harness.track("123456", PRODUCT_URL).await;
    harness.fetcher.serve(
        PRODUCT_URL,
        product_page("Guitar", "199.00", Some(B_STOCK_URL)),
    );
    harness.fetcher.serve(B_STOCK_URL, b_stock_page("149.00"));

    let report = check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("poll");
    assert_eq!(report.available, 1);
    assert_eq!(report.notified, 0);
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn disabled_notifications_are_not_sent() {
    let harness = Harness::new().await;
    harness
        .context
        .store
        .update_settings(|settings| settings.notifications_enabled = false)
        .await
        .expect("settings");
    harness.track("123456", PRODUCT_URL).await;
    harness.fetcher.serve(
        PRODUCT_URL,
        product_page("Guitar", "199.00", Some(B_STOCK_URL)),
    );
    harness.fetcher.serve(B_STOCK_URL, b_stock_page("149.00"));

    let report = check_all(&harness.context, PollTrigger::Scheduled)
        .await
        .expect("poll");
    assert_eq!(report.notified, 0);
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn repeated_polls_over_unchanged_pages_are_idempotent() {
    let harness = Harness::new().await;
    harness.track("123456", PRODUCT_URL).await;
    harness.fetcher.serve(
        PRODUCT_URL,
        product_page("Guitar", "199.00", Some(B_STOCK_URL)),
    );
    harness.fetcher.serve(B_STOCK_URL, b_stock_page("149.00"));

    check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("first poll");
    let first = harness.context.store.results().await["123456"].clone();
    check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("second poll");
    let second = harness.context.store.results().await["123456"].clone();

    assert!(first.price_changed);
    assert!(!second.price_changed);
    assert!(!second.b_stock_price_changed);
    assert_eq!(second.status, first.status);
    assert_eq!(second.price, first.price);
    assert_eq!(second.b_stock_price, first.b_stock_price);
    assert_eq!(second.b_stock_url, first.b_stock_url);
    assert_eq!(second.image_url, first.image_url);

    check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("third poll");
    let third = harness.context.store.results().await["123456"].clone();
    assert!(third.same_outcome(&second));
}

#[tokio::test]
async fn failed_fetch_keeps_previous_values() {
    let harness = Harness::new().await;
    harness.track("123456", PRODUCT_URL).await;
    harness.fetcher.serve(
        PRODUCT_URL,
        product_page("Guitar", "199.00", Some(B_STOCK_URL)),
    );
    harness.fetcher.serve(B_STOCK_URL, b_stock_page("149.00"));
    check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("first poll");

    harness
        .fetcher
        .fail(PRODUCT_URL, ClientError::Http("connection reset".to_string()));
    let report = check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("poll survives failures");
    assert_eq!(report.errors, 1);

    let results = harness.context.store.results().await;
    let result = &results["123456"];
    assert_eq!(result.status, CheckStatus::Error);
    assert!(result.message.contains("connection reset"));
    assert_eq!(result.price.as_deref(), Some("199.00"));
    assert_eq!(result.b_stock_price.as_deref(), Some("149.00"));
    assert_eq!(result.b_stock_url.as_deref(), Some(B_STOCK_URL));
}

#[tokio::test]
async fn missing_values_fall_back_to_previous_result() {
    let harness = Harness::new().await;
    harness.track("123456", PRODUCT_URL).await;
    harness
        .fetcher
        .serve(PRODUCT_URL, product_page("Guitar", "199.00", None));
    check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("first poll");

    harness
        .fetcher
        .serve(PRODUCT_URL, "<html><body><h1>Guitar</h1></body></html>");
    check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("second poll");

    let results = harness.context.store.results().await;
    let result = &results["123456"];
    assert_eq!(result.status, CheckStatus::Unavailable);
    assert_eq!(result.price.as_deref(), Some("199.00"));
    assert_eq!(
        result.image_url.as_deref(),
        Some("https://www.thomann.de/pics/prod/123456.jpg")
    );
    assert!(!result.price_changed);
}

#[tokio::test]
async fn one_failing_item_does_not_stop_the_others() {
    let harness = Harness::new().await;
    let other = "https://www.thomann.de/intl/other_654321.htm";
    harness.track("123456", PRODUCT_URL).await;
    harness.track("654321", other).await;
    harness
        .fetcher
        .fail(PRODUCT_URL, ClientError::Http("timed out".to_string()));
    harness
        .fetcher
        .serve(other, product_page("Other", "59.00", None));

    let report = check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("poll");
    assert_eq!(report.checked, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(harness.fetcher.requests(), [PRODUCT_URL, other]);

    let results = harness.context.store.results().await;
    assert_eq!(results["654321"].status, CheckStatus::Unavailable);
}

#[tokio::test]
async fn secondary_page_failure_marks_the_item_as_error() {
    let harness = Harness::new().await;
    harness.track("123456", PRODUCT_URL).await;
    harness.fetcher.serve(
        PRODUCT_URL,
        product_page("Guitar", "199.00", Some(B_STOCK_URL)),
    );

    check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("poll");
    let results = harness.context.store.results().await;
    assert_eq!(results["123456"].status, CheckStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn consecutive_fetches_are_spaced_by_the_request_delay() {
    let delay = Duration::from_secs(5);
    let harness = Harness::with_options(PollOptions {
        request_delay: delay,
        ..PollOptions::default()
    })
    .await;
    for id in ["111111", "222222", "333333"] {
        let url = format!("https://www.thomann.de/intl/item_{id}.htm");
        harness.track(id, &url).await;
        harness
            .fetcher
            .serve(&url, product_page("Item", "10.00", None));
    }

    let started = Instant::now();
    let report = check_all(&harness.context, PollTrigger::Manual)
        .await
        .expect("poll");
    assert_eq!(report.checked, 3);

    let times = harness.fetcher.request_times();
    assert_eq!(times.len(), 3);
    assert!(times[0] - started < delay, "first item is fetched right away");
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= delay);
    }
}

/// Removes one item from the store while its page is being fetched.
struct RemovingFetcher {
    store: OnceLock<Arc<ItemStore>>,
    victim: &'static str,
}

#[async_trait]
impl PageFetcher for RemovingFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, ClientError> {
        if let Some(store) = self.store.get() {
            if url.contains(self.victim) {
                store.remove(self.victim).await.expect("removal");
            }
        }
        Ok(product_page("Guitar", "199.00", None))
    }
}

#[tokio::test]
async fn items_removed_mid_poll_leave_no_orphan_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ItemStore::open(dir.path().join(ItemStore::FILE_NAME))
        .await
        .expect("store");
    store
        .add_item(TrackedItem::new("111111", "https://www.thomann.de/a_111111.htm"))
        .await
        .expect("add");
    store
        .add_item(TrackedItem::new("222222", "https://www.thomann.de/b_222222.htm"))
        .await
        .expect("add");

    let fetcher = Arc::new(RemovingFetcher {
        store: OnceLock::new(),
        victim: "111111",
    });
    let context = AppContext::new(
        fetcher.clone(),
        store,
        Arc::new(TracingNotifier),
        PollOptions {
            request_delay: Duration::ZERO,
            ..PollOptions::default()
        },
    );
    let _ = fetcher.store.set(context.store.clone());

    let report = check_all(&context, PollTrigger::Manual).await.expect("poll");
    assert_eq!(report.dropped, 1);

    let document = context.store.snapshot().await;
    assert_eq!(document.items.len(), 1);
    assert!(!document.results.contains_key("111111"));
    assert!(document.results.contains_key("222222"));

    let reopened = ItemStore::open(dir.path().join(ItemStore::FILE_NAME))
        .await
        .expect("reopen");
    assert!(!reopened.results().await.contains_key("111111"));
}

#[tokio::test]
async fn check_one_persists_tracked_items_only() {
    let harness = Harness::new().await;
    harness.track("123456", PRODUCT_URL).await;
    harness
        .fetcher
        .serve(PRODUCT_URL, product_page("Guitar", "199.00", None));
    harness.fetcher.serve(
        "https://www.thomann.de/777777.html",
        product_page("Drum", "99.00", None),
    );

    let tracked = check_one(&harness.context, "123456").await.expect("tracked");
    assert!(tracked.tracked);
    assert_eq!(tracked.url, PRODUCT_URL);
    assert_eq!(tracked.result.price.as_deref(), Some("199.00"));

    let adhoc = check_one(&harness.context, "777777").await.expect("untracked");
    assert!(!adhoc.tracked);
    assert_eq!(adhoc.url, "https://www.thomann.de/777777.html");
    assert_eq!(adhoc.result.price.as_deref(), Some("99.00"));

    let results = harness.context.store.results().await;
    assert!(results.contains_key("123456"));
    assert!(!results.contains_key("777777"));
}

#[tokio::test]
async fn check_one_rejects_bad_input() {
    let harness = Harness::new().await;
    let error = check_one(&harness.context, "  ").await.expect_err("empty");
    assert_eq!(
        error.downcast_ref::<InputError>(),
        Some(&InputError::Empty("Please enter a URL or article ID"))
    );

    let error = check_one(&harness.context, "not a url or id")
        .await
        .expect_err("garbage");
    assert!(matches!(
        error.downcast_ref::<InputError>(),
        Some(InputError::Invalid(_))
    ));
}
