//! Checking tracked items against the live storefront.

use anyhow::{Context, Result};
use bstock_client::{
    identifier::{extract_identifier, looks_like_url, normalize_url, product_url_for},
    types::{CheckResult, CheckStatus, TrackedItem},
    ClientError, FactsExtractor, PageFacts, PageFetcher,
};
use serde::Serialize;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    i18n::Messages,
    notifier::Notification,
    state::{ActivityEntry, AppContext},
    InputError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollTrigger {
    Manual,
    Scheduled,
}

/// Summary of one full poll.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollReport {
    pub trigger: PollTrigger,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub checked: usize,
    pub available: usize,
    pub errors: usize,
    pub notified: usize,
    /// Items removed while the poll was running.
    pub dropped: usize,
    /// Items left unchecked because the poll was cancelled.
    pub abandoned: usize,
}

impl PollReport {
    fn new(trigger: PollTrigger) -> Self {
        Self {
            trigger,
            started_at: OffsetDateTime::now_utc(),
            checked: 0,
            available: 0,
            errors: 0,
            notified: 0,
            dropped: 0,
            abandoned: 0,
        }
    }

    fn record(&mut self, result: &CheckResult) {
        self.checked += 1;
        match result.status {
            CheckStatus::Available => self.available += 1,
            CheckStatus::Error => self.errors += 1,
            CheckStatus::Checking | CheckStatus::Unavailable => {}
        }
    }
}

/// Result of checking one item, plus the product name found on its page.
#[derive(Debug, Clone)]
pub struct ItemCheck {
    pub result: CheckResult,
    pub name: Option<String>,
}

struct Inspection {
    facts: PageFacts,
    b_stock_price: Option<String>,
}

async fn inspect(
    fetcher: &dyn PageFetcher,
    extractor: &dyn FactsExtractor,
    url: &str,
) -> Result<Inspection, ClientError> {
    let html = fetcher.fetch_html(url).await?;
    let facts = extractor.page_facts(&html, url);

    let mut b_stock_price = None;
    if let Some(b_stock_url) = facts.secondary_stock_url.as_deref() {
        let secondary = fetcher.fetch_html(b_stock_url).await?;
        b_stock_price = extractor.price(&secondary);
    }

    Ok(Inspection {
        facts,
        b_stock_price,
    })
}

/// Fetches and evaluates one item.
///
/// Values never regress to `None` once observed: anything the page does not
/// yield is taken from `previous`. The `*_changed` flags compare against
/// `previous` only.
pub async fn check_item(
    fetcher: &dyn PageFetcher,
    extractor: &dyn FactsExtractor,
    item: &TrackedItem,
    previous: Option<&CheckResult>,
    messages: &Messages,
) -> ItemCheck {
    match inspect(fetcher, extractor, &item.url).await {
        Ok(inspection) => {
            let available = inspection.facts.secondary_stock;
            let name = inspection.facts.name.clone();
            ItemCheck {
                result: merge(inspection, previous, messages.status_message(available)),
                name,
            }
        }
        Err(error) => {
            warn!(
                target: "bstock_poller",
                item = %item.id,
                url = %item.url,
                error = %error,
                "item check failed"
            );
            ItemCheck {
                result: failed(&error, previous),
                name: None,
            }
        }
    }
}

fn merge(inspection: Inspection, previous: Option<&CheckResult>, message: &str) -> CheckResult {
    let Inspection {
        facts,
        b_stock_price,
    } = inspection;
    let previous_price = previous.and_then(|result| result.price.as_deref());
    let previous_b_stock_price = previous.and_then(|result| result.b_stock_price.as_deref());

    let status = if facts.secondary_stock {
        CheckStatus::Available
    } else {
        CheckStatus::Unavailable
    };
    let mut result = CheckResult::new(status, message);
    result.price_changed = changed(facts.price.as_deref(), previous_price);
    result.b_stock_price_changed = changed(b_stock_price.as_deref(), previous_b_stock_price);
    result.price = facts.price.or_else(|| previous_price.map(str::to_string));
    result.b_stock_price = b_stock_price.or_else(|| previous_b_stock_price.map(str::to_string));
    result.b_stock_url = facts
        .secondary_stock_url
        .or_else(|| previous.and_then(|result| result.b_stock_url.clone()));
    result.image_url = facts
        .image_url
        .or_else(|| previous.and_then(|result| result.image_url.clone()));
    result
}

fn failed(error: &ClientError, previous: Option<&CheckResult>) -> CheckResult {
    let mut result = CheckResult::new(CheckStatus::Error, error.to_string());
    if let Some(previous) = previous {
        result.price = previous.price.clone();
        result.b_stock_price = previous.b_stock_price.clone();
        result.b_stock_url = previous.b_stock_url.clone();
        result.image_url = previous.image_url.clone();
    }
    result
}

/// A freshly observed value that differs from the stored one. Nothing observed
/// is never a change.
fn changed(current: Option<&str>, previous: Option<&str>) -> bool {
    matches!(current, Some(value) if previous != Some(value))
}

/// Walks every tracked item once, strictly one at a time.
///
/// Results are persisted as soon as each item finishes. Scheduled polls notify
/// when an item turns available.
pub async fn check_all(context: &AppContext, trigger: PollTrigger) -> Result<PollReport> {
    check_all_until(context, trigger, &CancellationToken::new()).await
}

/// [`check_all`] that stops early once `cancel` fires.
///
/// Cancellation is only observed between items, so an item being fetched is
/// always finished. Items not reached get their pre-poll result back.
pub async fn check_all_until(
    context: &AppContext,
    trigger: PollTrigger,
    cancel: &CancellationToken,
) -> Result<PollReport> {
    let _poll = context.state.poll_lock.lock().await;
    let messages = Messages::for_language(context.store.settings().await.language);
    let snapshot = context
        .store
        .begin_poll(messages.checking)
        .await
        .context("failed to mark items as checking")?;

    let mut report = PollReport::new(trigger);
    info!(
        target: "bstock_poller",
        trigger = ?trigger,
        items = snapshot.items.len(),
        "poll started"
    );

    for (index, item) in snapshot.items.iter().enumerate() {
        if index > 0 && !context.options.request_delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(context.options.request_delay) => {}
            }
        }
        if cancel.is_cancelled() {
            let remaining: Vec<String> = snapshot.items[index..]
                .iter()
                .map(|item| item.id.clone())
                .collect();
            report.abandoned = context
                .store
                .abandon_poll(&remaining, &snapshot.previous)
                .await
                .context("failed to roll back unchecked items")?;
            info!(
                target: "bstock_poller",
                abandoned = report.abandoned,
                "poll cancelled"
            );
            break;
        }

        let previous = snapshot.previous.get(&item.id);
        let check = check_item(
            context.fetcher.as_ref(),
            context.extractor.as_ref(),
            item,
            previous,
            messages,
        )
        .await;
        let turned_available =
            check.result.is_available() && !previous.is_some_and(CheckResult::is_available);
        report.record(&check.result);

        let stored = context
            .store
            .put_result(&item.id, check.result.clone())
            .await
            .with_context(|| format!("failed to store result for {}", item.id))?;
        if !stored {
            report.dropped += 1;
            continue;
        }

        if let Some(name) = check.name.as_deref() {
            context
                .store
                .backfill_name(&item.id, name)
                .await
                .with_context(|| format!("failed to store name for {}", item.id))?;
        }

        debug!(
            target: "bstock_poller",
            item = %item.id,
            status = %check.result.status,
            price = check.result.price.as_deref().unwrap_or("-"),
            "item checked"
        );

        if trigger == PollTrigger::Scheduled && turned_available {
            let label = check
                .name
                .clone()
                .or_else(|| item.name.clone())
                .unwrap_or_else(|| item.display_name());
            if notify_available(context, item, &label).await {
                report.notified += 1;
            }
        }
    }

    info!(
        target: "bstock_poller",
        checked = report.checked,
        available = report.available,
        errors = report.errors,
        notified = report.notified,
        "poll finished"
    );
    context
        .state
        .activity
        .record(ActivityEntry::Poll(report.clone()))
        .await;
    Ok(report)
}

async fn notify_available(context: &AppContext, item: &TrackedItem, label: &str) -> bool {
    let settings = context.store.settings().await;
    if !settings.notifications_enabled {
        debug!(target: "bstock_poller", item = %item.id, "notifications disabled");
        return false;
    }

    let messages = Messages::for_language(settings.language);
    let notification = Notification {
        item_id: item.id.clone(),
        title: messages.notification_title.to_string(),
        message: messages.notification_body(label),
        url: Some(item.url.clone()),
    };
    match context.notifier.notify(&notification).await {
        Ok(()) => true,
        Err(error) => {
            warn!(
                target: "bstock_poller",
                item = %item.id,
                error = %error,
                "failed to deliver notification"
            );
            false
        }
    }
}

/// Outcome of [`check_one`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleCheck {
    pub item_id: String,
    pub url: String,
    pub tracked: bool,
    pub result: CheckResult,
}

/// Checks a single URL or article id. Tracked items get their stored result
/// updated; anything else is checked without being persisted.
pub async fn check_one(context: &AppContext, input: &str) -> Result<SingleCheck> {
    let settings = context.store.settings().await;
    let messages = Messages::for_language(settings.language);
    if input.trim().is_empty() {
        return Err(InputError::Empty(messages.enter_url).into());
    }

    if let Some(item) = context.store.find(input).await {
        let _poll = context.state.poll_lock.lock().await;
        let previous = context.store.results().await.remove(&item.id);
        let check = check_item(
            context.fetcher.as_ref(),
            context.extractor.as_ref(),
            &item,
            previous.as_ref(),
            messages,
        )
        .await;
        context
            .store
            .put_result(&item.id, check.result.clone())
            .await
            .with_context(|| format!("failed to store result for {}", item.id))?;
        if let Some(name) = check.name.as_deref() {
            context.store.backfill_name(&item.id, name).await?;
        }
        return Ok(SingleCheck {
            item_id: item.id,
            url: item.url,
            tracked: true,
            result: check.result,
        });
    }

    let id = extract_identifier(input).ok_or(InputError::Invalid(messages.invalid_url))?;
    let url = if looks_like_url(input.trim()) {
        normalize_url(input)
    } else {
        product_url_for(&id, &context.options.site_base_url)
    };
    let candidate = TrackedItem::new(id, url);
    let check = check_item(
        context.fetcher.as_ref(),
        context.extractor.as_ref(),
        &candidate,
        None,
        messages,
    )
    .await;
    Ok(SingleCheck {
        item_id: candidate.id,
        url: candidate.url,
        tracked: false,
        result: check.result,
    })
}
