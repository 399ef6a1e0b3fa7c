//! Month-window purchase synchronization.
//!
//! A requested range is partitioned into calendar-month windows, each cached
//! independently under `zettle:purchases:{year}-{month}`. The current month
//! gets a short TTL so near-real-time data refreshes quickly; historical
//! months are cached for about a month, staggered per window so they do not
//! all expire at once. Within a window the upstream is paged sequentially
//! through its resume cursor until exhausted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use shared::api::Purchase;

use crate::{cache::Cache, zettle};

/// Upstream page size (the purchase API maximum).
const PAGE_SIZE: usize = 1000;

/// The upstream may return slightly fewer records than requested even when
/// more remain. Only pages shorter than `PAGE_SIZE - PAGE_MARGIN` are treated
/// as the end of a window.
const PAGE_MARGIN: usize = 10;

/// TTL for the current month's window.
const LIVE_WINDOW_TTL: Duration = Duration::from_secs(50);

/// Base TTL for historical windows.
const HISTORY_WINDOW_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Stagger added per window index to historical TTLs so many windows written
/// together do not expire together.
const HISTORY_WINDOW_STAGGER: Duration = Duration::from_secs(60 * 60);

/// A calendar-month-aligned sub-range of a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One page of purchases from the upstream provider.
#[derive(Debug, Clone)]
pub struct PurchasePage {
    pub purchases: Vec<Purchase>,
    /// Opaque resume token; absent when the range is exhausted.
    pub next_cursor: Option<String>,
}

/// Upstream purchase source, one page at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchaseProvider: Send + Sync {
    async fn fetch_page(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<PurchasePage>;
}

/// Zettle implementation of PurchaseProvider.
pub struct ZettleProvider {
    client: zettle::Client,
}

impl ZettleProvider {
    pub fn new(client: zettle::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PurchaseProvider for ZettleProvider {
    async fn fetch_page(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<PurchasePage> {
        let response = self
            .client
            .purchases(start, end, limit, cursor.as_deref())
            .await
            .map_err(|e| anyhow::anyhow!("Zettle purchase fetch failed: {}", e))?;

        Ok(PurchasePage {
            purchases: response.purchases,
            next_cursor: response.last_purchase_hash,
        })
    }
}

/// Serves purchases over arbitrary ranges through the month-window cache.
pub struct PurchaseSyncService {
    cache: Cache,
    provider: Arc<dyn PurchaseProvider>,
}

impl PurchaseSyncService {
    pub fn new(cache: Cache, provider: Arc<dyn PurchaseProvider>) -> Self {
        Self { cache, provider }
    }

    fn month_key(year: i32, month: u32) -> String {
        format!("zettle:purchases:{}-{}", year, month)
    }

    /// All purchases in `[start, end]`, month window by month window in
    /// chronological order, each window served through the validating cache.
    pub async fn purchases_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Purchase>> {
        let now = Utc::now();
        let mut all = Vec::new();

        for (index, window) in month_windows(start, end).into_iter().enumerate() {
            let key = Self::month_key(window.start.year(), window.start.month());
            let ttl = window_ttl(&window, now, index);
            let provider = self.provider.clone();

            let cached = self
                .cache
                .cachify_validate(&key, Some(ttl), |_: &Vec<Purchase>| true, move || {
                    fetch_window(provider, window)
                })
                .await?;

            all.extend(cached.data);
        }

        Ok(all)
    }

    /// Refresh the current month after a pushed purchase: evict its window
    /// and refetch today so the next range query sees the new record.
    pub async fn resync_today(&self) -> Result<Vec<Purchase>> {
        let now = Utc::now();
        self.evict_month(now.year(), now.month()).await;
        self.purchases_in_range(start_of_day(now), end_of_day(now))
            .await
    }

    /// Best-effort eviction of one month window. A store failure is logged
    /// and swallowed; the next read degrades to a refetch anyway.
    pub async fn evict_month(&self, year: i32, month: u32) {
        let key = Self::month_key(year, month);
        if let Err(error) = self.cache.delete(&key).await {
            tracing::warn!(key, %error, "failed to evict cache window");
        }
    }
}

/// Fetch every page of one window, following the resume cursor until the
/// upstream reports exhaustion. Page fetches are strictly sequential.
async fn fetch_window(
    provider: Arc<dyn PurchaseProvider>,
    window: DateWindow,
) -> Result<Vec<Purchase>> {
    let mut purchases = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = provider
            .fetch_page(window.start, window.end, PAGE_SIZE, cursor.clone())
            .await?;

        if page.purchases.is_empty() {
            break;
        }
        let fetched = page.purchases.len();
        purchases.extend(page.purchases);

        // Near-full pages may still be followed by more; short pages are
        // definitely the end.
        if fetched < PAGE_SIZE - PAGE_MARGIN {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(purchases)
}

/// Partition `[start, end]` into calendar-month windows. The first window
/// starts at `start`, each window ends at the last millisecond of its month,
/// and the final window is clamped to `end`. Empty when `start > end`.
pub fn month_windows(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateWindow> {
    let mut windows = Vec::new();
    let mut cursor = start;

    while cursor <= end {
        let next_month = first_of_next_month(cursor);
        let window_end = (next_month - chrono::Duration::milliseconds(1)).min(end);
        windows.push(DateWindow {
            start: cursor,
            end: window_end,
        });
        cursor = next_month;
    }

    windows
}

fn first_of_next_month(at: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(at.year(), at.month(), 1)
        .expect("day 1 is always valid")
        .checked_add_months(Months::new(1))
        .expect("month arithmetic overflow")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

fn window_ttl(window: &DateWindow, now: DateTime<Utc>, index: usize) -> Duration {
    let live = window.start.year() == now.year() && window.start.month() == now.month();
    if live {
        LIVE_WINDOW_TTL
    } else {
        HISTORY_WINDOW_TTL + HISTORY_WINDOW_STAGGER * index as u32
    }
}

pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .expect("end of day is always valid")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use chrono::TimeZone;

    use crate::cache::InMemoryCache;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn purchases(count: usize, prefix: &str) -> Vec<Purchase> {
        (0..count)
            .map(|i| Purchase {
                purchase_uuid1: Some(format!("{prefix}-{i}")),
                ..Purchase::default()
            })
            .collect()
    }

    fn memory_cache() -> Cache {
        Cache::new(Arc::new(InMemoryCache::new()))
    }

    fn service(cache: Cache, provider: MockPurchaseProvider) -> PurchaseSyncService {
        PurchaseSyncService::new(cache, Arc::new(provider))
    }

    #[test]
    fn windows_split_on_month_boundaries_and_clamp_the_ends() {
        let windows = month_windows(utc(2024, 1, 15, 0, 0, 0), utc(2024, 3, 10, 0, 0, 0));

        assert_eq!(
            windows,
            vec![
                DateWindow {
                    start: utc(2024, 1, 15, 0, 0, 0),
                    end: Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()
                        + chrono::Duration::milliseconds(999),
                },
                DateWindow {
                    start: utc(2024, 2, 1, 0, 0, 0),
                    end: Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()
                        + chrono::Duration::milliseconds(999),
                },
                DateWindow {
                    start: utc(2024, 3, 1, 0, 0, 0),
                    end: utc(2024, 3, 10, 0, 0, 0),
                },
            ]
        );
    }

    #[test]
    fn range_within_one_month_is_a_single_window() {
        let start = utc(2024, 6, 3, 8, 0, 0);
        let end = utc(2024, 6, 20, 18, 0, 0);

        let windows = month_windows(start, end);

        assert_eq!(windows, vec![DateWindow { start, end }]);
    }

    #[test]
    fn inverted_range_yields_no_windows() {
        let windows = month_windows(utc(2024, 3, 10, 0, 0, 0), utc(2024, 1, 15, 0, 0, 0));

        assert!(windows.is_empty());
    }

    #[test]
    fn current_month_gets_the_short_ttl() {
        let now = utc(2024, 3, 5, 12, 0, 0);
        let window = DateWindow {
            start: utc(2024, 3, 1, 0, 0, 0),
            end: utc(2024, 3, 31, 0, 0, 0),
        };

        assert_eq!(window_ttl(&window, now, 2), LIVE_WINDOW_TTL);
    }

    #[test]
    fn historical_months_get_staggered_long_ttls() {
        let now = utc(2024, 3, 5, 12, 0, 0);
        let window = DateWindow {
            start: utc(2023, 11, 1, 0, 0, 0),
            end: utc(2023, 11, 30, 0, 0, 0),
        };

        assert_eq!(window_ttl(&window, now, 0), HISTORY_WINDOW_TTL);
        assert_eq!(
            window_ttl(&window, now, 3),
            HISTORY_WINDOW_TTL + HISTORY_WINDOW_STAGGER * 3
        );
    }

    #[tokio::test]
    async fn cached_windows_are_served_without_the_provider() {
        let cache = memory_cache();
        cache
            .set_object("zettle:purchases:2024-1", &purchases(2, "jan"), None)
            .await
            .unwrap();
        cache
            .set_object("zettle:purchases:2024-2", &purchases(1, "feb"), None)
            .await
            .unwrap();
        cache
            .set_object("zettle:purchases:2024-3", &purchases(2, "mar"), None)
            .await
            .unwrap();

        // No expectations: any provider call fails the test.
        let sync = service(cache, MockPurchaseProvider::new());

        let all = sync
            .purchases_in_range(utc(2024, 1, 15, 0, 0, 0), utc(2024, 3, 10, 0, 0, 0))
            .await
            .unwrap();

        let ids: Vec<_> = all
            .iter()
            .map(|p| p.purchase_uuid1.clone().unwrap())
            .collect();
        assert_eq!(ids, ["jan-0", "jan-1", "feb-0", "mar-0", "mar-1"]);
    }

    #[tokio::test]
    async fn three_month_range_issues_one_lookup_per_month() {
        let mut store = crate::cache::MockCacheStore::new();
        let mut seq = mockall::Sequence::new();
        for key in [
            "zettle:purchases:2024-1",
            "zettle:purchases:2024-2",
            "zettle:purchases:2024-3",
        ] {
            store
                .expect_get_string()
                .withf(move |k| k == key)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(Some("[]".to_string())));
        }
        store.expect_remaining_ttl().returning(|_| Ok(None));
        let sync = service(Cache::new(Arc::new(store)), MockPurchaseProvider::new());

        let all = sync
            .purchases_in_range(utc(2024, 1, 15, 0, 0, 0), utc(2024, 3, 10, 0, 0, 0))
            .await
            .unwrap();

        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn missed_windows_are_fetched_once_each_and_cached() {
        let cache = memory_cache();
        let seen: Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let mut provider = MockPurchaseProvider::new();
        let record = seen.clone();
        provider
            .expect_fetch_page()
            .times(3)
            .returning(move |start, end, _, _| {
                record.lock().unwrap().push((start, end));
                Ok(PurchasePage {
                    purchases: purchases(1, &format!("m{}", start.month())),
                    next_cursor: None,
                })
            });
        let sync = service(cache.clone(), provider);

        let all = sync
            .purchases_in_range(utc(2024, 1, 15, 0, 0, 0), utc(2024, 3, 10, 0, 0, 0))
            .await
            .unwrap();

        let ids: Vec<_> = all
            .iter()
            .map(|p| p.purchase_uuid1.clone().unwrap())
            .collect();
        assert_eq!(ids, ["m1-0", "m2-0", "m3-0"]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, utc(2024, 1, 15, 0, 0, 0));
        assert_eq!(seen[1].0, utc(2024, 2, 1, 0, 0, 0));
        assert_eq!(seen[2].1, utc(2024, 3, 10, 0, 0, 0));
        drop(seen);

        let cached: Option<Vec<Purchase>> =
            cache.get_object("zettle:purchases:2024-2").await.unwrap();
        assert_eq!(cached.unwrap()[0].purchase_uuid1.as_deref(), Some("m2-0"));
    }

    #[tokio::test]
    async fn pagination_follows_the_cursor_until_a_short_page() {
        let cursors: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));

        let mut provider = MockPurchaseProvider::new();
        let record = cursors.clone();
        provider
            .expect_fetch_page()
            .times(3)
            .returning(move |_, _, limit, cursor| {
                assert_eq!(limit, PAGE_SIZE);
                let mut record = record.lock().unwrap();
                record.push(cursor);
                let page = match record.len() {
                    1 => PurchasePage {
                        purchases: purchases(PAGE_SIZE, "a"),
                        next_cursor: Some("cursor-1".to_string()),
                    },
                    2 => PurchasePage {
                        purchases: purchases(PAGE_SIZE, "b"),
                        next_cursor: Some("cursor-2".to_string()),
                    },
                    _ => PurchasePage {
                        purchases: purchases(PAGE_SIZE - PAGE_MARGIN - 1, "c"),
                        next_cursor: Some("cursor-3".to_string()),
                    },
                };
                Ok(page)
            });

        let all = fetch_window(
            Arc::new(provider),
            DateWindow {
                start: utc(2024, 5, 1, 0, 0, 0),
                end: utc(2024, 5, 31, 0, 0, 0),
            },
        )
        .await
        .unwrap();

        assert_eq!(all.len(), PAGE_SIZE * 2 + PAGE_SIZE - PAGE_MARGIN - 1);
        assert_eq!(
            *cursors.lock().unwrap(),
            vec![
                None,
                Some("cursor-1".to_string()),
                Some("cursor-2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn pagination_discards_a_trailing_empty_page() {
        let calls = Arc::new(Mutex::new(0usize));

        let mut provider = MockPurchaseProvider::new();
        let counter = calls.clone();
        provider
            .expect_fetch_page()
            .times(2)
            .returning(move |_, _, _, _| {
                let mut calls = counter.lock().unwrap();
                *calls += 1;
                let page = if *calls == 1 {
                    // Near-full page: may still be followed by more.
                    PurchasePage {
                        purchases: purchases(PAGE_SIZE - PAGE_MARGIN, "a"),
                        next_cursor: Some("cursor-1".to_string()),
                    }
                } else {
                    PurchasePage {
                        purchases: Vec::new(),
                        next_cursor: None,
                    }
                };
                Ok(page)
            });

        let all = fetch_window(
            Arc::new(provider),
            DateWindow {
                start: utc(2024, 5, 1, 0, 0, 0),
                end: utc(2024, 5, 31, 0, 0, 0),
            },
        )
        .await
        .unwrap();

        assert_eq!(all.len(), PAGE_SIZE - PAGE_MARGIN);
    }

    #[tokio::test]
    async fn pagination_stops_when_no_cursor_is_returned() {
        let mut provider = MockPurchaseProvider::new();
        provider
            .expect_fetch_page()
            .times(1)
            .returning(move |_, _, _, _| {
                Ok(PurchasePage {
                    purchases: purchases(PAGE_SIZE, "a"),
                    next_cursor: None,
                })
            });

        let all = fetch_window(
            Arc::new(provider),
            DateWindow {
                start: utc(2024, 5, 1, 0, 0, 0),
                end: utc(2024, 5, 31, 0, 0, 0),
            },
        )
        .await
        .unwrap();

        assert_eq!(all.len(), PAGE_SIZE);
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_to_the_caller() {
        let mut provider = MockPurchaseProvider::new();
        provider
            .expect_fetch_page()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("502 from upstream")));
        let sync = service(memory_cache(), provider);

        let result = sync
            .purchases_in_range(utc(2024, 1, 15, 0, 0, 0), utc(2024, 1, 20, 0, 0, 0))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resync_today_replaces_the_current_month_window() {
        let now = Utc::now();
        let key = PurchaseSyncService::month_key(now.year(), now.month());

        let cache = memory_cache();
        cache
            .set_object(&key, &purchases(1, "stale"), None)
            .await
            .unwrap();

        let mut provider = MockPurchaseProvider::new();
        provider
            .expect_fetch_page()
            .times(1)
            .returning(move |_, _, _, _| {
                Ok(PurchasePage {
                    purchases: purchases(2, "fresh"),
                    next_cursor: None,
                })
            });
        let sync = service(cache.clone(), provider);

        let today = sync.resync_today().await.unwrap();

        assert_eq!(today.len(), 2);
        let cached: Vec<Purchase> = cache.get_object(&key).await.unwrap().unwrap();
        assert_eq!(cached[0].purchase_uuid1.as_deref(), Some("fresh-0"));
    }

    #[tokio::test]
    async fn evict_month_removes_the_window_key() {
        let cache = memory_cache();
        cache
            .set_object("zettle:purchases:2024-5", &purchases(1, "may"), None)
            .await
            .unwrap();
        let sync = service(cache.clone(), MockPurchaseProvider::new());

        sync.evict_month(2024, 5).await;

        let cached: Option<Vec<Purchase>> =
            cache.get_object("zettle:purchases:2024-5").await.unwrap();
        assert_eq!(cached, None);
    }

    #[tokio::test]
    async fn evict_month_swallows_store_failures() {
        let mut store = crate::cache::MockCacheStore::new();
        store
            .expect_delete()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));
        let sync = service(
            Cache::new(Arc::new(store)),
            MockPurchaseProvider::new(),
        );

        sync.evict_month(2024, 5).await;
    }
}
