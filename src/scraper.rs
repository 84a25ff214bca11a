use std::ops::RangeInclusive;
use std::sync::Arc;

use anyhow::Result;
use rusqlite::Connection;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::db::{self, UserRow};
use crate::error::{Anomaly, ScrapeError};
use crate::parser;
use crate::session::PageSource;

/// Results per listing page, mirroring the site's pagination.
pub const PAGE_SIZE: u32 = 24;

/// Query filters for the user directory search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub name: String,
    pub location: String,
    pub min_age: u32,
    pub max_age: u32,
    /// 0 = any, 1 = male, 2 = female, 3 = non-binary
    pub gender: u8,
}

impl SearchFilters {
    pub fn query(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("q", self.name.clone()),
            ("loc", self.location.clone()),
            ("agelow", self.min_age.to_string()),
            ("agehigh", self.max_age.to_string()),
            ("g", self.gender.to_string()),
            ("show", page_offset(page).to_string()),
        ]
    }
}

pub fn page_offset(page: u32) -> u32 {
    page * PAGE_SIZE
}

/// Outcome of one listing page.
#[derive(Debug, Default)]
pub struct PageReport {
    pub discovered: usize,
    pub fetch_errors: usize,
    pub extraction_errors: usize,
    pub anomalies: Vec<Anomaly>,
    /// Named records in listing order.
    pub records: Vec<UserRow>,
}

/// Fetch one listing page, fan out to every profile on it and extract
/// records. Per-profile failures are logged and skipped; a failed listing
/// fetch yields an empty report.
pub async fn run_page<S: PageSource>(
    source: &Arc<S>,
    page: u32,
    filters: &SearchFilters,
) -> PageReport {
    let mut report = PageReport::default();

    let listing_url = format!("{}/users.php", source.base_url());
    let listing = match source.fetch(&listing_url, &filters.query(page)).await {
        Ok(text) => text,
        Err(e) if e.is_timeout() => {
            warn!(page, "Skipping listing page after timeout");
            return report;
        }
        Err(e) => {
            error!(page, error = %e, "Skipping listing page");
            return report;
        }
    };

    let urls = parser::profile_urls(&listing, source.base_url());
    report.discovered = urls.len();
    if urls.is_empty() {
        error!(page, "No users could be found on listing page");
        report.anomalies.push(Anomaly::NoProfilesFound);
    }

    let pages = fetch_all(source, &urls).await;

    let mut records = Vec::with_capacity(urls.len());
    for (url, outcome) in urls.iter().zip(pages) {
        let text = match outcome {
            Ok(text) => text,
            Err(e) => {
                if e.is_timeout() {
                    warn!(page, url = %url, "Ignoring profile fetch timeout");
                } else {
                    warn!(page, url = %url, error = %e, "Ignoring failed profile fetch");
                }
                report.fetch_errors += 1;
                continue;
            }
        };
        match parser::parse_profile(url, &text) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(page, url = %url, error = %e, "Ignoring profile that could not be parsed");
                report.extraction_errors += 1;
            }
        }
    }

    report.records = records.into_iter().filter(|r| r.key().is_some()).collect();
    if report.discovered > 0 && report.records.iter().all(|r| r.affinity.is_none()) {
        warn!(page, "No affinities could be found on this page, you might not be logged in");
        report.anomalies.push(Anomaly::NoAffinities);
    }

    info!(
        page,
        discovered = report.discovered,
        kept = report.records.len(),
        fetch_errors = report.fetch_errors,
        extraction_errors = report.extraction_errors,
        "Listing page done"
    );
    report
}

/// Fetch every URL concurrently. Each outcome lands at its request index,
/// so the result order never depends on completion order.
async fn fetch_all<S: PageSource>(
    source: &Arc<S>,
    urls: &[String],
) -> Vec<Result<String, ScrapeError>> {
    let mut tasks = JoinSet::new();
    for (idx, url) in urls.iter().enumerate() {
        let source = Arc::clone(source);
        let url = url.clone();
        tasks.spawn(async move {
            let outcome = source.fetch(&url, &[]).await;
            (idx, outcome)
        });
    }

    let mut slots: Vec<Option<Result<String, ScrapeError>>> = urls.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, outcome)) => slots[idx] = Some(outcome),
            Err(e) => error!(error = %e, "Profile fetch task died"),
        }
    }

    slots
        .into_iter()
        .zip(urls)
        .map(|(slot, url)| {
            slot.unwrap_or_else(|| {
                Err(ScrapeError::Fetch {
                    url: url.clone(),
                    reason: "fetch task aborted".to_string(),
                })
            })
        })
        .collect()
}

/// Signalled after each listing page has been fetched and persisted.
#[derive(Debug, Clone, Copy)]
pub struct PageProgress {
    pub page: u32,
    pub last_page: u32,
    pub saved: usize,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub pages: usize,
    pub discovered: usize,
    pub saved: usize,
    pub fetch_errors: usize,
    pub extraction_errors: usize,
}

/// Process listing pages strictly one after another: each page's fetches
/// and its database write finish before the next page starts.
pub async fn scrape_pages<S: PageSource>(
    source: Arc<S>,
    filters: &SearchFilters,
    pages: RangeInclusive<u32>,
    conn: &Connection,
    verbose: bool,
    mut on_page: impl FnMut(PageProgress),
) -> Result<RunStats> {
    let last_page = *pages.end();
    let mut stats = RunStats::default();

    for page in pages {
        let report = run_page(&source, page, filters).await;
        if verbose {
            for record in &report.records {
                println!("{}", serde_json::to_string(record)?);
            }
        }

        let saved = db::save_users(conn, &report.records)?;

        stats.pages += 1;
        stats.discovered += report.discovered;
        stats.saved += saved;
        stats.fetch_errors += report.fetch_errors;
        stats.extraction_errors += report.extraction_errors;

        on_page(PageProgress {
            page,
            last_page,
            saved,
        });
    }

    info!(
        pages = stats.pages,
        saved = stats.saved,
        "Scraped {} profiles ({} fetch errors, {} extraction errors)",
        stats.discovered,
        stats.fetch_errors,
        stats.extraction_errors
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    const BASE: &str = "https://site.test";

    enum Reply {
        Page { delay_ms: u64, body: String },
        Timeout,
        Broken,
    }

    #[derive(Default)]
    struct FakeSite {
        listings: HashMap<u32, Reply>,
        profiles: HashMap<String, Reply>,
        listing_queries: Mutex<Vec<Vec<(&'static str, String)>>>,
        profile_hits: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn listing(mut self, offset: u32, names: &[&str]) -> Self {
            let body = names
                .iter()
                .map(|n| format!(r#"<div class="picSurround"><a href="/profile/{}"><img></a></div>"#, n))
                .collect::<Vec<_>>()
                .join("\n");
            self.listings.insert(offset, Reply::Page { delay_ms: 0, body });
            self
        }

        fn listing_reply(mut self, offset: u32, reply: Reply) -> Self {
            self.listings.insert(offset, reply);
            self
        }

        fn profile(mut self, name: &str, reply: Reply) -> Self {
            self.profiles.insert(format!("{}/profile/{}", BASE, name), reply);
            self
        }
    }

    fn page_for(name: &str, affinity: Option<&str>) -> String {
        let bars = affinity
            .map(|a| {
                format!(
                    concat!(
                        r#"<div class="bar-outer-negative ar"><span>0%</span></div>"#,
                        "\n",
                        r#"<div class="bar-outer-positive al"><span>{}%</span></div>"#,
                    ),
                    a
                )
            })
            .unwrap_or_default();
        format!(
            "<html><h1><span class=\"di-ib po-r\">\n  {}'s Profile</span></h1>\n{}\n</html>",
            name, bars
        )
    }

    fn ok(delay_ms: u64, name: &str) -> Reply {
        Reply::Page {
            delay_ms,
            body: page_for(name, Some("10")),
        }
    }

    impl PageSource for FakeSite {
        fn base_url(&self) -> &str {
            BASE
        }

        async fn fetch(
            &self,
            url: &str,
            params: &[(&'static str, String)],
        ) -> Result<String, ScrapeError> {
            let reply = if url.ends_with("/users.php") {
                self.listing_queries.lock().unwrap().push(params.to_vec());
                let offset: u32 = params
                    .iter()
                    .find(|(k, _)| *k == "show")
                    .and_then(|(_, v)| v.parse().ok())
                    .unwrap();
                self.listings.get(&offset)
            } else {
                self.profile_hits.lock().unwrap().push(url.to_string());
                self.profiles.get(url)
            };
            match reply {
                Some(Reply::Page { delay_ms, body }) => {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                    Ok(body.clone())
                }
                Some(Reply::Timeout) => Err(ScrapeError::Timeout {
                    url: url.to_string(),
                }),
                Some(Reply::Broken) | None => Err(ScrapeError::Fetch {
                    url: url.to_string(),
                    reason: "connection reset".to_string(),
                }),
            }
        }
    }

    fn names(report: &PageReport) -> Vec<&str> {
        report.records.iter().filter_map(|r| r.key()).collect()
    }

    #[test]
    fn page_three_starts_at_offset_72() {
        assert_eq!(page_offset(3), 72);
        let q = SearchFilters::default().query(3);
        assert!(q.contains(&("show", "72".to_string())));
    }

    #[tokio::test]
    async fn listing_query_carries_filters() {
        let site = Arc::new(FakeSite::default().listing(48, &[]));
        let filters = SearchFilters {
            name: "ali".into(),
            location: "Kyoto".into(),
            min_age: 18,
            max_age: 30,
            gender: 2,
        };
        run_page(&site, 2, &filters).await;
        let queries = site.listing_queries.lock().unwrap();
        assert_eq!(
            queries[0],
            vec![
                ("q", "ali".to_string()),
                ("loc", "Kyoto".to_string()),
                ("agelow", "18".to_string()),
                ("agehigh", "30".to_string()),
                ("g", "2".to_string()),
                ("show", "48".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn partial_failures_keep_successes_in_listing_order() {
        let site = Arc::new(
            FakeSite::default()
                .listing(24, &["a", "b", "c", "d", "e"])
                .profile("a", ok(60, "a"))
                .profile("b", Reply::Timeout)
                .profile("c", ok(30, "c"))
                .profile("d", Reply::Broken)
                .profile("e", ok(0, "e")),
        );
        let report = run_page(&site, 1, &SearchFilters::default()).await;

        assert_eq!(names(&report), vec!["a", "c", "e"]);
        assert_eq!(report.discovered, 5);
        assert_eq!(report.fetch_errors, 2);
        assert_eq!(report.extraction_errors, 0);
        assert!(report.anomalies.is_empty());
        assert_eq!(site.profile_hits.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn listing_timeout_abandons_only_that_page() {
        let site = Arc::new(FakeSite::default().listing_reply(24, Reply::Timeout));
        let report = run_page(&site, 1, &SearchFilters::default()).await;
        assert!(report.records.is_empty());
        assert_eq!(report.discovered, 0);
        assert!(site.profile_hits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_listing_is_flagged() {
        let site = Arc::new(FakeSite::default().listing(24, &[]));
        let report = run_page(&site, 1, &SearchFilters::default()).await;
        assert!(report.records.is_empty());
        assert_eq!(report.anomalies, vec![Anomaly::NoProfilesFound]);
    }

    #[tokio::test]
    async fn missing_affinities_are_flagged() {
        let site = Arc::new(
            FakeSite::default()
                .listing(24, &["a", "b"])
                .profile("a", Reply::Page { delay_ms: 0, body: page_for("a", None) })
                .profile("b", Reply::Page { delay_ms: 0, body: page_for("b", None) }),
        );
        let report = run_page(&site, 1, &SearchFilters::default()).await;
        assert_eq!(names(&report), vec!["a", "b"]);
        assert_eq!(report.anomalies, vec![Anomaly::NoAffinities]);
    }

    #[tokio::test]
    async fn all_profiles_failing_still_flags_missing_affinities() {
        let site = Arc::new(
            FakeSite::default()
                .listing(24, &["a", "b"])
                .profile("a", Reply::Timeout)
                .profile("b", Reply::Broken),
        );
        let report = run_page(&site, 1, &SearchFilters::default()).await;
        assert!(report.records.is_empty());
        assert_eq!(report.fetch_errors, 2);
        assert_eq!(report.anomalies, vec![Anomaly::NoAffinities]);
    }

    #[tokio::test]
    async fn nameless_and_blank_pages_are_dropped() {
        let site = Arc::new(
            FakeSite::default()
                .listing(24, &["a", "ghost", "blank"])
                .profile("a", ok(0, "a"))
                .profile(
                    "ghost",
                    Reply::Page { delay_ms: 0, body: "<html>This user does not exist</html>".into() },
                )
                .profile("blank", Reply::Page { delay_ms: 0, body: String::new() }),
        );
        let report = run_page(&site, 1, &SearchFilters::default()).await;
        assert_eq!(names(&report), vec!["a"]);
        assert_eq!(report.extraction_errors, 1);
        assert_eq!(report.fetch_errors, 0);
    }

    #[tokio::test]
    async fn pages_are_saved_in_sequence() {
        let site = Arc::new(
            FakeSite::default()
                .listing(24, &["a", "b"])
                .listing_reply(48, Reply::Broken)
                .listing(72, &["c"])
                .profile("a", ok(0, "a"))
                .profile("b", ok(0, "b"))
                .profile("c", ok(0, "c")),
        );
        let conn = Connection::open_in_memory().unwrap();
        let mut seen = Vec::new();

        let stats = scrape_pages(
            Arc::clone(&site),
            &SearchFilters::default(),
            1..=3,
            &conn,
            false,
            |p| seen.push((p.page, p.last_page, p.saved)),
        )
        .await
        .unwrap();

        assert_eq!(seen, vec![(1, 3, 2), (2, 3, 0), (3, 3, 1)]);
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.saved, 3);
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM user", [], |r| r.get(0))
            .unwrap();
        assert_eq!(users, 3);
    }
}
