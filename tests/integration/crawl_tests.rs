//! Integration tests for the crawler
//!
//! These tests drive full crawls against an in-memory site served by a
//! scripted renderer, with real on-disk ledgers in temporary directories.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use study_crawl::config::{LedgerBackend, Settings};
use study_crawl::crawler::{
    classify, partition, run_crawl, Classification, CrawlPlan, ReadyState, RenderError,
    RenderResult, Renderer, TabAllocator,
};
use study_crawl::output::RendererStatus;
use study_crawl::storage::{open_ledger, provenance_url, FsLedger, Ledger, StorageError, StudyLayout};
use study_crawl::{url_hash, CrawlPhase, FailureReason, PageState};
use tempfile::TempDir;

/// A page served by the fake site
#[derive(Clone, Default)]
struct SitePage {
    html: String,
    /// Links only visible to the live document (script-generated)
    script_links: Vec<String>,
}

/// In-memory website answering every domain from one URL map
#[derive(Clone, Default)]
struct Site {
    pages: Arc<HashMap<String, SitePage>>,
    visits: Arc<Mutex<Vec<String>>>,
    down: bool,
    no_tabs: bool,
    released: Arc<Mutex<Vec<String>>>,
}

impl Site {
    fn new(pages: Vec<(&str, SitePage)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().map(|(u, p)| (u.to_string(), p)).collect()),
            ..Self::default()
        }
    }

    fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

struct SiteRenderer {
    site: Site,
    current: String,
}

#[async_trait]
impl Renderer for SiteRenderer {
    async fn navigate(&mut self, url: &str) -> RenderResult<()> {
        if self.site.down {
            return Err(RenderError::Transport("connection refused".to_string()));
        }
        self.site.visits.lock().unwrap().push(url.to_string());
        self.current = url.to_string();
        Ok(())
    }

    async fn ready_state(&mut self) -> RenderResult<ReadyState> {
        Ok(ReadyState::Complete)
    }

    async fn html(&mut self) -> RenderResult<String> {
        Ok(match self.site.pages.get(&self.current) {
            Some(page) => page.html.clone(),
            None => page("404 Not Found", &[]),
        })
    }

    async fn links(&mut self) -> RenderResult<Vec<String>> {
        Ok(self
            .site
            .pages
            .get(&self.current)
            .map(|p| p.script_links.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TabAllocator for Site {
    async fn allocate(&self, domain: &str) -> RenderResult<Box<dyn Renderer>> {
        if self.no_tabs {
            return Err(RenderError::Allocation {
                domain: domain.to_string(),
                message: "bridge unreachable".to_string(),
            });
        }
        Ok(Box::new(SiteRenderer {
            site: self.clone(),
            current: String::new(),
        }))
    }

    async fn release(&self, domain: &str, _renderer: Box<dyn Renderer>) {
        self.released.lock().unwrap().push(domain.to_string());
    }
}

/// A full-size page with the given title and anchors
fn page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!("<a href=\"{}\">{}</a>\n", l, l))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body>\n{}{}</body></html>",
        title,
        anchors,
        "<p>Lorem ipsum dolor sit amet.</p>\n".repeat(30)
    )
}

fn site_page(title: &str, links: &[&str]) -> SitePage {
    SitePage {
        html: page(title, links),
        script_links: Vec::new(),
    }
}

fn create_test_plan(dir: &TempDir, domains: &[&str], backend: LedgerBackend) -> CrawlPlan {
    let mut settings = Settings::default();
    settings.output.base_dir = dir.path().to_path_buf();
    settings.crawler.ledger = backend;
    settings.crawler.page_delay_ms = 0;
    settings.crawler.ready_timeout_ms = 0;
    settings.crawler.settle_delay_ms = 0;
    settings.crawler.max_renderer_errors = 2;

    CrawlPlan::new(domains.iter().map(|d| d.to_string()).collect(), false, settings)
}

fn open_study_ledger(plan: &CrawlPlan, domain: &str) -> Box<dyn Ledger> {
    open_ledger(plan.settings.crawler.ledger, &plan.layout(domain)).unwrap()
}

fn example_site() -> Site {
    Site::new(vec![
        (
            "https://www.example.com/",
            site_page("Home", &["/a", "/b", "https://other.org/x", "/logo.png"]),
        ),
        (
            "https://www.example.com/a",
            site_page("A", &["/b", "/missing", "mailto:me@example.com"]),
        ),
        ("https://www.example.com/b", site_page("B", &["/", "#top"])),
    ])
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let dir = TempDir::new().unwrap();
    let site = example_site();
    let plan = create_test_plan(&dir, &["example.com"], LedgerBackend::Fs);

    let report = run_crawl(plan.clone(), Arc::new(site.clone())).await.unwrap();

    assert_eq!(report.domains.len(), 1);
    let summary = &report.domains[0];
    assert_eq!(summary.phase, CrawlPhase::Exhausted);
    assert_eq!(summary.downloaded, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.ledger.pending, 0);
    assert_eq!(summary.ledger.downloaded, 3);
    assert_eq!(summary.renderer, RendererStatus::Allocated);

    // Breadth-first from the seed, each page once
    assert_eq!(
        site.visits(),
        vec![
            "https://www.example.com/",
            "https://www.example.com/a",
            "https://www.example.com/b",
            "https://www.example.com/missing",
        ]
    );
    assert_eq!(*site.released.lock().unwrap(), vec!["example.com"]);

    // On-disk layout
    let layout = plan.layout("example.com");
    let root_hash = url_hash("https://www.example.com/");
    let stored = std::fs::read_to_string(
        layout.worker_dir().join("html").join(format!("{}.html", root_hash)),
    )
    .unwrap();
    assert_eq!(provenance_url(&stored), Some("https://www.example.com/"));
    assert!(layout
        .worker_dir()
        .join("INDEX")
        .join(&root_hash)
        .is_file());

    let missing_hash = url_hash("https://www.example.com/missing");
    let record = std::fs::read_to_string(layout.worker_dir().join("FAILED").join(&missing_hash))
        .unwrap();
    assert!(record.starts_with("https://www.example.com/missing|404_not_found|"));
    assert!(!layout
        .worker_dir()
        .join("html")
        .join(format!("{}.html", missing_hash))
        .exists());

    let archived: Vec<_> = std::fs::read_dir(layout.removed_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].ends_with(&format!("_{}.html", missing_hash)));
}

#[tokio::test]
async fn test_second_run_resumes_without_refetching() {
    let dir = TempDir::new().unwrap();
    let site = example_site();
    let plan = create_test_plan(&dir, &["example.com"], LedgerBackend::Fs);

    run_crawl(plan.clone(), Arc::new(site.clone())).await.unwrap();
    let visits = site.visits().len();

    let report = run_crawl(plan, Arc::new(site.clone())).await.unwrap();

    assert_eq!(site.visits().len(), visits);
    assert_eq!(report.total_downloaded(), 0);
    assert_eq!(report.domains[0].ledger.downloaded, 3);
    assert_eq!(report.domains[0].renderer, RendererStatus::NotNeeded);
}

#[tokio::test]
async fn test_discovery_recovers_unregistered_links() {
    let dir = TempDir::new().unwrap();
    let site = example_site();
    let plan = create_test_plan(&dir, &["example.com"], LedgerBackend::Fs);

    // A previous run stored the home page, then stopped before registering
    // its links
    {
        let mut ledger = open_study_ledger(&plan, "example.com");
        let root = "https://www.example.com/";
        assert!(ledger.register_url(root).unwrap());
        ledger
            .store_content(&url_hash(root), root, &site.pages[root].html)
            .unwrap();
    }

    let report = run_crawl(plan, Arc::new(site.clone())).await.unwrap();

    assert!(!site.visits().contains(&"https://www.example.com/".to_string()));
    assert!(site.visits().contains(&"https://www.example.com/a".to_string()));
    assert_eq!(report.domains[0].ledger.downloaded, 3);
    assert_eq!(report.domains[0].ledger.pending, 0);
}

#[tokio::test]
async fn test_pending_entries_resume_after_interruption() {
    let dir = TempDir::new().unwrap();
    let site = example_site();
    let plan = create_test_plan(&dir, &["example.com"], LedgerBackend::Sqlite);

    {
        let mut ledger = open_study_ledger(&plan, "example.com");
        let root = "https://www.example.com/";
        ledger.register_url(root).unwrap();
        ledger
            .store_content(&url_hash(root), root, &site.pages[root].html)
            .unwrap();
        ledger.register_url("https://www.example.com/b").unwrap();
    }

    let report = run_crawl(plan, Arc::new(site.clone())).await.unwrap();

    assert_eq!(site.visits()[0], "https://www.example.com/b");
    assert_eq!(report.domains[0].ledger.downloaded, 3);
}

#[test]
fn test_idempotent_admission_and_monotonic_states() {
    let dir = TempDir::new().unwrap();
    let layout = StudyLayout::new(dir.path(), "example.com", "300");
    let mut ledger = FsLedger::open(&layout.worker_dir(), &layout.removed_dir()).unwrap();

    let url = "https://www.example.com/a";
    let hash = url_hash(url);
    assert!(ledger.register_url(url).unwrap());
    assert!(!ledger.register_url(url).unwrap());
    assert_eq!(ledger.pending().unwrap(), vec![(hash.clone(), url.to_string())]);

    ledger.store_content(&hash, url, &page("A", &[])).unwrap();
    assert!(!ledger.register_url(url).unwrap());
    assert_eq!(ledger.page(&hash).unwrap().unwrap().state, PageState::Downloaded);

    let err = ledger
        .mark_failed(&hash, url, &FailureReason::NotFound)
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));

    let other = "https://www.example.com/b";
    let other_hash = url_hash(other);
    ledger.register_url(other).unwrap();
    ledger
        .mark_failed(&other_hash, other, &FailureReason::Forbidden)
        .unwrap();
    assert!(!ledger.register_url(other).unwrap());
    assert!(ledger.store_content(&other_hash, other, &page("B", &[])).is_err());
    assert_eq!(ledger.page(&other_hash).unwrap().unwrap().state, PageState::Failed);
}

#[test]
fn test_partition_balance() {
    let domains: Vec<String> = (0..13).map(|i| format!("d{}.com", i)).collect();
    let sizes: Vec<usize> = partition(domains, 4).iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 3, 3, 3]);
}

#[test]
fn test_rate_limit_title_wins_over_body() {
    let html = format!(
        "<html><head><title>429 Too Many Requests</title></head><body>Error 404 {}</body></html>",
        "x".repeat(600)
    );
    assert_eq!(
        classify(&html, 500),
        Classification::Failure(FailureReason::RateLimited)
    );
}

#[tokio::test]
async fn test_empty_responses_end_after_one_pass() {
    let dir = TempDir::new().unwrap();
    let site = Site::new(vec![
        ("https://www.a.com/", SitePage { html: "<html></html>".into(), ..SitePage::default() }),
        ("https://www.b.com/", SitePage { html: "<html></html>".into(), ..SitePage::default() }),
        ("https://www.c.com/", SitePage { html: "<html></html>".into(), ..SitePage::default() }),
    ]);
    let plan = create_test_plan(&dir, &["a.com", "b.com", "c.com"], LedgerBackend::Fs);

    let report = run_crawl(plan.clone(), Arc::new(site.clone())).await.unwrap();

    assert_eq!(site.visits().len(), 3);
    assert_eq!(report.total_downloaded(), 0);
    assert_eq!(report.total_failed(), 3);
    for domain in ["a.com", "b.com", "c.com"] {
        let ledger = open_study_ledger(&plan, domain);
        let hash = ledger.failed_hashes().unwrap().pop().unwrap();
        assert_eq!(
            ledger.failure(&hash).unwrap().unwrap().reason,
            FailureReason::EmptyResponse
        );
    }
}

#[tokio::test]
async fn test_transport_errors_keep_pages_pending() {
    let dir = TempDir::new().unwrap();
    let mut site = example_site();
    site.down = true;
    let plan = create_test_plan(&dir, &["example.com"], LedgerBackend::Fs);

    let report = run_crawl(plan.clone(), Arc::new(site.clone())).await.unwrap();

    let summary = &report.domains[0];
    assert_eq!(summary.renderer, RendererStatus::Degraded);
    assert_eq!(summary.retryable, 2);
    assert_eq!(summary.ledger.pending, 1);
    assert_eq!(summary.ledger.failed, 0);
    assert!(report.renderer_degraded());

    // The bridge comes back: the same page is fetched on the next run
    site.down = false;
    let report = run_crawl(plan, Arc::new(site)).await.unwrap();
    assert_eq!(report.domains[0].ledger.downloaded, 3);
}

#[tokio::test]
async fn test_allocation_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut site = example_site();
    site.no_tabs = true;
    let plan = create_test_plan(&dir, &["example.com", "example.org"], LedgerBackend::Fs);

    let report = run_crawl(plan, Arc::new(site.clone())).await.unwrap();

    assert!(report.renderer_degraded());
    assert!(report
        .domains
        .iter()
        .all(|d| d.renderer == RendererStatus::AllocationFailed && d.ledger.pending == 1));
    assert!(site.visits().is_empty());
}

#[tokio::test]
async fn test_many_domains_in_batches() {
    let dir = TempDir::new().unwrap();
    let domains = ["a.com", "b.com", "c.com", "d.com", "e.com"];
    let pages: Vec<(String, SitePage)> = domains
        .iter()
        .flat_map(|d| {
            vec![
                (format!("https://www.{}/", d), site_page("Home", &["/about"])),
                (format!("https://www.{}/about", d), site_page("About", &[])),
            ]
        })
        .collect();
    let site = Site::new(pages.iter().map(|(u, p)| (u.as_str(), p.clone())).collect());

    let mut plan = create_test_plan(&dir, &domains, LedgerBackend::Sqlite);
    plan.settings.crawler.max_per_batch = 2;
    assert_eq!(plan.batches().len(), 3);

    let report = run_crawl(plan, Arc::new(site.clone())).await.unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.domains.len(), 5);
    assert_eq!(report.total_downloaded(), 10);
    assert_eq!(site.released.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn test_study_patterns_and_script_links() {
    let dir = TempDir::new().unwrap();
    let site = Site::new(vec![
        (
            "https://www.example.com/",
            SitePage {
                html: page("Home", &["/fr/a", "/en/a", "https://docs.example.com/fr/x"]),
                script_links: vec!["https://www.example.com/fr/dynamic".to_string()],
            },
        ),
        ("https://www.example.com/fr/a", site_page("A", &[])),
        ("https://www.example.com/fr/dynamic", site_page("D", &[])),
    ]);
    let plan = create_test_plan(&dir, &["example.com"], LedgerBackend::Fs);

    let layout = plan.layout("example.com");
    std::fs::create_dir_all(layout.study_dir()).unwrap();
    std::fs::write(
        layout.config_path(),
        r#"{"include_patterns": ["/fr/"], "exclude_patterns": []}"#,
    )
    .unwrap();

    let report = run_crawl(plan, Arc::new(site.clone())).await.unwrap();

    assert_eq!(report.domains[0].downloaded, 3);
    let visits = site.visits();
    assert!(visits.contains(&"https://www.example.com/fr/dynamic".to_string()));
    assert!(!visits.contains(&"https://www.example.com/en/a".to_string()));
    assert!(!visits.iter().any(|v| v.contains("docs.example.com")));
}
