//! End-to-end crawl tests against a local mock HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tenderwatch::crawling::{CrawlEndReason, CrawlEngine, HaltReason, MergeMode, StopPolicy};
use tenderwatch::infrastructure::config::AppConfig;
use tenderwatch::infrastructure::http_client::{HttpClient, HttpClientConfig};
use tenderwatch::infrastructure::store::TenderStore;

fn test_config(server: &MockServer, store_path: PathBuf) -> AppConfig {
    AppConfig {
        base_url: server.uri(),
        start_url: format!("{}/Search/Results?sort=desc", server.uri()),
        output_file: store_path,
        page_delay_ms: 0,
        enrich_cpv: false,
        http: HttpClientConfig {
            retry_base_delay_ms: 10,
            max_requests_per_second: 1000,
            ..HttpClientConfig::default()
        },
        ..AppConfig::default()
    }
}

fn search_result(id: &str, date: &str) -> String {
    format!(
        r#"<div class="search-result">
            <h2><a href="/Notice/{id}?origin=SearchResults">Tender {id}</a></h2>
            <div class="search-result-sub-header">Example Council</div>
            <dl>
                <div class="search-result-entry"><dt>Publication date</dt><dd>{date}</dd></div>
            </dl>
        </div>"#
    )
}

fn listing_page(results: &[String], has_next: bool) -> String {
    let pagination = if has_next {
        r#"<ul class="gadget-footer-paginate">
            <li class="standard-paginate-selected">1</li>
            <li><a class="standard-paginate-next" href="?page=2">Next</a></li>
        </ul>"#
    } else {
        ""
    };
    format!("<html><body>{}{}</body></html>", results.join("\n"), pagination)
}

async fn build_engine(
    config: &AppConfig,
    policy: StopPolicy,
    merge_mode: MergeMode,
    max_pages: Option<u32>,
) -> CrawlEngine {
    let store = TenderStore::open(&config.output_file, &config.start_url)
        .await
        .expect("store should open");
    let fetcher = Arc::new(HttpClient::new(config.http.clone()).expect("client should build"));
    CrawlEngine::new(fetcher, store, policy, merge_mode, max_pages, config)
        .expect("engine should build")
}

#[tokio::test]
async fn test_full_crawl_walks_pagination_and_persists() {
    let server = MockServer::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(&server, dir.path().join("store.json"));

    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &[
                search_result("000002-2025", "2 June 2025, 9:00am"),
                search_result("000001-2025", "1 June 2025, 8:00am"),
            ],
            true,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &[search_result("000000-2025", "31 May 2025, 7:00am")],
            false,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut engine =
        build_engine(&config, StopPolicy::None, MergeMode::ProgressivePerPage, None).await;
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.end_reason, CrawlEndReason::PaginationExhausted);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.new_records, 3);

    // Reopen from disk: everything must have been persisted.
    let store = TenderStore::open(&config.output_file, &config.start_url).await.unwrap();
    assert_eq!(store.total(), 3);
    assert_eq!(store.records()[0].tender_id, "000002-2025");
    assert_eq!(store.records()[0].organisation, "Example Council");
    assert_eq!(
        store.records()[0].publication_date_parsed,
        Some(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap())
    );
    assert_eq!(store.metadata().total_tenders, 3);
}

#[tokio::test]
async fn test_incremental_run_halts_on_known_id_without_fetching_further() {
    let server = MockServer::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(&server, dir.path().join("store.json"));

    let page_one = listing_page(
        &[
            search_result("000003-2025", "3 June 2025, 9:00am"),
            search_result("000002-2025", "2 June 2025, 9:00am"),
        ],
        true,
    );
    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_one))
        .mount(&server)
        .await;
    // The known id appears on page one, so page two must never be requested.
    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&[], false)))
        .expect(0)
        .mount(&server)
        .await;

    // Seed the store with a first bounded run.
    let mut engine =
        build_engine(&config, StopPolicy::None, MergeMode::ProgressivePerPage, Some(1)).await;
    engine.run().await.unwrap();

    // Second run: both ids are already known; nothing new, immediate halt.
    let seeded = TenderStore::open(&config.output_file, &config.start_url).await.unwrap();
    let policy = StopPolicy::KnownIds {
        ids: seeded.known_ids(),
        last_scraped_at: seeded.last_scraped_at(),
    };
    let mut engine = build_engine(&config, policy, MergeMode::PrependOnComplete, None).await;
    let summary = engine.run().await.unwrap();

    assert!(matches!(
        summary.end_reason,
        CrawlEndReason::Halted(HaltReason::KnownId(_))
    ));
    assert_eq!(summary.new_records, 0);
    let store = TenderStore::open(&config.output_file, &config.start_url).await.unwrap();
    assert_eq!(store.total(), 2);
}

#[tokio::test]
async fn test_incremental_run_prepends_new_records() {
    let server = MockServer::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(&server, dir.path().join("store.json"));

    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &[
                search_result("000005-2025", "5 June 2025, 9:00am"),
                search_result("000004-2025", "4 June 2025, 9:00am"),
            ],
            false,
        )))
        .mount(&server)
        .await;

    let known = StopPolicy::KnownIds {
        ids: ["000004-2025".to_string()].into_iter().collect(),
        last_scraped_at: None,
    };
    let mut engine = build_engine(&config, known, MergeMode::PrependOnComplete, None).await;
    let summary = engine.run().await.unwrap();

    assert!(matches!(
        summary.end_reason,
        CrawlEndReason::Halted(HaltReason::KnownId(_))
    ));
    assert_eq!(summary.new_records, 1);
    let store = TenderStore::open(&config.output_file, &config.start_url).await.unwrap();
    assert_eq!(store.records()[0].tender_id, "000005-2025");
}

#[tokio::test]
async fn test_target_date_mode_keeps_only_matching_dates() {
    let server = MockServer::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(&server, dir.path().join("store.json"));

    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &[
                search_result("000011-2025", "16 June 2025, 9:00am"),
                search_result("000010-2025", "15 June 2025, 9:00am"),
                search_result("000009-2025", "14 June 2025, 9:00am"),
            ],
            true,
        )))
        .mount(&server)
        .await;

    let target = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
    let mut engine = build_engine(
        &config,
        StopPolicy::TargetDate(target),
        MergeMode::ProgressivePerPage,
        None,
    )
    .await;
    let summary = engine.run().await.unwrap();

    // The newer record is skipped, the match is kept, the older one halts.
    assert!(matches!(
        summary.end_reason,
        CrawlEndReason::Halted(HaltReason::DateBeforeTarget { .. })
    ));
    let store = TenderStore::open(&config.output_file, &config.start_url).await.unwrap();
    assert_eq!(store.total(), 1);
    assert_eq!(store.records()[0].tender_id, "000010-2025");
}

#[tokio::test]
async fn test_cpv_enrichment_from_detail_pages() {
    let server = MockServer::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = test_config(&server, dir.path().join("store.json"));
    config.enrich_cpv = true;

    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &[search_result("000020-2025", "20 June 2025, 9:00am")],
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Notice/000020-2025"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                <ul class="govuk-list govuk-list--bullet">
                    <li>45233140 - Roadworks</li>
                    <li>45233141 - Road-maintenance works</li>
                    <li>Not a CPV entry</li>
                </ul>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut engine =
        build_engine(&config, StopPolicy::None, MergeMode::ProgressivePerPage, None).await;
    engine.run().await.unwrap();

    let store = TenderStore::open(&config.output_file, &config.start_url).await.unwrap();
    let record = &store.records()[0];
    assert_eq!(record.cpv_codes, vec!["45233140", "45233141"]);
    assert_eq!(record.cpv_descriptions, vec!["Roadworks", "Road-maintenance works"]);
}

#[tokio::test]
async fn test_server_error_is_retried_until_success() {
    let server = MockServer::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(&server, dir.path().join("store.json"));

    // Two 503s, then the real page. Three attempts fit the retry budget.
    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &[search_result("000030-2025", "30 June 2025, 9:00am")],
            false,
        )))
        .mount(&server)
        .await;

    let mut engine =
        build_engine(&config, StopPolicy::None, MergeMode::ProgressivePerPage, None).await;
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.end_reason, CrawlEndReason::PaginationExhausted);
    assert_eq!(summary.new_records, 1);
}

#[tokio::test]
async fn test_mid_crawl_fetch_failure_keeps_earlier_pages() {
    let server = MockServer::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(&server, dir.path().join("store.json"));

    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &[search_result("000040-2025", "1 July 2025, 9:00am")],
            true,
        )))
        .mount(&server)
        .await;
    // 404 is not retryable, so page two fails on the first attempt.
    Mock::given(method("GET"))
        .and(path("/Search/Results"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut engine =
        build_engine(&config, StopPolicy::None, MergeMode::ProgressivePerPage, None).await;
    let summary = engine.run().await.unwrap();

    assert!(matches!(summary.end_reason, CrawlEndReason::FetchFailed(_)));
    assert_eq!(summary.pages_fetched, 1);
    let store = TenderStore::open(&config.output_file, &config.start_url).await.unwrap();
    assert_eq!(store.total(), 1);
}
