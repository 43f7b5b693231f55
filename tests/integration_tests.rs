use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gtfs_rt_sa_collector::alerts::NO_ALERT_EFFECT;
use gtfs_rt_sa_collector::archive::{bundle_path, list_entries};
use gtfs_rt_sa_collector::config::Config;
use gtfs_rt_sa_collector::error::{CollectError, FetchError};
use gtfs_rt_sa_collector::fetch::{HttpClient, fetch_feed};
use gtfs_rt_sa_collector::gtfs_rt::{
    self, FeedEntity, FeedHeader, FeedMessage, TimeRange, TranslatedString,
    translated_string::Translation,
};
use gtfs_rt_sa_collector::output::read_records;
use gtfs_rt_sa_collector::parser::decode;
use gtfs_rt_sa_collector::pipeline::{run, save};
use prost::Message;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Direct client that ignores any proxy configured in the environment.
struct LocalClient(reqwest::Client);

impl LocalClient {
    fn new() -> Self {
        Self(reqwest::Client::builder().no_proxy().build().unwrap())
    }
}

#[async_trait]
impl HttpClient for LocalClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}

/// Serves `responses` one per connection, then stops.
async fn serve(responses: Vec<(&'static str, Vec<u8>)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;

            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/x-protobuf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{addr}/sncf-gtfs-rt-service-alerts")
}

fn config(dir: &Path, url: String) -> Config {
    Config {
        feed_url: url,
        archive_dir: dir.to_path_buf(),
        timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn capture() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, 14, 12, 0, 0).unwrap()
}

fn feed(entity: Vec<FeedEntity>) -> FeedMessage {
    FeedMessage {
        header: FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            timestamp: Some(1699963200),
            incrementality: None,
            feed_version: None,
        },
        entity,
    }
}

fn alert_entity(id: &str, effect: gtfs_rt::alert::Effect, periods: &[(u64, u64)]) -> FeedEntity {
    FeedEntity {
        id: id.to_string(),
        alert: Some(gtfs_rt::Alert {
            effect: Some(effect as i32),
            active_period: periods
                .iter()
                .map(|&(start, end)| TimeRange {
                    start: Some(start),
                    end: Some(end),
                })
                .collect(),
            description_text: Some(TranslatedString {
                translation: vec![Translation {
                    text: "Trafic perturbé entre Paris et Lyon".to_string(),
                    language: Some("fr".to_string()),
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn day_files(dir: &Path, day: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(day) && !n.ends_with(".zip"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_fetch_returns_body() {
    let url = serve(vec![("200 OK", b"payload".to_vec())]).await;
    let bytes = fetch_feed(&LocalClient::new(), &url, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(bytes, b"payload");
}

#[tokio::test]
async fn test_fetch_rejects_error_status() {
    let url = serve(vec![("404 Not Found", Vec::new())]).await;
    let result = fetch_feed(&LocalClient::new(), &url, Duration::from_secs(5)).await;
    assert!(matches!(result, Err(FetchError::HttpStatus(404))));
}

#[tokio::test]
async fn test_fetch_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let result = fetch_feed(
        &LocalClient::new(),
        &format!("http://{addr}/feed"),
        Duration::from_millis(200),
    )
    .await;
    assert!(matches!(result, Err(FetchError::Timeout(_))), "{result:?}");
}

#[tokio::test]
async fn test_fetch_invalid_url() {
    let result = fetch_feed(&LocalClient::new(), "not a url", Duration::from_secs(1)).await;
    assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = fetch_feed(
        &LocalClient::new(),
        &format!("http://{addr}/feed"),
        Duration::from_secs(5),
    )
    .await;
    assert!(matches!(result, Err(FetchError::Request(_))));
}

#[tokio::test]
async fn test_save_reduced_service_example() {
    use gtfs_rt::alert::Effect;

    let tmp = tempfile::tempdir().unwrap();
    let payload = feed(vec![alert_entity(
        "sncf-1",
        Effect::ReducedService,
        &[(1700000000, 1700003600), (0, 1700010000)],
    )])
    .encode_to_vec();
    let url = serve(vec![("200 OK", payload.clone())]).await;

    let report = save(&config(tmp.path(), url), &LocalClient::new(), capture())
        .await
        .unwrap();

    assert_eq!(report.run_id, "2023-11-14_12-00");
    assert_eq!(report.alerts, 1);
    assert_eq!(report.records, 2);
    assert!(!report.no_alert);
    assert_eq!(
        report.paths.raw,
        tmp.path().join("gtfs_rt_sa_2023-11-14_12-00.pb")
    );

    let rows = read_records(&report.paths.table).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].effect, "REDUCED_SERVICE");
    assert_eq!(rows[0].start, DateTime::from_timestamp(1700000000, 0));
    assert_eq!(rows[0].end, DateTime::from_timestamp(1700003600, 0));
    assert_eq!(rows[1].start, None);
    assert_eq!(rows[1].end, DateTime::from_timestamp(1700010000, 0));
    assert!(rows.iter().all(|r| r.extraction_utc == "2023-11-14_12-00"));

    // The saved payload decodes to the alerts the table was built from
    let raw = fs::read(&report.paths.raw).unwrap();
    assert_eq!(raw, payload);
    assert_eq!(decode(&raw).unwrap(), decode(&payload).unwrap());
}

#[tokio::test]
async fn test_save_counts_one_row_per_period() {
    use gtfs_rt::alert::Effect;

    let tmp = tempfile::tempdir().unwrap();
    let payload = feed(vec![
        alert_entity("a", Effect::NoService, &[(1, 2), (3, 4), (5, 6)]),
        alert_entity("b", Effect::Detour, &[]),
        alert_entity("c", Effect::SignificantDelays, &[(7, 8)]),
    ])
    .encode_to_vec();
    let url = serve(vec![("200 OK", payload)]).await;

    let report = save(&config(tmp.path(), url), &LocalClient::new(), capture())
        .await
        .unwrap();

    let rows = read_records(&report.paths.table).unwrap();
    assert_eq!(rows.len(), 4);
    let effects: Vec<_> = rows.iter().map(|r| r.effect.as_str()).collect();
    assert_eq!(
        effects,
        vec!["NO_SERVICE", "NO_SERVICE", "NO_SERVICE", "SIGNIFICANT_DELAYS"]
    );
}

#[tokio::test]
async fn test_save_empty_feed_writes_sentinel() {
    let tmp = tempfile::tempdir().unwrap();
    let url = serve(vec![("200 OK", feed(vec![]).encode_to_vec())]).await;

    let report = save(&config(tmp.path(), url), &LocalClient::new(), capture())
        .await
        .unwrap();

    assert!(report.no_alert);
    let rows = read_records(&report.paths.table).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].effect, NO_ALERT_EFFECT);
    assert_eq!(rows[0].description, "Aucune alerte active");
}

#[tokio::test]
async fn test_save_malformed_payload_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("archive");
    let url = serve(vec![("200 OK", vec![0xFF, 0xFE, 0x00, 0x01])]).await;

    let result = save(&config(&dir, url), &LocalClient::new(), capture()).await;

    assert!(matches!(result, Err(CollectError::Decode(_))));
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_run_bundles_todays_files() {
    use gtfs_rt::alert::Effect;

    let tmp = tempfile::tempdir().unwrap();
    let payload =
        feed(vec![alert_entity("a", Effect::NoService, &[(1700000000, 0)])]).encode_to_vec();
    let url = serve(vec![("200 OK", payload.clone()), ("200 OK", payload)]).await;
    let config = config(tmp.path(), url);

    let first = run(&config, &LocalClient::new()).await;
    assert!(first.succeeded(), "{first:?}");

    let today = Utc::now().format("%Y-%m-%d").to_string();
    fs::write(tmp.path().join(format!("notes_{today}.txt")), "manual").unwrap();
    fs::write(tmp.path().join("gtfs_rt_sa_1999-01-01_00-00.pb"), "old").unwrap();

    let second = run(&config, &LocalClient::new()).await;
    assert!(second.succeeded(), "{second:?}");

    let bundle = second.archive.unwrap();
    assert_eq!(bundle.path, bundle_path(tmp.path(), Utc::now().date_naive()));
    let entries = list_entries(&bundle.path).unwrap();
    assert_eq!(entries, day_files(tmp.path(), &today));
    assert!(entries.contains(&format!("notes_{today}.txt")));
    assert!(entries.iter().all(|e| !e.contains("1999")));
}

#[tokio::test]
async fn test_run_archives_even_when_fetch_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let earlier = format!("gtfs_rt_sa_{today}_00-00.csv");
    fs::write(tmp.path().join(&earlier), "extraction_utc\n").unwrap();

    let url = serve(vec![("500 Internal Server Error", Vec::new())]).await;
    let report = run(&config(tmp.path(), url), &LocalClient::new()).await;

    assert!(report.save.is_none());
    assert!(report.save_error.unwrap().contains("500"));
    assert_eq!(report.archive.unwrap().entries, vec![earlier]);
}

#[tokio::test]
async fn test_run_reports_archive_failure_separately() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("never-created");
    let url = serve(vec![("503 Service Unavailable", Vec::new())]).await;

    let report = run(&config(&missing, url), &LocalClient::new()).await;

    assert!(report.save_error.is_some());
    assert!(report.archive_error.is_some());
    assert!(!report.succeeded());
}
