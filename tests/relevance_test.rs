use std::time::Duration;

use astral::relevance::{
    ConnectivityProbe, HttpProbe, StaticProbe, keywords, needs_web_augmentation, overlap_score,
};

#[test]
fn recency_questions_trigger_web() {
    assert!(needs_web_augmentation("What's the latest React version?"));
    assert!(needs_web_augmentation("Any NEWS about the mission?"));
    assert!(needs_web_augmentation("what's trending right now"));
}

#[test]
fn year_mentions_trigger_web() {
    assert!(needs_web_augmentation("released in 2024"));
    assert!(needs_web_augmentation("who won in 2031"));
}

#[test]
fn tech_questions_trigger_web() {
    assert!(needs_web_augmentation("how do I install tokio"));
    assert!(needs_web_augmentation("is this crate compatible with wasm"));
    assert!(needs_web_augmentation("saw it on Stack Overflow"));
    assert!(needs_web_augmentation("check the GitHub issue"));
}

#[test]
fn today_is_a_trigger() {
    assert!(needs_web_augmentation("I feel anxious today"));
}

#[test]
fn ordinary_messages_stay_offline() {
    assert!(!needs_web_augmentation("I feel anxious"));
    assert!(!needs_web_augmentation("hi"));
    assert!(!needs_web_augmentation("can you help me with fractions"));
    assert!(!needs_web_augmentation("in 1999 things were different"));
}

#[test]
fn empty_text_never_triggers() {
    assert!(!needs_web_augmentation(""));
}

#[test]
fn overlap_counts_shared_keywords() {
    let q = keywords("healthy sleep habits");
    assert_eq!(overlap_score(&q, &keywords("my sleep habits are bad")), 2);
    assert_eq!(overlap_score(&q, &keywords("nothing shared")), 0);
    assert_eq!(overlap_score(&q, &keywords("Sleep, sleep, SLEEP")), 1);
}

#[tokio::test]
async fn static_probe_reports_its_value() {
    assert!(StaticProbe(true).is_online().await);
    assert!(!StaticProbe(false).is_online().await);
}

#[tokio::test]
async fn http_probe_is_offline_when_nothing_listens() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
        listener.local_addr().expect("local addr").port()
    };

    let probe = HttpProbe::new(
        format!("http://127.0.0.1:{port}/"),
        Duration::from_millis(500),
    )
    .expect("probe client");
    assert!(!probe.is_online().await);
}

#[tokio::test]
async fn http_probe_is_online_when_host_answers() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let port = listener.local_addr().expect("local addr").port();
    let app = axum::Router::new().route("/", axum::routing::get(|| async { "up" }));
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let probe = HttpProbe::new(format!("http://127.0.0.1:{port}/"), Duration::from_secs(2))
        .expect("probe client");
    assert!(probe.is_online().await);

    server.abort();
}
