use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, get};
use showroom_signage::config::{Configuration, FetchOptions};
use showroom_signage::error::{FetchError, LoadError};
use showroom_signage::events::{RotationCommand, SessionStatus};
use showroom_signage::fetch::load_documents;
use showroom_signage::slides::Slide;
use showroom_signage::tasks::loader;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const STOCK: &str = r#"[
  {"titolo": "Fiat Panda", "prezzo": "€ 9.900", "anno": 2019, "km": 54000, "immagine": "img/panda.jpg", "link": "/auto/panda", "posizione": 3},
  {"titolo": "Jeep Renegade", "anno": "2022", "km": "0", "tipo": "km0", "immagine": "https://cdn.test/renegade.jpg", "posizione": 1},
  {"titolo": "Lancia Ypsilon", "posizione": ""},
  {"titolo": "Alfa Giulia"},
  {"titolo": "Fiat 500X"}
]"#;

const SETTINGS: &str = r#"{"durata_slide": 8, "promo": ["promo/a.png", "https://cdn.test/b.png"]}"#;

/// Answers 500 for the first `failures` requests, then serves `body`.
fn flaky(failures: usize, body: &'static str, hits: Arc<AtomicUsize>) -> MethodRouter {
    get(move || {
        let hits = Arc::clone(&hits);
        async move {
            let n = hits.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
            } else {
                ([(header::CONTENT_TYPE, "application/json")], body).into_response()
            }
        }
    })
}

fn json(body: &'static str) -> MethodRouter {
    flaky(0, body, Arc::new(AtomicUsize::new(0)))
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/")
}

fn config(base_url: String, max_attempts: u32) -> Configuration {
    Configuration {
        base_url,
        fetch: FetchOptions {
            max_attempts,
            base_delay: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
        },
        ..Configuration::default()
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn recovers_after_transient_failures() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/stock.json", flaky(3, STOCK, Arc::clone(&hits)))
        .route("/settings.json", json(SETTINGS));
    let cfg = config(serve(app).await, 5);

    let session = loader::prepare_session(&client(), &cfg, Some(1))
        .await
        .expect("session should load on the fourth attempt");
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert_eq!(session.listings.len(), 5);
    assert_eq!(session.settings.slide_duration(), Duration::from_secs(8));
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/stock.json", flaky(usize::MAX, STOCK, Arc::clone(&hits)))
        .route("/settings.json", json(SETTINGS));
    let cfg = config(serve(app).await, 5);

    let err = loader::prepare_session(&client(), &cfg, None)
        .await
        .expect_err("inventory never succeeds");
    match err {
        LoadError::Inventory(FetchError::Exhausted { attempts, last, .. }) => {
            assert_eq!(attempts, 5);
            assert!(matches!(*last, FetchError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn invalid_json_is_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let stock_hits = Arc::clone(&hits);
    let stock = get(move || {
        let hits = Arc::clone(&stock_hits);
        async move {
            if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                "<html>maintenance</html>"
            } else {
                STOCK
            }
        }
    });
    let app = Router::new()
        .route("/stock.json", stock)
        .route("/settings.json", json(SETTINGS));
    let cfg = config(serve(app).await, 3);

    let session = loader::prepare_session(&client(), &cfg, None).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(session.listings.len(), 5);
}

#[tokio::test]
async fn first_failure_fails_the_barrier() {
    let app = Router::new()
        .route("/stock.json", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/settings.json",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                SETTINGS
            }),
        );
    let mut cfg = config(serve(app).await, 1);
    cfg.fetch.request_timeout = Duration::from_secs(60);

    let started = std::time::Instant::now();
    let res = timeout(
        Duration::from_secs(5),
        load_documents(
            &client(),
            &cfg.stock_url().unwrap(),
            &cfg.settings_url().unwrap(),
            &cfg.fetch.retry_policy(),
        ),
    )
    .await
    .expect("barrier must not wait for the slow document");
    assert!(matches!(res, Err(LoadError::Inventory(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn settings_failure_is_reported_as_such() {
    let app = Router::new()
        .route("/stock.json", json(STOCK))
        .route("/settings.json", get(|| async { "{\"durata_slide\": [1, 2]}" }));
    let cfg = config(serve(app).await, 2);

    let err = loader::prepare_session(&client(), &cfg, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Settings(FetchError::Exhausted { attempts: 2, .. })));
}

#[tokio::test]
async fn relative_locators_resolve_against_base() {
    let app = Router::new()
        .route("/stock.json", json(STOCK))
        .route("/settings.json", json(SETTINGS));
    let base = serve(app).await;
    let cfg = config(base.clone(), 1);

    let session = loader::prepare_session(&client(), &cfg, None).await.unwrap();
    assert_eq!(
        &session.promotions[..],
        [format!("{base}promo/a.png"), "https://cdn.test/b.png".to_owned()]
    );
    let panda = &session.listings[0];
    assert_eq!(panda.image.as_deref(), Some(format!("{base}img/panda.jpg").as_str()));
    assert_eq!(panda.link.as_deref(), Some(format!("{base}auto/panda").as_str()));
    assert_eq!(
        session.listings[1].image.as_deref(),
        Some("https://cdn.test/renegade.jpg")
    );
}

#[tokio::test]
async fn position_order_and_cap_apply_before_building() {
    let app = Router::new().route("/stock.json", json(STOCK)).route(
        "/settings.json",
        json(r#"{"ordine": "posizione", "max_annunci": 3, "promo": null}"#),
    );
    let cfg = config(serve(app).await, 1);

    let session = loader::prepare_session(&client(), &cfg, None).await.unwrap();
    let titles: Vec<&str> = session.listings.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, ["Jeep Renegade", "Fiat Panda", "Lancia Ypsilon"]);
    assert!(session.promotions.is_empty());
    assert_eq!(session.slides.len(), 3);
    assert_eq!(
        session.settings.slide_duration(),
        showroom_signage::model::DEFAULT_SLIDE_DURATION
    );
}

struct LoaderRun {
    status: watch::Receiver<SessionStatus>,
    commands: mpsc::Receiver<RotationCommand>,
}

async fn run_loader(cfg: Configuration) -> LoaderRun {
    let (status_tx, status) = watch::channel(SessionStatus::Loading);
    let (to_rotation, commands) = mpsc::channel(4);
    timeout(
        Duration::from_secs(10),
        loader::run(
            client(),
            cfg,
            Some(7),
            status_tx,
            to_rotation,
            CancellationToken::new(),
        ),
    )
    .await
    .expect("loader did not finish")
    .expect("loader task error");
    LoaderRun { status, commands }
}

#[tokio::test]
async fn loader_hands_ready_sequence_to_rotation() {
    let app = Router::new()
        .route("/stock.json", json(STOCK))
        .route("/settings.json", json(SETTINGS));
    let base = serve(app).await;
    let mut run = run_loader(config(base.clone(), 1)).await;

    assert_eq!(*run.status.borrow(), SessionStatus::Ready { slides: 6 });
    let Some(RotationCommand::Load { slides, duration }) = run.commands.recv().await else {
        panic!("expected a Load command");
    };
    assert_eq!(duration, Duration::from_secs(8));
    assert_eq!(slides.len(), 6);
    assert_eq!(slides[4], Slide::Promotion(format!("{base}promo/a.png")));
    assert!(slides.iter().filter(|s| s.is_promotion()).count() == 1);
    assert!(run.commands.recv().await.is_none());
}

#[tokio::test]
async fn loader_failure_shows_error_and_keeps_rotation_idle() {
    let app = Router::new()
        .route("/stock.json", get(|| async { StatusCode::BAD_GATEWAY }))
        .route("/settings.json", json(SETTINGS));
    let mut run = run_loader(config(serve(app).await, 2)).await;

    let status = run.status.borrow().clone();
    let SessionStatus::Failed(detail) = status else {
        panic!("expected failure status, got {status:?}");
    };
    assert!(detail.contains("stock.json"), "detail: {detail}");
    assert!(detail.contains("502"), "detail: {detail}");
    assert!(matches!(run.commands.recv().await, Some(RotationCommand::Stop)));
    assert!(run.commands.recv().await.is_none());
}

#[tokio::test]
async fn loader_reports_empty_inventory() {
    let app = Router::new()
        .route("/stock.json", json("[]"))
        .route("/settings.json", json(SETTINGS));
    let mut run = run_loader(config(serve(app).await, 1)).await;

    assert_eq!(*run.status.borrow(), SessionStatus::Empty);
    assert!(matches!(run.commands.recv().await, Some(RotationCommand::Stop)));
    assert!(run.commands.recv().await.is_none());
}

#[tokio::test]
async fn loader_stops_on_cancel() {
    let app = Router::new()
        .route("/stock.json", flaky(usize::MAX, STOCK, Arc::new(AtomicUsize::new(0))))
        .route("/settings.json", json(SETTINGS));
    let mut cfg = config(serve(app).await, 5);
    cfg.fetch.base_delay = Duration::from_secs(10);

    let (status_tx, status) = watch::channel(SessionStatus::Loading);
    let (to_rotation, mut commands) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(loader::run(
        client(),
        cfg,
        None,
        status_tx,
        to_rotation,
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    timeout(Duration::from_secs(2), handle)
        .await
        .expect("loader ignored cancel")
        .unwrap()
        .unwrap();
    assert_eq!(*status.borrow(), SessionStatus::Loading);
    assert!(commands.recv().await.is_none());
}

#[tokio::test]
async fn loose_settings_extras_still_load() {
    let app = Router::new().route("/stock.json", json(STOCK)).route(
        "/settings.json",
        json(r#"{"durata_slide": -3, "max_annunci": "2", "ordine": 1}"#),
    );
    let mut run = run_loader(config(serve(app).await, 1)).await;

    assert_eq!(*run.status.borrow(), SessionStatus::Ready { slides: 2 });
    let Some(RotationCommand::Load { slides, duration }) = run.commands.recv().await else {
        panic!("expected a Load command");
    };
    assert_eq!(duration, Duration::from_secs(2));
    let titles: Vec<String> = slides
        .iter()
        .map(|slide| match slide {
            Slide::Vehicle(listing) => listing.title.clone(),
            Slide::Promotion(image) => image.clone(),
        })
        .collect();
    assert_eq!(titles, ["Fiat Panda", "Jeep Renegade"]);
}

#[tokio::test]
async fn load_failure_without_rotation_still_reports() {
    let app = Router::new()
        .route("/stock.json", get(|| async { StatusCode::NOT_FOUND }))
        .route("/settings.json", json(SETTINGS));
    let cfg = config(serve(app).await, 1);

    let (status_tx, status) = watch::channel(SessionStatus::Loading);
    let (to_rotation, commands) = mpsc::channel(4);
    drop(commands);
    timeout(
        Duration::from_secs(5),
        loader::run(client(), cfg, None, status_tx, to_rotation, CancellationToken::new()),
    )
    .await
    .expect("loader did not finish")
    .expect("a missing rotation is not a loader error");
    assert!(matches!(*status.borrow(), SessionStatus::Failed(_)));
}
