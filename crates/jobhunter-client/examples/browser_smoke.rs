/// Smoke-test for `BrowserFetcher` behind an exclusive session.
///
/// Launches a headless Chromium, renders <https://example.com> twice from
/// concurrent tasks, and checks both pages came back intact.
///
/// Run with:
///   cargo run -p jobhunter-client --example browser_smoke --features browser
use jobhunter_client::BrowserFetcher;
use jobhunter_core::session::ExclusiveSession;
use jobhunter_core::traits::Fetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser…");
    let session = ExclusiveSession::new(BrowserFetcher::new().await?);

    let url = "https://example.com";
    let (first, second) = tokio::join!(session.fetch(url), session.fetch(url));
    for html in [first?, second?] {
        assert!(
            html.contains("<h1>Example Domain</h1>"),
            "Expected <h1> not found in rendered HTML"
        );
        println!("OK: got {} bytes of rendered HTML", html.len());
    }
    Ok(())
}
