use std::sync::Arc;

use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use subsearch_server::listener::Listener;
use subsearch_server::service::ServiceRegistry;
use subsearch_server::settings::{settings, VERSION};

pub const HEADER: &str = r#"
   _____ __  __/ /_  ________  ____ ___________/ /_
  / ___/ / / / __ \/ ___/ _ \/ __ `/ ___/ ___/ __ \
 (__  ) /_/ / /_/ (__  )  __/ /_/ / /  / /__/ / / /
 /____/\__,_/_.___/____/\___/\__,_/_/   \___/_/ /_/
 Submissions in, facets out
 "#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = settings();
    std::env::set_var("RUST_LOG", &settings.log_level);
    pretty_env_logger::init();
    println!("{}", HEADER);
    info!("subsearch {} starting", VERSION);

    let services = ServiceRegistry::init(settings).await?;
    let submission_client = services.http_client()?;
    let listener = Listener::new(Arc::clone(&services.indexer), submission_client);

    if services.settings.auto_commit_duration > 0.0 {
        let commit_lock = Arc::new(std::sync::atomic::AtomicBool::new(false));
        tokio::spawn(subsearch_server::commit::watcher(
            Arc::clone(&services.writers),
            services.settings.auto_commit_duration,
            commit_lock,
        ));
    }

    // Notifications arrive as newline-delimited JSON on stdin; the AMQP
    // facade feeding a production deployment lives outside this binary.
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(value) => {
                    if tx.send(value).await.is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("skipping unparsable notification line: {}", e),
            }
        }
    });

    listener.run_loop(rx).await;
    info!("input drained, shutting down");
    Ok(())
}
