//! Prints the digest the next run would send. Nothing is delivered and the
//! cache file is left untouched.

use topic_digest_bot::config::load_settings_default;
use topic_digest_bot::{init_tracing, Pipeline};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = load_settings_default()?;
    let pipeline = Pipeline::from_settings(settings)?;
    let chunks = pipeline.preview(chrono::Utc::now()).await?;

    if chunks.is_empty() {
        println!("{}", pipeline.settings().messages.empty_notice);
        return Ok(());
    }
    for (i, chunk) in chunks.iter().enumerate() {
        println!("----- message {}/{} ({} items) -----", i + 1, chunks.len(), chunk.items.len());
        println!("{}", chunk.text);
    }
    Ok(())
}
