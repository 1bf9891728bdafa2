use dnslookup::{DnsLookupProcessor, ProcessorConfig, ResourceRecords};
use std::{env, error::Error};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Reads newline-delimited JSON batches from stdin, enriches them, and
/// writes them to stdout.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // install global collector configured based on RUST_LOG env var.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = match env::args().nth(1) {
        Some(path) => ProcessorConfig::from_json(&tokio::fs::read_to_string(&path).await?)?,
        None => ProcessorConfig::default(),
    };
    let processor = DnsLookupProcessor::new(config)?;

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    let mut count = 0usize;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let mut batch = [serde_json::from_str::<ResourceRecords>(&line)?];
        if let Err(errors) = processor.process_batch(&mut batch).await {
            for err in errors {
                warn!(error = %err, "DNS lookup failed");
            }
        }

        let mut out = serde_json::to_vec(&batch[0])?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        count += 1;
    }
    stdout.flush().await?;

    info!(count, "Processed input");
    processor.shutdown()?;

    Ok(())
}
