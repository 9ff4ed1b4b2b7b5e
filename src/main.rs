use anyhow::{Context, Result};
use chunkstream::StreamConfig;
use chunkstream::cli::{self, AppArgs};
use chunkstream::io::{self, DataSink, DataSource, FlushPoller, InputStream, WriterSink};
use tokio::fs::File;
use tokio::task::LocalSet;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::parse_args()?;

    let mut config = match &args.config_file {
        Some(path) => StreamConfig::load(path).await?,
        None => StreamConfig::default(),
    };
    if let Some(size) = args.buffer_size {
        config.buffer_size = size;
    }
    if args.batch {
        config.batch_flushes = true;
    }
    config.validate()?;

    LocalSet::new().run_until(run(args, config)).await
}

async fn run(args: AppArgs, config: StreamConfig) -> Result<()> {
    let source: Box<dyn DataSource> = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("open {path}"))?;
            Box::new(config.reader_source(file))
        }
        None => Box::new(config.reader_source(tokio::io::stdin())),
    };
    let sink: Box<dyn DataSink> = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("create {path}"))?;
            Box::new(WriterSink::new(file))
        }
        None => Box::new(WriterSink::new(tokio::io::stdout())),
    };

    let poller = FlushPoller::new();
    let driver = tokio::task::spawn_local(poller.clone().run());

    let mut input = InputStream::new(source);
    let mut output = config.output_stream(sink, &poller);
    let copied = io::copy(&mut input, &mut output)
        .await
        .context("copy")?;
    output.close().await.context("close output")?;
    input.close().await.context("close input")?;
    driver.abort();

    info!(bytes = copied, batched = config.batch_flushes, "copy finished");
    Ok(())
}
