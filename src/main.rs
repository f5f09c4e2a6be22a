use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use noisegate::audio::{AudioCapture, RingSource};
use noisegate::control::{LogIndicator, RecalibrateSignal};
use noisegate::notify::WriterTransport;
use noisegate::{DetectorConfig, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    // Usage: noisegate [config.json] [serial-device]
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            tracing::info!("loading config from {path}");
            DetectorConfig::load(path)?
        }
        None => DetectorConfig::default(),
    };

    // 2. Outbound transport: a serial device file if given, else stdout.
    let sink: Box<dyn Write + Send> = match args.next() {
        Some(path) => {
            tracing::info!("notifying over {path}");
            Box::new(std::fs::OpenOptions::new().write(true).open(path)?)
        }
        None => Box::new(std::io::stdout()),
    };

    // 3. Audio stack: cpal callback -> ring buffer -> block source.
    use ringbuf::traits::Split;
    use ringbuf::HeapRb;

    // Room for a handful of blocks of jitter before frames drop.
    let rb = HeapRb::<u32>::new(config.block_samples * 16);
    let (producer, consumer) = rb.split();

    // The capture struct holds the cpal stream and must stay alive for
    // the life of the process.
    let _capture = AudioCapture::new(producer, &config)?;
    let source = RingSource::new(consumer, config.block_samples);

    let recalibrate = RecalibrateSignal::new();
    let cancel = CancellationToken::new();

    // 4. Recalibrate trigger: 'r' + Enter on stdin stands in for the
    // debounced button on the reference hardware.
    let recal_handle = recalibrate.clone();
    tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().eq_ignore_ascii_case("r") {
                recal_handle.request();
            }
        }
    });

    // 5. Detection loop on a blocking task; everything per-block runs
    // synchronously inside it.
    let engine_cancel = cancel.clone();
    let mut engine = Engine::new(
        source,
        WriterTransport(sink),
        LogIndicator,
        recalibrate,
        config,
    );
    let engine_task = tokio::task::spawn_blocking(move || engine.run(engine_cancel));

    tracing::info!("noisegate running; 'r' to recalibrate, Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    cancel.cancel();
    engine_task.await?;

    Ok(())
}
