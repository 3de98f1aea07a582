use std::time::Duration;

use heizwire_frame::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{parse_duration, ListenArgs};
use crate::config::ServiceConfig;
use crate::exit::CliResult;
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let shutdown_timeout = parse_duration(&args.shutdown_timeout)?;
    let reconnect_delay = args
        .reconnect_delay
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    config.apply_overrides(args.port.clone(), args.baud);
    let (location, baud_rate) = config.serial_settings()?;
    let session_config = config.session_config()?;

    let shutdown = CancellationToken::new();
    let kill = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone(), kill.clone(), shutdown_timeout));

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_messages(
        rx,
        location.display().to_string(),
        format,
        args.count,
        shutdown.clone(),
    ));

    let result = serve(
        &location,
        baud_rate,
        session_config,
        tx,
        &shutdown,
        &kill,
        reconnect_delay,
    )
    .await;

    if kill.is_cancelled() {
        // An abandoned extractor may still hold a sender.
        printer.abort();
    } else if let Ok(printed) = printer.await {
        info!(messages = printed, "listener stopped");
    }
    result
}

/// First interrupt requests a graceful stop. A second interrupt, or the
/// grace period running out, fires `kill`.
async fn watch_signals(shutdown: CancellationToken, kill: CancellationToken, timeout: Duration) {
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "cannot listen for interrupts");
                return;
            }
            info!("interrupt received, stopping (press Ctrl-C again to abort)");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => warn!("second interrupt, abandoning session"),
        _ = tokio::time::sleep(timeout) => warn!(?timeout, "shutdown timed out, abandoning session"),
    }
    kill.cancel();
}

async fn print_messages(
    mut rx: mpsc::UnboundedReceiver<Message>,
    source: String,
    format: OutputFormat,
    count: Option<u64>,
    shutdown: CancellationToken,
) -> u64 {
    let mut printed = 0u64;
    while let Some(message) = rx.recv().await {
        if count.is_some_and(|limit| printed >= limit) {
            continue;
        }
        printed += 1;
        print_message(&message, &source, printed, format);
        if count == Some(printed) {
            shutdown.cancel();
        }
    }
    printed
}

#[cfg(unix)]
async fn serve(
    location: &std::path::Path,
    baud_rate: u32,
    session_config: heizwire_pipeline::SessionConfig,
    tx: mpsc::UnboundedSender<Message>,
    shutdown: &CancellationToken,
    kill: &CancellationToken,
    reconnect_delay: Option<Duration>,
) -> CliResult<i32> {
    use heizwire_pipeline::{channel_sink, start};
    use heizwire_transport::{SerialConfig, SerialDevice};

    use crate::exit::{pipeline_error, transport_error, SUCCESS};

    let serial = SerialConfig::new(location, baud_rate);

    loop {
        let device = match SerialDevice::open(&serial) {
            Ok(device) => device,
            Err(err) => match reconnect_delay {
                Some(delay) => {
                    warn!(error = %err, ?delay, "cannot open serial device, retrying");
                    if !pause(delay, shutdown).await {
                        return Ok(SUCCESS);
                    }
                    continue;
                }
                None => return Err(transport_error("cannot open serial device", err)),
            },
        };
        info!(port = %serial.location.display(), baud = baud_rate, "serial device opened");

        let handle = start(
            device,
            channel_sink(tx.clone()),
            session_config.clone(),
            shutdown.clone(),
        )
        .map_err(|err| pipeline_error("cannot start session", err))?;

        let report = handle
            .wait_or_kill(kill)
            .await
            .map_err(|err| pipeline_error("session did not stop in time", err))?;
        // Dropping the returned device closes it before any reopen.
        drop(report.source);

        if shutdown.is_cancelled() {
            return match report.error {
                Some(err) => Err(pipeline_error("session failed", err)),
                None => Ok(SUCCESS),
            };
        }

        let Some(delay) = reconnect_delay else {
            return match report.error {
                Some(err) => Err(pipeline_error("session failed", err)),
                None => Ok(SUCCESS),
            };
        };
        match &report.error {
            Some(err) => warn!(error = %err, ?delay, "session failed, reconnecting"),
            None => warn!(?delay, "serial device closed, reconnecting"),
        }
        if !pause(delay, shutdown).await {
            return Ok(SUCCESS);
        }
    }
}

/// Sleep for `delay`; `false` if shutdown was requested meanwhile.
#[cfg(unix)]
async fn pause(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(not(unix))]
async fn serve(
    _location: &std::path::Path,
    _baud_rate: u32,
    _session_config: heizwire_pipeline::SessionConfig,
    _tx: mpsc::UnboundedSender<Message>,
    _shutdown: &CancellationToken,
    _kill: &CancellationToken,
    _reconnect_delay: Option<Duration>,
) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "serial devices are only supported on Unix",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn printer_stops_session_after_count() {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let printer = tokio::spawn(print_messages(
            rx,
            "test".into(),
            OutputFormat::Pretty,
            Some(2),
            shutdown.clone(),
        ));

        for body in [&b"A;22;1;%;"[..], &b"B;22;1;%;"[..], &b"C;22;1;%;"[..]] {
            tx.send(Message::new(body, 8)).unwrap();
        }
        drop(tx);

        assert_eq!(printer.await.unwrap(), 2);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_arms_kill_timer() {
        let shutdown = CancellationToken::new();
        let kill = CancellationToken::new();
        let watcher = tokio::spawn(watch_signals(
            shutdown.clone(),
            kill.clone(),
            Duration::from_millis(20),
        ));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), kill.cancelled())
            .await
            .expect("kill fires once the grace period ends");
        watcher.await.unwrap();
    }
}
