use heizwire_frame::{FrameConfig, Message, Terminator};
use heizwire_pipeline::{start, SinkError, DEFAULT_MINIMUM_READ_SIZE};
use heizwire_transport::AsyncReadSource;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::ReplayArgs;
use crate::config::session_config;
use crate::exit::{frame_error, io_error, pipeline_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let mut frame = FrameConfig::default();
    if let Some(terminator) = args.terminator {
        frame.terminator = Terminator::new(terminator.into_bytes())
            .map_err(|err| frame_error("invalid --terminator", err))?;
    }
    if let Some(max) = args.max_message_size {
        frame.max_message_size = max;
    }
    let config = session_config(frame, DEFAULT_MINIMUM_READ_SIZE)?;

    let file = tokio::fs::File::open(&args.file)
        .await
        .map_err(|err| io_error(&format!("cannot open {}", args.file.display()), err))?;
    let id = args.file.display().to_string();
    let source = AsyncReadSource::new(id.clone(), file);

    let mut printed = 0u64;
    let sink = move |message: Message| {
        printed += 1;
        print_message(&message, &id, printed, format);
        Ok::<(), SinkError>(())
    };

    let handle = start(source, sink, config, CancellationToken::new())
        .map_err(|err| pipeline_error("replay failed", err))?;
    let report = handle
        .wait()
        .await
        .map_err(|err| pipeline_error("replay failed", err))?;

    info!(
        messages = report.messages,
        bytes = report.bytes_read,
        discarded = report.discarded_bytes,
        "replay finished"
    );
    match report.error {
        Some(err) => Err(pipeline_error("replay failed", err)),
        None => Ok(SUCCESS),
    }
}
