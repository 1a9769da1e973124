use band_filter::config::filter::load_config;
use band_filter::image::io::{read_image, write_image_atomic, write_json_file};
use band_filter::transport::{serve, StreamTransport};
use band_filter::{Coordinator, FilterError};
use env_logger::Env;
use log::debug;
use std::env;
use std::path::Path;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), FilterError> {
    let arg = env::args().nth(1).ok_or_else(usage)?;
    if arg == "worker" {
        return run_worker();
    }

    let config = load_config(Path::new(&arg))?;
    let kernel = config.kernel.to_kernel()?;
    let workers = config.worker_count();
    let (source, meta) = read_image(&config.input)?;
    debug!(
        "loaded {} ({}x{}, stride {})",
        config.input.display(),
        source.width(),
        source.height(),
        source.stride()
    );

    let coordinator =
        Coordinator::new(kernel, config.boundary).with_boxed_backend(config.backend.build()?);
    let (output, report) = coordinator.run_with_report(&source, workers)?;
    // Report first: once the image is in place nothing else may fail.
    if let Some(path) = &config.report_json {
        write_json_file(path, &report)?;
    }
    if let Err(e) = write_image_atomic(&config.output, &output, meta.as_ref()) {
        if let Some(path) = &config.report_json {
            let _ = std::fs::remove_file(path);
        }
        return Err(e);
    }

    println!(
        "Filtered {} -> {} ({}x{}, {} band(s) on {}, {:.2} ms)",
        config.input.display(),
        config.output.display(),
        report.width,
        report.height,
        report.workers_used,
        report.backend,
        report.total_ms
    );
    Ok(())
}

/// Serve band requests on stdin/stdout; stdout carries frames only.
fn run_worker() -> Result<(), FilterError> {
    let mut link = StreamTransport::new(std::io::stdin(), std::io::stdout());
    let served = serve(&mut link)?;
    debug!("worker {} served {} band(s)", std::process::id(), served);
    Ok(())
}

fn usage() -> FilterError {
    FilterError::InvalidConfiguration(
        "Usage: band_filter <config.json> | band_filter worker".to_string(),
    )
}
