//! Command-line front end for attendance capture
//!
//! Usage:
//! ```
//! faculty-attendance --still ./frames roster --teacher T42 --minutes 5
//! faculty-attendance --still teacher.jpg self
//! ```

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use faculty_attendance::attendance::{
    AttendanceEvent, AttendanceMode, BackendStatus, SelfCheckOutcome,
};
use faculty_attendance::capture::{CameraSource, StillImageCamera};
use faculty_attendance::commands::attendance::{self as handlers, AttendanceState};
use faculty_attendance::config::AttendanceConfig;
use faculty_attendance::export::ExportMeta;
use faculty_attendance::recognition::{
    format_confidence, RecognitionClient, RecognitionResult, RecognitionService,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    name = "faculty-attendance",
    about = "Face-recognition attendance capture",
    version
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recognition service base URL (overrides the config file)
    #[arg(long)]
    server: Option<String>,

    /// Replay frames from an image file or a directory of images instead of a webcam
    #[arg(long)]
    still: Option<PathBuf>,

    /// Webcam device index
    #[cfg(feature = "webcam")]
    #[arg(long)]
    device: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether the recognition service is reachable
    Probe,

    /// List available cameras
    Cameras,

    /// Recognize students continuously and export the roster
    Roster(RosterArgs),

    /// Capture and mark the teacher's own attendance
    #[command(name = "self")]
    SelfCheck(SelfArgs),
}

#[derive(clap::Args, Debug)]
struct RosterArgs {
    #[arg(long)]
    teacher: Option<String>,

    #[arg(long)]
    subject: Option<String>,

    #[arg(long)]
    section: Option<String>,

    #[arg(long)]
    semester: Option<String>,

    /// Session date (defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Stop after this many minutes; runs until Ctrl-C when omitted
    #[arg(long)]
    minutes: Option<u64>,

    /// Directory for the CSV export
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(clap::Args, Debug)]
struct SelfArgs {
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    faculty_attendance::init_tracing();
    let args = Args::parse();

    let mut config = AttendanceConfig::load_or_default(args.config.as_deref())?;
    if let Some(server) = &args.server {
        config.service.base_url = server.clone();
    }

    tracing::info!(
        "Starting faculty-attendance v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.service.base_url
    );

    match &args.command {
        Command::Probe => {
            let client =
                RecognitionClient::new(&config.service.base_url, config.service.timeout())?;
            if client.probe().await {
                println!("Recognition service at {} is reachable", client.base_url());
                Ok(())
            } else {
                bail!("Recognition service at {} is not reachable", client.base_url())
            }
        }
        Command::Cameras => {
            for camera in handlers::get_cameras().await.map_err(response_error)? {
                println!("{}\t{}", camera.id, camera.name);
            }
            Ok(())
        }
        Command::Roster(roster) => run_roster(&args, &config, roster).await,
        Command::SelfCheck(self_args) => run_self(&args, &config, self_args).await,
    }
}

#[cfg_attr(not(feature = "webcam"), allow(unused_variables))]
fn camera(args: &Args, config: &AttendanceConfig) -> Result<Arc<dyn CameraSource>> {
    if let Some(path) = &args.still {
        return Ok(Arc::new(StillImageCamera::new(path.clone())));
    }

    #[cfg(feature = "webcam")]
    {
        Ok(Arc::new(faculty_attendance::capture::webcam::WebcamCamera::new(
            args.device.clone(),
            config.capture.resolution(),
            config.capture.fps,
        )))
    }

    #[cfg(not(feature = "webcam"))]
    {
        bail!("No camera available: pass --still or build with the `webcam` feature")
    }
}

fn response_error(error: faculty_attendance::utils::ErrorResponse) -> anyhow::Error {
    anyhow::anyhow!("{} ({})", error.message, error.code)
}

async fn connected_state(args: &Args, config: &AttendanceConfig) -> Result<AttendanceState> {
    let state = AttendanceState::from_config(config, camera(args, config)?)?;
    let status = handlers::check_backend(&state).await.map_err(response_error)?;
    if status != BackendStatus::Connected {
        bail!("Recognition service at {} is not reachable", config.service.base_url);
    }
    Ok(state)
}

async fn run_roster(args: &Args, config: &AttendanceConfig, roster: &RosterArgs) -> Result<()> {
    let date = roster.date.unwrap_or_else(|| Local::now().date_naive());
    let mut defaults = config.session.clone();
    if let Some(teacher) = &roster.teacher {
        defaults.teacher_id = teacher.clone();
    }
    if let Some(subject) = &roster.subject {
        defaults.subject = subject.clone();
    }
    if let Some(section) = &roster.section {
        defaults.section = section.clone();
    }
    if let Some(semester) = &roster.semester {
        defaults.semester = semester.clone();
    }
    if defaults.teacher_id.is_empty() {
        bail!("A teacher id is required (--teacher or [session].teacher_id)");
    }
    let context = defaults.context(date);

    let state = connected_state(args, config).await?;
    let controller = state.controller.clone();
    let mut events = controller.subscribe();

    controller.start().await?;
    let session = controller
        .start_session(context.clone())
        .await
        .context("Could not open the attendance session")?;
    println!(
        "Session {} open for {} section {} (Ctrl-C to stop)",
        session.id(),
        context.subject_id,
        context.section
    );

    let deadline = async {
        match roster.minutes {
            Some(minutes) => tokio::time::sleep(Duration::from_secs(minutes * 60)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(AttendanceEvent::Recognized { result, .. }) => print_result(&result),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} attendance events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    handlers::stop_attendance(&state).await.map_err(response_error)?;

    let summary = controller.roster_summary();
    println!(
        "Present: {} of {} ({:.1}%)",
        summary.present, summary.total, summary.attendance_percentage
    );

    let meta = ExportMeta {
        date,
        subject: context.subject_id.clone(),
        section: context.section.clone(),
        semester: context.semester.clone(),
    };
    match handlers::export_attendance(&state, &roster.out, meta).await {
        Ok(path) => println!("Roster written to {}", path.display()),
        Err(e) => println!("Nothing exported: {}", e.message),
    }
    Ok(())
}

async fn run_self(args: &Args, config: &AttendanceConfig, self_args: &SelfArgs) -> Result<()> {
    let date = self_args.date.unwrap_or_else(|| Local::now().date_naive());
    let state = connected_state(args, config).await?;
    handlers::switch_mode(&state, AttendanceMode::SelfCheck)
        .await
        .map_err(response_error)?;

    let outcome = handlers::capture_self(&state).await.map_err(response_error)?;
    handlers::stop_attendance(&state).await.map_err(response_error)?;

    match outcome {
        SelfCheckOutcome::Marked(result) => {
            print_result(&result);
            let meta = ExportMeta {
                date,
                subject: String::new(),
                section: String::new(),
                semester: String::new(),
            };
            let path = handlers::export_attendance(&state, &self_args.out, meta)
                .await
                .map_err(response_error)?;
            println!("Attendance written to {}", path.display());
        }
        SelfCheckOutcome::NotRecognized => {
            println!("Face not recognized. Please try again.");
        }
    }
    Ok(())
}

fn print_result(result: &RecognitionResult) {
    println!(
        "{:<24} {:<12} {:>7}  {}",
        result.display_name,
        result.identity_id.as_deref().unwrap_or("N/A"),
        format_confidence(result.confidence),
        result.timestamp.with_timezone(&Local).format("%H:%M:%S")
    );
}
