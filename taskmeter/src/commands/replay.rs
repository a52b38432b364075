//! Replay command: deliver recorded completion events to a tracker

use super::ReplayArgs;
use convenient_metrics::{
    ClassifiedPrefixes, FinalizedBuild, LocalHost, ProjectDescriptor, SystemFactProvider,
    TaskCompletion, TrackerConfig, TrackerService,
};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Execute the replay command against the local host
pub fn execute(args: &ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let facts = Arc::new(SystemFactProvider::new(LocalHost::new(Duration::from_secs(
        args.command_timeout_secs,
    ))));

    let Some(finished) = replay(args, facts)? else {
        return Ok(());
    };

    if !finished.all_written() {
        for outcome in finished.writers.iter().filter(|w| w.error.is_some()) {
            tracing::warn!(writer = outcome.writer, "Report writer did not complete");
        }
    }

    if let Some(path) = &args.json_report {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, finished.report.to_json()?)?;
        tracing::info!(path = %path.display(), "JSON report written");
    }

    Ok(())
}

/// Run one build: load prefixes and events, dispatch, finalize
pub fn replay(
    args: &ReplayArgs,
    facts: Arc<SystemFactProvider>,
) -> Result<Option<FinalizedBuild>, Box<dyn std::error::Error>> {
    let config = TrackerConfig {
        export_text_report: args.export_txt,
        output_directory: args.output_dir.clone(),
        csv_file_name: args.csv_file.clone(),
        txt_file_name: args.txt_file.clone(),
    };
    config.validate()?;

    let classified = load_prefixes(&args.classified, args.projects.as_deref())?;
    let events = read_events(&args.events)?;
    let workers = args.workers.unwrap_or_else(num_cpus::get).max(1);

    tracing::info!(
        events = events.len(),
        workers,
        classified = classified.len(),
        "Replaying task completions"
    );

    let tracker = Arc::new(TrackerService::new(config, classified, facts));
    let handler = tracker.completion_handler();
    dispatch(&handler, &events, workers);

    Ok(tracker.on_build_finished())
}

/// Prefixes from `--classified` flags plus mobile projects from a project file
pub fn load_prefixes(
    classified: &[String],
    projects: Option<&Path>,
) -> Result<ClassifiedPrefixes, Box<dyn std::error::Error>> {
    let mut prefixes: Vec<String> = classified.to_vec();

    if let Some(path) = projects {
        let content = fs::read_to_string(path)?;
        let projects: Vec<ProjectDescriptor> = serde_json::from_str(&content)?;
        let mobile = ClassifiedPrefixes::mobile_projects(&projects);
        tracing::debug!(
            projects = projects.len(),
            mobile = mobile.len(),
            path = %path.display(),
            "Loaded project descriptors"
        );
        prefixes.extend(mobile.iter().map(str::to_string));
    }

    Ok(ClassifiedPrefixes::new(prefixes))
}

/// Read events from a file, or stdin for "-"
pub fn read_events(path: &Path) -> io::Result<Vec<TaskCompletion>> {
    if path == Path::new("-") {
        Ok(parse_events(io::stdin().lock()))
    } else {
        let file = fs::File::open(path)?;
        Ok(parse_events(BufReader::new(file)))
    }
}

/// Parse JSON-lines events, skipping blank and malformed lines
pub fn parse_events(reader: impl BufRead) -> Vec<TaskCompletion> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(line = line_number, error = %e, "Stopped reading events");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TaskCompletion>(&line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!(line = line_number, error = %e, "Skipping malformed event"),
        }
    }
    events
}

/// Deliver events from `workers` threads, each taking a contiguous slice
pub fn dispatch<F>(handler: &F, events: &[TaskCompletion], workers: usize)
where
    F: Fn(&TaskCompletion) + Sync,
{
    if events.is_empty() {
        return;
    }
    let chunk_size = events.len().div_ceil(workers.max(1));

    std::thread::scope(|scope| {
        for chunk in events.chunks(chunk_size) {
            let _ = scope.spawn(move || {
                for event in chunk {
                    handler(event);
                }
            });
        }
    });
}
