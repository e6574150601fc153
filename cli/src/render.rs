use archivist_core::api::{
    DriverFailure, SessionEvent, ShutdownOutcome, StateMode, TerminationReason, WorkerState,
};

const BAR_WIDTH: usize = 30;

pub fn event(event: &SessionEvent) {
    match event {
        SessionEvent::Assigned { worker_id } => println!("worker assigned: {worker_id}"),
        SessionEvent::StateChanged(state) => self::state(state),
        SessionEvent::Progress(p) => println!("{}", progress_bar(*p)),
        SessionEvent::ResultAvailable(path) => println!("result available: {}", path.display()),
        SessionEvent::DriverStarted => println!("ChromeDriver started"),
        SessionEvent::DriverFailed(failure) => {
            eprintln!("{failure}");
            if let DriverFailure::Other { stacktrace } = failure {
                eprintln!("{stacktrace}");
            }
        }
        SessionEvent::Error(message) => eprintln!("error: {message}"),
        SessionEvent::Terminated(reason) => println!("{}", terminated(*reason)),
    }
}

pub fn state(state: &WorkerState) {
    println!("{}", state.note);
    if !state.hint.is_empty() {
        println!("  {}", state.hint);
    }
    match state.mode() {
        StateMode::Progressive { indeterminate: true } => println!("  ..."),
        StateMode::Progressive { indeterminate: false } => {}
        StateMode::Selective { buttons } => {
            for (i, button) in buttons.iter().enumerate() {
                println!("  [{}] {}", i + 1, button.label);
            }
            println!("choose a number and press enter:");
        }
    }
}

pub fn shutdown(outcome: &ShutdownOutcome) {
    match outcome {
        ShutdownOutcome::NotRunning => {}
        ShutdownOutcome::Graceful { exit_code } => {
            println!("worker stopped (exit code {exit_code})")
        }
        ShutdownOutcome::Signalled { exit_code } => {
            println!("worker stopped after terminate signal (exit code {exit_code})")
        }
        ShutdownOutcome::Killed { exit_code } => match exit_code {
            Some(code) => println!("worker killed (exit code {code})"),
            None => println!("worker killed"),
        },
    }
}

fn terminated(reason: TerminationReason) -> &'static str {
    match reason {
        TerminationReason::Requested => "session closed",
        TerminationReason::ButtonAction => "session finished",
        TerminationReason::ProcessExited => "worker process exited unexpectedly",
    }
}

pub fn progress_bar(progress: f64) -> String {
    let progress = progress.clamp(0.0, 1.0);
    let filled = (progress * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        (progress * 100.0).round() as u32
    )
}
