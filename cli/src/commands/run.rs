use std::sync::Arc;

use anyhow::Context;
use archivist_core::api::{
    AppConfig, ButtonAction, ListenerRegistry, ProcessSupervisor, SessionError, SessionEvent,
    SessionHub, Target, TerminationReason, WorkerSession,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::cli::RunArgs;
use crate::render;

/// Start the worker, follow one dispatched session, then tear everything
/// down in order: session, hub, supervisor.
pub async fn run(cfg: AppConfig, args: RunArgs) -> anyhow::Result<i32> {
    let registry = Arc::new(ListenerRegistry::new());
    let supervisor = Arc::new(ProcessSupervisor::new(&cfg, registry.clone()));
    supervisor
        .initialize()
        .await
        .context("failed to start worker process")?;

    let hub = SessionHub::new(registry, supervisor.clone());
    let followed = follow(&hub, &cfg, &args).await;
    drop(hub);

    if let Some(code) = supervisor.exit_code().await {
        tracing::warn!(target: "archivist.cli", exit_code = code, "worker had already exited");
    }
    let outcome = supervisor.shutdown().await?;
    render::shutdown(&outcome);
    followed
}

async fn follow(hub: &SessionHub, cfg: &AppConfig, args: &RunArgs) -> anyhow::Result<i32> {
    let target = Target::new(args.root_url.clone(), args.version);
    let (session, mut events) = hub
        .dispatch(target, args.worker_type)
        .context("failed to dispatch worker")?;
    render::state(&session.current_state());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let code = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!(target: "archivist.cli", "interrupted");
                session.terminate()?;
                break 130;
            }

            event = events.recv() => {
                let Some(event) = event else { break 0 };
                render::event(&event);
                if let SessionEvent::Terminated(reason) = event {
                    break match reason {
                        TerminationReason::ProcessExited => 1,
                        _ => 0,
                    };
                }
            }

            line = stdin.next_line(), if stdin_open => {
                match line.context("failed to read stdin")? {
                    Some(line) => select(&session, cfg, line.trim()),
                    None => stdin_open = false,
                }
            }
        }
    };
    Ok(code)
}

fn select(session: &WorkerSession, cfg: &AppConfig, input: &str) {
    if input.is_empty() {
        return;
    }
    let Ok(choice) = input.parse::<usize>() else {
        eprintln!("not a number: {input}");
        return;
    };
    if choice == 0 {
        eprintln!("buttons are numbered from 1");
        return;
    }
    match session.select_button(choice - 1) {
        Ok(ButtonAction::OpenLog) => match &cfg.logging.dir {
            Some(dir) => println!("logs are written to {}", dir.display()),
            None => println!("file logging is off; set [logging] dir in the config"),
        },
        Ok(ButtonAction::ExportArchive) => match session.result_path() {
            Some(path) => println!("archive ready for export: {}", path.display()),
            None => println!("no result available yet"),
        },
        Ok(ButtonAction::None | ButtonAction::Terminate) => {}
        Err(e @ (SessionError::NotSelective | SessionError::NoSuchButton { .. })) => {
            eprintln!("{e}")
        }
        Err(e) => {
            tracing::warn!(target: "archivist.cli", error = %e, "button selection failed");
            eprintln!("{e}");
        }
    }
}
