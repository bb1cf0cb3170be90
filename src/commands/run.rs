//! `dotdeploy run`: connect, run every action, print the summary

use actiongraph::{Action, Phase, RunObserver, RunSummary, Shutdown};
use anyhow::{Context as AnyhowContext, Result};
use sshkit::SshConnector;
use std::sync::Arc;
use std::time::Duration;

use crate::Context;
use crate::cli::RunArgs;
use crate::config::DeployFile;
use crate::ui;

use super::engine_error;

/// Prints each action as it starts and finishes, and keeps the summary
struct Progress {
    quiet: bool,
    summary: Option<RunSummary>,
}

impl RunObserver for Progress {
    fn on_phase(&mut self, phase: Phase) {
        log::info!("Phase: {phase:?}");
    }

    fn on_dispatch(&mut self, action: &Action) {
        if !self.quiet {
            ui::info(&format!("{}: {}", action.name, action.kind.describe()));
        }
    }

    fn on_complete(&mut self, action: &Action, result: &actiongraph::Result<()>) {
        match result {
            Ok(()) if !self.quiet => ui::success(&action.name),
            Ok(()) => {}
            Err(e) => ui::error(&format!("{}: {e}", action.name)),
        }
    }

    fn on_finish(&mut self, summary: &RunSummary) {
        self.summary = Some(summary.clone());
    }
}

fn install_interrupt_handler(shutdown: &Shutdown) -> Result<()> {
    let handle = shutdown.clone();
    ctrlc::set_handler(move || {
        if handle.is_triggered() {
            std::process::exit(130);
        }
        log::warn!("Interrupt received, press Ctrl-C again to abort running actions");
        handle.trigger();
    })
    .context("Failed to install interrupt handler")
}

pub fn run(ctx: &Context, args: &RunArgs) -> Result<()> {
    let mut deploy = DeployFile::load(&args.file)?.into_deploy();
    if args.keep {
        deploy = deploy.keep(true);
    }
    let plan = deploy.prepare().map_err(engine_error)?;
    log::info!(
        "Loaded {} from {}",
        ui::plural(plan.len(), "action"),
        args.file.display()
    );

    let known_hosts = if args.no_host_key_check {
        log::warn!("Host key verification disabled");
        None
    } else {
        sshkit::default_known_hosts()
    };
    let connector = SshConnector::new()
        .connect_timeout(Duration::from_secs(args.connect_timeout))
        .known_hosts(known_hosts);

    let shutdown = Shutdown::new();
    install_interrupt_handler(&shutdown)?;

    let mut progress = Progress {
        quiet: ctx.quiet,
        summary: None,
    };
    let result = actiongraph::execute(plan, Arc::new(connector), &shutdown, &mut progress);

    if let Some(summary) = &progress.summary
        && !ctx.quiet
    {
        ui::summary(summary);
    }

    match result {
        Ok(summary) if summary.interrupted => {
            ui::warn("Interrupted before any action ran");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => Err(engine_error(e)),
    }
}
