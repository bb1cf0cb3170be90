//! `dotdeploy check`: validate a descriptor and print the action tree

use anyhow::Result;

use crate::Context;
use crate::cli::CheckArgs;
use crate::config::DeployFile;
use crate::ui;

use super::engine_error;

pub fn run(ctx: &Context, args: &CheckArgs) -> Result<()> {
    let plan = DeployFile::load(&args.file)?
        .into_deploy()
        .prepare()
        .map_err(engine_error)?;

    if ctx.quiet {
        return Ok(());
    }

    ui::header(&args.file.display().to_string());
    ui::kv("folder", &plan.folder().display().to_string());
    if plan.keeps_folder() {
        ui::kv("keep", "yes");
    }
    for connection in plan.connections() {
        ui::kv("remote", &format!("{} ({})", connection.name, connection.credential));
    }
    println!();
    print!("{plan}");
    println!();
    ui::success(&format!(
        "{} across {}",
        ui::plural(plan.len(), "action"),
        ui::plural(plan.connections().len(), "connection")
    ));
    Ok(())
}
