mod packages;
mod repos;

use crate::opts::{Opts, SubCmd};

use anyhow::{bail, Result};
use aptctl::{cli::gen_prefix, executor::SystemRunner, Config};
use dialoguer::Confirm;
use nix::unistd::Uid;

/// Run the requested command. Returns whether the user cancelled it.
pub fn dispatch(config: &Config, opts: &Opts) -> Result<bool> {
    let runner = SystemRunner::new(config);
    match &opts.subcmd {
        SubCmd::Update => packages::update(&runner),
        SubCmd::List(args) => packages::list(config, &runner, args),
        SubCmd::Show(args) => packages::show(config, &runner, &args.name),
        SubCmd::Install(args) => packages::install(config, &runner, args),
        SubCmd::Remove(args) => packages::remove(config, opts, &runner, &args.names),
        SubCmd::Hold(args) => packages::hold(config, &runner, &args.name, true),
        SubCmd::Unhold(args) => packages::hold(config, &runner, &args.name, false),
        SubCmd::Repo(cmd) => repos::run(config, opts, &runner, cmd),
    }
}

pub fn ask_confirm(opts: &Opts, msg: &str) -> Result<bool> {
    if opts.yes {
        return Ok(true);
    }

    let msg = format!("{}{}", gen_prefix(""), msg);
    let res = Confirm::new().with_prompt(msg).interact()?;
    Ok(res)
}

/// Source files and keys can only be changed by root.
pub fn ensure_root() -> Result<()> {
    if !Uid::effective().is_root() {
        bail!("You must be root to perform this operation");
    }
    Ok(())
}
