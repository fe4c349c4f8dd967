use prettytable::{cell, row};

use std::convert::TryFrom;

use verdocs::{
    git::{Config, Repo},
    Error, Result,
};

use crate::SubCommand;

#[derive(Clone)]
pub struct Handle {
    pub long: bool,
}

impl TryFrom<crate::SubCommand> for Handle {
    type Error = Error;

    fn try_from(subcmd: crate::SubCommand) -> Result<Handle> {
        let opt = match subcmd {
            SubCommand::Ls { long } => Handle { long },
            _ => unreachable!(),
        };

        Ok(opt)
    }
}

pub fn handle(h: Handle, cfg: Config) -> Result<()> {
    let repo = Repo::open(&cfg.loc_repo)?;
    let entries = repo.list_files(&cfg.branch)?;

    if !h.long {
        entries.iter().for_each(|e| println!("{}", e.as_key()));
        return Ok(());
    }

    let mut table = prettytable::Table::new();
    table.set_format(*prettytable::format::consts::FORMAT_CLEAN);
    table.set_titles(row![Fy => "Mode", "Object", "Path"]);
    for entry in entries.iter() {
        let mode = format!("{:06o}", entry.to_mode());
        table.add_row(row![mode, entry.to_oid(), entry.as_key()]);
    }
    table.printstd();

    Ok(())
}
