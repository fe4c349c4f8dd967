use std::{convert::TryFrom, net};

use verdocs::{err_at, git::Config, serve, Error, Result};

use crate::SubCommand;

#[derive(Clone)]
pub struct Handle {
    pub addr: net::SocketAddr,
}

impl TryFrom<crate::SubCommand> for Handle {
    type Error = Error;

    fn try_from(subcmd: crate::SubCommand) -> Result<Handle> {
        let opt = match subcmd {
            SubCommand::Serve { addr } => Handle {
                addr: err_at!(InvalidInput, addr.parse::<net::SocketAddr>(), "{:?}", addr)?,
            },
            _ => unreachable!(),
        };

        Ok(opt)
    }
}

pub fn handle(h: Handle, cfg: Config) -> Result<()> {
    let rt = err_at!(
        Fatal,
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    )?;

    rt.block_on(serve::run(h.addr, &cfg.loc_repo, &cfg.branch))
}
